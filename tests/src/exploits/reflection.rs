//! # Reflection
//!
//! An attacker bounces a party's own per-message token back at it, or
//! cross-wires tokens between two unrelated sessions.

#[cfg(test)]
mod tests {
    use crate::fixtures::{established_pair, manager, realm};
    use gss_context::{ErrorKind, MessageProp, Oid};

    #[test]
    fn test_own_wrap_token_reflected() {
        let manager = manager(&realm());
        for mechanism in [None, Some(Oid::SPNEGO)] {
            let (mut client, mut server) = established_pair(&manager, mechanism.clone());

            let mut prop = MessageProp::new(0, true);
            let token = client.protect(b"transfer 100", &mut prop).unwrap();
            let err = client.unprotect(&token, &mut prop).unwrap_err();
            assert!(err.is(ErrorKind::Failure), "{mechanism:?}: {err:?}");

            // The genuine recipient still accepts it
            assert_eq!(server.unprotect(&token, &mut prop).unwrap(), b"transfer 100");
        }
    }

    #[test]
    fn test_own_mic_reflected() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);

        let mut prop = MessageProp::default();
        let mic = server.sign(b"ok", &mut prop).unwrap();
        let err = server.verify(&mic, b"ok", &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::Failure));

        client.verify(&mic, b"ok", &mut prop).unwrap();
    }

    #[test]
    fn test_tokens_do_not_cross_sessions() {
        let manager = manager(&realm());
        let (mut client_a, mut server_a) = established_pair(&manager, None);
        let (mut client_b, mut server_b) = established_pair(&manager, None);

        let mut prop = MessageProp::default();
        let token = client_a.protect(b"for session a", &mut prop).unwrap();
        let err = server_b.unprotect(&token, &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::Failure));

        let mic = client_b.sign(b"for session b", &mut prop).unwrap();
        let err = server_a.verify(&mic, b"for session b", &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::Failure));
    }

    #[test]
    fn test_wrap_token_is_not_a_mic() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);

        let mut prop = MessageProp::new(0, false);
        let wrapped = client.protect(b"payload", &mut prop).unwrap();
        let err = server.verify(&wrapped, b"payload", &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::MalformedToken));

        let mic = client.sign(b"payload", &mut prop).unwrap();
        let err = server.unprotect(&mic, &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::MalformedToken));
    }
}
