//! # Negotiation Flows
//!
//! Contexts requested for SPNEGO: the wrapper picks the loopback mechanism,
//! only the initiator's first token is framed, and the established context
//! reports the negotiated mechanism.

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        acceptor, client_credential, initiator, manager, realm, run_handshake, service, user,
    };
    use gss_context::test_utils::LOOPBACK_MECHANISM;
    use gss_context::{
        CredentialUsage, ErrorKind, Lifetime, MessageProp, Oid, SecurityManagerApi, TokenHeader,
    };
    use gss_context::domain::TOKEN_ID;
    use std::sync::Arc;

    #[test]
    fn test_negotiated_context_reports_inner_mechanism() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", Some(Oid::SPNEGO));
        let mut server = acceptor(&manager);

        let first = client.initiate(&[]).unwrap();
        let (header, body) = TokenHeader::split(&first).unwrap();
        assert_eq!(header.mechanism(), &Oid::SPNEGO);
        assert_ne!(body.first(), Some(&TOKEN_ID));

        let reply = server.accept(&first).unwrap();
        assert_ne!(reply.first(), Some(&TOKEN_ID));
        assert!(server.is_established());

        assert!(client.initiate(&reply).unwrap().is_empty());
        assert!(client.is_established());
        assert_eq!(client.mechanism(), Some(LOOPBACK_MECHANISM));
        assert_eq!(server.mechanism(), Some(LOOPBACK_MECHANISM));
        assert_eq!(server.source_name().unwrap().unwrap().value(), "alice");
    }

    #[test]
    fn test_client_without_negotiation_element_falls_back() {
        let manager = manager(&realm());
        // Only a loopback element, no SPNEGO element
        let credential = manager
            .acquire_credential(
                Some(&user("alice")),
                Lifetime::DEFAULT,
                Some(&[LOOPBACK_MECHANISM]),
                CredentialUsage::InitiateOnly,
            )
            .unwrap();
        assert_eq!(credential.mechanisms().unwrap(), vec![LOOPBACK_MECHANISM]);

        let mut client = manager.create_initiator_context(
            service(),
            Some(Oid::SPNEGO),
            Some(credential),
            Lifetime::DEFAULT,
        );
        let mut server = acceptor(&manager);
        assert_eq!(run_handshake(&mut client, &mut server).unwrap(), 2);
        assert!(client.is_established());
    }

    #[test]
    fn test_server_without_negotiation_element_is_rejected() {
        let manager = manager(&realm());
        let loopback_only = manager
            .acquire_credential(
                Some(&service()),
                Lifetime::DEFAULT,
                Some(&[LOOPBACK_MECHANISM]),
                CredentialUsage::AcceptOnly,
            )
            .unwrap();

        let mut client = initiator(&manager, "alice", Some(Oid::SPNEGO));
        let mut server = manager.create_acceptor_context(Some(loopback_only));

        let first = client.initiate(&[]).unwrap();
        let err = server.accept(&first).unwrap_err();
        assert!(err.is(ErrorKind::NoCredential));
    }

    #[test]
    fn test_messages_through_negotiated_context() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "bob", Some(Oid::SPNEGO));
        let mut server = acceptor(&manager);
        run_handshake(&mut client, &mut server).unwrap();

        let mut prop = MessageProp::new(0, true);
        let token = client.protect(b"negotiated", &mut prop).unwrap();
        let mut received = MessageProp::default();
        assert_eq!(server.unprotect(&token, &mut received).unwrap(), b"negotiated");
        assert!(received.privacy);

        let mic = server.sign(b"ack", &mut prop).unwrap();
        client.verify(&mic, b"ack", &mut received).unwrap();
    }

    #[test]
    fn test_negotiated_and_direct_contexts_interoperate_on_one_server() {
        let manager = manager(&realm());
        let server_credential = crate::fixtures::server_credential(&manager);

        for mechanism in [Some(Oid::SPNEGO), Some(LOOPBACK_MECHANISM), None] {
            let credential = client_credential(&manager, "alice");
            let mut client = manager.create_initiator_context(
                service(),
                mechanism.clone(),
                Some(credential),
                Lifetime::DEFAULT,
            );
            let mut server = manager.create_acceptor_context(Some(Arc::clone(&server_credential)));
            run_handshake(&mut client, &mut server).unwrap();
            assert_eq!(server.mechanism(), Some(LOOPBACK_MECHANISM), "{mechanism:?}");
        }
    }
}
