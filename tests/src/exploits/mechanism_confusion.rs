//! # Mechanism Confusion
//!
//! Tokens relabelled with another mechanism's identifier, mid-handshake
//! mechanism switches, and impersonation from a foreign realm.

#[cfg(test)]
mod tests {
    use crate::fixtures::{acceptor, initiator, manager, realm, server_credential};
    use gss_context::test_utils::{loopback_provider, LoopbackRealm, LOOPBACK_MECHANISM};
    use gss_context::{
        ContextState, ErrorKind, GssError, Oid, SecurityManager, SecurityManagerApi, TokenHeader,
    };

    #[test]
    fn test_reply_relabelled_as_other_mechanism() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let mut server = acceptor(&manager);

        let first = client.initiate(&[]).unwrap();
        let reply = server.accept(&first).unwrap();
        let (_, body) = TokenHeader::split(&reply).unwrap();

        for other in [Oid::KRB5, Oid::SPNEGO] {
            let forged = TokenHeader::frame(&other, body).unwrap();
            match client.initiate(&forged).unwrap_err() {
                GssError::MechanismMismatch { expected, actual } => {
                    assert_eq!(expected, LOOPBACK_MECHANISM);
                    assert_eq!(actual, other);
                }
                e => panic!("expected mismatch, got {e:?}"),
            }
            assert_eq!(client.state(), ContextState::InProgress);
        }

        client.initiate(&reply).unwrap();
        assert!(client.is_established());
    }

    #[test]
    fn test_first_token_relabelled_as_negotiation() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let first = client.initiate(&[]).unwrap();
        let (_, body) = TokenHeader::split(&first).unwrap();

        // A bare loopback token is not a negotiation offer
        let forged = TokenHeader::frame(&Oid::SPNEGO, body).unwrap();
        let mut server = acceptor(&manager);
        let err = server.accept(&forged).unwrap_err();
        assert!(err.is(ErrorKind::MalformedToken), "{err:?}");
        assert!(!server.is_established());
    }

    #[test]
    fn test_negotiation_offer_relabelled_as_loopback() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", Some(Oid::SPNEGO));
        let first = client.initiate(&[]).unwrap();
        let (_, body) = TokenHeader::split(&first).unwrap();

        let forged = TokenHeader::frame(&LOOPBACK_MECHANISM, body).unwrap();
        let mut server = acceptor(&manager);
        let err = server.accept(&forged).unwrap_err();
        assert!(err.is(ErrorKind::MalformedToken), "{err:?}");
    }

    #[test]
    fn test_foreign_realm_cannot_impersonate_client() {
        // Same principal names, independent keys
        let home = realm();
        let rogue = LoopbackRealm::with_principals(&["alice", "HTTP/server"]);
        let server_manager = manager(&home);
        let rogue_manager = SecurityManager::with_providers(
            crate::fixtures::config(),
            [loopback_provider(&rogue)],
        );

        let mut impostor = initiator(&rogue_manager, "alice", None);
        let mut server =
            server_manager.create_acceptor_context(Some(server_credential(&server_manager)));

        let token = impostor.initiate(&[]).unwrap();
        let err = server.accept(&token).unwrap_err();
        assert!(err.is(ErrorKind::Failure), "{err:?}");
        assert_eq!(server.state(), ContextState::PreInit);
        assert!(server.source_name().unwrap().is_none());
    }

    #[test]
    fn test_token_for_other_service_is_refused() {
        let realm = realm();
        let manager = manager(&realm);
        let bob_as_service = manager
            .acquire_credential(
                Some(&crate::fixtures::user("bob")),
                gss_context::Lifetime::DEFAULT,
                Some(&[LOOPBACK_MECHANISM]),
                gss_context::CredentialUsage::AcceptOnly,
            )
            .unwrap();

        let mut client = initiator(&manager, "alice", None);
        let mut bob = manager.create_acceptor_context(Some(bob_as_service));
        let token = client.initiate(&[]).unwrap();

        let err = bob.accept(&token).unwrap_err();
        assert!(err.is(ErrorKind::NoCredential));
    }
}
