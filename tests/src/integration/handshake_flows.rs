//! # Handshake Flows
//!
//! End-to-end establishment and message exchange over the loopback
//! mechanism through [`SecurityManager`].

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        acceptor, client_credential, established_pair, initiator, manager, realm, run_handshake,
        service, user,
    };
    use gss_context::test_utils::LOOPBACK_MECHANISM;
    use gss_context::{
        ContextState, CredentialUsage, ErrorKind, Lifetime, MessageProp, SecurityContext,
        SecurityManagerApi, TokenHeader,
    };
    use gss_types::SupplementaryStatus;
    use std::sync::Arc;

    // =============================================================================
    // ESTABLISHMENT
    // =============================================================================

    #[test]
    fn test_client_server_establishment() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let mut server = acceptor(&manager);

        let first = client.initiate(&[]).unwrap();
        let (header, _) = TokenHeader::split(&first).unwrap();
        assert_eq!(header.mechanism(), &LOOPBACK_MECHANISM);
        assert_eq!(client.state(), ContextState::InProgress);

        let reply = server.accept(&first).unwrap();
        assert!(server.is_established());
        assert!(!reply.is_empty());

        assert!(client.initiate(&reply).unwrap().is_empty());
        assert!(client.is_established());

        assert_eq!(server.source_name().unwrap().unwrap().value(), "alice");
        assert_eq!(client.target_name().unwrap().unwrap().value(), "HTTP/server");
        assert_eq!(client.mechanism(), Some(LOOPBACK_MECHANISM));
        assert_eq!(server.mechanism(), Some(LOOPBACK_MECHANISM));
    }

    #[test]
    fn test_single_token_without_mutual_auth() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "bob", None);
        let mut server = acceptor(&manager);
        client.request_mutual_auth(false);

        assert_eq!(run_handshake(&mut client, &mut server).unwrap(), 1);
        assert!(client.is_established() && server.is_established());
        assert!(!client.mutual_auth_state());
        assert_eq!(server.source_name().unwrap().unwrap().value(), "bob");
    }

    #[test]
    fn test_unknown_client_cannot_acquire() {
        let manager = manager(&realm());
        let err = manager
            .acquire_credential(
                Some(&user("mallory")),
                Lifetime::DEFAULT,
                Some(&[LOOPBACK_MECHANISM]),
                CredentialUsage::InitiateOnly,
            )
            .unwrap_err();
        assert!(err.is(ErrorKind::NoCredential));
    }

    #[test]
    fn test_revoked_principal_cannot_establish() {
        let realm = realm();
        let manager = manager(&realm);
        let mut client = initiator(&manager, "alice", None);
        let mut server = acceptor(&manager);

        let token = client.initiate(&[]).unwrap();
        realm.remove_principal("alice");

        let err = server.accept(&token).unwrap_err();
        assert!(err.is(ErrorKind::Failure));
        assert_eq!(server.state(), ContextState::PreInit);
    }

    // =============================================================================
    // MESSAGE EXCHANGE
    // =============================================================================

    #[test]
    fn test_conversation_stays_in_order() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);

        for round in 0..32u32 {
            let request = format!("request {round}");
            let mut prop = MessageProp::new(0, round % 2 == 0);
            let token = client.protect(request.as_bytes(), &mut prop).unwrap();

            let mut received = MessageProp::default();
            let plain = server.unprotect(&token, &mut received).unwrap();
            assert_eq!(plain, request.as_bytes());
            assert_eq!(received.privacy, round % 2 == 0);
            assert_eq!(received.supplementary, SupplementaryStatus::InOrder);

            let mut prop = MessageProp::default();
            let mic = server.sign(&plain, &mut prop).unwrap();
            let mut checked = MessageProp::default();
            client.verify(&mic, &plain, &mut checked).unwrap();
            assert_eq!(checked.supplementary, SupplementaryStatus::InOrder);
        }
    }

    #[test]
    fn test_wrap_size_limit_is_honoured() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);

        let max_token = 512;
        let limit = client.wrap_size_limit(0, true, max_token).unwrap();
        let message = vec![0x5a; limit];
        let mut prop = MessageProp::new(0, true);
        let token = client.protect(&message, &mut prop).unwrap();
        assert!(token.len() <= max_token);

        let mut received = MessageProp::default();
        assert_eq!(server.unprotect(&token, &mut received).unwrap(), message);
    }

    #[test]
    fn test_disposed_context_refuses_messages() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);

        client.dispose();
        assert_eq!(client.state(), ContextState::Deleted);
        let mut prop = MessageProp::default();
        let err = client.protect(b"late", &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::InvalidContextState));

        // The peer is unaffected
        let token = server.protect(b"still here", &mut prop).unwrap();
        assert!(!token.is_empty());
    }

    // =============================================================================
    // DELEGATION
    // =============================================================================

    #[test]
    fn test_server_acts_on_behalf_of_client() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let mut front_end = acceptor(&manager);
        client.request_credential_delegation(true);
        run_handshake(&mut client, &mut front_end).unwrap();
        assert!(front_end.credential_delegation_state());

        let delegated = front_end.delegated_credential().unwrap().unwrap();
        assert_eq!(delegated.name(None).unwrap().value(), "alice");

        let mut onward =
            manager.create_initiator_context(service(), None, Some(delegated), Lifetime::DEFAULT);
        let mut back_end = manager.create_acceptor_context(None);
        run_handshake(&mut onward, &mut back_end).unwrap();
        assert_eq!(back_end.source_name().unwrap().unwrap().value(), "alice");
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[test]
    fn test_parallel_handshakes_share_one_manager() {
        let manager = Arc::new(manager(&realm()));

        std::thread::scope(|scope| {
            for client in ["alice", "bob"].into_iter().cycle().take(8) {
                let manager = Arc::clone(&manager);
                scope.spawn(move || {
                    let mut initiator = initiator(&manager, client, None);
                    let mut acceptor = acceptor(&manager);
                    run_handshake(&mut initiator, &mut acceptor).unwrap();

                    let mut prop = MessageProp::default();
                    let token = initiator.protect(client.as_bytes(), &mut prop).unwrap();
                    let plain = acceptor.unprotect(&token, &mut prop).unwrap();
                    assert_eq!(plain, client.as_bytes());
                });
            }
        });

        // Factories are created once per (provider, mechanism) and then reused
        assert_eq!(manager.mechanisms().len(), 2);
    }

    #[test]
    fn test_contexts_move_between_threads() {
        let manager = manager(&realm());
        let (client, mut server) = established_pair(&manager, None);

        let token = std::thread::spawn(move || {
            let mut client: SecurityContext = client;
            let mut prop = MessageProp::default();
            client.protect(b"from another thread", &mut prop).unwrap()
        })
        .join()
        .unwrap();

        let mut prop = MessageProp::default();
        assert_eq!(
            server.unprotect(&token, &mut prop).unwrap(),
            b"from another thread"
        );
    }

    #[test]
    fn test_credential_shared_by_many_contexts() {
        let manager = manager(&realm());
        let credential = client_credential(&manager, "alice");

        for _ in 0..4 {
            let mut client = manager.create_initiator_context(
                service(),
                None,
                Some(Arc::clone(&credential)),
                Lifetime::DEFAULT,
            );
            let mut server = acceptor(&manager);
            run_handshake(&mut client, &mut server).unwrap();
        }
        assert_eq!(Arc::strong_count(&credential), 1);
    }
}
