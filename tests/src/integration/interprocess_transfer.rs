//! # Interprocess Transfer
//!
//! An established context exported by one manager and imported by another
//! sharing the same realm, standing in for a hand-off between processes.

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        acceptor, established_pair, initiator, manager, native_manager, realm, run_handshake,
    };
    use gss_context::test_utils::LOOPBACK_MECHANISM;
    use gss_context::domain::TOKEN_ID;
    use gss_context::{ContextState, ErrorKind, MessageProp, SecurityManagerApi, TokenHeader};
    use gss_types::SupplementaryStatus;

    #[test]
    fn test_acceptor_handed_to_worker_process() {
        let realm = realm();
        let listener = native_manager(&realm);
        let worker = native_manager(&realm);

        let (mut client, mut server) = established_pair(&listener, None);
        assert!(server.is_transferable());

        let mut prop = MessageProp::default();
        let before = client.protect(b"before transfer", &mut prop).unwrap();
        server.unprotect(&before, &mut prop).unwrap();

        let exported = server.export_to_interprocess_token().unwrap().unwrap();
        assert_eq!(server.state(), ContextState::Deleted);

        let mut imported = worker.import_context(&exported).unwrap();
        assert_eq!(imported.state(), ContextState::Ready);
        assert!(!imported.is_initiator());
        assert_eq!(imported.mechanism(), Some(LOOPBACK_MECHANISM));
        assert_eq!(imported.source_name().unwrap().unwrap().value(), "alice");

        // Sequence tracking continues where the exporter left off
        let after = client.protect(b"after transfer", &mut prop).unwrap();
        let mut received = MessageProp::default();
        assert_eq!(imported.unprotect(&after, &mut received).unwrap(), b"after transfer");
        assert_eq!(received.supplementary, SupplementaryStatus::InOrder);

        let mut received = MessageProp::default();
        imported.unprotect(&before, &mut received).unwrap();
        assert_eq!(received.supplementary, SupplementaryStatus::Duplicate);

        let reply = imported.protect(b"from worker", &mut prop).unwrap();
        assert_eq!(client.unprotect(&reply, &mut prop).unwrap(), b"from worker");
    }

    #[test]
    fn test_export_token_is_single_use_state() {
        let realm = realm();
        let manager = native_manager(&realm);
        let (mut client, _server) = established_pair(&manager, None);

        let exported = client.export_to_interprocess_token().unwrap().unwrap();
        let err = client.export_to_interprocess_token().unwrap_err();
        assert!(err.is(ErrorKind::InvalidContextState));

        let imported = manager.import_context(&exported).unwrap();
        assert!(imported.is_initiator());
    }

    #[test]
    fn test_non_native_manager_cannot_transfer() {
        let realm = realm();
        let manager = manager(&realm);
        let (mut client, _server) = established_pair(&manager, None);

        assert!(!client.is_transferable());
        assert_eq!(client.export_to_interprocess_token().unwrap(), None);
        assert!(client.is_established());

        // A native manager's token is meaningless to a non-native one
        let native = native_manager(&realm);
        let (mut native_client, _native_server) = established_pair(&native, None);
        let exported = native_client.export_to_interprocess_token().unwrap().unwrap();
        let err = manager.import_context(&exported).unwrap_err();
        assert!(err.is(ErrorKind::Failure));
    }

    #[test]
    fn test_native_engine_frames_its_own_tokens() {
        let realm = realm();
        let manager = native_manager(&realm);
        let mut client = initiator(&manager, "bob", None);
        let mut server = acceptor(&manager);

        // Exactly one header: the engine's own, not doubled by the context
        let first = client.initiate(&[]).unwrap();
        let (header, body) = TokenHeader::split(&first).unwrap();
        assert_eq!(header.mechanism(), &LOOPBACK_MECHANISM);
        assert_ne!(body.first(), Some(&TOKEN_ID));

        let reply = server.accept(&first).unwrap();
        assert!(TokenHeader::split(&reply).is_ok());
        client.initiate(&reply).unwrap();
        assert!(client.is_established() && server.is_established());

        let mut other = initiator(&manager, "alice", None);
        let mut peer = acceptor(&manager);
        assert_eq!(run_handshake(&mut other, &mut peer).unwrap(), 2);
    }
}
