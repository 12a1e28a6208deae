//! # Replay
//!
//! Captured tokens re-sent later: per-message tokens are flagged through
//! the supplementary status, handshake tokens are refused once the
//! context is established.

#[cfg(test)]
mod tests {
    use crate::fixtures::{acceptor, established_pair, initiator, manager, realm};
    use gss_context::{ContextState, ErrorKind, MessageProp, SecurityContext};
    use gss_types::SupplementaryStatus::{self, Duplicate, Gap, InOrder, Old, Unsequenced};

    fn captured(client: &mut SecurityContext, count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| {
                let mut prop = MessageProp::default();
                client.protect(format!("message {i}").as_bytes(), &mut prop).unwrap()
            })
            .collect()
    }

    fn deliver(server: &mut SecurityContext, token: &[u8]) -> SupplementaryStatus {
        let mut prop = MessageProp::default();
        server.unprotect(token, &mut prop).unwrap();
        prop.supplementary
    }

    #[test]
    fn test_replayed_message_is_flagged() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);
        let tokens = captured(&mut client, 3);

        for (index, expected) in [(0, InOrder), (1, InOrder), (1, Duplicate), (0, Duplicate)] {
            assert_eq!(deliver(&mut server, &tokens[index]), expected, "token {index}");
        }
        assert_eq!(deliver(&mut server, &tokens[2]), InOrder);
    }

    #[test]
    fn test_dropped_and_reordered_messages() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);
        let tokens = captured(&mut client, 4);

        assert_eq!(deliver(&mut server, &tokens[0]), InOrder);
        assert_eq!(deliver(&mut server, &tokens[2]), Gap);
        assert_eq!(deliver(&mut server, &tokens[1]), Unsequenced);
        assert_eq!(deliver(&mut server, &tokens[3]), InOrder);
        assert_eq!(deliver(&mut server, &tokens[1]), Duplicate);
    }

    #[test]
    fn test_message_older_than_window_is_old() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);
        let tokens = captured(&mut client, 12);

        // Six disjoint runs push the oldest out of the tracked history
        for index in (0..12).step_by(2) {
            deliver(&mut server, &tokens[index]);
        }
        assert_eq!(deliver(&mut server, &tokens[1]), Old);
        assert_eq!(deliver(&mut server, &tokens[1]), Old);
        assert_eq!(deliver(&mut server, &tokens[3]), Unsequenced);
    }

    #[test]
    fn test_replay_without_detection_is_not_flagged() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let mut server = acceptor(&manager);
        client.request_replay_detection(false);
        client.request_sequence_detection(false);
        crate::fixtures::run_handshake(&mut client, &mut server).unwrap();
        assert!(!server.replay_detection_state());

        let tokens = captured(&mut client, 1);
        assert_eq!(deliver(&mut server, &tokens[0]), InOrder);
        assert_eq!(deliver(&mut server, &tokens[0]), InOrder);
    }

    #[test]
    fn test_handshake_token_replayed_after_establishment() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let mut server = acceptor(&manager);

        let first = client.initiate(&[]).unwrap();
        let reply = server.accept(&first).unwrap();
        client.initiate(&reply).unwrap();

        let err = server.accept(&first).unwrap_err();
        assert!(err.is(ErrorKind::InvalidContextState));
        let err = client.initiate(&reply).unwrap_err();
        assert!(err.is(ErrorKind::InvalidContextState));
        assert_eq!(server.state(), ContextState::Ready);
    }

    #[test]
    fn test_replay_after_dispose_is_refused() {
        let manager = manager(&realm());
        let (mut client, mut server) = established_pair(&manager, None);
        let tokens = captured(&mut client, 1);

        server.dispose();
        let mut prop = MessageProp::default();
        let err = server.unprotect(&tokens[0], &mut prop).unwrap_err();
        assert!(err.is(ErrorKind::InvalidContextState));
    }
}
