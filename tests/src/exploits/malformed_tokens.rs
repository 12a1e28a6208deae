//! # Malformed Context Tokens
//!
//! Hostile framing: bad tags, oversized or indefinite lengths, identifiers
//! overrunning the declared length, and random garbage.

#[cfg(test)]
mod tests {
    use crate::fixtures::{acceptor, initiator, manager, realm};
    use gss_context::{ContextState, ErrorKind, Oid, SecurityManagerApi, TokenHeader};
    use rand::{Rng, SeedableRng};

    struct Case {
        name: &'static str,
        token: Vec<u8>,
        expected: ErrorKind,
    }

    fn cases() -> Vec<Case> {
        let krb5_der = Oid::KRB5.to_der();
        let mut overrun = vec![0x60, 0x03];
        overrun.extend_from_slice(&krb5_der);

        let mut short_body = TokenHeader::frame(&Oid::KRB5, b"body").unwrap();
        short_body.truncate(short_body.len() - 1);

        let mut long_body = TokenHeader::frame(&Oid::KRB5, b"body").unwrap();
        long_body.push(0x00);

        vec![
            Case {
                name: "empty",
                token: vec![],
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "wrong application tag",
                token: vec![0x30, 0x02, 0x06, 0x00],
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "indefinite length",
                token: vec![0x60, 0x80, 0x06, 0x01, 0x2a],
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "five length octets",
                token: vec![0x60, 0x85, 0xff, 0xff, 0xff, 0xff, 0xff],
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "length octets missing",
                token: vec![0x60, 0x82, 0x01],
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "identifier tag is not an OID",
                token: vec![0x60, 0x03, 0x04, 0x01, 0x2a],
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "identifier overruns declared length",
                token: overrun,
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "body shorter than declared",
                token: short_body,
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "body longer than declared",
                token: long_body,
                expected: ErrorKind::MalformedToken,
            },
            Case {
                name: "well-framed but unknown mechanism",
                token: TokenHeader::frame(&Oid::NT_EXPORT_NAME, b"x").unwrap(),
                expected: ErrorKind::UnsupportedMechanism,
            },
        ]
    }

    #[test]
    fn test_hostile_first_tokens_are_rejected() {
        let manager = manager(&realm());

        for case in cases() {
            let mut server = manager.create_acceptor_context(None);
            let err = server.accept(&case.token).unwrap_err();
            assert!(
                err.is(case.expected),
                "{}: expected {:?}, got {err:?}",
                case.name,
                case.expected
            );
            assert_eq!(server.state(), ContextState::PreInit, "{}", case.name);
        }
    }

    #[test]
    fn test_rejected_token_does_not_poison_acceptor() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let mut server = acceptor(&manager);

        for case in cases() {
            assert!(server.accept(&case.token).is_err(), "{}", case.name);
        }

        let token = client.initiate(&[]).unwrap();
        let reply = server.accept(&token).unwrap();
        client.initiate(&reply).unwrap();
        assert!(client.is_established() && server.is_established());
    }

    #[test]
    fn test_truncated_genuine_tokens() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let token = client.initiate(&[]).unwrap();

        for len in 0..token.len() {
            let mut server = acceptor(&manager);
            assert!(server.accept(&token[..len]).is_err(), "prefix of {len} bytes");
            assert_eq!(server.state(), ContextState::PreInit);
        }
    }

    #[test]
    fn test_tampered_mechanism_body_fails_verification() {
        let manager = manager(&realm());
        let mut client = initiator(&manager, "alice", None);
        let token = client.initiate(&[]).unwrap();
        let (header, _) = TokenHeader::split(&token).unwrap();
        let body_start = header.header_len();

        // Flip one bit in each position past the header and tag bytes
        for position in (body_start + 2..token.len()).step_by(7) {
            let mut forged = token.clone();
            forged[position] ^= 0x01;
            let mut server = acceptor(&manager);
            let err = server.accept(&forged).unwrap_err();
            assert!(
                err.is(ErrorKind::Failure)
                    || err.is(ErrorKind::MalformedToken)
                    || err.is(ErrorKind::NoCredential),
                "byte {position}: {err:?}"
            );
            assert!(!server.is_established());
        }
    }

    #[test]
    fn test_random_garbage_never_panics() {
        let manager = manager(&realm());
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x6753_5321);

        for _ in 0..500 {
            let len = rng.gen_range(0..96);
            let mut token: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            if rng.gen_bool(0.5) && !token.is_empty() {
                token[0] = 0x60;
            }
            let mut server = manager.create_acceptor_context(None);
            if server.accept(&token).is_err() {
                assert_eq!(server.state(), ContextState::PreInit);
            }
        }
    }
}
