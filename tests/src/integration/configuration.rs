//! # Configuration and Telemetry
//!
//! A manager built from a TOML file, and the counters a handshake leaves
//! behind in the Prometheus registry.

#[cfg(test)]
mod tests {
    use crate::fixtures::{realm, run_handshake, service, user};
    use gss_context::test_utils::{loopback_provider, native_loopback_provider, LOOPBACK_MECHANISM};
    use gss_context::{
        ConfigError, ConfigProvider, CredentialUsage, Lifetime, MessageProp, SecurityManager,
        SecurityManagerApi, TomlConfigProvider,
    };
    use gss_telemetry::{
        gather_metrics, register_metrics, CONTEXTS_ESTABLISHED, SEQUENCE_ANOMALIES,
        TOKENS_REJECTED,
    };
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_manager_from_config_file() {
        let file = write_config("[manager]\ndefault_mechanism = \"1.3.6.1.4.1.32473.1.1\"\n");
        let source = TomlConfigProvider::load(file.path()).unwrap();
        assert_eq!(source.manager_config().default_mechanism, LOOPBACK_MECHANISM);

        let realm = realm();
        let manager = SecurityManager::from_config(&source, [loopback_provider(&realm)]);
        assert_eq!(manager.config().default_mechanism, LOOPBACK_MECHANISM);

        // No mechanism given anywhere: the configured default is used
        let credential = manager
            .acquire_credential_for(
                Some(&user("alice")),
                Lifetime::DEFAULT,
                None,
                CredentialUsage::InitiateOnly,
            )
            .unwrap();
        let mut client =
            manager.create_initiator_context(service(), None, Some(credential), Lifetime::DEFAULT);
        let mut server = manager.create_acceptor_context(None);
        run_handshake(&mut client, &mut server).unwrap();
        assert_eq!(client.mechanism(), Some(LOOPBACK_MECHANISM));
    }

    #[test]
    fn test_use_native_from_config_file() {
        let file = write_config(
            "[manager]\ndefault_mechanism = \"1.3.6.1.4.1.32473.1.1\"\nuse_native = true\n",
        );
        let source = TomlConfigProvider::load(file.path()).unwrap();

        let realm = realm();
        let manager = SecurityManager::from_config(
            &source,
            [loopback_provider(&realm), native_loopback_provider(&realm)],
        );
        assert_eq!(manager.mechanisms(), vec![LOOPBACK_MECHANISM]);
    }

    #[test]
    fn test_bad_config_file_is_reported() {
        let file = write_config("[manager]\ndefault_mechanism = 42\n");
        let err = TomlConfigProvider::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_handshake_metrics_are_exported() {
        // Another test may have registered first
        let _ = register_metrics();

        let established = CONTEXTS_ESTABLISHED.with_label_values(&["acceptor"]).get();
        let duplicates = SEQUENCE_ANOMALIES.with_label_values(&["duplicate"]).get();
        let malformed = TOKENS_REJECTED.with_label_values(&["malformed"]).get();

        let realm = realm();
        let manager = crate::fixtures::manager(&realm);
        let (mut client, mut server) = crate::fixtures::established_pair(&manager, None);

        let mut prop = MessageProp::default();
        let token = client.protect(b"once", &mut prop).unwrap();
        server.unprotect(&token, &mut prop).unwrap();
        server.unprotect(&token, &mut prop).unwrap();
        assert!(prop.is_duplicate());

        let mut fresh = manager.create_acceptor_context(None);
        assert!(fresh.accept(&[0x61, 0x00]).is_err());

        assert!(CONTEXTS_ESTABLISHED.with_label_values(&["acceptor"]).get() >= established + 1.0);
        assert!(SEQUENCE_ANOMALIES.with_label_values(&["duplicate"]).get() >= duplicates + 1.0);
        assert!(TOKENS_REJECTED.with_label_values(&["malformed"]).get() >= malformed + 1.0);

        let text = gather_metrics().unwrap();
        assert!(text.contains("gss_contexts_established_total"));
    }
}
