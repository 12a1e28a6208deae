//! Manager configuration.

use gss_types::Oid;
use std::env;
use tracing::warn;

/// Settings applied once when a manager is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Mechanism used whenever a caller omits one.
    pub default_mechanism: Oid,

    /// Admit only native providers to the preference list.
    pub use_native: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_mechanism: Oid::KRB5,
            use_native: false,
        }
    }
}

impl ManagerConfig {
    /// Read configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `GSS_DEFAULT_MECHANISM`: dotted mechanism OID (default: Kerberos v5)
    /// - `GSS_USE_NATIVE`: only use native providers (default: false)
    pub fn from_env() -> Self {
        let default_mechanism = match env::var("GSS_DEFAULT_MECHANISM") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                warn!(value = %value, error = %e, "[Config] Ignoring GSS_DEFAULT_MECHANISM");
                Oid::KRB5
            }),
            Err(_) => Oid::KRB5,
        };

        Self {
            default_mechanism,
            use_native: env::var("GSS_USE_NATIVE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn with_default_mechanism(mut self, mechanism: Oid) -> Self {
        self.default_mechanism = mechanism;
        self
    }

    pub fn with_native(mut self, use_native: bool) -> Self {
        self.use_native = use_native;
        self
    }
}
