//! # Error Types
//!
//! One error enum covers the whole negotiation core and the mechanisms that
//! plug into it. Mechanisms report through the same variants so that the
//! core can propagate their failures unchanged.

use crate::entities::CredentialUsage;
use crate::oid::Oid;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Result alias used across the workspace.
pub type GssResult<T> = Result<T, GssError>;

/// Coarse classification of a [`GssError`], convenient for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedToken,
    MechanismMismatch,
    UnsupportedMechanism,
    NoCredential,
    InvalidContextState,
    DuplicateRegistration,
    Failure,
}

/// Errors raised by context negotiation, credential handling and mechanism
/// resolution.
#[derive(Debug, Clone, Error)]
pub enum GssError {
    /// Token framing or identifier encoding could not be parsed.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Inbound token names a different mechanism than the context is bound to.
    #[error("Mechanism mismatch: context uses {expected}, token carries {actual}")]
    MechanismMismatch { expected: Oid, actual: Oid },

    /// No registered provider (or not the named one) supports the mechanism.
    #[error("Unsupported mechanism {mechanism}{}", provider_suffix(.provider))]
    UnsupportedMechanism {
        mechanism: Oid,
        provider: Option<String>,
    },

    /// No credential element matches the requested mechanism and direction.
    #[error("No credential found for {}", describe_element(.mechanism, .usage))]
    NoCredential {
        mechanism: Option<Oid>,
        usage: Option<CredentialUsage>,
    },

    /// The operation is not allowed in the object's current state.
    #[error("Invalid context state: {0}")]
    InvalidContextState(String),

    /// A credential element for this (mechanism, usage) key already exists.
    #[error("Duplicate element found: {mechanism} {usage}")]
    DuplicateRegistration {
        mechanism: Oid,
        usage: CredentialUsage,
    },

    /// Anything else, optionally wrapping the underlying cause.
    #[error("{message}")]
    Failure {
        message: String,
        #[source]
        source: Option<Arc<dyn StdError + Send + Sync>>,
    },
}

impl GssError {
    pub fn malformed(message: impl Into<String>) -> Self {
        GssError::MalformedToken(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        GssError::InvalidContextState(message.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        GssError::Failure {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error as a [`GssError::Failure`].
    pub fn wrap<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        GssError::Failure {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn unsupported(mechanism: &Oid) -> Self {
        GssError::UnsupportedMechanism {
            mechanism: mechanism.clone(),
            provider: None,
        }
    }

    pub fn no_credential(mechanism: Option<&Oid>, usage: Option<CredentialUsage>) -> Self {
        GssError::NoCredential {
            mechanism: mechanism.cloned(),
            usage,
        }
    }

    /// Coarse classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GssError::MalformedToken(_) => ErrorKind::MalformedToken,
            GssError::MechanismMismatch { .. } => ErrorKind::MechanismMismatch,
            GssError::UnsupportedMechanism { .. } => ErrorKind::UnsupportedMechanism,
            GssError::NoCredential { .. } => ErrorKind::NoCredential,
            GssError::InvalidContextState(_) => ErrorKind::InvalidContextState,
            GssError::DuplicateRegistration { .. } => ErrorKind::DuplicateRegistration,
            GssError::Failure { .. } => ErrorKind::Failure,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

impl From<std::io::Error> for GssError {
    fn from(err: std::io::Error) -> Self {
        GssError::wrap("I/O failure", err)
    }
}

fn provider_suffix(provider: &Option<String>) -> String {
    match provider {
        Some(name) => format!(" (provider {name})"),
        None => String::new(),
    }
}

fn describe_element(mechanism: &Option<Oid>, usage: &Option<CredentialUsage>) -> String {
    let mech = mechanism
        .as_ref()
        .map_or_else(|| "<default mechanism>".to_string(), Oid::to_string);
    match usage {
        Some(usage) => format!("{mech} {usage}"),
        None => mech,
    }
}
