//! Error types for envseal

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for envseal
///
/// Messages never carry plaintext, passphrases or key material.
#[derive(Error, Debug)]
pub enum Error {
    // Envelope errors
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unsupported envelope algorithm: {0}")]
    UnsupportedAlgorithm(String),

    // Crypto errors
    #[error("Decryption failed: invalid password or corrupted data")]
    AuthenticationFailure,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Invalid {what} length: expected {expected}, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    // Credential store errors
    #[error("Credential {0} not found")]
    CredentialNotFound(String),

    #[error("Unable to access credential {name}")]
    DecryptionFailure {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // Config errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a failure that happened while resolving a named credential
    pub fn decryption_failure(name: impl Into<String>, source: Error) -> Self {
        Error::DecryptionFailure {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is a "credential not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::CredentialNotFound(_))
    }

    /// Check if the authentication tag did not verify
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::AuthenticationFailure)
    }

    /// Check if the input was not a well-formed envelope
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::MalformedEnvelope(_) | Error::UnsupportedAlgorithm(_)
        )
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Underlying cause of a `DecryptionFailure`, or the error itself
    pub fn root(&self) -> &Error {
        match self {
            Error::DecryptionFailure { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_message_is_generic() {
        let err = Error::AuthenticationFailure;
        assert_eq!(
            err.to_string(),
            "Decryption failed: invalid password or corrupted data"
        );
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_decryption_failure_keeps_cause() {
        let err = Error::decryption_failure("VITE_VPB_API_KEY", Error::AuthenticationFailure);
        assert_eq!(err.to_string(), "Unable to access credential VITE_VPB_API_KEY");
        assert!(err.root().is_auth_failure());

        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("invalid password"));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::CredentialNotFound("X".into()).is_not_found());
        assert!(Error::MalformedEnvelope("bad".into()).is_malformed());
        assert!(Error::UnsupportedAlgorithm("ROT13".into()).is_malformed());
        assert!(Error::Configuration("missing".into()).is_configuration());
        assert!(!Error::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
