//! envseal - Encrypted credentials for env files
//!
//! This library seals credential values with a passphrase-derived key
//! (PBKDF2-HMAC-SHA256, AES-256-GCM) into a single-line JSON envelope, and
//! resolves them back to plaintext at runtime with a time-bounded cache.

pub mod batch;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod passphrase;
pub mod source;
pub mod store;

pub use config::Config;
pub use envelope::{Algorithm, Envelope};
pub use error::{Error, Result};
pub use store::CredentialStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::CredentialCache;
    pub use crate::config::Config;
    pub use crate::envelope::{Algorithm, Envelope};
    pub use crate::error::{Error, Result};
    pub use crate::source::{CredentialSource, EnvFileSource, EnvSource, LayeredSource, MapSource};
    pub use crate::store::CredentialStore;
}
