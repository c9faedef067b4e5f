//! Master passphrase resolution and generation

use crate::config::{Config, RuntimeEnvironment};
use crate::error::{Error, Result};
use crate::source::CredentialSource;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Random bytes behind a generated passphrase
pub const GENERATED_PASSPHRASE_BYTES: usize = 32;

/// Development-only fallback, compiled out of release builds
#[cfg(debug_assertions)]
const DEVELOPMENT_FALLBACK: Option<&str> = Some("envseal-local-development-key");

#[cfg(not(debug_assertions))]
const DEVELOPMENT_FALLBACK: Option<&str> = None;

/// Where a resolved passphrase came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphraseOrigin {
    Master,
    DeploymentKey,
    DevelopmentFallback,
}

/// Looks up the master passphrase in a credential source
#[derive(Debug, Clone)]
pub struct PassphraseResolver {
    environment: RuntimeEnvironment,
    master_var: String,
    deployment_var: String,
}

impl PassphraseResolver {
    pub fn new(
        environment: RuntimeEnvironment,
        master_var: impl Into<String>,
        deployment_var: impl Into<String>,
    ) -> Self {
        PassphraseResolver {
            environment,
            master_var: master_var.into(),
            deployment_var: deployment_var.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.environment,
            config.passphrase.master_var.clone(),
            config.passphrase.deployment_var.clone(),
        )
    }

    /// Resolve the passphrase: master variable, then deployment key, then
    /// (debug builds in development only) the built-in fallback
    pub fn resolve(&self, source: &dyn CredentialSource) -> Result<Zeroizing<String>> {
        self.resolve_with_origin(source).map(|(passphrase, _)| passphrase)
    }

    pub fn resolve_with_origin(
        &self,
        source: &dyn CredentialSource,
    ) -> Result<(Zeroizing<String>, PassphraseOrigin)> {
        if let Some(value) = source.lookup(&self.master_var) {
            debug!("Using master passphrase from {}", self.master_var);
            return Ok((Zeroizing::new(value), PassphraseOrigin::Master));
        }

        if let Some(value) = source.lookup(&self.deployment_var) {
            debug!("Using deployment key from {}", self.deployment_var);
            return Ok((Zeroizing::new(value), PassphraseOrigin::DeploymentKey));
        }

        if self.environment.is_development() {
            if let Some(fallback) = DEVELOPMENT_FALLBACK {
                warn!(
                    "Using development master password. Set {} outside development.",
                    self.master_var
                );
                return Ok((
                    Zeroizing::new(fallback.to_string()),
                    PassphraseOrigin::DevelopmentFallback,
                ));
            }
        }

        Err(Error::Configuration(format!(
            "Master password not configured. Set the {} environment variable.",
            self.master_var
        )))
    }
}

/// Generate a high-entropy passphrase for operators
pub fn generate_passphrase() -> String {
    let mut bytes = Zeroizing::new([0u8; GENERATED_PASSPHRASE_BYTES]);
    rand::thread_rng().fill_bytes(&mut bytes[..]);
    STANDARD.encode(&bytes[..])
}
