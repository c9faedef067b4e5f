//! Credential store
//!
//! Resolves named credentials from a [`CredentialSource`], decrypting
//! sealed values off the async runtime and caching the plaintext for the
//! configured time-to-live.

use crate::cache::{CacheStats, CredentialCache};
use crate::config::Config;
use crate::crypto;
use crate::envelope::{classify, Classified, Envelope};
use crate::error::{Error, Result};
use crate::passphrase::PassphraseResolver;
use crate::source::CredentialSource;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Builder for [`CredentialStore`]
pub struct CredentialStoreBuilder {
    config: Config,
    source: Arc<dyn CredentialSource>,
    passphrase_source: Option<Arc<dyn CredentialSource>>,
    cache: Option<Arc<CredentialCache>>,
    decrypt_timeout: Option<Duration>,
}

impl CredentialStoreBuilder {
    /// Share an existing cache instead of creating one from the config
    pub fn cache(mut self, cache: Arc<CredentialCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Look the master passphrase up somewhere other than the credential source
    pub fn passphrase_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.passphrase_source = Some(source);
        self
    }

    /// Override the per-attempt decrypt timeout
    pub fn decrypt_timeout(mut self, timeout: Duration) -> Self {
        self.decrypt_timeout = Some(timeout);
        self
    }

    /// Validate startup requirements and build the store
    pub fn build(self) -> Result<CredentialStore> {
        let passphrase_source = self
            .passphrase_source
            .unwrap_or_else(|| self.source.clone());
        self.config.validate_startup(&*passphrase_source)?;

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(CredentialCache::from_config(&self.config.cache)));

        debug!(
            "Credential store ready: environment={:?}, cache_enabled={}, ttl={:?}",
            self.config.environment,
            self.config.cache.enabled,
            cache.ttl()
        );

        Ok(CredentialStore {
            source: self.source,
            passphrase_source,
            resolver: PassphraseResolver::from_config(&self.config),
            cache,
            cache_enabled: self.config.cache.enabled,
            decrypt_timeout: self
                .decrypt_timeout
                .unwrap_or_else(|| self.config.decrypt_timeout()),
            inflight: DashMap::new(),
            derivations: AtomicU64::new(0),
        })
    }
}

/// Resolves, decrypts and caches named credentials
pub struct CredentialStore {
    source: Arc<dyn CredentialSource>,
    passphrase_source: Arc<dyn CredentialSource>,
    resolver: PassphraseResolver,
    cache: Arc<CredentialCache>,
    cache_enabled: bool,
    decrypt_timeout: Duration,
    /// Per-name locks so one derivation runs per uncached name
    inflight: DashMap<String, Arc<Mutex<()>>>,
    /// Decrypt attempts started
    derivations: AtomicU64,
}

impl CredentialStore {
    pub fn builder(config: Config, source: Arc<dyn CredentialSource>) -> CredentialStoreBuilder {
        CredentialStoreBuilder {
            config,
            source,
            passphrase_source: None,
            cache: None,
            decrypt_timeout: None,
        }
    }

    /// Store with defaults derived from `config`
    pub fn new(config: Config, source: Arc<dyn CredentialSource>) -> Result<Self> {
        Self::builder(config, source).build()
    }

    /// Resolve a credential to its plaintext
    ///
    /// Unsealed values are returned as-is with a warning and are not
    /// cached. Any failure to open a sealed value surfaces as
    /// [`Error::DecryptionFailure`] and leaves the cache untouched.
    pub async fn get_credential(&self, name: &str) -> Result<Zeroizing<String>> {
        if let Some(value) = self.cached(name) {
            return Ok(value);
        }

        // Declared before `lock` so it runs after the Arc is released
        let _cleanup = InflightCleanup {
            map: &self.inflight,
            name,
        };
        let lock = self
            .inflight
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let _guard = lock.lock().await;
        match self.cached(name) {
            Some(value) => Ok(value),
            None => self.resolve(name).await,
        }
    }

    /// Drop one cached credential, or all of them
    pub fn clear_cache(&self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.cache.remove(name);
            }
            None => self.cache.clear(),
        }
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            cache: self.cache.stats(),
            derivations: self.derivations.load(Ordering::Relaxed),
        }
    }

    fn cached(&self, name: &str) -> Option<Zeroizing<String>> {
        if !self.cache_enabled {
            return None;
        }
        self.cache.get(name)
    }

    async fn resolve(&self, name: &str) -> Result<Zeroizing<String>> {
        let raw = self
            .source
            .lookup(name)
            .map(Zeroizing::new)
            .ok_or_else(|| Error::CredentialNotFound(name.to_string()))?;

        match classify(&raw) {
            Classified::Plaintext => {
                warn!(
                    "Credential {} is stored unencrypted; encrypt it before deploying",
                    name
                );
                Ok(raw)
            }
            Classified::Malformed(e) => {
                warn!("Credential {} holds a malformed envelope: {}", name, e);
                Err(Error::decryption_failure(name, e))
            }
            Classified::Sealed(envelope) => {
                let passphrase = self.resolver.resolve(&*self.passphrase_source)?;
                let value = self.open(name, envelope, passphrase).await?;
                if self.cache_enabled {
                    self.cache.insert(name, value.clone());
                }
                Ok(value)
            }
        }
    }

    /// Derive and decrypt on the blocking pool, bounded by the timeout
    async fn open(
        &self,
        name: &str,
        envelope: Envelope,
        passphrase: Zeroizing<String>,
    ) -> Result<Zeroizing<String>> {
        self.derivations.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || crypto::decrypt(&envelope, &passphrase));

        match tokio::time::timeout(self.decrypt_timeout, task).await {
            Ok(Ok(Ok(value))) => {
                debug!("Decrypted {} in {:?}", name, started.elapsed());
                Ok(value)
            }
            Ok(Ok(Err(e))) => {
                warn!("Failed to decrypt credential {}: {}", name, e);
                Err(Error::decryption_failure(name, e))
            }
            Ok(Err(e)) => Err(Error::Internal(format!("decrypt task failed: {}", e))),
            Err(_) => {
                warn!(
                    "Decrypting credential {} exceeded {:?}",
                    name, self.decrypt_timeout
                );
                Err(Error::decryption_failure(
                    name,
                    Error::Timeout(self.decrypt_timeout),
                ))
            }
        }
    }
}

/// Removes a per-name lock entry once no caller holds it, including when
/// the owning future is dropped mid-wait
struct InflightCleanup<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    name: &'a str,
}

impl Drop for InflightCleanup<'_> {
    fn drop(&mut self) {
        self.map
            .remove_if(self.name, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub cache: CacheStats,
    /// Decrypt attempts that ran key derivation
    pub derivations: u64,
}
