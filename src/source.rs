//! External key-value sources for credentials
//!
//! The store never reads configuration directly; it asks a
//! [`CredentialSource`] for the raw value of a name.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Lookup of raw credential values by name
pub trait CredentialSource: Send + Sync {
    /// Raw value for `name`; empty values count as absent
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

impl<T: CredentialSource + ?Sized> CredentialSource for Box<T> {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

/// Split a `KEY=VALUE` line
///
/// Returns `None` for blank lines, `#` comments and lines without `=`.
/// The line is trimmed; the value is everything after the first `=`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    trimmed.split_once('=')
}

/// Process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl CredentialSource for EnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// In-memory values, mutable after construction
#[derive(Debug, Default)]
pub struct MapSource {
    values: RwLock<HashMap<String, String>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace a value
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(name.into(), value.into());
    }

    /// Remove a value
    pub fn remove(&self, name: &str) -> Option<String> {
        self.values.write().remove(name)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let values = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        MapSource {
            values: RwLock::new(values),
        }
    }
}

impl CredentialSource for MapSource {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values
            .read()
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// Values parsed from a dotenv-style file
#[derive(Debug, Default, Clone)]
pub struct EnvFileSource {
    values: HashMap<String, String>,
}

impl EnvFileSource {
    /// Load and parse an env file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let source = Self::parse(&content);
        debug!(
            "Loaded {} entries from {:?}",
            source.values.len(),
            path.as_ref()
        );
        Ok(source)
    }

    /// Parse env file content; later assignments win
    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .filter_map(parse_line)
            .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
            .collect();
        EnvFileSource { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl CredentialSource for EnvFileSource {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values.get(name).filter(|v| !v.is_empty()).cloned()
    }
}

/// Strip one pair of matching outer quotes
pub(crate) fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Ordered stack of sources; the first hit wins
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn CredentialSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lower-priority layer
    pub fn with(mut self, layer: impl CredentialSource + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl CredentialSource for LayeredSource {
    fn lookup(&self, name: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.lookup(name))
    }
}
