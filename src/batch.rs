//! Batch encryption of env files
//!
//! Rewrites a `KEY=VALUE` file, sealing the values of recognized credential
//! names. Every other line is copied byte for byte. A line that fails to
//! encrypt is kept as it was and reported; the rest of the file proceeds.

use crate::config::BatchConfig;
use crate::crypto;
use crate::envelope::is_envelope;
use crate::error::Result;
use crate::source::{parse_line, unquote};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Which lines get sealed
#[derive(Debug, Clone)]
pub struct BatchOptions {
    credential_keys: HashSet<String>,
    placeholders: HashSet<String>,
}

impl BatchOptions {
    pub fn new<K, P>(credential_keys: K, placeholders: P) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        BatchOptions {
            credential_keys: credential_keys.into_iter().map(Into::into).collect(),
            placeholders: placeholders.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.credential_keys.clone(), config.placeholders.clone())
    }

    fn wants(&self, key: &str, value: &str) -> bool {
        self.credential_keys.contains(key)
            && !value.is_empty()
            && !self.placeholders.contains(value)
            && !is_envelope(value)
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

/// A line that could not be sealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// 1-based line number
    pub line: usize,
    pub key: String,
    pub reason: String,
}

/// What a batch run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Keys whose values were sealed, in file order
    pub encrypted: Vec<String>,
    pub failed: Vec<BatchFailure>,
    /// Lines copied unchanged
    pub passed_through: usize,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Result of a file-level batch run
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub output_path: PathBuf,
    pub report: BatchReport,
}

/// Transform env file content with a caller-supplied sealing function
pub fn encrypt_lines_with<F>(content: &str, options: &BatchOptions, mut seal: F) -> (String, BatchReport)
where
    F: FnMut(&str) -> Result<String>,
{
    let mut report = BatchReport::default();
    let mut output = Vec::new();

    for (index, line) in content.split('\n').enumerate() {
        let candidate = parse_line(line)
            .map(|(key, value)| (key.trim(), unquote(value.trim())))
            .filter(|(key, value)| options.wants(key, value));

        let Some((key, value)) = candidate else {
            output.push(line.to_string());
            report.passed_through += 1;
            continue;
        };

        match seal(value) {
            Ok(sealed) => {
                debug!("Encrypted {}", key);
                let ending = if line.ends_with('\r') { "\r" } else { "" };
                output.push(format!("{}={}{}", key, sealed, ending));
                report.encrypted.push(key.to_string());
            }
            Err(e) => {
                error!("Failed to encrypt {} on line {}: {}", key, index + 1, e);
                output.push(line.to_string());
                report.failed.push(BatchFailure {
                    line: index + 1,
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    (output.join("\n"), report)
}

/// Seal recognized values in env file content under `passphrase`
pub fn encrypt_lines(content: &str, passphrase: &str, options: &BatchOptions) -> (String, BatchReport) {
    encrypt_lines_with(content, options, |value| {
        crypto::encrypt(value, passphrase)?.encode()
    })
}

/// Where `batch_encrypt` writes when no target is given
///
/// `.env` in the file name becomes `.env.encrypted`; names without it get
/// `.encrypted` appended.
pub fn default_output_path(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let renamed = if name.contains(".env") {
        name.replacen(".env", ".env.encrypted", 1)
    } else {
        format!("{}.encrypted", name)
    };

    source.with_file_name(renamed)
}

/// Read `source`, seal recognized values and write the result
///
/// Only an unreadable source or an unwritable target fails the call;
/// per-line failures are in the report.
pub fn batch_encrypt(
    source: &Path,
    passphrase: &str,
    target: Option<&Path>,
    options: &BatchOptions,
) -> Result<BatchOutcome> {
    let content = std::fs::read_to_string(source)?;
    let (output, report) = encrypt_lines(&content, passphrase, options);

    let output_path = target
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(source));
    std::fs::write(&output_path, output)?;

    info!(
        "Batch encrypted {} credential(s) into {:?} ({} failed, {} lines unchanged)",
        report.encrypted.len(),
        output_path,
        report.failed.len(),
        report.passed_through
    );

    Ok(BatchOutcome {
        output_path,
        report,
    })
}
