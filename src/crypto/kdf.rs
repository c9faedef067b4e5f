//! PBKDF2-HMAC-SHA256 key derivation
//!
//! Turns a passphrase and a per-envelope salt into an AES-256 key. The
//! iteration count is a fixed cost factor shared by the encrypt and decrypt
//! paths; it is not stored in the envelope.

use crate::crypto::{KEY_SIZE, SALT_SIZE};
use crate::error::{Error, Result};
use rand::RngCore;
use ring::pbkdf2;
use std::num::NonZeroU32;
use std::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A key derived from a passphrase, wiped on drop
pub struct DerivedKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Generate a fresh random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a passphrase and salt
///
/// Deterministic for the same inputs. CPU-bound (hundreds of
/// milliseconds), so async callers should run it on a blocking thread.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<DerivedKey> {
    if salt.len() != SALT_SIZE {
        return Err(Error::InvalidLength {
            what: "salt",
            expected: SALT_SIZE,
            got: salt.len(),
        });
    }

    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
        .ok_or_else(|| Error::KeyDerivation("iteration count must be non-zero".to_string()))?;

    let started = Instant::now();
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        passphrase.as_bytes(),
        &mut key[..],
    );
    debug!("Derived key in {:?}", started.elapsed());

    Ok(DerivedKey { key })
}
