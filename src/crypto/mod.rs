//! Cryptography module for envseal
//!
//! Provides AES-256-GCM encryption with PBKDF2-HMAC-SHA256 key derivation.
//! Every call to [`encrypt`] draws a fresh salt and nonce, so a nonce is
//! never used twice under the same derived key.

mod encryption;
mod kdf;

pub use encryption::{generate_nonce, open, seal, SealedData};
pub use kdf::{derive_key, generate_salt, DerivedKey, PBKDF2_ITERATIONS};

use crate::envelope::{Algorithm, Envelope, TagLayout};
use crate::error::{Error, Result};
use zeroize::Zeroizing;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of salt for key derivation
pub const SALT_SIZE: usize = 16;

/// Domain-separation prefix bound into every credential tag
pub const CREDENTIAL_CONTEXT: &str = "envseal-credential";

/// Context of detached-tag envelopes written by the earlier Node tool
pub const LEGACY_CLI_CONTEXT: &str = "stargazer-credential";

/// Associated data for a credential sealed with `algorithm`
pub fn credential_aad(algorithm: Algorithm) -> Vec<u8> {
    format!("{}:{}", CREDENTIAL_CONTEXT, algorithm.as_str()).into_bytes()
}

/// Associated data accepted when opening `envelope`, in the order tried
///
/// Embedded-tag envelopes come from the browser encryptor, which binds no
/// associated data.
fn accepted_aads(envelope: &Envelope) -> Vec<Vec<u8>> {
    match envelope.layout() {
        TagLayout::Detached => vec![
            credential_aad(envelope.algorithm()),
            LEGACY_CLI_CONTEXT.as_bytes().to_vec(),
        ],
        TagLayout::Embedded => vec![Vec::new()],
    }
}

/// Encrypt a credential under a passphrase
pub fn encrypt(plaintext: &str, passphrase: &str) -> Result<Envelope> {
    let algorithm = Algorithm::AesGcm;
    let salt = generate_salt();
    let nonce = generate_nonce();

    let key = derive_key(passphrase, &salt)?;
    let sealed = seal(
        key.as_bytes(),
        &nonce,
        plaintext.as_bytes(),
        &credential_aad(algorithm),
    )?;

    Ok(Envelope::from_parts(
        algorithm,
        salt,
        nonce,
        sealed.ciphertext,
        sealed.tag,
    ))
}

/// Decrypt an envelope with a passphrase
pub fn decrypt(envelope: &Envelope, passphrase: &str) -> Result<Zeroizing<String>> {
    let key = derive_key(passphrase, envelope.salt())?;
    let mut plaintext = accepted_aads(envelope)
        .iter()
        .find_map(|aad| {
            open(
                key.as_bytes(),
                envelope.nonce(),
                envelope.ciphertext(),
                envelope.tag(),
                aad,
            )
            .ok()
        })
        .ok_or(Error::AuthenticationFailure)?;

    match String::from_utf8(std::mem::take(&mut *plaintext)) {
        Ok(text) => Ok(Zeroizing::new(text)),
        Err(e) => {
            // Keep the rejected bytes wiped on drop
            drop(Zeroizing::new(e.into_bytes()));
            Err(Error::MalformedEnvelope(
                "decrypted credential is not valid UTF-8".to_string(),
            ))
        }
    }
}

/// Decode an encoded envelope and decrypt it
pub fn decrypt_text(text: &str, passphrase: &str) -> Result<Zeroizing<String>> {
    let envelope = Envelope::decode(text)?;
    decrypt(&envelope, passphrase)
}
