//! AES-256-GCM Encryption Implementation
//!
//! Every credential is sealed with AES-256-GCM which provides:
//! - Confidentiality: the secret is encrypted
//! - Integrity: any tampering is detected before plaintext is released
//! - Context binding: associated data ties the ciphertext to its use

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use zeroize::Zeroizing;

/// Ciphertext with its detached authentication tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedData {
    /// Encrypted bytes, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag
    pub tag: [u8; TAG_SIZE],
}

/// Generate a fresh random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn aead_key(key: &[u8; KEY_SIZE]) -> Result<LessSafeKey> {
    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Encryption("Failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound_key))
}

/// Encrypt data using AES-256-GCM
///
/// # Arguments
/// * `key` - 256-bit encryption key
/// * `nonce` - 96-bit nonce, never reused with the same key
/// * `plaintext` - Data to encrypt
/// * `aad` - Additional authenticated data (authenticated but not encrypted)
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedData> {
    let sealing_key = aead_key(key)?;

    let mut in_out = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(*nonce),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| Error::Encryption("Encryption failed".to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Decrypt data using AES-256-GCM
///
/// The tag is verified before any plaintext is returned. Every mismatch
/// (key, nonce, ciphertext, tag or aad) yields `AuthenticationFailure`.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let opening_key = aead_key(key)?;

    // ring expects the tag appended to the ciphertext
    let mut in_out = Zeroizing::new(Vec::with_capacity(ciphertext.len() + TAG_SIZE));
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(tag);

    let plaintext_len = opening_key
        .open_in_place(
            Nonce::assume_unique_for_key(*nonce),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| Error::AuthenticationFailure)?
        .len();

    in_out.truncate(plaintext_len);
    Ok(in_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = b"envseal-credential:AES-GCM";

    fn test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_open() {
        let key = test_key();
        let nonce = generate_nonce();
        let plaintext = b"Hello, envseal!";

        let sealed = seal(&key, &nonce, plaintext, AAD).unwrap();
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_ne!(sealed.ciphertext.as_slice(), plaintext);

        let opened = open(&key, &nonce, &sealed.ciphertext, &sealed.tag, AAD).unwrap();
        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = test_key();
        let nonce = generate_nonce();

        let sealed = seal(&key, &nonce, b"Secret data", AAD).unwrap();
        let result = open(&key, &nonce, &sealed.ciphertext, &sealed.tag, b"other-context");

        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = generate_nonce();
        let sealed = seal(&test_key(), &nonce, b"Secret data", AAD).unwrap();

        let result = open(&test_key(), &nonce, &sealed.ciphertext, &sealed.tag, AAD);
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = test_key();
        let nonce = generate_nonce();
        let sealed = seal(&key, &nonce, b"Secret data", AAD).unwrap();

        let mut other = nonce;
        other[0] ^= 0x01;
        let result = open(&key, &other, &sealed.ciphertext, &sealed.tag, AAD);
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let nonce = generate_nonce();
        let sealed = seal(&key, &nonce, b"Secret data", AAD).unwrap();

        for i in 0..sealed.ciphertext.len() {
            let mut tampered = sealed.ciphertext.clone();
            tampered[i] ^= 0xFF;
            let result = open(&key, &nonce, &tampered, &sealed.tag, AAD);
            assert!(matches!(result, Err(Error::AuthenticationFailure)));
        }
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = test_key();
        let nonce = generate_nonce();
        let sealed = seal(&key, &nonce, b"Secret data", AAD).unwrap();

        for i in 0..TAG_SIZE {
            let mut tag = sealed.tag;
            tag[i] ^= 0x80;
            let result = open(&key, &nonce, &sealed.ciphertext, &tag, AAD);
            assert!(matches!(result, Err(Error::AuthenticationFailure)));
        }
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let nonce = generate_nonce();

        let sealed = seal(&key, &nonce, b"", AAD).unwrap();
        assert!(sealed.ciphertext.is_empty());

        let opened = open(&key, &nonce, &sealed.ciphertext, &sealed.tag, AAD).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_nonces_do_not_collide() {
        let key = test_key();
        let mut nonces = std::collections::HashSet::new();
        let mut ciphertexts = std::collections::HashSet::new();

        for _ in 0..1000 {
            let nonce = generate_nonce();
            let sealed = seal(&key, &nonce, b"same input", AAD).unwrap();
            assert!(nonces.insert(nonce));
            assert!(ciphertexts.insert(sealed.ciphertext));
        }
    }
}
