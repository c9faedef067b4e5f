//! Envelope codec
//!
//! An envelope is the self-describing package stored in place of a
//! plaintext credential. On the wire it is a single-line JSON object:
//!
//! ```text
//! {"encrypted":"<b64 ciphertext>","iv":"<b64 nonce>","salt":"<b64 salt>","tag":"<b64 tag>","algorithm":"AES-GCM"}
//! ```
//!
//! `tag` may be absent, in which case the last 16 bytes of `encrypted` are
//! the authentication tag. The layout is kept so a decoded envelope
//! re-encodes the way it arrived.

use crate::crypto::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated cipher scheme named by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// AES-256 in Galois/Counter Mode
    AesGcm,
}

impl Algorithm {
    /// Wire name of the scheme
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::AesGcm => "AES-GCM",
        }
    }

    /// Parse a wire name, rejecting schemes this build cannot open
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "AES-GCM" => Ok(Algorithm::AesGcm),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the authentication tag travels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagLayout {
    /// Separate `tag` field
    Detached,
    /// Last bytes of `encrypted`, no `tag` field
    Embedded,
}

/// A decoded ciphertext package
///
/// Immutable once built; re-encrypting a secret produces a new envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    algorithm: Algorithm,
    layout: TagLayout,
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_SIZE],
}

/// JSON shape of an envelope
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    encrypted: String,
    iv: String,
    salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    algorithm: String,
}

/// Result of inspecting a stored credential value
#[derive(Debug)]
pub enum Classified {
    /// The value does not look like an envelope at all
    Plaintext,
    /// A well-formed envelope
    Sealed(Envelope),
    /// The value has the envelope shape but its fields are invalid
    Malformed(Error),
}

impl Envelope {
    /// Assemble an envelope from freshly produced parts
    pub fn from_parts(
        algorithm: Algorithm,
        salt: [u8; SALT_SIZE],
        nonce: [u8; NONCE_SIZE],
        ciphertext: Vec<u8>,
        tag: [u8; TAG_SIZE],
    ) -> Self {
        Envelope {
            algorithm,
            layout: TagLayout::Detached,
            salt,
            nonce,
            ciphertext,
            tag,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn layout(&self) -> TagLayout {
        self.layout
    }

    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }

    /// Serialize to single-line JSON suitable for a `KEY=VALUE` line
    pub fn encode(&self) -> Result<String> {
        let (encrypted, tag) = match self.layout {
            TagLayout::Detached => (
                STANDARD.encode(&self.ciphertext),
                Some(STANDARD.encode(self.tag)),
            ),
            TagLayout::Embedded => {
                let mut combined = self.ciphertext.clone();
                combined.extend_from_slice(&self.tag);
                (STANDARD.encode(combined), None)
            }
        };
        let wire = WireEnvelope {
            encrypted,
            iv: STANDARD.encode(self.nonce),
            salt: STANDARD.encode(self.salt),
            tag,
            algorithm: self.algorithm.as_str().to_string(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parse and validate every field of an encoded envelope
    ///
    /// The algorithm is checked before anything else is decoded.
    pub fn decode(text: &str) -> Result<Self> {
        let wire = parse_wire(text)
            .map_err(|e| Error::MalformedEnvelope(format!("not an envelope object: {}", e)))?;
        Self::from_wire(wire)
    }

    /// Validated parse that never fails loudly: `None` for anything that is
    /// not a well-formed envelope
    pub fn parse(text: &str) -> Option<Self> {
        Self::decode(text).ok()
    }

    fn from_wire(wire: WireEnvelope) -> Result<Self> {
        let algorithm = Algorithm::from_name(&wire.algorithm)?;

        let salt = decode_fixed::<SALT_SIZE>("salt", &wire.salt)?;
        let nonce = decode_fixed::<NONCE_SIZE>("iv", &wire.iv)?;
        let mut ciphertext = decode_field("encrypted", &wire.encrypted)?;

        let (layout, tag) = match wire.tag.as_deref() {
            Some(tag) => (TagLayout::Detached, decode_fixed::<TAG_SIZE>("tag", tag)?),
            None => {
                // Tag appended to the ciphertext
                if ciphertext.len() < TAG_SIZE {
                    return Err(Error::MalformedEnvelope(format!(
                        "encrypted field too short to carry a {}-byte tag",
                        TAG_SIZE
                    )));
                }
                let split = ciphertext.len() - TAG_SIZE;
                let mut tag = [0u8; TAG_SIZE];
                tag.copy_from_slice(&ciphertext[split..]);
                ciphertext.truncate(split);
                (TagLayout::Embedded, tag)
            }
        };

        Ok(Envelope {
            algorithm,
            layout,
            salt,
            nonce,
            ciphertext,
            tag,
        })
    }
}

// Byte fields are omitted
impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("algorithm", &self.algorithm)
            .field("layout", &self.layout)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Parse the JSON shape; sequence-form input is not accepted
fn parse_wire(text: &str) -> std::result::Result<WireEnvelope, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text.trim())?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("expected a JSON object"));
    }
    serde_json::from_value(value)
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::MalformedEnvelope(format!("invalid base64 in {}: {}", field, e)))
}

fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N]> {
    let bytes = decode_field(field, value)?;
    if bytes.len() != N {
        return Err(Error::MalformedEnvelope(format!(
            "{} must be {} bytes, got {}",
            field,
            N,
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Structural check: does `text` claim to be an envelope?
///
/// True for a JSON object whose `encrypted`, `iv`, `salt` and `algorithm`
/// members are strings (and `tag`, when present, is a string). Never panics.
pub fn is_envelope(text: &str) -> bool {
    parse_wire(text).is_ok()
}

/// Decide how a stored credential value must be handled
pub fn classify(text: &str) -> Classified {
    match parse_wire(text) {
        Err(_) => Classified::Plaintext,
        Ok(wire) => match Envelope::from_wire(wire) {
            Ok(envelope) => Classified::Sealed(envelope),
            Err(e) => Classified::Malformed(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::from_parts(
            Algorithm::AesGcm,
            [1u8; SALT_SIZE],
            [2u8; NONCE_SIZE],
            b"ciphertext".to_vec(),
            [3u8; TAG_SIZE],
        )
    }

    #[test]
    fn test_encode_layout() {
        let text = sample().encode().unwrap();
        assert!(!text.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["algorithm"], "AES-GCM");
        assert_eq!(value["iv"], STANDARD.encode([2u8; NONCE_SIZE]));
        assert_eq!(value["salt"], STANDARD.encode([1u8; SALT_SIZE]));
        assert_eq!(value["tag"], STANDARD.encode([3u8; TAG_SIZE]));
        assert_eq!(value["encrypted"], STANDARD.encode(b"ciphertext"));
    }

    #[test]
    fn test_decode_encoded() {
        let envelope = sample();
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.layout(), TagLayout::Detached);
    }

    #[test]
    fn test_decode_embedded_tag() {
        let mut combined = b"ciphertext".to_vec();
        combined.extend_from_slice(&[3u8; TAG_SIZE]);
        let text = format!(
            r#"{{"encrypted":"{}","iv":"{}","salt":"{}","algorithm":"AES-GCM"}}"#,
            STANDARD.encode(&combined),
            STANDARD.encode([2u8; NONCE_SIZE]),
            STANDARD.encode([1u8; SALT_SIZE]),
        );

        let decoded = Envelope::decode(&text).unwrap();
        assert_eq!(decoded.layout(), TagLayout::Embedded);
        assert_eq!(decoded.ciphertext(), b"ciphertext");
        assert_eq!(decoded.tag(), &[3u8; TAG_SIZE]);

        // Re-encodes without a separate tag
        let reencoded = decoded.encode().unwrap();
        assert!(!reencoded.contains("\"tag\""));
        assert_eq!(Envelope::decode(&reencoded).unwrap(), decoded);
    }

    #[test]
    fn test_embedded_tag_too_short() {
        let text = format!(
            r#"{{"encrypted":"{}","iv":"{}","salt":"{}","algorithm":"AES-GCM"}}"#,
            STANDARD.encode([0u8; 4]),
            STANDARD.encode([2u8; NONCE_SIZE]),
            STANDARD.encode([1u8; SALT_SIZE]),
        );
        assert!(matches!(
            Envelope::decode(&text),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let text = r#"{"encrypted":"AAAA","iv":"AAAA","algorithm":"AES-GCM"}"#;
        assert!(matches!(
            Envelope::decode(text),
            Err(Error::MalformedEnvelope(_))
        ));
        assert!(!is_envelope(text));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let text = r#"{"encrypted":"AAAA","iv":12,"salt":"AAAA","algorithm":"AES-GCM"}"#;
        assert!(Envelope::decode(text).unwrap_err().is_malformed());
        assert!(!is_envelope(text));
    }

    #[test]
    fn test_wrong_lengths_are_malformed() {
        let text = format!(
            r#"{{"encrypted":"AAAA","iv":"{}","salt":"{}","tag":"{}","algorithm":"AES-GCM"}}"#,
            STANDARD.encode([2u8; 8]),
            STANDARD.encode([1u8; SALT_SIZE]),
            STANDARD.encode([3u8; TAG_SIZE]),
        );
        let err = Envelope::decode(&text).unwrap_err();
        assert!(err.to_string().contains("iv must be 12 bytes"));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let text = r#"{"encrypted":"!!!","iv":"AAAA","salt":"AAAA","algorithm":"AES-GCM"}"#;
        assert!(is_envelope(text));
        assert!(matches!(classify(text), Classified::Malformed(_)));
    }

    #[test]
    fn test_unknown_algorithm_rejected_first() {
        // Invalid base64 everywhere, but the algorithm check wins
        let text = r#"{"encrypted":"!","iv":"!","salt":"!","algorithm":"ChaCha20"}"#;
        match Envelope::decode(text) {
            Err(Error::UnsupportedAlgorithm(name)) => assert_eq!(name, "ChaCha20"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_is_envelope_never_panics() {
        let inputs = [
            "",
            " ",
            "your_api_key_here",
            "{",
            "}",
            "null",
            "[]",
            "42",
            "\"string\"",
            "{}",
            r#"{"encrypted":null}"#,
            r#"[{"encrypted":"a","iv":"b","salt":"c","algorithm":"d"}]"#,
            r#"["a","b","c",null,"d"]"#,
            r#"{"encrypted":"a","iv":"b","salt":"c","algorithm":"d","tag":7}"#,
            "\u{0}\u{1}\u{ffff}",
            "{\"encrypted\":\"\u{1F600}\"",
        ];
        for input in inputs {
            assert!(!is_envelope(input), "{:?}", input);
            assert!(Envelope::parse(input).is_none());
            assert!(matches!(classify(input), Classified::Plaintext));
        }
    }

    #[test]
    fn test_is_envelope_accepts_shape() {
        let text = r#"{"encrypted":"a","iv":"b","salt":"c","algorithm":"d"}"#;
        assert!(is_envelope(text));
        assert!(Envelope::parse(text).is_none());

        let padded = format!("  {}  ", sample().encode().unwrap());
        assert!(is_envelope(&padded));
        assert!(matches!(classify(&padded), Classified::Sealed(_)));
    }

    #[test]
    fn test_extra_fields_tolerated() {
        let mut value: serde_json::Value =
            serde_json::from_str(&sample().encode().unwrap()).unwrap();
        value["comment"] = serde_json::Value::from("rotated 2024");
        assert!(Envelope::parse(&value.to_string()).is_some());
    }

    #[test]
    fn test_debug_hides_bytes() {
        let debug = format!("{:?}", sample());
        assert!(debug.contains("AesGcm"));
        assert!(!debug.contains("salt"));
    }
}
