//! The persisted form of an encrypted session payload.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use super::cipher::CipherSuite;

/// Prefix that appears at the start of every serialised envelope.
pub const VERSION_PREFIX: &str = "v1";

/// A sealed session payload. Decrypting it needs nothing but the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Suite the payload was sealed with.
    pub cipher: CipherSuite,
    /// Raw IV bytes.
    pub iv: Vec<u8>,
    /// Raw ciphertext bytes, without the tag.
    pub ciphertext: Vec<u8>,
    /// Authentication tag; present exactly for authenticated suites.
    pub tag: Option<Vec<u8>>,
}

/// Errors produced while parsing a stored envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The record is not `v1.<cipher>.<iv>.<ciphertext>[.<tag>]`.
    #[error("invalid envelope format")]
    InvalidFormat,

    /// The version prefix is not one this build understands.
    #[error("unsupported envelope version: {0:?}")]
    UnsupportedVersion(String),

    /// The cipher segment names no known suite.
    #[error("unknown envelope cipher: {0:?}")]
    UnknownCipher(String),

    /// A segment is not valid unpadded base64url.
    #[error("invalid base64 in envelope {0} segment")]
    InvalidEncoding(&'static str),

    /// The IV length does not fit the named suite.
    #[error("invalid IV length for {cipher}: expected {expected} bytes, got {got}")]
    InvalidIvLength {
        /// Suite named in the envelope.
        cipher: CipherSuite,
        /// Length required by that suite.
        expected: usize,
        /// Length found.
        got: usize,
    },

    /// The tag is missing, unexpected, or the wrong length for the named suite.
    #[error("invalid authentication tag for {0}")]
    InvalidTag(CipherSuite),
}

impl Envelope {
    /// Encode this envelope to its canonical byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "{}.{}.{}.{}",
            VERSION_PREFIX,
            self.cipher.name(),
            URL_SAFE_NO_PAD.encode(&self.iv),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        );
        if let Some(tag) = &self.tag {
            out.push('.');
            out.push_str(&URL_SAFE_NO_PAD.encode(tag));
        }
        out.into_bytes()
    }

    /// Parse a stored record back into an [`Envelope`].
    ///
    /// Validates the version, the cipher name, the IV length, and the
    /// presence and length of the tag against the named suite.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidFormat)?;
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() < 4 || parts.len() > 5 {
            return Err(EnvelopeError::InvalidFormat);
        }
        if parts[0] != VERSION_PREFIX {
            return Err(EnvelopeError::UnsupportedVersion(parts[0].to_owned()));
        }
        let cipher: CipherSuite = parts[1]
            .parse()
            .map_err(|_| EnvelopeError::UnknownCipher(parts[1].to_owned()))?;

        let iv = decode(parts[2], "iv")?;
        if iv.len() != cipher.iv_len() {
            return Err(EnvelopeError::InvalidIvLength {
                cipher,
                expected: cipher.iv_len(),
                got: iv.len(),
            });
        }

        let ciphertext = decode(parts[3], "ciphertext")?;

        let tag = match (parts.get(4), cipher.tag_len()) {
            (Some(encoded), Some(len)) => {
                let tag = decode(encoded, "tag")?;
                if tag.len() != len {
                    return Err(EnvelopeError::InvalidTag(cipher));
                }
                Some(tag)
            }
            (None, None) => None,
            _ => return Err(EnvelopeError::InvalidTag(cipher)),
        };

        Ok(Self {
            cipher,
            iv,
            ciphertext,
            tag,
        })
    }
}

fn decode(segment: &str, name: &'static str) -> Result<Vec<u8>, EnvelopeError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| EnvelopeError::InvalidEncoding(name))
}
