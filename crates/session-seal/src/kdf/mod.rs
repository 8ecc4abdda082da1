//! HKDF derivation of the encryption key and storage key from a session ID.
//!
//! The session ID is the secret input keying material, the application
//! entropy is the HKDF salt, and a [`Scope`] label per [`Purpose`] is the
//! `info`. The two keys share secret and salt but differ in `info`, so they
//! are computationally independent.
//!
//! # Key invariants
//!
//! - Entropy shorter than [`MIN_ENTROPY_LEN`] bytes is rejected once, at construction.
//! - Derived keys are recomputed per call and held in zeroizing buffers.
//! - The storage key is at most [`STORE_KEY_LEN`] ASCII alphanumeric characters.

pub mod label;

pub use label::{Purpose, Scope};

use std::{fmt, str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;
use zeroize::Zeroizing;

/// Minimum accepted length of the application entropy, in bytes.
pub const MIN_ENTROPY_LEN: usize = 64;

/// Maximum length of an encoded storage key, in characters.
pub const STORE_KEY_LEN: usize = 26;

/// Raw HKDF output length for the storage key before encoding.
///
/// Base64 of 48 bytes is 64 characters; after dropping `+` and `/` about 62
/// remain, comfortably above [`STORE_KEY_LEN`].
pub const STORE_KEY_RAW_LEN: usize = 48;

/// Hash function driving HKDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlg {
    /// Every supported hash.
    pub const ALL: [HashAlg; 3] = [HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512];

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            HashAlg::Sha256 => "sha256",
            HashAlg::Sha384 => "sha384",
            HashAlg::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlg {
    type Err = KdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "");
        HashAlg::ALL
            .into_iter()
            .find(|alg| alg.name() == wanted)
            .ok_or_else(|| KdfError::UnknownHash(s.to_owned()))
    }
}

/// Errors produced by the key deriver.
#[derive(Debug, Error)]
pub enum KdfError {
    /// The application entropy is too short.
    #[error("entropy must be at least {MIN_ENTROPY_LEN} bytes, got {0}")]
    InsufficientEntropy(usize),

    /// The hash name is not one of [`HashAlg::ALL`].
    #[error("unknown hash algorithm: {0:?}")]
    UnknownHash(String),

    /// An empty session ID cannot serve as keying material.
    #[error("session ID must not be empty")]
    EmptySessionId,

    /// HKDF cannot produce this many bytes with the configured hash.
    #[error("cannot derive {0} bytes with the configured hash")]
    OutputLength(usize),
}

/// Fixed-width, path-safe token naming a stored envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Both keys for one session ID. Lives for a single codec operation.
pub struct DerivedKeys {
    /// Raw key that seals the payload. Zeroed on drop.
    pub enc_key: Zeroizing<Vec<u8>>,
    /// Key under which the envelope is stored.
    pub store_key: StoreKey,
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("DerivedKeys")
            .field("enc_key", &"[REDACTED]")
            .field("store_key", &self.store_key)
            .finish()
    }
}

/// Derives per-session keys from a session ID and the application entropy.
///
/// Immutable after construction and cheap to clone, so one instance can be
/// shared by every concurrent caller.
#[derive(Clone)]
pub struct KeyDeriver {
    entropy: Arc<Zeroizing<Vec<u8>>>,
    hash: HashAlg,
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("entropy", &"[REDACTED]")
            .field("hash", &self.hash)
            .finish()
    }
}

impl KeyDeriver {
    /// Create a deriver over `entropy` using `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`KdfError::InsufficientEntropy`] if `entropy` is shorter than
    /// [`MIN_ENTROPY_LEN`] bytes.
    pub fn new(entropy: &[u8], hash: HashAlg) -> Result<Self, KdfError> {
        if entropy.len() < MIN_ENTROPY_LEN {
            return Err(KdfError::InsufficientEntropy(entropy.len()));
        }
        Ok(Self {
            entropy: Arc::new(Zeroizing::new(entropy.to_vec())),
            hash,
        })
    }

    /// The configured hash.
    pub fn hash(&self) -> HashAlg {
        self.hash
    }

    /// Derive both the encryption key (`enc_key_len` bytes) and the storage key.
    pub fn derive(
        &self,
        session_id: &[u8],
        scope: &Scope,
        enc_key_len: usize,
    ) -> Result<DerivedKeys, KdfError> {
        Ok(DerivedKeys {
            enc_key: self.encryption_key(session_id, scope, enc_key_len)?,
            store_key: self.store_key(session_id, scope)?,
        })
    }

    /// Derive only the encryption key.
    pub fn encryption_key(
        &self,
        session_id: &[u8],
        scope: &Scope,
        len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, KdfError> {
        let mut okm = Zeroizing::new(vec![0u8; len]);
        self.expand(session_id, &scope.label(Purpose::Encryption), &mut okm)?;
        Ok(okm)
    }

    /// Derive only the storage key.
    pub fn store_key(&self, session_id: &[u8], scope: &Scope) -> Result<StoreKey, KdfError> {
        let mut raw = Zeroizing::new(vec![0u8; STORE_KEY_RAW_LEN]);
        self.expand(session_id, &scope.label(Purpose::Storage), &mut raw)?;
        Ok(StoreKey(encode_store_key(&raw)))
    }

    fn expand(&self, session_id: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), KdfError> {
        if session_id.is_empty() {
            return Err(KdfError::EmptySessionId);
        }
        hkdf(self.hash, session_id, &self.entropy, info, okm)
    }
}

/// HKDF extract-then-expand (RFC 5869) filling `okm`.
pub(crate) fn hkdf(
    hash: HashAlg,
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    okm: &mut [u8],
) -> Result<(), KdfError> {
    let len = okm.len();
    match hash {
        HashAlg::Sha256 => Hkdf::<Sha256>::new(Some(salt), ikm).expand(info, okm),
        HashAlg::Sha384 => Hkdf::<Sha384>::new(Some(salt), ikm).expand(info, okm),
        HashAlg::Sha512 => Hkdf::<Sha512>::new(Some(salt), ikm).expand(info, okm),
    }
    .map_err(|_| KdfError::OutputLength(len))
}

/// Encode raw key bytes as a storage key: base64, keep alphanumerics, cap at
/// [`STORE_KEY_LEN`] characters.
pub fn encode_store_key(raw: &[u8]) -> String {
    STANDARD
        .encode(raw)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(STORE_KEY_LEN)
        .collect()
}
