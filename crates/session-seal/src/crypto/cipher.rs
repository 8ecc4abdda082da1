//! AES-256 encryption and decryption of whole session payloads.
//!
//! **Algorithm choice:** AES-256-GCM is the default. AES-256-GCM-SIV is
//! offered for deployments that want nonce-misuse resistance. AES-256-CBC
//! exists only to keep reading and writing envelopes of older deployments; it
//! carries no authentication tag, so tampering surfaces as a padding error at
//! best.
//!
//! New envelopes are always sealed with the configured suite. On read, an
//! envelope naming another suite is opened only if that suite was explicitly
//! listed as a legacy read suite. This lets a deployment move from CBC to GCM
//! while its old sessions stay readable until they are rewritten.
//!
//! Every call to [`EnvelopeCipher::encrypt`] draws a fresh IV. There is a
//! single attempt: a failing or weak randomness source is reported, never
//! retried or silently downgraded.

use std::{fmt, str::FromStr, sync::Arc};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use aes_gcm_siv::Aes256GcmSiv;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;
use tracing::{debug, warn};

use super::envelope::Envelope;
use super::random::{OsRandom, RandomSource, Strength};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of a GCM / GCM-SIV nonce (12 bytes = 96 bits).
pub const GCM_IV_LEN: usize = 12;

/// Byte length of a CBC IV (one AES block).
pub const CBC_IV_LEN: usize = 16;

/// Byte length of a GCM / GCM-SIV authentication tag.
pub const TAG_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Symmetric cipher and mode used to seal session payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// AES-256 in Galois/Counter Mode.
    Aes256Gcm,
    /// AES-256-GCM-SIV (RFC 8452).
    Aes256GcmSiv,
    /// AES-256-CBC with PKCS#7 padding. Unauthenticated.
    Aes256Cbc,
}

impl CipherSuite {
    /// Every supported suite.
    pub const ALL: [CipherSuite; 3] = [
        CipherSuite::Aes256Gcm,
        CipherSuite::Aes256GcmSiv,
        CipherSuite::Aes256Cbc,
    ];

    /// Configuration and wire-format name.
    pub fn name(self) -> &'static str {
        match self {
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::Aes256GcmSiv => "aes-256-gcm-siv",
            CipherSuite::Aes256Cbc => "aes-256-cbc",
        }
    }

    /// Required key length in bytes.
    pub fn key_len(self) -> usize {
        KEY_LEN
    }

    /// Required IV length in bytes.
    pub fn iv_len(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm | CipherSuite::Aes256GcmSiv => GCM_IV_LEN,
            CipherSuite::Aes256Cbc => CBC_IV_LEN,
        }
    }

    /// Authentication tag length, or `None` for unauthenticated modes.
    pub fn tag_len(self) -> Option<usize> {
        match self {
            CipherSuite::Aes256Gcm | CipherSuite::Aes256GcmSiv => Some(TAG_LEN),
            CipherSuite::Aes256Cbc => None,
        }
    }

    /// Returns `true` if the mode detects tampering on decrypt.
    pub fn is_authenticated(self) -> bool {
        self.tag_len().is_some()
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherSuite {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CipherSuite::ALL
            .into_iter()
            .find(|suite| suite.name() == wanted)
            .ok_or_else(|| CipherError::UnknownCipher(s.to_owned()))
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length for the suite.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength {
        /// Length required by the suite.
        expected: usize,
        /// Length supplied.
        got: usize,
    },

    /// The cipher name is not one of [`CipherSuite::ALL`].
    #[error("unknown cipher: {0:?}")]
    UnknownCipher(String),

    /// The randomness source could not produce IV bytes.
    #[error("randomness source failed: {0}")]
    RandomSource(String),

    /// The randomness source reported weak output and weak output is not permitted.
    #[error("randomness source reported weak output")]
    WeakRandomness,

    /// The underlying cipher refused to encrypt.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Tag verification failed: the envelope was tampered with or the key is wrong.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Lower-level decryption failure (padding, malformed envelope fields).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The envelope was sealed with a suite that is neither configured nor
    /// listed as a legacy read suite.
    #[error("envelope cipher {found} is not accepted (configured cipher {expected})")]
    CipherMismatch {
        /// The configured suite.
        expected: CipherSuite,
        /// The suite named in the envelope.
        found: CipherSuite,
    },
}

/// Seals [`Envelope`]s under one configured [`CipherSuite`] and opens them
/// under that suite or any listed legacy suite.
///
/// Cheap to clone; the randomness source is shared.
#[derive(Clone)]
pub struct EnvelopeCipher {
    suite: CipherSuite,
    legacy: Vec<CipherSuite>,
    random: Arc<dyn RandomSource>,
    allow_weak_randomness: bool,
}

impl fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeCipher")
            .field("suite", &self.suite)
            .field("legacy", &self.legacy)
            .field("allow_weak_randomness", &self.allow_weak_randomness)
            .finish_non_exhaustive()
    }
}

impl EnvelopeCipher {
    /// Create a cipher drawing IVs from the OS CSPRNG.
    pub fn new(suite: CipherSuite, allow_weak_randomness: bool) -> Self {
        Self::with_random_source(suite, allow_weak_randomness, Arc::new(OsRandom))
    }

    /// Create a cipher drawing IVs from `random`.
    pub fn with_random_source(
        suite: CipherSuite,
        allow_weak_randomness: bool,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            suite,
            legacy: Vec::new(),
            random,
            allow_weak_randomness,
        }
    }

    /// Also accept envelopes sealed with `suites` on decrypt.
    pub fn with_legacy_suites(mut self, suites: impl IntoIterator<Item = CipherSuite>) -> Self {
        for suite in suites {
            if suite != self.suite && !self.legacy.contains(&suite) {
                self.legacy.push(suite);
            }
        }
        self
    }

    /// The configured suite.
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Suites accepted on decrypt in addition to [`suite`](Self::suite).
    pub fn legacy_suites(&self) -> &[CipherSuite] {
        &self.legacy
    }

    /// Whether envelopes sealed with `suite` are accepted on decrypt.
    pub fn accepts(&self, suite: CipherSuite) -> bool {
        suite == self.suite || self.legacy.contains(&suite)
    }

    /// Encrypt `plaintext` under `key` with a freshly generated IV.
    ///
    /// # Errors
    ///
    /// - [`CipherError::InvalidKeyLength`] if `key` does not fit the suite.
    /// - [`CipherError::RandomSource`] if no IV could be generated.
    /// - [`CipherError::WeakRandomness`] if the IV is weak and weak output is
    ///   not permitted. Nothing is encrypted in that case.
    /// - [`CipherError::EncryptionFailed`] on an internal cipher error.
    pub fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Envelope, CipherError> {
        check_key(self.suite, key)?;

        let mut iv = vec![0u8; self.suite.iv_len()];
        match self.random.fill(&mut iv)? {
            Strength::Strong => {}
            Strength::Weak if self.allow_weak_randomness => {
                warn!(cipher = %self.suite, "sealing envelope with weak IV randomness (permitted by configuration)");
            }
            Strength::Weak => return Err(CipherError::WeakRandomness),
        }

        let (ciphertext, tag) = match self.suite {
            CipherSuite::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| key_error(self.suite, key))?;
                let sealed = cipher
                    .encrypt(aes_gcm::Nonce::from_slice(&iv), plaintext)
                    .map_err(|_| CipherError::EncryptionFailed)?;
                split_tag(sealed)
            }
            CipherSuite::Aes256GcmSiv => {
                let cipher =
                    Aes256GcmSiv::new_from_slice(key).map_err(|_| key_error(self.suite, key))?;
                let sealed = cipher
                    .encrypt(aes_gcm_siv::Nonce::from_slice(&iv), plaintext)
                    .map_err(|_| CipherError::EncryptionFailed)?;
                split_tag(sealed)
            }
            CipherSuite::Aes256Cbc => {
                let cipher = Aes256CbcEnc::new_from_slices(key, &iv)
                    .map_err(|_| key_error(self.suite, key))?;
                (cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext), None)
            }
        };

        Ok(Envelope {
            cipher: self.suite,
            iv,
            ciphertext,
            tag,
        })
    }

    /// Decrypt `envelope` under `key`.
    ///
    /// # Errors
    ///
    /// - [`CipherError::AuthenticationFailed`] if an authenticated envelope's
    ///   tag does not verify (tampered ciphertext, tag, or IV; or wrong key).
    /// - [`CipherError::DecryptionFailed`] for padding errors and envelopes
    ///   whose fields do not fit the suite.
    /// - [`CipherError::CipherMismatch`] if the envelope names a suite that is
    ///   neither configured nor listed as legacy.
    /// - [`CipherError::InvalidKeyLength`] if `key` does not fit the suite.
    pub fn decrypt(&self, envelope: &Envelope, key: &[u8]) -> Result<Vec<u8>, CipherError> {
        let suite = envelope.cipher;
        if !self.accepts(suite) {
            return Err(CipherError::CipherMismatch {
                expected: self.suite,
                found: suite,
            });
        }
        if suite != self.suite {
            debug!(cipher = %suite, "opening legacy envelope");
        }
        check_key(suite, key)?;
        if envelope.iv.len() != suite.iv_len() {
            return Err(CipherError::DecryptionFailed(format!(
                "expected {}-byte IV, got {}",
                suite.iv_len(),
                envelope.iv.len()
            )));
        }

        match suite {
            CipherSuite::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| key_error(suite, key))?;
                let sealed = join_tag(envelope)?;
                cipher
                    .decrypt(aes_gcm::Nonce::from_slice(&envelope.iv), sealed.as_ref())
                    .map_err(|_| CipherError::AuthenticationFailed)
            }
            CipherSuite::Aes256GcmSiv => {
                let cipher =
                    Aes256GcmSiv::new_from_slice(key).map_err(|_| key_error(suite, key))?;
                let sealed = join_tag(envelope)?;
                cipher
                    .decrypt(aes_gcm_siv::Nonce::from_slice(&envelope.iv), sealed.as_ref())
                    .map_err(|_| CipherError::AuthenticationFailed)
            }
            CipherSuite::Aes256Cbc => {
                if envelope.tag.is_some() {
                    return Err(CipherError::DecryptionFailed(
                        "unexpected tag for unauthenticated cipher".into(),
                    ));
                }
                let cipher = Aes256CbcDec::new_from_slices(key, &envelope.iv)
                    .map_err(|_| key_error(suite, key))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(&envelope.ciphertext)
                    .map_err(|_| CipherError::DecryptionFailed("invalid padding".into()))
            }
        }
    }
}

fn check_key(suite: CipherSuite, key: &[u8]) -> Result<(), CipherError> {
    if key.len() != suite.key_len() {
        return Err(key_error(suite, key));
    }
    Ok(())
}

fn key_error(suite: CipherSuite, key: &[u8]) -> CipherError {
    CipherError::InvalidKeyLength {
        expected: suite.key_len(),
        got: key.len(),
    }
}

/// Split AEAD output (`ciphertext || tag`) into its two parts.
fn split_tag(mut sealed: Vec<u8>) -> (Vec<u8>, Option<Vec<u8>>) {
    let at = sealed.len().saturating_sub(TAG_LEN);
    let tag = sealed.split_off(at);
    (sealed, Some(tag))
}

/// Rebuild `ciphertext || tag` for the AEAD decrypt call.
fn join_tag(envelope: &Envelope) -> Result<Vec<u8>, CipherError> {
    let tag = envelope
        .tag
        .as_ref()
        .ok_or_else(|| CipherError::DecryptionFailed("missing authentication tag".into()))?;
    if tag.len() != TAG_LEN {
        return Err(CipherError::DecryptionFailed(format!(
            "expected {TAG_LEN}-byte tag, got {}",
            tag.len()
        )));
    }
    let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&envelope.ciphertext);
    sealed.extend_from_slice(tag);
    Ok(sealed)
}
