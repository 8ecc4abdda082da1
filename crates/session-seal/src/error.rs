//! Top-level error type returned by the session codec.

use common::StorageError;
use thiserror::Error;

use crate::crypto::{CipherError, EnvelopeError};
use crate::kdf::KdfError;

/// Every failure the codec can surface.
///
/// Absence of a record is not represented here: a read of a missing or
/// expired session returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad cipher or hash name, insufficient entropy, or other invalid settings.
    /// Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The IV source reported weak output and weak output is not permitted.
    #[error("randomness source reported weak output; refusing to encrypt")]
    WeakRandomness,

    /// The stored envelope failed tag verification (tampered or wrong key).
    #[error("session data failed authentication")]
    Authentication,

    /// The stored envelope is malformed or could not be decrypted.
    #[error("session data could not be decrypted: {0}")]
    Decryption(String),

    /// Cryptographic failure while sealing a payload.
    #[error("session data could not be encrypted: {0}")]
    Encryption(String),

    /// The session ID cannot be used as keying material.
    #[error("invalid session ID: {0}")]
    InvalidSessionId(String),

    /// Propagated unchanged from the storage backend.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Returns `true` if stored session data exists but cannot be read.
    ///
    /// Hosts typically respond by discarding the record and starting a new
    /// session; that policy is theirs to choose.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            SessionError::Authentication | SessionError::Decryption(_)
        )
    }
}

impl From<CipherError> for SessionError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::WeakRandomness => SessionError::WeakRandomness,
            CipherError::AuthenticationFailed => SessionError::Authentication,
            CipherError::UnknownCipher(_) => SessionError::Configuration(e.to_string()),
            CipherError::DecryptionFailed(_) | CipherError::CipherMismatch { .. } => {
                SessionError::Decryption(e.to_string())
            }
            CipherError::InvalidKeyLength { .. }
            | CipherError::RandomSource(_)
            | CipherError::EncryptionFailed => SessionError::Encryption(e.to_string()),
        }
    }
}

impl From<EnvelopeError> for SessionError {
    fn from(e: EnvelopeError) -> Self {
        SessionError::Decryption(e.to_string())
    }
}

impl From<KdfError> for SessionError {
    fn from(e: KdfError) -> Self {
        match e {
            KdfError::InsufficientEntropy(_)
            | KdfError::UnknownHash(_)
            | KdfError::OutputLength(_) => SessionError::Configuration(e.to_string()),
            KdfError::EmptySessionId => SessionError::InvalidSessionId(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_errors_map_to_taxonomy() {
        assert!(matches!(
            SessionError::from(CipherError::WeakRandomness),
            SessionError::WeakRandomness
        ));
        assert!(matches!(
            SessionError::from(CipherError::AuthenticationFailed),
            SessionError::Authentication
        ));
        assert!(matches!(
            SessionError::from(CipherError::DecryptionFailed("pad".into())),
            SessionError::Decryption(_)
        ));
        assert!(matches!(
            SessionError::from(CipherError::UnknownCipher("rc4".into())),
            SessionError::Configuration(_)
        ));
    }

    #[test]
    fn kdf_errors_map_to_taxonomy() {
        assert!(matches!(
            SessionError::from(KdfError::InsufficientEntropy(10)),
            SessionError::Configuration(_)
        ));
        assert!(matches!(
            SessionError::from(KdfError::EmptySessionId),
            SessionError::InvalidSessionId(_)
        ));
    }

    #[test]
    fn unreadable_classification() {
        assert!(SessionError::Authentication.is_unreadable());
        assert!(SessionError::from(EnvelopeError::InvalidFormat).is_unreadable());
        assert!(!SessionError::WeakRandomness.is_unreadable());
        assert!(!SessionError::Storage(StorageError::Backend("down".into())).is_unreadable());
    }

    #[test]
    fn display_includes_message() {
        let e = SessionError::Configuration("entropy too short".into());
        assert!(e.to_string().contains("entropy too short"));
    }
}
