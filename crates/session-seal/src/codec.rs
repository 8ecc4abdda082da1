//! [`SessionCodec`]: encrypts session payloads under keys derived from the
//! session ID and moves the resulting envelopes through a [`SessionStore`].
//!
//! Every operation is a standalone transaction: keys are derived fresh,
//! used once, and zeroed when the call returns, on success and error paths
//! alike. Nothing about a session ID outlives the call.

use std::{sync::Arc, time::Duration};

use common::SessionStore;
use tracing::{debug, warn};

use crate::config::{CryptoSettings, SessionConfig};
use crate::crypto::{Envelope, EnvelopeCipher, RandomSource};
use crate::error::SessionError;
use crate::kdf::{KeyDeriver, Scope};

/// Session payload encryption over an injected storage backend.
///
/// `read`, `write`, and `destroy` take `&self`, so one codec can serve
/// concurrent requests when `S` is shareable. Concurrent writes to the same
/// session ID are last-writer-wins, as with the store's `put`.
#[derive(Debug)]
pub struct SessionCodec<S> {
    deriver: KeyDeriver,
    cipher: EnvelopeCipher,
    store: S,
    scope: Scope,
}

impl<S: SessionStore> SessionCodec<S> {
    /// Build a codec that draws IVs from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the entropy is too short.
    pub fn new(settings: &CryptoSettings, store: S) -> Result<Self, SessionError> {
        let cipher = EnvelopeCipher::new(settings.cipher, settings.allow_weak_randomness);
        Self::build(settings, cipher, store)
    }

    /// Build a codec from loaded configuration, already opened on the
    /// configured scope.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] for an unknown cipher or hash,
    /// or entropy that is too short.
    pub fn from_config(config: &SessionConfig, store: S) -> Result<Self, SessionError> {
        let mut codec = Self::new(&config.crypto_settings()?, store)?;
        codec.scope = config.scope();
        Ok(codec)
    }

    /// Build a codec that draws IVs from `random`.
    pub fn with_random_source(
        settings: &CryptoSettings,
        store: S,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, SessionError> {
        let cipher = EnvelopeCipher::with_random_source(
            settings.cipher,
            settings.allow_weak_randomness,
            random,
        );
        Self::build(settings, cipher, store)
    }

    fn build(
        settings: &CryptoSettings,
        cipher: EnvelopeCipher,
        store: S,
    ) -> Result<Self, SessionError> {
        let deriver = KeyDeriver::new(&settings.entropy, settings.hash)?;
        Ok(Self {
            deriver,
            cipher: cipher.with_legacy_suites(settings.legacy_ciphers.iter().copied()),
            store,
            scope: Scope::default(),
        })
    }

    /// Record the scope (`save_path`, `name`) bound into every derived key.
    pub fn open(&mut self, save_path: &str, name: &str) {
        self.scope = Scope::new(save_path, name);
        debug!(save_path, name, "session scope opened");
    }

    /// No cryptographic work; present for lifecycle symmetry with [`open`](Self::open).
    pub fn close(&mut self) {}

    /// The scope recorded by the last [`open`](Self::open).
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The storage backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decrypt the payload stored for `session_id`.
    ///
    /// Returns `Ok(None)` if no record exists (new or expired session).
    ///
    /// # Errors
    ///
    /// A record that exists but cannot be parsed or decrypted is an error
    /// ([`SessionError::Authentication`] or [`SessionError::Decryption`]),
    /// never treated as absence.
    pub fn read(&self, session_id: &[u8]) -> Result<Option<Vec<u8>>, SessionError> {
        let keys = self
            .deriver
            .derive(session_id, &self.scope, self.cipher.suite().key_len())?;

        let Some(record) = self.store.get(keys.store_key.as_str())? else {
            debug!(store_key = %keys.store_key, "no session record");
            return Ok(None);
        };

        let plaintext = match self.open_record(&record, &keys.enc_key) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(store_key = %keys.store_key, error = %e, "session record unreadable");
                return Err(e);
            }
        };

        debug!(store_key = %keys.store_key, "session record read");
        Ok(Some(plaintext))
    }

    fn open_record(&self, record: &[u8], key: &[u8]) -> Result<Vec<u8>, SessionError> {
        let envelope = Envelope::from_bytes(record)?;
        Ok(self.cipher.decrypt(&envelope, key)?)
    }

    /// Encrypt `plaintext` and store it for `session_id`, replacing any
    /// previous record.
    ///
    /// Fails before touching storage if key derivation or encryption fails.
    pub fn write(&self, session_id: &[u8], plaintext: &[u8]) -> Result<(), SessionError> {
        let keys = self
            .deriver
            .derive(session_id, &self.scope, self.cipher.suite().key_len())?;
        let envelope = self.cipher.encrypt(plaintext, &keys.enc_key)?;
        self.store.put(keys.store_key.as_str(), &envelope.to_bytes())?;
        debug!(store_key = %keys.store_key, cipher = %envelope.cipher, "session record written");
        Ok(())
    }

    /// Remove the record for `session_id`. Removing an absent record succeeds.
    ///
    /// Only the storage key is derived.
    pub fn destroy(&self, session_id: &[u8]) -> Result<(), SessionError> {
        let store_key = self.deriver.store_key(session_id, &self.scope)?;
        self.store.remove(store_key.as_str())?;
        debug!(store_key = %store_key, "session record destroyed");
        Ok(())
    }

    /// Sweep records older than `max_lifetime`. Returns the number removed.
    pub fn gc(&self, max_lifetime: Duration) -> Result<usize, SessionError> {
        let removed = self.store.gc(max_lifetime)?;
        debug!(removed, max_lifetime_secs = max_lifetime.as_secs(), "session gc complete");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherError, CipherSuite, Strength};
    use crate::kdf::HashAlg;
    use common::{MemoryStore, StorageError};
    use mockall::{mock, predicate::eq};

    mock! {
        Store {}

        impl SessionStore for Store {
            fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
            fn put(&self, key: &str, record: &[u8]) -> Result<(), StorageError>;
            fn remove(&self, key: &str) -> Result<(), StorageError>;
            fn gc(&self, max_age: Duration) -> Result<usize, StorageError>;
        }
    }

    struct WeakSource;

    impl RandomSource for WeakSource {
        fn fill(&self, dest: &mut [u8]) -> Result<Strength, CipherError> {
            dest.fill(0x11);
            Ok(Strength::Weak)
        }
    }

    const ENTROPY: &[u8; 64] = b"EEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEE";

    fn settings() -> CryptoSettings {
        CryptoSettings::new(CipherSuite::Aes256Gcm, HashAlg::Sha256, ENTROPY)
    }

    fn memory_codec() -> SessionCodec<MemoryStore> {
        SessionCodec::new(&settings(), MemoryStore::new()).unwrap()
    }

    fn store_key_for(session_id: &[u8]) -> String {
        KeyDeriver::new(ENTROPY, HashAlg::Sha256)
            .unwrap()
            .store_key(session_id, &Scope::default())
            .unwrap()
            .to_string()
    }

    #[test]
    fn write_read_destroy_scenario() {
        let codec = memory_codec();
        codec.write(b"abc123", b"hello").unwrap();
        assert_eq!(codec.read(b"abc123").unwrap().as_deref(), Some(&b"hello"[..]));

        codec.destroy(b"abc123").unwrap();
        assert_eq!(codec.read(b"abc123").unwrap(), None);
        assert!(codec.store().is_empty());
    }

    #[test]
    fn stored_record_reveals_neither_id_nor_payload() {
        let codec = memory_codec();
        codec.write(b"abc123", b"hello").unwrap();

        let keys = codec.store().keys();
        assert_eq!(keys, vec![store_key_for(b"abc123")]);
        assert!(!keys[0].contains("abc123"));

        let record = codec.store().get(&keys[0]).unwrap().unwrap();
        assert!(record.starts_with(b"v1.aes-256-gcm."));
        assert!(!record.windows(5).any(|w| w == b"hello"));
    }

    #[test]
    fn read_of_unknown_session_is_absent() {
        assert_eq!(memory_codec().read(b"never-written").unwrap(), None);
    }

    #[test]
    fn empty_payload_is_present_not_absent() {
        let codec = memory_codec();
        codec.write(b"abc123", b"").unwrap();
        assert_eq!(codec.read(b"abc123").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn rewrite_replaces_payload() {
        let codec = memory_codec();
        codec.write(b"abc123", b"first").unwrap();
        codec.write(b"abc123", b"second").unwrap();
        assert_eq!(codec.store().len(), 1);
        assert_eq!(codec.read(b"abc123").unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn destroy_of_absent_session_succeeds() {
        memory_codec().destroy(b"ghost").unwrap();
    }

    #[test]
    fn sessions_are_isolated() {
        let codec = memory_codec();
        codec.write(b"alice", b"a-data").unwrap();
        codec.write(b"bob", b"b-data").unwrap();
        assert_eq!(codec.store().len(), 2);
        codec.destroy(b"alice").unwrap();
        assert_eq!(codec.read(b"alice").unwrap(), None);
        assert_eq!(codec.read(b"bob").unwrap().as_deref(), Some(&b"b-data"[..]));
    }

    #[test]
    fn scope_separates_handlers() {
        let store = MemoryStore::new();
        let mut first = SessionCodec::new(&settings(), store.clone()).unwrap();
        let mut second = SessionCodec::new(&settings(), store.clone()).unwrap();
        first.open("/var/lib/a", "SID");
        second.open("/var/lib/b", "SID");

        first.write(b"abc123", b"hello").unwrap();
        assert_eq!(second.read(b"abc123").unwrap(), None);
        assert_eq!(first.read(b"abc123").unwrap().as_deref(), Some(&b"hello"[..]));
        first.close();
        assert_eq!(first.scope(), &Scope::new("/var/lib/a", "SID"));
    }

    #[test]
    fn other_entropy_cannot_read() {
        let store = MemoryStore::new();
        let writer = SessionCodec::new(&settings(), store.clone()).unwrap();
        writer.write(b"abc123", b"hello").unwrap();

        let other = CryptoSettings::new(CipherSuite::Aes256Gcm, HashAlg::Sha256, &[b'F'; 64]);
        let reader = SessionCodec::new(&other, store).unwrap();
        // Different entropy derives a different storage key: nothing to read.
        assert_eq!(reader.read(b"abc123").unwrap(), None);
    }

    #[test]
    fn tampered_record_is_an_error_not_absence() {
        let codec = memory_codec();
        codec.write(b"abc123", b"hello").unwrap();
        let key = store_key_for(b"abc123");
        let record = codec.store().get(&key).unwrap().unwrap();

        let mut envelope = Envelope::from_bytes(&record).unwrap();
        envelope.ciphertext[0] ^= 0x80;
        codec.store().put(&key, &envelope.to_bytes()).unwrap();

        let err = codec.read(b"abc123").unwrap_err();
        assert!(matches!(err, SessionError::Authentication));
        assert!(err.is_unreadable());
    }

    #[test]
    fn garbage_record_is_a_decryption_error() {
        let codec = memory_codec();
        codec
            .store()
            .put(&store_key_for(b"abc123"), b"not an envelope")
            .unwrap();
        assert!(matches!(
            codec.read(b"abc123"),
            Err(SessionError::Decryption(_))
        ));
    }

    #[test]
    fn cipher_change_does_not_silently_read_old_envelopes() {
        let store = MemoryStore::new();
        let legacy = CryptoSettings::new(CipherSuite::Aes256Cbc, HashAlg::Sha256, ENTROPY);
        SessionCodec::new(&legacy, store.clone())
            .unwrap()
            .write(b"abc123", b"hello")
            .unwrap();

        let current = SessionCodec::new(&settings(), store).unwrap();
        assert!(matches!(
            current.read(b"abc123"),
            Err(SessionError::Decryption(_))
        ));
    }

    #[test]
    fn legacy_cbc_sessions_readable_after_switch_to_gcm() {
        let store = MemoryStore::new();
        let legacy = CryptoSettings::new(CipherSuite::Aes256Cbc, HashAlg::Sha256, ENTROPY);
        SessionCodec::new(&legacy, store.clone())
            .unwrap()
            .write(b"abc123", b"hello")
            .unwrap();

        let current = settings().legacy_ciphers([CipherSuite::Aes256Cbc]);
        let codec = SessionCodec::new(&current, store.clone()).unwrap();
        assert_eq!(codec.read(b"abc123").unwrap().as_deref(), Some(&b"hello"[..]));

        // The next write migrates the record to the configured suite.
        codec.write(b"abc123", b"hello again").unwrap();
        let record = store.get(&store_key_for(b"abc123")).unwrap().unwrap();
        assert!(record.starts_with(b"v1.aes-256-gcm."));
        assert_eq!(
            codec.read(b"abc123").unwrap().as_deref(),
            Some(&b"hello again"[..])
        );
    }

    #[test]
    fn from_config_applies_scope_and_legacy_ciphers() {
        let config = SessionConfig {
            cipher: "aes-256-gcm".into(),
            legacy_ciphers: "aes-256-cbc".into(),
            hash: "sha256".into(),
            entropy: String::from_utf8(ENTROPY.to_vec()).unwrap(),
            allow_weak_randomness: false,
            save_path: "/var/lib/sessions".into(),
            session_name: "SID".into(),
            gc_max_lifetime_secs: 1440,
            log_level: "info".into(),
        };
        let store = MemoryStore::new();
        let codec = SessionCodec::from_config(&config, store.clone()).unwrap();
        assert_eq!(codec.scope(), &Scope::new("/var/lib/sessions", "SID"));

        let mut legacy = SessionCodec::new(
            &CryptoSettings::new(CipherSuite::Aes256Cbc, HashAlg::Sha256, ENTROPY),
            store,
        )
        .unwrap();
        legacy.open("/var/lib/sessions", "SID");
        legacy.write(b"abc123", b"hello").unwrap();
        assert_eq!(codec.read(b"abc123").unwrap().as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn from_config_rejects_unknown_cipher() {
        let config = SessionConfig {
            cipher: "rc4".into(),
            legacy_ciphers: String::new(),
            hash: "sha256".into(),
            entropy: String::from_utf8(ENTROPY.to_vec()).unwrap(),
            allow_weak_randomness: false,
            save_path: String::new(),
            session_name: "session".into(),
            gc_max_lifetime_secs: 1440,
            log_level: "info".into(),
        };
        assert!(matches!(
            SessionCodec::from_config(&config, MemoryStore::new()),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn every_suite_round_trips_through_the_codec() {
        for suite in CipherSuite::ALL {
            let s = CryptoSettings::new(suite, HashAlg::Sha384, ENTROPY);
            let codec = SessionCodec::new(&s, MemoryStore::new()).unwrap();
            codec.write(b"abc123", b"payload").unwrap();
            assert_eq!(codec.read(b"abc123").unwrap().as_deref(), Some(&b"payload"[..]));
        }
    }

    #[test]
    fn short_entropy_fails_construction() {
        let s = CryptoSettings::new(CipherSuite::Aes256Gcm, HashAlg::Sha256, &[0u8; 32]);
        assert!(matches!(
            SessionCodec::new(&s, MemoryStore::new()),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn empty_session_id_rejected() {
        let codec = memory_codec();
        assert!(matches!(
            codec.write(b"", b"x"),
            Err(SessionError::InvalidSessionId(_))
        ));
        assert!(codec.store().is_empty());
    }

    #[test]
    fn weak_randomness_never_reaches_storage() {
        let mut store = MockStore::new();
        store.expect_put().never();
        let codec =
            SessionCodec::with_random_source(&settings(), store, Arc::new(WeakSource)).unwrap();
        assert!(matches!(
            codec.write(b"abc123", b"hello"),
            Err(SessionError::WeakRandomness)
        ));
    }

    #[test]
    fn weak_randomness_override_writes() {
        let s = settings().allow_weak_randomness(true);
        let codec =
            SessionCodec::with_random_source(&s, MemoryStore::new(), Arc::new(WeakSource)).unwrap();
        codec.write(b"abc123", b"hello").unwrap();
        assert_eq!(codec.read(b"abc123").unwrap().as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn write_puts_under_derived_key() {
        let mut store = MockStore::new();
        store
            .expect_put()
            .withf(|key, record| {
                key.to_string() == store_key_for(b"abc123") && record.starts_with(b"v1.")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let codec = SessionCodec::new(&settings(), store).unwrap();
        codec.write(b"abc123", b"hello").unwrap();
    }

    #[test]
    fn storage_failure_propagates_from_put() {
        let mut store = MockStore::new();
        store
            .expect_put()
            .returning(|_, _| Err(StorageError::Backend("disk full".into())));
        let codec = SessionCodec::new(&settings(), store).unwrap();
        assert!(matches!(
            codec.write(b"abc123", b"hello"),
            Err(SessionError::Storage(StorageError::Backend(_)))
        ));
    }

    #[test]
    fn storage_failure_propagates_from_get() {
        let mut store = MockStore::new();
        store.expect_get().returning(|_| {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "backend timeout",
            )))
        });
        let codec = SessionCodec::new(&settings(), store).unwrap();
        assert!(matches!(
            codec.read(b"abc123"),
            Err(SessionError::Storage(StorageError::Io(_)))
        ));
    }

    #[test]
    fn destroy_removes_derived_key_without_reading() {
        let mut store = MockStore::new();
        store.expect_get().never();
        store
            .expect_remove()
            .with(eq(store_key_for(b"abc123")))
            .times(1)
            .returning(|_| Ok(()));
        let codec = SessionCodec::new(&settings(), store).unwrap();
        codec.destroy(b"abc123").unwrap();
    }

    #[test]
    fn gc_delegates_and_reports_partial_sweeps() {
        let mut store = MockStore::new();
        store
            .expect_gc()
            .with(eq(Duration::from_secs(1440)))
            .times(1)
            .returning(|_| {
                Err(StorageError::PartialSweep {
                    removed: 4,
                    failed: 1,
                })
            });
        let codec = SessionCodec::new(&settings(), store).unwrap();
        let err = codec.gc(Duration::from_secs(1440)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Storage(StorageError::PartialSweep { removed: 4, failed: 1 })
        ));
    }

    #[test]
    fn codec_is_shareable_across_threads() {
        let codec = Arc::new(memory_codec());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let codec = Arc::clone(&codec);
                std::thread::spawn(move || {
                    let id = format!("session-{i}");
                    let payload = format!("payload-{i}");
                    codec.write(id.as_bytes(), payload.as_bytes()).unwrap();
                    assert_eq!(
                        codec.read(id.as_bytes()).unwrap().as_deref(),
                        Some(payload.as_bytes())
                    );
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(codec.store().len(), 8);
    }
}
