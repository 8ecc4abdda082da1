//! Configuration loading and validation for the session codec.
//!
//! Values are read from `SESSION_SEAL_*` environment variables once, at
//! startup. Loading fails with a clear error if the entropy is missing or too
//! short, or if the cipher or hash name is not supported.
//!
//! Every value is kept as the literal string from the environment until serde
//! asks for a typed field, so an all-digit entropy is never coerced to a number.

use std::{fmt, time::Duration};

use anyhow::{Context, Result};
use config::{builder::DefaultState, ConfigBuilder, Environment};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::crypto::CipherSuite;
use crate::error::SessionError;
use crate::kdf::{HashAlg, Scope, MIN_ENTROPY_LEN};
use crate::telemetry;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "SESSION_SEAL";

/// Raw codec configuration as loaded from the environment.
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    /// Cipher suite name (e.g. `"aes-256-gcm"`).
    #[serde(default = "default_cipher")]
    pub cipher: String,

    /// Comma-separated suites still accepted on read (e.g. `"aes-256-cbc"`).
    /// Empty by default: only `cipher` is accepted.
    #[serde(default)]
    pub legacy_ciphers: String,

    /// HKDF hash name (e.g. `"sha256"`).
    #[serde(default = "default_hash")]
    pub hash: String,

    /// Application secret, at least [`MIN_ENTROPY_LEN`] bytes. **Required.**
    pub entropy: String,

    /// Permit encryption when the IV source reports weak output.
    #[serde(default)]
    pub allow_weak_randomness: bool,

    /// Save path bound into the key-derivation scope.
    #[serde(default)]
    pub save_path: String,

    /// Session name bound into the key-derivation scope.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Records untouched for longer than this many seconds are swept by gc.
    #[serde(default = "default_gc_max_lifetime")]
    pub gc_max_lifetime_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cipher() -> String {
    CipherSuite::Aes256Gcm.name().into()
}
fn default_hash() -> String {
    HashAlg::Sha256.name().into()
}
fn default_session_name() -> String {
    "session".into()
}
fn default_gc_max_lifetime() -> u64 {
    1440
}
fn default_log_level() -> String {
    "info".into()
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cipher", &self.cipher)
            .field("legacy_ciphers", &self.legacy_ciphers)
            .field("hash", &self.hash)
            .field("entropy", &"[REDACTED]")
            .field("allow_weak_randomness", &self.allow_weak_randomness)
            .field("save_path", &self.save_path)
            .field("session_name", &self.session_name)
            .field("gc_max_lifetime_secs", &self.gc_max_lifetime_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl SessionConfig {
    /// Load and validate configuration from `SESSION_SEAL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is absent, cannot be parsed,
    /// or fails validation.
    pub fn from_env() -> Result<Self> {
        let builder = config::Config::builder().add_source(environment());
        Self::load(builder)
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let cfg = builder
            .build()
            .context("failed to build session-seal configuration")?;

        let c: SessionConfig = cfg
            .try_deserialize()
            .context("failed to deserialise session-seal configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.entropy.len() < MIN_ENTROPY_LEN {
            anyhow::bail!(
                "{ENV_PREFIX}_ENTROPY must be at least {MIN_ENTROPY_LEN} bytes, got {}",
                self.entropy.len()
            );
        }
        if self.gc_max_lifetime_secs == 0 {
            anyhow::bail!("{ENV_PREFIX}_GC_MAX_LIFETIME_SECS must be > 0");
        }
        telemetry::filter(&self.log_level)
            .with_context(|| format!("invalid {ENV_PREFIX}_LOG_LEVEL {:?}", self.log_level))?;
        self.crypto_settings()
            .context("invalid cryptographic settings")?;
        Ok(())
    }

    /// Convert the raw names into typed, immutable [`CryptoSettings`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] for an unknown cipher or hash.
    pub fn crypto_settings(&self) -> Result<CryptoSettings, SessionError> {
        let cipher: CipherSuite = self.cipher.parse()?;
        let hash: HashAlg = self.hash.parse()?;
        let legacy = self
            .legacy_ciphers
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<CipherSuite>, _>>()?;
        Ok(CryptoSettings::new(cipher, hash, self.entropy.as_bytes())
            .legacy_ciphers(legacy)
            .allow_weak_randomness(self.allow_weak_randomness))
    }

    /// The key-derivation scope described by `save_path` and `session_name`.
    pub fn scope(&self) -> Scope {
        Scope::new(self.save_path.clone(), self.session_name.clone())
    }

    /// The gc sweep threshold.
    pub fn gc_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.gc_max_lifetime_secs)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
}

/// Validated cryptographic settings shared by every codec operation.
#[derive(Clone)]
pub struct CryptoSettings {
    /// Cipher suite for new envelopes.
    pub cipher: CipherSuite,
    /// Other suites accepted on read. Never used to seal.
    pub legacy_ciphers: Vec<CipherSuite>,
    /// Hash driving HKDF.
    pub hash: HashAlg,
    /// Application entropy. Zeroed on drop.
    pub entropy: Zeroizing<Vec<u8>>,
    /// Permit encryption when the IV source reports weak output.
    pub allow_weak_randomness: bool,
}

impl CryptoSettings {
    /// Settings with weak randomness forbidden.
    pub fn new(cipher: CipherSuite, hash: HashAlg, entropy: &[u8]) -> Self {
        Self {
            cipher,
            legacy_ciphers: Vec::new(),
            hash,
            entropy: Zeroizing::new(entropy.to_vec()),
            allow_weak_randomness: false,
        }
    }

    /// Set the suites accepted on read besides `cipher`.
    pub fn legacy_ciphers(mut self, suites: impl IntoIterator<Item = CipherSuite>) -> Self {
        self.legacy_ciphers = suites.into_iter().collect();
        self
    }

    /// Set whether weak IV randomness is tolerated.
    pub fn allow_weak_randomness(mut self, allow: bool) -> Self {
        self.allow_weak_randomness = allow;
        self
    }
}

impl fmt::Debug for CryptoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoSettings")
            .field("cipher", &self.cipher)
            .field("legacy_ciphers", &self.legacy_ciphers)
            .field("hash", &self.hash)
            .field("entropy", &"[REDACTED]")
            .field("allow_weak_randomness", &self.allow_weak_randomness)
            .finish()
    }
}
