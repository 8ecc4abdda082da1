//! `session-seal` encrypts session payloads at rest under a key that is
//! never stored: the session ID itself.
//!
//! Layering:
//! 1. [`kdf`] derives an encryption key and an unrelated storage key from the
//!    session ID, the application entropy, and a scope label (HKDF).
//! 2. [`crypto`] seals the payload into a self-describing, versioned
//!    [`Envelope`](crypto::Envelope) with a fresh IV per write.
//! 3. [`codec`] ties both to an injected [`SessionStore`] backend: `read`,
//!    `write`, `destroy`, and `gc`.
//!
//! Configuration is loaded once via [`SessionConfig::from_env`] and is
//! immutable afterwards. A host typically wires it up like this:
//!
//! ```no_run
//! use session_seal::{telemetry, SessionCodec, SessionConfig};
//! # fn host(store: impl session_seal::SessionStore) -> anyhow::Result<()> {
//! let config = SessionConfig::from_env()?;
//! telemetry::init_from_config(&config)?;
//! let codec = SessionCodec::from_config(&config, store)?;
//! codec.write(b"abc123", b"hello")?;
//! codec.gc(config.gc_max_lifetime())?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod kdf;
pub mod telemetry;

pub use codec::SessionCodec;
pub use common::{SessionStore, StorageError};
pub use config::{CryptoSettings, SessionConfig};
pub use error::SessionError;
