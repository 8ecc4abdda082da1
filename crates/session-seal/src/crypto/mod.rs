//! Envelope encryption of session payloads.
//!
//! This module is free of storage and key-derivation concerns. It takes a raw
//! key and a payload and produces a self-contained [`Envelope`], or reverses
//! that operation.
//!
//! # Envelope format
//!
//! ```text
//! v1.<cipher>.<base64url-no-pad(iv)>.<base64url-no-pad(ciphertext)>[.<base64url-no-pad(tag)>]
//! ```
//!
//! The `v1` prefix enables future format migration without breaking existing
//! envelopes. The tag segment is present exactly when the cipher is
//! authenticated.

pub mod cipher;
pub mod envelope;
pub mod random;

pub use cipher::{CipherError, CipherSuite, EnvelopeCipher};
pub use envelope::{Envelope, EnvelopeError};
pub use random::{OsRandom, RandomSource, Strength};
