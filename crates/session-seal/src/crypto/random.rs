//! IV randomness sources.

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};

use super::cipher::CipherError;

/// How strong the source judged the bytes it just produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    /// Output of a cryptographically secure generator.
    Strong,
    /// Output the source cannot vouch for.
    Weak,
}

/// A source of IV bytes that reports the strength of its output.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::RandomSource`] if no bytes could be produced.
    fn fill(&self, dest: &mut [u8]) -> Result<Strength, CipherError>;
}

/// The operating system CSPRNG. Always reports [`Strength::Strong`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<Strength, CipherError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| CipherError::RandomSource(e.to_string()))?;
        Ok(Strength::Strong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_random_is_strong_and_fills() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(OsRandom.fill(&mut a).unwrap(), Strength::Strong);
        assert_eq!(OsRandom.fill(&mut b).unwrap(), Strength::Strong);
        assert_ne!(a, b);
    }
}
