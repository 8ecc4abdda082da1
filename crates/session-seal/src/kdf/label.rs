//! Context labels that separate the encryption-key and storage-key derivations.

use std::fmt;

/// What a derived key is for. Each purpose yields an unrelated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Key that seals the session payload.
    Encryption,
    /// Key under which the envelope is stored.
    Storage,
}

impl Purpose {
    fn as_str(self) -> &'static str {
        match self {
            Purpose::Encryption => "Encryption",
            Purpose::Storage => "Storage",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler scope recorded at session open: the save path and session name.
///
/// Binding labels to the scope keeps two handler instances that share entropy
/// from deriving the same keys for the same session ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    save_path: String,
    name: String,
}

impl Scope {
    /// Create a scope from a save path and session name.
    pub fn new(save_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            save_path: save_path.into(),
            name: name.into(),
        }
    }

    /// The save path.
    pub fn save_path(&self) -> &str {
        &self.save_path
    }

    /// The session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HKDF `info` for `purpose` within this scope.
    ///
    /// Format: `[u32 BE len][save_path][u32 BE len][name][purpose]`. The
    /// length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
    pub fn label(&self, purpose: Purpose) -> Vec<u8> {
        let path = self.save_path.as_bytes();
        let name = self.name.as_bytes();
        let purpose = purpose.as_str().as_bytes();
        let mut label = Vec::with_capacity(8 + path.len() + name.len() + purpose.len());
        label.extend_from_slice(&(path.len() as u32).to_be_bytes());
        label.extend_from_slice(path);
        label.extend_from_slice(&(name.len() as u32).to_be_bytes());
        label.extend_from_slice(name);
        label.extend_from_slice(purpose);
        label
    }
}
