//! Logical vault path validation.
//!
//! This is not a configuration-file reader: callers supply the master
//! key and vault path programmatically (spec §1 places the CLI and
//! config-file layer outside this crate). `VaultPath` exists so an
//! invalid string can be rejected once at the boundary rather than
//! producing a confusing filesystem error deep inside `store`.

use crate::error::VaultError;

/// A validated relative, `/`-separated logical path naming a vault
/// within a repository (e.g. `"secrets"`, `"config/prod"`).
///
/// Construction rejects absolute paths, empty segments, and `..`
/// components, since the path is joined directly onto
/// `.git-vault/data/` and `.git-vault/cache/` without further checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPath(String);

impl VaultPath {
    /// # Errors
    /// Returns [`VaultError::InvalidVaultPath`] if `raw` is empty,
    /// absolute, contains a `..` segment, or contains an empty segment
    /// (e.g. `a//b`, trailing `/`).
    pub fn new(raw: &str) -> Result<Self, VaultError> {
        if raw.is_empty() {
            return Err(VaultError::InvalidVaultPath {
                path: raw.to_string(),
                reason: "must not be empty",
            });
        }
        if raw.starts_with('/') {
            return Err(VaultError::InvalidVaultPath {
                path: raw.to_string(),
                reason: "must be relative",
            });
        }
        for segment in raw.split('/') {
            if segment.is_empty() {
                return Err(VaultError::InvalidVaultPath {
                    path: raw.to_string(),
                    reason: "must not contain empty segments",
                });
            }
            if segment == ".." {
                return Err(VaultError::InvalidVaultPath {
                    path: raw.to_string(),
                    reason: "must not contain '..' segments",
                });
            }
        }
        Ok(VaultPath(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VaultPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_and_nested_paths() {
        assert!(VaultPath::new("secrets").is_ok());
        assert!(VaultPath::new("config/prod").is_ok());
    }

    #[test]
    fn rejects_empty_absolute_and_dotdot() {
        assert!(VaultPath::new("").is_err());
        assert!(VaultPath::new("/secrets").is_err());
        assert!(VaultPath::new("../secrets").is_err());
        assert!(VaultPath::new("a/../b").is_err());
        assert!(VaultPath::new("a//b").is_err());
        assert!(VaultPath::new("a/").is_err());
    }
}
