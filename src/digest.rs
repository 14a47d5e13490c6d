//! Directory digest (C2): a stable, content-only fingerprint of a
//! directory tree, used for change detection and cache validation.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::crypto::hash_sha256;
use crate::error::VaultError;

/// A 32-byte SHA-256 directory digest.
pub type Digest = [u8; 32];

/// Compute the directory digest of `root` per the algorithm in spec §4.2:
///
/// 1. Enumerate regular files under `root` in lexicographic order by
///    repository-relative path (byte-wise, `/` separator).
/// 2. Hash each file's bytes with SHA-256 and concatenate the digests.
/// 3. Hash the concatenation to produce the directory digest.
///
/// Symlinks are not followed or tracked. Empty directories carry no
/// weight. A directory with no regular files digests to `hash_sha256(b"")`.
pub fn directory_digest(root: &Path) -> Result<Digest, VaultError> {
    let mut paths = enumerate_files(root)?;
    paths.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    let mut buffer = Vec::with_capacity(paths.len() * 32);
    for rel in &paths {
        let bytes = fs::read(root.join(rel)).map_err(|e| VaultError::io(root.join(rel), e))?;
        buffer.extend_from_slice(&hash_sha256(&bytes));
    }
    Ok(hash_sha256(&buffer))
}

/// Enumerate regular files under `root`, returning `/`-separated paths
/// relative to `root`. Symlinks are never followed or included.
pub(crate) fn enumerate_files(root: &Path) -> Result<Vec<String>, VaultError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            VaultError::io(
                e.path().unwrap_or(root).to_path_buf(),
                io_error_from_walkdir(e),
            )
        })?;
        let file_type = entry.file_type();
        if !file_type.is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir entries are rooted under the walked directory");
        let rel_str = path_to_slash_string(rel);
        out.push(rel_str);
    }
    Ok(out)
}

fn io_error_from_walkdir(e: walkdir::Error) -> std::io::Error {
    e.into_io_error()
        .unwrap_or_else(|| std::io::Error::other("directory walk failed"))
}

/// Render a relative path using `/` as the separator regardless of host OS.
fn path_to_slash_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_directory_has_well_defined_digest() {
        let dir = tempfile::tempdir().unwrap();
        let digest = directory_digest(dir.path()).unwrap();
        assert_eq!(digest, hash_sha256(b""));
    }

    #[test]
    fn digest_is_stable_and_order_independent_of_creation_order() {
        let dir_a = tempfile::tempdir().unwrap();
        fs::write(dir_a.path().join("b.txt"), b"world").unwrap();
        fs::write(dir_a.path().join("a.txt"), b"hello").unwrap();

        let dir_b = tempfile::tempdir().unwrap();
        fs::write(dir_b.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir_b.path().join("b.txt"), b"world").unwrap();

        assert_eq!(
            directory_digest(dir_a.path()).unwrap(),
            directory_digest(dir_b.path()).unwrap()
        );
    }

    #[test]
    fn digest_changes_when_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let d1 = directory_digest(dir.path()).unwrap();

        fs::write(dir.path().join("a.txt"), b"HELLO").unwrap();
        let d2 = directory_digest(dir.path()).unwrap();

        assert_ne!(d1, d2);
    }

    #[test]
    fn digest_ignores_empty_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("empty_sub")).unwrap();

        let other = tempfile::tempdir().unwrap();
        fs::write(other.path().join("a.txt"), b"hello").unwrap();

        assert_eq!(
            directory_digest(dir.path()).unwrap(),
            directory_digest(other.path()).unwrap()
        );
    }

    #[test]
    fn digest_covers_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();
        let d1 = directory_digest(dir.path()).unwrap();

        fs::write(dir.path().join("sub/b.txt"), b"WORLD").unwrap();
        let d2 = directory_digest(dir.path()).unwrap();

        assert_ne!(d1, d2);
    }
}
