//! Vault store (C3): the on-disk layout of a vault and the invariants
//! enforced around it.
//!
//! ```text
//! <repo_root>/.git-vault/data/<vault>/
//!     base.tar.gz.aes256gcm.enc
//!     base.nonce
//!     state.hash
//!     patches/
//!         001.patch.aes256gcm.enc
//!         001.nonce
//!         ...
//! <repo_root>/.git-vault/cache/<vault>/
//!     content/
//! ```
//!
//! Every write of a paired artifact (ciphertext + nonce, or a single
//! artifact that must never be observed half-written) goes through
//! [`atomic_write`]: write to a sibling temp file, `fsync`, then rename.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, instrument};

use crate::crypto::NonceBytes;
use crate::digest::Digest;
use crate::error::VaultError;

const BASE_CIPHERTEXT: &str = "base.tar.gz.aes256gcm.enc";
const BASE_NONCE: &str = "base.nonce";
const STATE_HASH: &str = "state.hash";
const PATCHES_DIR: &str = "patches";

/// A single stored patch: its 1-based index and the paths of its
/// ciphertext and nonce files.
#[derive(Debug, Clone)]
pub struct StoredPatch {
    pub index: u32,
    pub ciphertext_path: PathBuf,
    pub nonce_path: PathBuf,
}

/// Handle to one vault's on-disk storage directory
/// (`.git-vault/data/<vault>`).
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    /// Open (without creating) the store directory for `vault_path`
    /// under `repo_root`.
    pub fn new(repo_root: &Path, vault_path: &str) -> Self {
        VaultStore {
            root: repo_root.join(".git-vault").join("data").join(vault_path),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn patches_dir(&self) -> PathBuf {
        self.root.join(PATCHES_DIR)
    }

    /// Create the store directory structure if absent. Idempotent.
    pub fn ensure_exists(&self) -> Result<(), VaultError> {
        fs::create_dir_all(self.patches_dir()).map_err(|e| VaultError::io(self.patches_dir(), e))
    }

    #[must_use]
    pub fn has_base(&self) -> bool {
        self.root.join(BASE_CIPHERTEXT).exists()
    }

    /// Acquire an advisory exclusive lock on `state.hash` for the
    /// duration of the returned guard. Hardening only (spec §5): no
    /// correctness property depends on this succeeding or being honored
    /// by every caller.
    pub fn lock_exclusive(&self) -> Result<VaultLockGuard, VaultError> {
        let lock_path = self.root.join(STATE_HASH);
        // The lock targets state.hash itself, which must exist once a
        // base has been written; for a brand-new vault we lock a
        // sentinel file instead so lock() can be called before the
        // first state.hash is written.
        let path = if lock_path.exists() {
            lock_path
        } else {
            self.root.join(".lock")
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| VaultError::io(&path, e))?;
        file.try_lock_exclusive().map_err(|_| VaultError::VaultBusy {
            path: self.root.clone(),
        })?;
        Ok(VaultLockGuard { _file: file })
    }

    /// Count of patches currently stored, i.e. the index the *next*
    /// appended patch will receive minus one.
    pub fn next_patch_index(&self) -> Result<u32, VaultError> {
        let dir = self.patches_dir();
        if !dir.exists() {
            return Ok(1);
        }
        let mut max_index = 0u32;
        for entry in fs::read_dir(&dir).map_err(|e| VaultError::io(&dir, e))? {
            let entry = entry.map_err(|e| VaultError::io(&dir, e))?;
            if let Some(idx) = parse_patch_ciphertext_name(&entry.file_name().to_string_lossy()) {
                max_index = max_index.max(idx);
            }
        }
        Ok(max_index + 1)
    }

    /// List stored patches in ascending index order, enforcing invariant
    /// I3: a contiguous `1..N` sequence with no gaps. A missing index
    /// (e.g. `001`, `003` with `002` absent) is corruption, not a patch
    /// to silently skip.
    pub fn list_patches(&self) -> Result<Vec<StoredPatch>, VaultError> {
        let dir = self.patches_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut indices = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| VaultError::io(&dir, e))? {
            let entry = entry.map_err(|e| VaultError::io(&dir, e))?;
            if let Some(idx) = parse_patch_ciphertext_name(&entry.file_name().to_string_lossy()) {
                indices.push(idx);
            }
        }
        indices.sort_unstable();

        let mut out = Vec::with_capacity(indices.len());
        for (position, idx) in indices.into_iter().enumerate() {
            let expected = position as u32 + 1;
            if idx != expected {
                return Err(VaultError::CorruptPatch {
                    reason: format!(
                        "patch sequence has a gap: expected {expected:03}, found {idx:03} (invariant I3)"
                    ),
                });
            }
            let stem = format!("{idx:03}");
            let ciphertext_path = dir.join(format!("{stem}.patch.aes256gcm.enc"));
            let nonce_path = dir.join(format!("{stem}.nonce"));
            if !nonce_path.exists() {
                return Err(VaultError::CorruptPatch {
                    reason: format!("patch {stem} has no matching nonce file (invariant I4)"),
                });
            }
            out.push(StoredPatch {
                index: idx,
                ciphertext_path,
                nonce_path,
            });
        }
        Ok(out)
    }

    /// Append a new patch at `next_patch_index()`, writing ciphertext
    /// and nonce atomically and in full before returning.
    #[instrument(skip(self, ciphertext), fields(vault = %self.root.display()))]
    pub fn append_patch(&self, ciphertext: &[u8], nonce: NonceBytes) -> Result<u32, VaultError> {
        let index = self.next_patch_index()?;
        let stem = format!("{index:03}");
        let dir = self.patches_dir();
        fs::create_dir_all(&dir).map_err(|e| VaultError::io(&dir, e))?;

        let ciphertext_path = dir.join(format!("{stem}.patch.aes256gcm.enc"));
        let nonce_path = dir.join(format!("{stem}.nonce"));

        atomic_write(&ciphertext_path, ciphertext)?;
        atomic_write(&nonce_path, nonce.to_hex().as_bytes())?;
        debug!(index, "appended patch");
        Ok(index)
    }

    pub fn read_base(&self) -> Result<(Vec<u8>, NonceBytes), VaultError> {
        let ciphertext_path = self.root.join(BASE_CIPHERTEXT);
        let nonce_path = self.root.join(BASE_NONCE);
        let ciphertext = fs::read(&ciphertext_path).map_err(|e| VaultError::io(&ciphertext_path, e))?;
        let nonce = read_nonce(&nonce_path)?;
        Ok((ciphertext, nonce))
    }

    pub fn write_base(&self, ciphertext: &[u8], nonce: NonceBytes) -> Result<(), VaultError> {
        self.ensure_exists()?;
        atomic_write(&self.root.join(BASE_CIPHERTEXT), ciphertext)?;
        atomic_write(&self.root.join(BASE_NONCE), nonce.to_hex().as_bytes())?;
        Ok(())
    }

    /// Read the state hash together with the patch count it was written
    /// against. The count lets callers detect an orphan patch: one that
    /// finished `append_patch` but whose matching `state.hash` update
    /// never landed (e.g. a crash in between). Both fields are written
    /// by a single [`atomic_write`] call, so they can never disagree
    /// about which generation they describe.
    pub fn read_state_hash(&self) -> Result<Option<(Digest, u32)>, VaultError> {
        let path = self.root.join(STATE_HASH);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path).map_err(|e| VaultError::io(&path, e))?;
        let s = s.trim_end_matches('\n');
        let (hash_hex, count_str) = s.split_once(' ').ok_or_else(|| VaultError::CorruptPatch {
            reason: "state.hash is missing its patch-count field".to_string(),
        })?;
        if hash_hex.len() != 64 {
            return Err(VaultError::CorruptPatch {
                reason: format!("state.hash has invalid length {}", hash_hex.len()),
            });
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut out).map_err(|_| VaultError::CorruptPatch {
            reason: "state.hash is not valid hex".to_string(),
        })?;
        let patch_count: u32 = count_str.parse().map_err(|_| VaultError::CorruptPatch {
            reason: format!("state.hash patch count is not a valid integer: {count_str:?}"),
        })?;
        Ok(Some((out, patch_count)))
    }

    /// Write `hash` as the vault's current state hash, recording that it
    /// was computed after `patch_count` patches were applied on top of
    /// the base snapshot.
    pub fn write_state_hash(&self, hash: Digest, patch_count: u32) -> Result<(), VaultError> {
        let contents = format!("{} {patch_count}", hex::encode(hash));
        atomic_write(&self.root.join(STATE_HASH), contents.as_bytes())
    }
}

/// RAII guard releasing the advisory lock taken by [`VaultStore::lock_exclusive`].
pub struct VaultLockGuard {
    _file: File,
}

fn parse_patch_ciphertext_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".patch.aes256gcm.enc")?;
    if stem.len() != 3 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn read_nonce(path: &Path) -> Result<NonceBytes, VaultError> {
    let s = fs::read_to_string(path).map_err(|e| VaultError::io(path, e))?;
    let s = s.trim_end_matches('\n');
    NonceBytes::from_hex(s).ok_or_else(|| VaultError::CorruptPatch {
        reason: format!("malformed nonce file {}", path.display()),
    })
}

/// Write `data` to `path` via temp-file-plus-rename, fsyncing both the
/// temp file and the containing directory before returning, so that a
/// crash leaves either the old contents or the new contents in place —
/// never a half-written file.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
    let temp_name = format!(".{}.tmp-{}", file_name_or(path), uuid::Uuid::new_v4());
    let temp_path = parent.join(temp_name);

    let mut file = File::create(&temp_path).map_err(|e| VaultError::io(&temp_path, e))?;
    file.write_all(data).map_err(|e| VaultError::io(&temp_path, e))?;
    file.sync_all().map_err(|e| VaultError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        VaultError::io(path, e)
    })?;

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn file_name_or(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}
