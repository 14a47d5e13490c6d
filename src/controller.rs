//! Controller (C5): the `lock`/`unlock` entry points tying together the
//! store, patch engine, and plaintext cache.
//!
//! ```text
//! lock:   working tree  --diff against cache-->  change set  --encrypt-->  store
//! unlock: store  --replay-->  cache (validated)  --copy-->  working tree
//! ```
//!
//! The cache is never trusted on a single signal (spec design note):
//! before being used as the "previous state" for a diff, or copied out
//! to satisfy `unlock`, it must pass both checks in
//! [`validate_cache`] — its stored hash must match its own recomputed
//! digest (it wasn't corrupted or partially written) *and* that digest
//! must match the vault's `state.hash` (it isn't stale). Either check
//! failing triggers a full replay from the encrypted log, never a
//! partial repair.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::config::VaultPath;
use crate::crypto::{self, MasterKey};
use crate::digest::directory_digest;
use crate::error::{CacheInvalid, VaultError};
use crate::patch::{encode_change_set, replay, synthesize_change_set};
use crate::store::VaultStore;

const CACHE_HASH_FILE: &str = "content.hash";
const CACHE_CONTENT_DIR: &str = "content";

fn cache_root(repo_root: &Path, vault_path: &VaultPath) -> PathBuf {
    repo_root.join(".git-vault").join("cache").join(vault_path.as_str())
}

fn cache_content_dir(repo_root: &Path, vault_path: &VaultPath) -> PathBuf {
    cache_root(repo_root, vault_path).join(CACHE_CONTENT_DIR)
}

fn cache_hash_path(repo_root: &Path, vault_path: &VaultPath) -> PathBuf {
    cache_root(repo_root, vault_path).join(CACHE_HASH_FILE)
}

/// Outcome of a [`lock`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// No base snapshot existed; one was created from the working tree.
    BaseCreated,
    /// A new patch was appended because the working tree changed.
    PatchAppended { index: u32 },
    /// The working tree matched the cache exactly; nothing was written.
    NoChange,
}

/// Seal the current contents of `repo_root/<vault_path>` into the
/// encrypted log.
///
/// Idempotent: calling `lock` twice in a row with no intervening edits
/// produces [`LockOutcome::NoChange`] and appends nothing.
#[instrument(skip(key), fields(vault = %vault_path))]
pub fn lock(
    repo_root: &Path,
    vault_path: &VaultPath,
    key: &MasterKey,
) -> Result<LockOutcome, VaultError> {
    let store = VaultStore::new(repo_root, vault_path.as_str());
    let working_dir = repo_root.join(vault_path.as_str());
    let _guard = store.lock_exclusive()?;

    if !store.has_base() {
        let ciphertext_nonce = encrypt_directory(&working_dir, key)?;
        store.write_base(&ciphertext_nonce.0, ciphertext_nonce.1)?;
        let digest = directory_digest(&working_dir)?;
        store.write_state_hash(digest, 0)?;
        refresh_cache(repo_root, vault_path, &working_dir, digest)?;
        info!("created base snapshot");
        return Ok(LockOutcome::BaseCreated);
    }

    check_no_orphan_patches(&store)?;

    let previous_dir = ensure_valid_cache(repo_root, vault_path, &store, key)?;

    let records = synthesize_change_set(&previous_dir, &working_dir)?;
    if records.is_empty() {
        return Ok(LockOutcome::NoChange);
    }

    let plaintext = encode_change_set(&records).into_bytes();
    let nonce = crypto::random_nonce();
    let ciphertext = crypto::encrypt(key, nonce, &plaintext);
    let index = store.append_patch(&ciphertext, nonce)?;

    let digest = directory_digest(&working_dir)?;
    store.write_state_hash(digest, index)?;
    refresh_cache(repo_root, vault_path, &working_dir, digest)?;

    info!(index, "appended patch");
    Ok(LockOutcome::PatchAppended { index })
}

/// Detect a patch that finished `append_patch` but whose matching
/// `state.hash` update never landed (e.g. a crash in between). Left
/// unchecked, the next `lock` would diff against the now-stale cache and
/// append a second patch on top of the orphan, producing a replay chain
/// that can never reproduce the `state.hash` it would go on to write
/// (DESIGN.md, open question 2). `state.hash` itself must already exist
/// here since `lock` only reaches this point once a base snapshot has
/// been written.
fn check_no_orphan_patches(store: &VaultStore) -> Result<(), VaultError> {
    let (_, recorded_count) = store.read_state_hash()?.ok_or(VaultError::InconsistentState)?;
    let actual_count = store.list_patches()?.len() as u32;
    if actual_count != recorded_count {
        return Err(VaultError::InconsistentState);
    }
    Ok(())
}

/// Materialize the vault's current logical plaintext state into
/// `repo_root/<vault_path>`, validating (and rebuilding, if necessary)
/// the cache first.
#[instrument(skip(key), fields(vault = %vault_path))]
pub fn unlock(repo_root: &Path, vault_path: &VaultPath, key: &MasterKey) -> Result<(), VaultError> {
    let store = VaultStore::new(repo_root, vault_path.as_str());
    let working_dir = repo_root.join(vault_path.as_str());
    let _guard = store.lock_exclusive()?;

    let cache_dir = ensure_valid_cache(repo_root, vault_path, &store, key)?;
    copy_dir_all(&cache_dir, &working_dir)?;
    Ok(())
}

/// Validate the cache against `store`'s `state.hash`, rebuilding it via
/// full replay if either half of the double-check fails. Returns the
/// path of a directory known to hold the vault's current logical
/// plaintext state.
fn ensure_valid_cache(
    repo_root: &Path,
    vault_path: &VaultPath,
    store: &VaultStore,
    key: &MasterKey,
) -> Result<PathBuf, VaultError> {
    let content_dir = cache_content_dir(repo_root, vault_path);

    match validate_cache(repo_root, vault_path, store)? {
        None => Ok(content_dir),
        Some(reason) => {
            warn!(?reason, "cache invalid, rebuilding from encrypted log");
            replay(store, key, &content_dir)?;
            let digest = directory_digest(&content_dir)?;
            write_cache_hash(repo_root, vault_path, digest)?;
            Ok(content_dir)
        }
    }
}

/// `Ok(None)` means the cache is trustworthy as-is. `Ok(Some(reason))`
/// means it failed one of the two checks and must be rebuilt.
fn validate_cache(
    repo_root: &Path,
    vault_path: &VaultPath,
    store: &VaultStore,
) -> Result<Option<CacheInvalid>, VaultError> {
    let content_dir = cache_content_dir(repo_root, vault_path);
    let hash_path = cache_hash_path(repo_root, vault_path);

    if !content_dir.exists() || !hash_path.exists() {
        return Ok(Some(CacheInvalid::Missing));
    }

    let stored_hex = fs::read_to_string(&hash_path).map_err(|e| VaultError::io(&hash_path, e))?;
    let mut stored = [0u8; 32];
    if hex::decode_to_slice(stored_hex.trim_end_matches('\n'), &mut stored).is_err() {
        return Ok(Some(CacheInvalid::StoredHashMismatch));
    }

    let recomputed = directory_digest(&content_dir)?;
    if recomputed != stored {
        return Ok(Some(CacheInvalid::StoredHashMismatch));
    }

    let (expected, _recorded_patch_count) =
        store.read_state_hash()?.ok_or(VaultError::InconsistentState)?;
    if recomputed != expected {
        return Ok(Some(CacheInvalid::ContentMismatch));
    }

    Ok(None)
}

/// Overwrite the cache's content mirror with `working_dir` and record
/// `digest` (the digest of that same content) as its stored hash.
fn refresh_cache(
    repo_root: &Path,
    vault_path: &VaultPath,
    working_dir: &Path,
    digest: [u8; 32],
) -> Result<(), VaultError> {
    let content_dir = cache_content_dir(repo_root, vault_path);
    if content_dir.exists() {
        fs::remove_dir_all(&content_dir).map_err(|e| VaultError::io(&content_dir, e))?;
    }
    fs::create_dir_all(&content_dir).map_err(|e| VaultError::io(&content_dir, e))?;
    copy_dir_all(working_dir, &content_dir)?;
    write_cache_hash(repo_root, vault_path, digest)
}

fn write_cache_hash(
    repo_root: &Path,
    vault_path: &VaultPath,
    digest: [u8; 32],
) -> Result<(), VaultError> {
    let hash_path = cache_hash_path(repo_root, vault_path);
    if let Some(parent) = hash_path.parent() {
        fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
    }
    fs::write(&hash_path, hex::encode(digest)).map_err(|e| VaultError::io(&hash_path, e))
}

/// Encrypt the tar-gz packing of `dir` under a fresh nonce, returning
/// `(ciphertext, nonce)`.
fn encrypt_directory(
    dir: &Path,
    key: &MasterKey,
) -> Result<(Vec<u8>, crypto::NonceBytes), VaultError> {
    let archive = crate::patch::pack_tar_gz(dir)?;
    let nonce = crypto::random_nonce();
    let ciphertext = crypto::encrypt(key, nonce, &archive);
    Ok((ciphertext, nonce))
}

/// Recursively copy `src` into `dst`, creating `dst` if needed.
/// Symlinks are skipped, matching the digest and snapshot walks.
fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), VaultError> {
    if dst.exists() {
        fs::remove_dir_all(dst).map_err(|e| VaultError::io(dst, e))?;
    }
    fs::create_dir_all(dst).map_err(|e| VaultError::io(dst, e))?;

    if !src.exists() {
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            VaultError::io(
                e.path().unwrap_or(src).to_path_buf(),
                std::io::Error::other("directory walk failed"),
            )
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir entries are rooted under src");
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| VaultError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| VaultError::io(&target, e))?;
        }
    }
    Ok(())
}
