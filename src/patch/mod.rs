//! Patch engine (C4): change-set synthesis, encoding, application, and
//! sequential replay — the incremental heart of the storage engine.

mod apply;
mod chunker;
mod encoding;
mod synth;

pub use chunker::diff_chunks;
pub use encoding::{decode_change_set, encode_change_set, ChangeRecord};
pub use synth::synthesize_change_set;

use std::fs;
use std::path::Path;

use tracing::instrument;

use crate::crypto::{self, MasterKey};
use crate::digest::directory_digest;
use crate::error::VaultError;
use crate::store::VaultStore;

pub(crate) use apply::apply_change_set;

/// Reconstruct the vault's current logical plaintext state (base plus
/// all stored patches, in index order) into `target`.
///
/// `target` is cleared first. Used both as the final step of `unlock`
/// and, internally, to rebuild a scratch "previous state" directory that
/// `lock` diffs the working tree against.
#[instrument(skip(store, key), fields(vault = %store.root().display()))]
pub fn replay(store: &VaultStore, key: &MasterKey, target: &Path) -> Result<(), VaultError> {
    if !store.has_base() {
        return Err(VaultError::VaultMissing {
            path: store.root().to_path_buf(),
        });
    }

    if target.exists() {
        fs::remove_dir_all(target).map_err(|e| VaultError::io(target, e))?;
    }
    fs::create_dir_all(target).map_err(|e| VaultError::io(target, e))?;

    let (base_ciphertext, base_nonce) = store.read_base()?;
    let base_plain = crypto::decrypt(key, base_nonce, &base_ciphertext, "base snapshot")?;
    unpack_tar_gz(&base_plain, target)?;

    for patch in store.list_patches()? {
        let ciphertext = fs::read(&patch.ciphertext_path)
            .map_err(|e| VaultError::io(&patch.ciphertext_path, e))?;
        let nonce_str = fs::read_to_string(&patch.nonce_path)
            .map_err(|e| VaultError::io(&patch.nonce_path, e))?;
        let nonce = crypto::NonceBytes::from_hex(nonce_str.trim_end_matches('\n')).ok_or_else(|| {
            VaultError::CorruptPatch {
                reason: format!("malformed nonce for patch {:03}", patch.index),
            }
        })?;
        let plaintext = crypto::decrypt(
            key,
            nonce,
            &ciphertext,
            &format!("patch {:03}", patch.index),
        )?;
        let text = String::from_utf8(plaintext).map_err(|_| VaultError::CorruptPatch {
            reason: format!("patch {:03} is not valid UTF-8", patch.index),
        })?;
        let records = decode_change_set(&text)?;
        apply_change_set(&records, target)?;
    }

    let digest = directory_digest(target)?;
    let (expected, _patch_count) = store
        .read_state_hash()?
        .ok_or(VaultError::ReplayMismatch)?;
    if digest != expected {
        return Err(VaultError::ReplayMismatch);
    }
    Ok(())
}

/// Pack `dir`'s contents into a gzip-compressed tar archive.
pub(crate) fn pack_tar_gz(dir: &Path) -> Result<Vec<u8>, VaultError> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    {
        let mut builder = tar::Builder::new(&mut gz);
        builder.mode(tar::HeaderMode::Deterministic);
        builder
            .append_dir_all(".", dir)
            .map_err(|e| VaultError::io(dir, e))?;
        builder.finish().map_err(|e| VaultError::io(dir, e))?;
    }
    gz.finish().map_err(|e| VaultError::io(dir, e))
}

/// Unpack a gzip-compressed tar archive into `dest`, which must already
/// exist.
pub(crate) fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> Result<(), VaultError> {
    use flate2::read::GzDecoder;

    let gz = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(gz);
    archive.unpack(dest).map_err(|e| VaultError::io(dest, e))
}
