//! Applies a decoded change set to a plaintext directory in place, per
//! spec §4.4.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::trace;

use crate::error::VaultError;
use crate::patch::encoding::ChangeRecord;

/// Apply `records`, in order, to the directory tree rooted at `target`.
pub(crate) fn apply_change_set(records: &[ChangeRecord], target: &Path) -> Result<(), VaultError> {
    for record in records {
        apply_one(record, target)?;
    }
    Ok(())
}

fn apply_one(record: &ChangeRecord, target: &Path) -> Result<(), VaultError> {
    match record {
        ChangeRecord::Create { path, content } | ChangeRecord::Modify { path, content } => {
            let full = target.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
            }
            fs::write(&full, content).map_err(|e| VaultError::io(&full, e))?;
            trace!(path, len = content.len(), "wrote file");
            Ok(())
        }
        ChangeRecord::Delete { path } => {
            let full = target.join(path);
            match fs::remove_file(&full) {
                Ok(()) => {}
                // Deletion is idempotent: a file already absent is not an error.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(VaultError::io(&full, e)),
            }
            trace!(path, "deleted file");
            Ok(())
        }
        ChangeRecord::BinDiff {
            path,
            offset,
            content,
        } => {
            let full = target.join(path);
            let mut file = OpenOptions::new()
                .write(true)
                .open(&full)
                .map_err(|e| VaultError::io(&full, e))?;
            file.seek(SeekFrom::Start(*offset))
                .map_err(|e| VaultError::io(&full, e))?;
            file.write_all(content)
                .map_err(|e| VaultError::io(&full, e))?;
            trace!(path, offset, len = content.len(), "applied bindiff run");
            Ok(())
        }
    }
}
