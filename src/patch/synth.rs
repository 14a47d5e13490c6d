//! Change-set synthesis: compares a previous logical state directory
//! against the current working directory and produces the minimal
//! sequence of [`ChangeRecord`]s that would reproduce `current` from
//! `previous`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, instrument};

use crate::crypto::hash_sha256;
use crate::digest::enumerate_files;
use crate::error::VaultError;
use crate::patch::chunker::{diff_chunks, total_payload_bytes, MODIFY_THRESHOLD};
use crate::patch::encoding::ChangeRecord;

/// Synthesize the change set that turns `previous` into `current`, per
/// spec §4.4.
#[instrument(skip(previous, current), fields(previous = %previous.display(), current = %current.display()))]
pub fn synthesize_change_set(
    previous: &Path,
    current: &Path,
) -> Result<Vec<ChangeRecord>, VaultError> {
    let prev_paths: BTreeSet<String> = enumerate_files(previous)?.into_iter().collect();
    let cur_paths: BTreeSet<String> = enumerate_files(current)?.into_iter().collect();

    let mut records = Vec::new();

    for path in prev_paths.difference(&cur_paths) {
        records.push(ChangeRecord::Delete { path: path.clone() });
    }

    for path in cur_paths.difference(&prev_paths) {
        let content = fs::read(current.join(path)).map_err(|e| VaultError::io(current.join(path), e))?;
        records.push(ChangeRecord::Create {
            path: path.clone(),
            content,
        });
    }

    for path in prev_paths.intersection(&cur_paths) {
        let prev_bytes = fs::read(previous.join(path)).map_err(|e| VaultError::io(previous.join(path), e))?;
        let cur_bytes = fs::read(current.join(path)).map_err(|e| VaultError::io(current.join(path), e))?;

        if hash_sha256(&prev_bytes) == hash_sha256(&cur_bytes) {
            continue;
        }

        records.extend(changed_file_records(path, &prev_bytes, &cur_bytes));
    }

    debug!(record_count = records.len(), "synthesized change set");
    Ok(records)
}

/// Decide whether a single changed file should be encoded as one
/// `MODIFY` or as a sequence of `BINDIFF` records, per spec §4.4 step 4.
fn changed_file_records(path: &str, prev_bytes: &[u8], cur_bytes: &[u8]) -> Vec<ChangeRecord> {
    let larger = prev_bytes.len().max(cur_bytes.len());
    let whole_file_modify = || {
        vec![ChangeRecord::Modify {
            path: path.to_string(),
            content: cur_bytes.to_vec(),
        }]
    };

    if larger <= MODIFY_THRESHOLD {
        return whole_file_modify();
    }

    // The chunker only applies when the file length is unchanged; any
    // length-changing diff falls back to MODIFY (spec §4.4 step 5,
    // open question 1 — resolved in DESIGN.md by following the
    // reference behaviour rather than inventing an APPEND action).
    if prev_bytes.len() != cur_bytes.len() {
        return whole_file_modify();
    }

    let runs = diff_chunks(prev_bytes, cur_bytes);
    let bindiff_cost = total_payload_bytes(&runs);

    // The BINDIFF encoding must strictly undercut a single MODIFY, or
    // the chunker has failed the size-savings test and we fall back.
    if runs.is_empty() || bindiff_cost >= cur_bytes.len() {
        return whole_file_modify();
    }

    runs.iter()
        .map(|run| ChangeRecord::BinDiff {
            path: path.to_string(),
            offset: run.offset as u64,
            content: cur_bytes[run.offset..run.offset + run.len].to_vec(),
        })
        .collect()
}
