//! Change-record types and the `ACTION:PATH:PAYLOAD` text encoding.
//!
//! Parsing splits on the first two `:` only — the remainder, including
//! any further `:` characters, is the payload verbatim (this matters for
//! `BINDIFF`, whose payload is itself `OFFSET:BASE64`).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::VaultError;

/// One line of a decoded change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    /// File did not exist previously; now exists with the given bytes.
    Create { path: String, content: Vec<u8> },
    /// Small file whose content changed; replace entirely.
    Modify { path: String, content: Vec<u8> },
    /// File existed previously; remove it.
    Delete { path: String },
    /// Overwrite `[offset, offset + content.len())` in the existing file
    /// without changing its length.
    BinDiff {
        path: String,
        offset: u64,
        content: Vec<u8>,
    },
}

impl ChangeRecord {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            ChangeRecord::Create { path, .. }
            | ChangeRecord::Modify { path, .. }
            | ChangeRecord::Delete { path }
            | ChangeRecord::BinDiff { path, .. } => path,
        }
    }
}

/// A path containing a newline or `:` cannot be represented in the
/// reference text encoding and must be rejected rather than silently
/// emitted.
pub fn validate_path(path: &str) -> Result<(), VaultError> {
    if path.is_empty() || path.contains(':') || path.contains('\n') || path.contains('\r') {
        return Err(VaultError::CorruptPatch {
            reason: format!("path {path:?} is not representable in a change record"),
        });
    }
    Ok(())
}

/// Encode a change set to the ASCII text format described in spec §4.4.
#[must_use]
pub fn encode_change_set(records: &[ChangeRecord]) -> String {
    let mut out = String::from("# git-vault change set\n");
    for record in records {
        let line = match record {
            ChangeRecord::Create { path, content } => {
                format!("CREATE:{path}:{}", BASE64.encode(content))
            }
            ChangeRecord::Modify { path, content } => {
                format!("MODIFY:{path}:{}", BASE64.encode(content))
            }
            ChangeRecord::Delete { path } => format!("DELETE:{path}:"),
            ChangeRecord::BinDiff {
                path,
                offset,
                content,
            } => format!("BINDIFF:{path}:{offset}:{}", BASE64.encode(content)),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Decode a change set, rejecting anything the encoder in this crate
/// would never have produced itself (unknown actions, malformed
/// offsets, non-base64 payloads).
pub fn decode_change_set(text: &str) -> Result<Vec<ChangeRecord>, VaultError> {
    let mut out = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push(decode_line(line)?);
    }
    Ok(out)
}

fn decode_line(line: &str) -> Result<ChangeRecord, VaultError> {
    let (action, rest) = split_once_colon(line).ok_or_else(|| VaultError::CorruptPatch {
        reason: format!("malformed change record (no ':' found): {line:?}"),
    })?;
    let (path, payload) = split_once_colon(rest).ok_or_else(|| VaultError::CorruptPatch {
        reason: format!("malformed change record (missing payload): {line:?}"),
    })?;
    validate_path(path)?;

    match action {
        "CREATE" => Ok(ChangeRecord::Create {
            path: path.to_string(),
            content: decode_b64(payload)?,
        }),
        "MODIFY" => Ok(ChangeRecord::Modify {
            path: path.to_string(),
            content: decode_b64(payload)?,
        }),
        "DELETE" => Ok(ChangeRecord::Delete {
            path: path.to_string(),
        }),
        "BINDIFF" => {
            let (offset_str, b64) =
                split_once_colon(payload).ok_or_else(|| VaultError::CorruptPatch {
                    reason: format!("BINDIFF payload missing offset: {payload:?}"),
                })?;
            let offset: u64 = offset_str.parse().map_err(|_| VaultError::CorruptPatch {
                reason: format!("BINDIFF offset is not a valid decimal integer: {offset_str:?}"),
            })?;
            Ok(ChangeRecord::BinDiff {
                path: path.to_string(),
                offset,
                content: decode_b64(b64)?,
            })
        }
        other => Err(VaultError::CorruptPatch {
            reason: format!("unknown change record action: {other:?}"),
        }),
    }
}

/// Split on the first `:`, per the "first-two-`:`" parse rule applied
/// twice by the caller.
fn split_once_colon(s: &str) -> Option<(&str, &str)> {
    s.split_once(':')
}

fn decode_b64(s: &str) -> Result<Vec<u8>, VaultError> {
    BASE64.decode(s.trim()).map_err(|_| VaultError::CorruptPatch {
        reason: "payload is not valid base64".to_string(),
    })
}
