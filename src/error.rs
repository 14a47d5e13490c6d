//! Crate-wide error types.
//!
//! # Security classification
//!
//! Several variants indicate **adversarial tampering** or an integrity
//! violation rather than an ordinary I/O hiccup. These are marked
//! `[INTEGRITY VIOLATION]` below and should never be silently retried.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// All failure kinds a `lock`/`unlock` call can surface to its caller.
///
/// `CacheInvalid` is deliberately absent: per the controller's contract
/// it is recovered internally (fall back to full replay) and never
/// escapes to a caller.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The supplied master key is not 64 lowercase hex characters.
    #[error("invalid master key: expected 64 lowercase hex characters")]
    InvalidKey,

    /// A filesystem operation failed. Scratch/staging artifacts are
    /// removed before this propagates.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// **[INTEGRITY VIOLATION]** AES-GCM tag verification failed while
    /// decrypting a base archive or patch. No plaintext is released.
    #[error("authentication failed decrypting {what} (tampered or wrong key)")]
    Auth { what: String },

    /// **[INTEGRITY VIOLATION]** A change set could not be parsed: an
    /// unknown action, malformed offset, non-base64 payload, or a path
    /// containing a newline or `:`.
    #[error("corrupt patch: {reason}")]
    CorruptPatch { reason: String },

    /// **[INTEGRITY VIOLATION]** Replaying base + patches produced a
    /// directory whose digest does not match the stored state hash.
    #[error("replay mismatch: reconstructed state does not match state.hash")]
    ReplayMismatch,

    /// `unlock` was called on a vault with no base snapshot.
    #[error("vault has no base snapshot: {path}")]
    VaultMissing { path: PathBuf },

    /// The vault's `state.hash` does not match a successful prior patch
    /// append (see DESIGN.md, open question 2). The vault is usable for
    /// `unlock` (replay is still authoritative) but `lock` refuses to
    /// append further patches until an administrator intervenes.
    #[error("vault state is inconsistent: state.hash predates the latest patch")]
    InconsistentState,

    /// An advisory lock on `state.hash` is held by another process.
    /// Hardening only, never relied on for correctness.
    #[error("vault is locked by another process: {path}")]
    VaultBusy { path: PathBuf },

    /// A logical vault path failed validation (see `config::VaultPath`).
    #[error("invalid vault path {path:?}: {reason}")]
    InvalidVaultPath { path: String, reason: &'static str },
}

impl VaultError {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome reserved for the controller's internal cache-validation step.
/// Never returned from `lock`/`unlock` directly; observing this always
/// triggers a full replay instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheInvalid {
    Missing,
    StoredHashMismatch,
    ContentMismatch,
}

pub type Result<T> = std::result::Result<T, VaultError>;
