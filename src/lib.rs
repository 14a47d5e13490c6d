//! Incremental encrypted storage engine for source-controlled vault
//! directories: an append-only log of an encrypted base snapshot plus
//! encrypted change patches, backed by a locally cached plaintext
//! mirror that is never trusted without being checked against the log.

pub mod config;
pub mod controller;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod patch;
pub mod store;

pub use config::VaultPath;
pub use controller::{lock, unlock, LockOutcome};
pub use crypto::MasterKey;
pub use error::{Result, VaultError};
