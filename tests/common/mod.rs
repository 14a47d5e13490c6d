use std::fs;
use std::path::{Path, PathBuf};

use git_vault_core::MasterKey;

/// Route `tracing` spans to the test harness's captured output. Safe to
/// call from every test; `try_init` is a no-op once a subscriber is
/// already installed for the process.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_key() -> MasterKey {
    MasterKey::from_hex(&"ab".repeat(32)).unwrap()
}

pub fn other_key() -> MasterKey {
    MasterKey::from_hex(&"cd".repeat(32)).unwrap()
}

/// A scratch repository root plus its vault's working directory.
pub struct TestRepo {
    _dir: tempfile::TempDir,
    pub repo_root: PathBuf,
    pub working_dir: PathBuf,
}

impl TestRepo {
    pub fn new(vault_name: &str) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let repo_root = dir.path().to_path_buf();
        let working_dir = repo_root.join(vault_name);
        fs::create_dir_all(&working_dir).unwrap();
        TestRepo {
            _dir: dir,
            repo_root,
            working_dir,
        }
    }

    pub fn write(&self, rel: &str, content: &[u8]) {
        let path = self.working_dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.working_dir.join(rel)).unwrap();
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.working_dir.join(rel)).unwrap()
    }

    pub fn clear_working_dir(&self) {
        fs::remove_dir_all(&self.working_dir).unwrap();
        fs::create_dir_all(&self.working_dir).unwrap();
    }

    pub fn store_dir(&self, vault_name: &str) -> PathBuf {
        self.repo_root.join(".git-vault").join("data").join(vault_name)
    }
}

/// Walk every file under `root` (the encrypted store) and assert that
/// `needle` is not a substring of any file's raw bytes.
pub fn assert_no_plaintext_leak(root: &Path, needle: &[u8]) {
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = fs::read(entry.path()).unwrap();
        assert!(
            !contains_subslice(&bytes, needle),
            "plaintext leaked into {}",
            entry.path().display()
        );
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
