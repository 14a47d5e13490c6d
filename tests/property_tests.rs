mod common;

use std::collections::HashSet;

use common::{test_key, TestRepo};
use git_vault_core::store::VaultStore;
use git_vault_core::{lock, unlock, VaultPath};
use proptest::prelude::*;

#[test]
fn nonces_are_unique_across_a_vaults_lifetime() {
    let repo = TestRepo::new("secrets");
    let vault = VaultPath::new("secrets").unwrap();
    repo.write("a.txt", b"v0");
    lock(&repo.repo_root, &vault, &test_key()).unwrap();

    for i in 1..20 {
        repo.write("a.txt", format!("v{i}").as_bytes());
        lock(&repo.repo_root, &vault, &test_key()).unwrap();
    }

    let store = VaultStore::new(&repo.repo_root, "secrets");
    let mut nonces = HashSet::new();

    let (_, base_nonce) = store.read_base().unwrap();
    assert!(nonces.insert(base_nonce.to_hex()));

    for patch in store.list_patches().unwrap() {
        let nonce_str = std::fs::read_to_string(&patch.nonce_path).unwrap();
        assert!(
            nonces.insert(nonce_str.trim().to_string()),
            "nonce reused across patches"
        );
    }
}

proptest! {
    #[test]
    fn round_trip_preserves_final_state_for_arbitrary_edit_sequences(
        initial in "[a-z]{1,20}",
        edits in prop::collection::vec("[a-z]{0,30}", 0..6),
    ) {
        let repo = TestRepo::new("secrets");
        let vault = VaultPath::new("secrets").unwrap();
        repo.write("a.txt", initial.as_bytes());
        lock(&repo.repo_root, &vault, &test_key()).unwrap();

        let mut last = initial;
        for edit in edits {
            repo.write("a.txt", edit.as_bytes());
            lock(&repo.repo_root, &vault, &test_key()).unwrap();
            last = edit;
        }

        repo.clear_working_dir();
        unlock(&repo.repo_root, &vault, &test_key()).unwrap();
        prop_assert_eq!(repo.read("a.txt"), last.into_bytes());
    }
}

#[test]
fn cache_stays_coherent_across_many_lock_unlock_cycles() {
    let repo = TestRepo::new("secrets");
    let vault = VaultPath::new("secrets").unwrap();
    repo.write("a.txt", b"start");
    lock(&repo.repo_root, &vault, &test_key()).unwrap();

    for i in 0..10 {
        repo.write("a.txt", format!("content-{i}").as_bytes());
        lock(&repo.repo_root, &vault, &test_key()).unwrap();
        unlock(&repo.repo_root, &vault, &test_key()).unwrap();
        assert_eq!(repo.read("a.txt"), format!("content-{i}").into_bytes());
    }
}
