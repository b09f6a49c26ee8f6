//! ACID and crash recovery integration tests for EntertainMe.
//!
//! These tests verify that catalog documents and the version ledger keep
//! the expected durability and atomicity guarantees.
//!
//! # Crash Simulation
//!
//! We simulate a crash by dropping the `Repository` handle without calling
//! `close()`. redb commits durably during `commit()`, so dropping the
//! handle simulates an ungraceful shutdown. redb uses shadow paging, so a
//! commit is either fully present or fully absent after recovery.

use std::path::Path;

use entertainme::{
    Profile, Provider, RedbStore, Repository, RepositoryConfig, StorageError, StoreLocation,
    LATEST_VERSION,
};
use tempfile::tempdir;

fn open_repo(path: &Path) -> Repository {
    Repository::open(RepositoryConfig::new(StoreLocation::path(path))).unwrap()
}

// ============================================================================
// Durability Tests
// ============================================================================

#[test]
fn test_committed_data_survives_crash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.db");

    let saved;
    {
        let repo = open_repo(&path);
        saved = repo.save_profile(&Profile::new("crash-safe")).unwrap();
        // NO close() -- crash
    }

    let repo = open_repo(&path);
    assert_eq!(
        repo.profile_by_name("crash-safe").unwrap(),
        Some(saved),
        "Committed data must survive a crash (drop without close)"
    );
    repo.close().unwrap();
}

#[test]
fn test_bulk_data_survives_crash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bulk_crash.db");

    {
        let repo = open_repo(&path);
        for i in 0..100 {
            repo.save_provider(&Provider::new(format!("provider-{}", i)))
                .unwrap();
        }
    }

    let repo = open_repo(&path);
    // 6 default providers plus ours
    assert_eq!(repo.providers().unwrap().len(), 106);
    for i in 0..100 {
        assert!(
            repo.provider_by_name(&format!("provider-{}", i))
                .unwrap()
                .is_some(),
            "provider-{} must be present after crash",
            i
        );
    }
    repo.close().unwrap();
}

#[test]
fn test_multiple_crash_cycles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("multi_crash.db");

    for cycle in 0..3 {
        let repo = open_repo(&path);
        repo.save_profile(&Profile::new(format!("cycle-{}", cycle)))
            .unwrap();
    }

    let repo = open_repo(&path);
    for cycle in 0..3 {
        assert!(repo
            .profile_by_name(&format!("cycle-{}", cycle))
            .unwrap()
            .is_some());
    }
    // Default profile plus one per cycle; ids never reused
    let profiles = repo.profiles().unwrap();
    assert_eq!(profiles.len(), 4);
    let mut ids: Vec<_> = profiles.iter().map(|p| p.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    repo.close().unwrap();
}

// ============================================================================
// Ledger durability
// ============================================================================

#[test]
fn test_ledger_survives_crash_after_migration() {
    let dir = tempdir().unwrap();
    let location = StoreLocation::path(dir.path().join("ledger.db"));

    {
        let mut repo = Repository::open(RepositoryConfig {
            target_version: "00.02".parse().unwrap(),
            ..RepositoryConfig::new(location.clone())
        })
        .unwrap();
        assert!(repo.migrate_database().success);
        // NO close() -- crash
    }

    let store = RedbStore::open(&location).unwrap();
    assert_eq!(store.schema_version().unwrap(), Some(LATEST_VERSION));
    store.close().unwrap();
}

// ============================================================================
// Atomicity Tests
// ============================================================================

#[test]
fn test_uncommitted_write_is_discarded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rollback.db");

    let repo = open_repo(&path);
    // The write closure fails after inserting, so nothing commits
    let result: entertainme::Result<()> = repo.store().write(|w| {
        w.insert(&Profile::new("ghost"))?;
        Err(StorageError::corrupted("abort").into())
    });
    assert!(result.is_err());
    assert!(repo.profile_by_name("ghost").unwrap().is_none());
    repo.close().unwrap();
}
