//! Tests for crash recovery
//!
//! A store dropped without `close` stands in for a crash: every
//! acknowledged write was fsynced to the WAL but no final checkpoint ran.

use std::fs::{self, OpenOptions};
use std::io::Write;

use minikv::{KvError, Store, Value};
use tempfile::TempDir;

use super::{reopen, sorted_items, test_config};

#[test]
fn test_acknowledged_writes_survive_crash() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(temp_dir.path());
        for i in 0..200 {
            store.set(format!("key{}", i), i).unwrap();
        }
        // Crash: no close, no checkpoint
    }

    let store = reopen(temp_dir.path());
    assert_eq!(store.size(), 200);
    for i in 0..200 {
        assert_eq!(store.get(&format!("key{}", i)).unwrap(), Some(Value::Int(i)));
    }
}

#[test]
fn test_deletes_and_clear_replayed() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(temp_dir.path());
        store.set("gone", 1).unwrap();
        store.set("old", 1).unwrap();
        store.clear().unwrap();
        store.set("kept", 2).unwrap();
        store.set("gone", 3).unwrap();
        store.delete("gone").unwrap();
    }

    let store = reopen(temp_dir.path());
    assert_eq!(
        sorted_items(&store),
        vec![("kept".to_string(), Value::Int(2))]
    );
}

#[test]
fn test_recovery_combines_snapshot_and_wal() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(temp_dir.path());
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.checkpoint().unwrap();

        store.set("b", 20).unwrap();
        store.set("c", 3).unwrap();
        store.delete("a").unwrap();
    }

    let store = reopen(temp_dir.path());
    assert_eq!(
        sorted_items(&store),
        vec![
            ("b".to_string(), Value::Int(20)),
            ("c".to_string(), Value::Int(3)),
        ]
    );
    let stats = store.stats();
    assert_eq!(stats.checkpoint_seq, 2);
    assert_eq!(stats.wal_last_seq, 5);
}

#[test]
fn test_torn_wal_tail_is_discarded() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(temp_dir.path());
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
    }

    // Partial record from an append that never returned
    let mut wal = OpenOptions::new()
        .append(true)
        .open(temp_dir.path().join("wal.log"))
        .unwrap();
    wal.write_all(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
    drop(wal);

    {
        let store = reopen(temp_dir.path());
        assert_eq!(store.size(), 2);
        store.set("c", 3).unwrap();
    }

    let store = reopen(temp_dir.path());
    assert_eq!(store.size(), 3);
    assert_eq!(store.get("c").unwrap(), Some(Value::Int(3)));
}

#[test]
fn test_corrupt_snapshot_fails_open() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(temp_dir.path());
        store.set("a", "value").unwrap();
        store.close().unwrap();
    }

    let snapshot = temp_dir.path().join("snapshot.db");
    let mut bytes = fs::read(&snapshot).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    fs::write(&snapshot, &bytes).unwrap();

    let result = Store::open(test_config(temp_dir.path()));
    assert!(matches!(result, Err(KvError::Persistence(_))));
}

#[test]
fn test_sequence_continues_after_pruned_restart() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(temp_dir.path());
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.set("c", 3).unwrap();
        store.close().unwrap();
        assert_eq!(store.stats().wal_records, 0);
    }

    let store = reopen(temp_dir.path());
    assert_eq!(store.stats().wal_last_seq, 3);
    store.set("d", 4).unwrap();
    assert_eq!(store.stats().wal_last_seq, 4);
    drop(store);

    let store = reopen(temp_dir.path());
    assert_eq!(store.size(), 4);
}

#[test]
fn test_close_without_checkpoint_keeps_wal() {
    let temp_dir = TempDir::new().unwrap();
    let config = minikv::Config::builder()
        .data_dir(temp_dir.path())
        .checkpoint_interval(None)
        .checkpoint_on_close(false)
        .build();

    {
        let store = Store::open(config.clone()).unwrap();
        store.set("a", 1).unwrap();
        store.close().unwrap();
        assert_eq!(store.stats().wal_records, 1);
    }
    assert!(!temp_dir.path().join("snapshot.db").exists());

    let store = Store::open(config).unwrap();
    assert_eq!(store.get("a").unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_separate_wal_and_snapshot_paths() {
    let temp_dir = TempDir::new().unwrap();
    let config = minikv::Config::builder()
        .data_dir(temp_dir.path().join("data"))
        .wal_path(temp_dir.path().join("logs").join("minikv.wal"))
        .snapshot_path(temp_dir.path().join("snap").join("minikv.snap"))
        .build();

    {
        let store = Store::open(config.clone()).unwrap();
        store.set("k", "v").unwrap();
        store.close().unwrap();
    }
    assert!(temp_dir.path().join("logs").join("minikv.wal").exists());
    assert!(temp_dir.path().join("snap").join("minikv.snap").exists());

    let store = Store::open(config).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(Value::from("v")));
}
