//! Tests for the snapshot persistence backend
//!
//! These tests verify:
//! - Staged changes are only durable after a checkpoint
//! - Snapshots round-trip through load_all with their sequence
//! - Single keys can be read back with load
//! - Corrupt or foreign files are rejected
//! - Failed writes leave the previous snapshot in place

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use minikv::{KvError, PersistenceBackend, SnapshotFile, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_snapshot() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("snapshot.db");
    (temp_dir, path)
}

fn reload(path: &PathBuf) -> (u64, HashMap<String, Value>) {
    let mut backend = SnapshotFile::new(path);
    let table = backend.load_all().unwrap();
    (backend.checkpoint_seq(), table)
}

// =============================================================================
// Load Tests
// =============================================================================

#[test]
fn test_load_missing_file_is_empty() {
    let (_temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);

    let table = backend.load_all().unwrap();

    assert!(table.is_empty());
    assert!(backend.is_empty());
    assert_eq!(backend.checkpoint_seq(), 0);
    assert!(!path.exists());
}

#[test]
fn test_checkpoint_round_trip() {
    let (_temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();

    let mut nested = std::collections::BTreeMap::new();
    nested.insert("inner".to_string(), Value::from(true));

    backend.upsert("int", &Value::from(42)).unwrap();
    backend.upsert("text", &Value::from("hello")).unwrap();
    backend.upsert("map", &Value::Map(nested.clone())).unwrap();
    assert!(backend.checkpoint(17).unwrap());

    let (seq, table) = reload(&path);
    assert_eq!(seq, 17);
    assert_eq!(table.len(), 3);
    assert_eq!(table["int"], Value::Int(42));
    assert_eq!(table["text"], Value::from("hello"));
    assert_eq!(table["map"], Value::Map(nested));
}

#[test]
fn test_staged_changes_not_durable_until_checkpoint() {
    let (_temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();

    backend.upsert("a", &Value::from(1)).unwrap();
    backend.checkpoint(1).unwrap();

    backend.upsert("b", &Value::from(2)).unwrap();
    backend.remove("a").unwrap();
    assert_eq!(backend.len(), 1);

    // Disk still has the first checkpoint
    let (seq, table) = reload(&path);
    assert_eq!(seq, 1);
    assert!(table.contains_key("a"));
    assert!(!table.contains_key("b"));

    backend.checkpoint(3).unwrap();
    let (seq, table) = reload(&path);
    assert_eq!(seq, 3);
    assert!(!table.contains_key("a"));
    assert_eq!(table["b"], Value::from(2));
}

#[test]
fn test_clear_then_checkpoint() {
    let (_temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();

    backend.upsert("a", &Value::from(1)).unwrap();
    backend.upsert("b", &Value::from(2)).unwrap();
    backend.checkpoint(2).unwrap();

    backend.clear().unwrap();
    backend.upsert("c", &Value::from(3)).unwrap();
    backend.checkpoint(5).unwrap();

    let (_, table) = reload(&path);
    assert_eq!(table.len(), 1);
    assert_eq!(table["c"], Value::from(3));
}

#[test]
fn test_empty_checkpoint_writes_file() {
    let (_temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();

    backend.checkpoint(8).unwrap();

    assert!(path.exists());
    let (seq, table) = reload(&path);
    assert_eq!(seq, 8);
    assert!(table.is_empty());
}

#[test]
fn test_unchanged_checkpoint_skips_write() {
    let (_temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();

    backend.upsert("a", &Value::from(1)).unwrap();
    backend.checkpoint(4).unwrap();
    let modified = fs::metadata(&path).unwrap().modified().unwrap();

    // Same sequence and nothing staged
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(!backend.checkpoint(4).unwrap());
    assert_eq!(backend.checkpoint_seq(), 4);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_checkpoint_leaves_no_temp_file() {
    let (temp, path) = setup_temp_snapshot();
    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();
    backend.upsert("k", &Value::Null).unwrap();
    backend.checkpoint(1).unwrap();

    let names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["snapshot.db".to_string()]);
}

#[test]
fn test_load_single_key() {
    let (_temp, path) = setup_temp_snapshot();
    {
        let mut backend = SnapshotFile::new(&path);
        backend.load_all().unwrap();
        backend.upsert("a", &Value::from("alpha")).unwrap();
        backend.upsert("b", &Value::from(2)).unwrap();
        backend.checkpoint(2).unwrap();
    }

    let mut backend = SnapshotFile::new(&path);
    assert_eq!(backend.load("a").unwrap(), None);

    backend.load_all().unwrap();
    assert_eq!(backend.load("a").unwrap(), Some(Value::from("alpha")));
    assert_eq!(backend.load("b").unwrap(), Some(Value::Int(2)));
    assert_eq!(backend.load("missing").unwrap(), None);

    // Staged changes are visible before they are written
    backend.remove("a").unwrap();
    backend.upsert("c", &Value::Null).unwrap();
    assert_eq!(backend.load("a").unwrap(), None);
    assert_eq!(backend.load("c").unwrap(), Some(Value::Null));
}

// =============================================================================
// Validation Tests
// =============================================================================

fn write_valid_snapshot(path: &PathBuf) {
    let mut backend = SnapshotFile::new(path);
    backend.load_all().unwrap();
    backend.upsert("a", &Value::from("alpha")).unwrap();
    backend.upsert("b", &Value::from("beta")).unwrap();
    backend.checkpoint(2).unwrap();
}

#[test]
fn test_flipped_byte_is_rejected() {
    let (_temp, path) = setup_temp_snapshot();
    write_valid_snapshot(&path);

    let mut bytes = fs::read(&path).unwrap();
    bytes[25] ^= 0x40;
    fs::write(&path, &bytes).unwrap();

    let err = SnapshotFile::new(&path).load_all().unwrap_err();
    assert!(matches!(err, KvError::Persistence(_)));
}

#[test]
fn test_truncated_file_is_rejected() {
    let (_temp, path) = setup_temp_snapshot();
    write_valid_snapshot(&path);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();

    assert!(matches!(
        SnapshotFile::new(&path).load_all(),
        Err(KvError::Persistence(_))
    ));
}

#[test]
fn test_foreign_file_is_rejected() {
    let (_temp, path) = setup_temp_snapshot();
    fs::write(&path, b"this is not a snapshot file at all").unwrap();

    let err = SnapshotFile::new(&path).load_all().unwrap_err();
    assert!(matches!(err, KvError::Persistence(_)));
    assert!(err.to_string().contains("snapshot"));
}

#[test]
fn test_tiny_file_is_rejected() {
    let (_temp, path) = setup_temp_snapshot();
    fs::write(&path, b"MKVS").unwrap();

    assert!(SnapshotFile::new(&path).load_all().is_err());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_failed_write_keeps_previous_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("snapshot.db");
    write_valid_snapshot(&path);

    // A directory where the temp file should go makes File::create fail
    fs::create_dir(temp_dir.path().join("snapshot.db.tmp")).unwrap();

    let mut backend = SnapshotFile::new(&path);
    backend.load_all().unwrap();
    backend.upsert("c", &Value::from("gamma")).unwrap();

    let err = backend.checkpoint(3).unwrap_err();
    assert!(matches!(err, KvError::Persistence(_)));
    assert_eq!(backend.checkpoint_seq(), 2);

    // Old snapshot intact
    let (seq, table) = reload(&path);
    assert_eq!(seq, 2);
    assert_eq!(table.len(), 2);

    // Staged change retried once the obstruction is gone
    fs::remove_dir(temp_dir.path().join("snapshot.db.tmp")).unwrap();
    assert!(backend.checkpoint(3).unwrap());
    let (_, table) = reload(&path);
    assert_eq!(table["c"], Value::from("gamma"));
}
