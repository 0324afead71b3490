//! Tests for single-threaded store operations
//!
//! These tests verify:
//! - get/set/delete/exists/size semantics
//! - Batch updates
//! - Store-wide reads and clear
//! - Every mutation is logged, and only mutations are

use minikv::{Store, Value};
use tempfile::TempDir;

use super::{reopen, setup_temp_store, sorted_items, test_config};

#[test]
fn test_open_creates_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("db");

    let store = Store::open(test_config(&data_dir)).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("wal.log").exists());
    assert!(store.is_empty());
    assert_eq!(store.data_dir(), data_dir.as_path());
}

#[test]
fn test_set_and_get() {
    let (_temp, store) = setup_temp_store();

    store.set("name", "alice").unwrap();
    store.set("age", 30).unwrap();
    store.set("tags", vec![Value::from("a"), Value::from("b")]).unwrap();

    assert_eq!(store.get("name").unwrap(), Some(Value::from("alice")));
    assert_eq!(store.get("age").unwrap(), Some(Value::Int(30)));
    assert_eq!(
        store.get("tags").unwrap(),
        Some(Value::List(vec![Value::from("a"), Value::from("b")]))
    );
}

#[test]
fn test_get_missing_is_none() {
    let (_temp, store) = setup_temp_store();
    assert_eq!(store.get("missing").unwrap(), None);
}

#[test]
fn test_set_overwrites() {
    let (_temp, store) = setup_temp_store();

    store.set("k", 1).unwrap();
    store.set("k", 2).unwrap();

    assert_eq!(store.get("k").unwrap(), Some(Value::Int(2)));
    assert_eq!(store.size(), 1);
}

#[test]
fn test_null_is_a_value() {
    let (_temp, store) = setup_temp_store();

    store.set("k", Value::Null).unwrap();

    assert!(store.exists("k"));
    assert_eq!(store.get("k").unwrap(), Some(Value::Null));
}

#[test]
fn test_empty_key_is_allowed() {
    let (_temp, store) = setup_temp_store();
    store.set("", "empty").unwrap();
    assert_eq!(store.get("").unwrap(), Some(Value::from("empty")));
}

#[test]
fn test_delete() {
    let (_temp, store) = setup_temp_store();

    store.set("k", "v").unwrap();
    assert!(store.delete("k").unwrap());

    assert!(!store.exists("k"));
    assert_eq!(store.get("k").unwrap(), None);
    assert_eq!(store.size(), 0);
}

#[test]
fn test_delete_absent_writes_nothing() {
    let (_temp, store) = setup_temp_store();
    store.set("present", 1).unwrap();
    let before = store.stats().wal_last_seq;

    assert!(!store.delete("absent").unwrap());

    assert_eq!(store.stats().wal_last_seq, before);
    assert_eq!(store.size(), 1);
}

#[test]
fn test_every_mutation_is_logged() {
    let (_temp, store) = setup_temp_store();

    store.set("a", 1).unwrap();
    store.set("b", 2).unwrap();
    store.delete("a").unwrap();
    store.update([("c", 3), ("d", 4)]).unwrap();
    store.clear().unwrap();

    let stats = store.stats();
    assert_eq!(stats.wal_last_seq, 6);
    assert_eq!(stats.wal_records, 6);
}

#[test]
fn test_reads_are_not_logged() {
    let (_temp, store) = setup_temp_store();
    store.set("a", 1).unwrap();

    store.get("a").unwrap();
    store.exists("a");
    store.keys();
    store.items();

    assert_eq!(store.stats().wal_records, 1);
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_sets_all_keys() {
    let (_temp, store) = setup_temp_store();

    let written = store.update([("a", 1), ("b", 2), ("c", 3)]).unwrap();

    assert_eq!(written, 3);
    assert_eq!(store.size(), 3);
    assert_eq!(store.get("b").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_update_later_duplicate_wins() {
    let (_temp, store) = setup_temp_store();

    let written = store.update(vec![("k", 1), ("k", 2)]).unwrap();

    assert_eq!(written, 1);
    assert_eq!(store.get("k").unwrap(), Some(Value::Int(2)));
    assert_eq!(store.stats().wal_records, 1);
}

#[test]
fn test_empty_update_is_noop() {
    let (_temp, store) = setup_temp_store();

    let written = store.update(Vec::<(String, Value)>::new()).unwrap();

    assert_eq!(written, 0);
    assert_eq!(store.stats().wal_records, 0);
}

// =============================================================================
// Store-wide Tests
// =============================================================================

#[test]
fn test_keys_values_items() {
    let (_temp, store) = setup_temp_store();
    store.update([("x", 1), ("y", 2)]).unwrap();

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, vec!["x".to_string(), "y".to_string()]);

    let mut values: Vec<i64> = store.values().iter().filter_map(Value::as_int).collect();
    values.sort();
    assert_eq!(values, vec![1, 2]);

    assert_eq!(
        sorted_items(&store),
        vec![
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
        ]
    );
}

#[test]
fn test_clear() {
    let (_temp, store) = setup_temp_store();
    store.update([("a", 1), ("b", 2), ("c", 3)]).unwrap();

    store.clear().unwrap();

    assert!(store.is_empty());
    assert!(store.keys().is_empty());
    assert_eq!(store.get("a").unwrap(), None);

    // Usable afterwards
    store.set("a", 10).unwrap();
    assert_eq!(store.size(), 1);
}

#[test]
fn test_scenario_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let expected = vec![
        ("a".to_string(), Value::Int(10)),
        ("c".to_string(), Value::Int(3)),
    ];

    {
        let store = reopen(temp_dir.path());
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.update([("a", 10), ("c", 3)]).unwrap();
        assert!(store.delete("b").unwrap());

        assert_eq!(sorted_items(&store), expected);
        store.close().unwrap();
    }

    let store = reopen(temp_dir.path());
    assert_eq!(sorted_items(&store), expected);
    assert!(!store.exists("b"));
}

#[test]
fn test_close_is_idempotent() {
    let (_temp, store) = setup_temp_store();
    store.set("k", 1).unwrap();

    store.close().unwrap();
    store.close().unwrap();
}
