//! Tests for Cursor and MutableCursor
//!
//! These tests verify:
//! - Lazy, forward-only consumption
//! - Length counts what is left to yield
//! - Key pairing and inline (preloaded) values
//! - Records deleted between lookup and fetch

use burrowkv::config::{Config, SyncStrategy};
use burrowkv::cursor::Cursor;
use burrowkv::engine::{Engine, GetOptions};
use burrowkv::error::ErrorCode;
use burrowkv::value::Value;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sync_strategy(SyncStrategy::OnClose)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn seeded_engine() -> (TempDir, Engine) {
    let (temp, engine) = setup_temp_engine();
    engine.put("a", 1).wait().unwrap();
    engine.put("b", 2).wait().unwrap();
    engine.put("c", 3).wait().unwrap();
    (temp, engine)
}

// =============================================================================
// Cursor Tests
// =============================================================================

#[test]
fn test_cursor_next_in_call_order() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine.get(["c", "a", "b"]).wait().unwrap();

    assert_eq!(cursor.len(), 3);
    assert_eq!(cursor.next().unwrap().wait().unwrap(), Some(Value::Int(3)));
    assert_eq!(cursor.len(), 2);
    assert_eq!(cursor.next().unwrap().wait().unwrap(), Some(Value::Int(1)));
    assert_eq!(cursor.next().unwrap().wait().unwrap(), Some(Value::Int(2)));
    assert!(cursor.next().is_none());
    assert_eq!(cursor.len(), 0);
    assert!(cursor.is_empty());
}

#[test]
fn test_cursor_to_array_after_partial_consumption() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine.get(["a", "b", "c"]).wait().unwrap();
    cursor.next().unwrap().wait().unwrap();

    assert_eq!(
        cursor.to_array().wait().unwrap(),
        vec![Value::Int(2), Value::Int(3)]
    );
}

#[test]
fn test_cursor_fetches_current_value_lazily() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine.get("a").wait().unwrap();
    engine.put("a", 100).wait().unwrap();

    // Overwrites reuse the record, so the lazy fetch sees the new value
    assert_eq!(cursor.next().unwrap().wait().unwrap(), Some(Value::Int(100)));
}

#[test]
fn test_cursor_skips_deleted_record() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine.get(["a", "b"]).wait().unwrap();
    engine.del("a").wait().unwrap();

    assert_eq!(cursor.next().unwrap().wait().unwrap(), None);
    assert_eq!(cursor.next().unwrap().wait().unwrap(), Some(Value::Int(2)));

    let cursor = engine.get(["b", "c"]).wait().unwrap();
    engine.del("b").wait().unwrap();
    assert_eq!(cursor.to_array().wait().unwrap(), vec![Value::Int(3)]);
}

#[test]
fn test_cursor_from_values_is_detached() {
    let cursor = Cursor::from_values(vec![Value::from("x"), Value::Null]);

    assert_eq!(cursor.len(), 2);
    assert_eq!(
        cursor.to_array().wait().unwrap(),
        vec![Value::from("x"), Value::Null]
    );
}

#[test]
fn test_cursor_fetch_after_close_fails() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine.get("a").wait().unwrap();
    engine.close().wait().unwrap();

    let err = cursor.next().unwrap().wait().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Closed);
}

#[test]
fn test_cursor_keeps_engine_alive() {
    let (_temp, engine) = seeded_engine();

    let cursor = engine.get(["a", "c"]).wait().unwrap();
    drop(engine);

    assert_eq!(
        cursor.to_array().wait().unwrap(),
        vec![Value::Int(1), Value::Int(3)]
    );
}

// =============================================================================
// MutableCursor Tests
// =============================================================================

#[test]
fn test_mutable_cursor_pairs_keys() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine
        .get_mutable(["b", "zz", "a"], GetOptions::default())
        .wait()
        .unwrap();

    assert_eq!(cursor.len(), 2);
    assert_eq!(cursor.keys(), vec!["b".to_string(), "a".to_string()]);
    assert_eq!(
        cursor.next().unwrap().wait().unwrap(),
        ("b".to_string(), Some(Value::Int(2)))
    );
    assert_eq!(cursor.keys(), vec!["a".to_string()]);
    assert_eq!(
        cursor.to_array().wait().unwrap(),
        vec![("a".to_string(), Value::Int(1))]
    );
}

#[test]
fn test_mutable_cursor_preload_carries_values() {
    let (_temp, engine) = seeded_engine();

    let cursor = engine
        .get_mutable(["a", "b"], GetOptions::preload())
        .wait()
        .unwrap();
    // Values were read during lookup; later deletes do not affect them
    engine.del(["a", "b"]).wait().unwrap();

    assert_eq!(
        cursor.to_array().wait().unwrap(),
        vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
        ]
    );
}

#[test]
fn test_mutable_cursor_duplicate_positions() {
    let (_temp, engine) = seeded_engine();

    let cursor = engine
        .get_mutable(["a", "a"], GetOptions::default())
        .wait()
        .unwrap();

    assert_eq!(
        cursor.to_array().wait().unwrap(),
        vec![
            ("a".to_string(), Value::Int(1)),
            ("a".to_string(), Value::Int(1)),
        ]
    );
}

#[test]
fn test_mutable_cursor_len_shrinks_as_pairs_are_yielded() {
    let (_temp, engine) = seeded_engine();

    let mut cursor = engine
        .get_mutable(["a", "b", "c"], GetOptions::default())
        .wait()
        .unwrap();
    assert_eq!(cursor.len(), 3);

    cursor.next().unwrap().wait().unwrap();

    assert_eq!(cursor.len(), 2);
    // Asking for the length does not consume anything
    assert_eq!(cursor.len(), 2);
    assert_eq!(cursor.keys(), vec!["b".to_string(), "c".to_string()]);
}
