//! Tests for persistent-entry snapshots
//!
//! These tests verify:
//! - Save/load of persistent entries only
//! - Recovery from corrupted records and truncated files
//! - Rejection of foreign files
//! - Merge semantics when loading into a populated table
//! - Server start/stop persistence

use std::fs::{self, OpenOptions};
use std::io::Write;

use tablesync::persist::{self, PersistRecord, RECORD_HEADER_SIZE};
use tablesync::{Config, EntryFlags, Instance, SyncError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn record(path: &str, value: f64, version: u64) -> PersistRecord {
    PersistRecord {
        path: path.to_string(),
        value: Value::Double(value),
        version,
        flags: EntryFlags::PERSISTENT,
    }
}

fn setup_temp_file() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("table.tsp");
    (temp_dir, file)
}

// =============================================================================
// Save / Load Tests
// =============================================================================

#[test]
fn test_save_and_load_records() {
    let (_temp, file) = setup_temp_file();
    let records = vec![record("a", 1.0, 3), record("b/c", 2.0, 1)];

    persist::save(&file, &records).unwrap();
    let (loaded, result) = persist::load(&file).unwrap();

    assert_eq!(loaded, records);
    assert_eq!(result.records_loaded, 2);
    assert_eq!(result.records_corrupted, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_save_empty() {
    let (_temp, file) = setup_temp_file();

    persist::save(&file, &[]).unwrap();
    let (loaded, result) = persist::load(&file).unwrap();

    assert!(loaded.is_empty());
    assert_eq!(result.records_loaded, 0);
}

#[test]
fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("nested/dir/table.tsp");

    persist::save(&file, &[record("a", 1.0, 1)]).unwrap();

    assert!(file.exists());
    assert!(!file.with_extension("tmp").exists());
}

#[test]
fn test_save_replaces_previous_file() {
    let (_temp, file) = setup_temp_file();
    persist::save(&file, &[record("old", 1.0, 1)]).unwrap();

    persist::save(&file, &[record("new", 2.0, 1)]).unwrap();
    let (loaded, _) = persist::load(&file).unwrap();

    assert_eq!(loaded, vec![record("new", 2.0, 1)]);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupted_record_is_skipped() {
    let (_temp, file) = setup_temp_file();
    let records = vec![record("a", 1.0, 1), record("b", 2.0, 1), record("c", 3.0, 1)];
    persist::save(&file, &records).unwrap();

    // Flip a byte inside the second record's data
    let first_len = records[0].serialize().unwrap().len();
    let mut bytes = fs::read(&file).unwrap();
    let target = 4 + first_len + RECORD_HEADER_SIZE + 2;
    bytes[target] ^= 0xff;
    fs::write(&file, &bytes).unwrap();

    let (loaded, result) = persist::load(&file).unwrap();

    assert_eq!(loaded, vec![records[0].clone(), records[2].clone()]);
    assert_eq!(result.records_loaded, 2);
    assert_eq!(result.records_corrupted, 1);
    assert!(!result.was_truncated);
}

#[test]
fn test_truncated_tail_is_reported() {
    let (_temp, file) = setup_temp_file();
    persist::save(&file, &[record("a", 1.0, 1), record("b", 2.0, 1)]).unwrap();

    let bytes = fs::read(&file).unwrap();
    fs::write(&file, &bytes[..bytes.len() - 3]).unwrap();

    let (loaded, result) = persist::load(&file).unwrap();

    assert_eq!(loaded, vec![record("a", 1.0, 1)]);
    assert!(result.was_truncated);
}

#[test]
fn test_partial_header_is_truncation() {
    let (_temp, file) = setup_temp_file();
    persist::save(&file, &[record("a", 1.0, 1)]).unwrap();

    let mut handle = OpenOptions::new().append(true).open(&file).unwrap();
    handle.write_all(&[0x00, 0x01, 0x02]).unwrap();
    drop(handle);

    let (loaded, result) = persist::load(&file).unwrap();

    assert_eq!(loaded.len(), 1);
    assert!(result.was_truncated);
}

#[test]
fn test_foreign_file_rejected() {
    let (_temp, file) = setup_temp_file();
    fs::write(&file, b"not a snapshot at all").unwrap();

    assert!(matches!(
        persist::load(&file),
        Err(SyncError::Persistence(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let (_temp, file) = setup_temp_file();

    assert!(matches!(persist::load(&file), Err(SyncError::Io(_))));
}

// =============================================================================
// Instance Tests
// =============================================================================

#[test]
fn test_only_persistent_entries_are_saved() {
    let (_temp, file) = setup_temp_file();
    let instance = Instance::new(Config::default());
    instance.set_value("prefs/speed", 0.8).unwrap();
    instance.entry("prefs/speed").set_persistent(true).unwrap();
    instance.set_value("telemetry/time", 5.0).unwrap();

    assert_eq!(instance.save_persistent(&file).unwrap(), 1);

    let restored = Instance::new(Config::default());
    let result = restored.load_persistent(&file).unwrap();
    assert_eq!(result.records_loaded, 1);
    assert_eq!(restored.entry("prefs/speed").get_double(0.0), 0.8);
    assert!(restored.entry("prefs/speed").flags().is_persistent());
    assert!(!restored.entry("telemetry/time").exists());
}

#[test]
fn test_load_keeps_newer_local_state() {
    let (_temp, file) = setup_temp_file();
    persist::save(&file, &[record("x", 1.0, 2)]).unwrap();

    let instance = Instance::new(Config::default());
    for v in 0..5 {
        instance.set_value("x", v as f64).unwrap();
    }
    instance.load_persistent(&file).unwrap();

    assert_eq!(instance.entry("x").get_double(-1.0), 4.0);
    assert_eq!(instance.entry("x").version(), 5);
}

#[test]
fn test_server_loads_and_saves_persist_path() {
    let (_temp, file) = setup_temp_file();
    persist::save(&file, &[record("boot/count", 1.0, 1)]).unwrap();

    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .persist_path(&file)
        .build();
    let server = Instance::new(config.clone());
    server.start_server().unwrap();
    assert_eq!(server.entry("boot/count").get_double(0.0), 1.0);

    server.set_value("boot/count", 2.0).unwrap();
    server.disconnect();

    let again = Instance::new(config);
    again.start_server().unwrap();
    assert_eq!(again.entry("boot/count").get_double(0.0), 2.0);
    again.disconnect();
}
