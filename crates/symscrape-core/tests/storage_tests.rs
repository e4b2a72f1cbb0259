use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

use symscrape_core::config::{AppConfig, MarkerStoreKind};
use symscrape_core::dedup::{open_marker_store, DirMarkerStore, MarkerStore};
use symscrape_core::storage::SqliteMarkerStore;
use symscrape_core::symbols::SymbolKey;

fn key(file: &str, id: &str) -> SymbolKey {
    SymbolKey::new(file, id)
}

fn assert_mark_and_contains(store: &dyn MarkerStore) {
    let foo = key("libfoo.so", "ABCD1234");
    let foo_other_build = key("libfoo.so", "EEEE0000");

    assert!(!store.contains(&foo).unwrap());
    store.mark(&foo).unwrap();
    assert!(store.contains(&foo).unwrap());
    assert!(!store.contains(&foo_other_build).unwrap());

    // marking twice is harmless
    store.mark(&foo).unwrap();
    assert!(store.contains(&foo).unwrap());
}

#[test]
fn test_sqlite_marker_store() {
    let store = SqliteMarkerStore::open_in_memory().unwrap();
    assert_mark_and_contains(&store);
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_sqlite_markers_persist_across_opens() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state").join("markers.db");

    {
        let store = SqliteMarkerStore::open(&db_path).unwrap();
        store.mark(&key("libz.so.1", "0011")).unwrap();
    }

    let reopened = SqliteMarkerStore::open(&db_path).unwrap();
    assert!(reopened.contains(&key("libz.so.1", "0011")).unwrap());
    assert_eq!(reopened.count().unwrap(), 1);
}

#[test]
fn test_sqlite_marks_from_many_threads() {
    let store = Arc::new(SqliteMarkerStore::open_in_memory().unwrap());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    store.mark(&key(&format!("lib{}.so", t), &format!("{:04}", i))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.count().unwrap(), 100);
}

#[test]
fn test_dir_marker_store() {
    let dir = tempdir().unwrap();
    let store = DirMarkerStore::open(&dir.path().join("markers")).unwrap();
    assert_mark_and_contains(&store);

    let marker = dir.path().join("markers").join("libfoo.so").join("ABCD1234");
    assert_eq!(fs::metadata(marker).unwrap().len(), 0);
}

#[test]
fn test_dir_marker_store_rejects_escaping_keys() {
    let dir = tempdir().unwrap();
    let store = DirMarkerStore::open(dir.path()).unwrap();
    assert!(store.mark(&key("..", "ABCD")).is_err());
    assert!(store.mark(&key("lib/evil.so", "ABCD")).is_err());
    assert!(store.contains(&key("libok.so", "")).is_err());
}

#[test]
fn test_open_marker_store_from_config() {
    let dir = tempdir().unwrap();

    let none = AppConfig::default();
    assert!(open_marker_store(&none).unwrap().is_none());

    let sqlite = AppConfig {
        marker_store: MarkerStoreKind::Sqlite,
        marker_path: dir.path().join("markers.db"),
        ..AppConfig::default()
    };
    let store = open_marker_store(&sqlite).unwrap().unwrap();
    store.mark(&key("libfoo.so", "AB")).unwrap();
    assert!(dir.path().join("markers.db").is_file());

    let directory = AppConfig {
        marker_store: MarkerStoreKind::Directory,
        marker_path: dir.path().join("markers"),
        ..AppConfig::default()
    };
    let store = open_marker_store(&directory).unwrap().unwrap();
    store.mark(&key("libfoo.so", "AB")).unwrap();
    assert!(dir.path().join("markers/libfoo.so/AB").is_file());
}
