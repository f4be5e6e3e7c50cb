use std::fs;

use assert_matches::assert_matches;
use chat_store::{
    json_key, ChatStoreError, DirectoryStore, InstallLayout, KeyValueStore, MemoryStore,
};
use tempfile::TempDir;

fn directory_store() -> (TempDir, DirectoryStore) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = DirectoryStore::open(dir.path()).expect("store should open");
    (dir, store)
}

#[test]
fn open_rejects_missing_directory() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let missing = dir.path().join("nope");

    let error = DirectoryStore::open(&missing).expect_err("missing dir must fail");
    assert_matches!(error, ChatStoreError::MissingStoreDirectory { path } if path == missing);
}

#[test]
fn create_makes_nested_directories() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let nested = dir.path().join("a").join("b");

    let store = DirectoryStore::create(&nested).expect("store should be created");
    assert!(nested.is_dir());
    assert_eq!(store.root(), nested.as_path());
}

#[test]
fn put_get_delete_round_trip_on_disk() {
    let (dir, store) = directory_store();

    store
        .put("chat.json", b"{\"a\":1}")
        .expect("put should succeed");
    assert_eq!(
        fs::read(dir.path().join("chat.json")).expect("file should exist"),
        b"{\"a\":1}"
    );
    assert_eq!(
        store.get("chat.json").expect("get should succeed"),
        Some(b"{\"a\":1}".to_vec())
    );

    assert!(store.delete("chat.json").expect("delete should succeed"));
    assert!(!store.delete("chat.json").expect("second delete is a no-op"));
    assert_eq!(store.get("chat.json").expect("get should succeed"), None);
}

#[test]
fn put_replaces_existing_value() {
    let (_dir, store) = directory_store();

    store.put("chat.json", b"old").expect("put should succeed");
    store.put("chat.json", b"new").expect("put should succeed");

    assert_eq!(
        store.get("chat.json").expect("get should succeed"),
        Some(b"new".to_vec())
    );
}

#[test]
fn keys_are_sorted_and_skip_directories_and_hidden_files() {
    let (dir, store) = directory_store();
    store.put("b.json", b"2").expect("put should succeed");
    store.put("a.json", b"1").expect("put should succeed");
    fs::create_dir(dir.path().join("nested")).expect("dir should be created");
    fs::write(dir.path().join(".partial"), b"x").expect("file should be written");

    assert_eq!(
        store.keys().expect("keys should list"),
        vec!["a.json".to_string(), "b.json".to_string()]
    );
}

#[test]
fn stores_reject_keys_that_escape_the_namespace() {
    let (_dir, store) = directory_store();
    let memory = MemoryStore::new();

    for key in ["../escape.json", "a/b", ""] {
        assert_matches!(
            store.put(key, b"x"),
            Err(ChatStoreError::InvalidKey { .. })
        );
        assert_matches!(memory.get(key), Err(ChatStoreError::InvalidKey { .. }));
    }
}

#[test]
fn memory_store_behaves_like_directory_store() {
    let store = MemoryStore::new();

    store.put(&json_key("my chat"), b"tree").expect("put should succeed");

    assert_eq!(store.keys().expect("keys"), vec!["my_chat.json".to_string()]);
    assert_eq!(
        store.get("my_chat.json").expect("get"),
        Some(b"tree".to_vec())
    );
    assert!(store.delete("my_chat.json").expect("delete"));
    assert!(store.keys().expect("keys").is_empty());
}

#[test]
fn install_creates_layout_once() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let layout = InstallLayout::new(dir.path().join("brunch"));

    assert!(!layout.is_installed());
    layout.install().expect("install should succeed");
    assert!(layout.is_installed());
    assert!(layout.data_store().is_dir());
    assert!(layout.chat_store().is_dir());
    assert!(layout.provider_store().is_dir());

    let error = layout.install().expect_err("second install must fail");
    assert_matches!(error, ChatStoreError::AlreadyInstalled { .. });
}
