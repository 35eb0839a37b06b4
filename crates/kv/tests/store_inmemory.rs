use kv::{Identity, InMemoryKvStore, KvError, KvStore, Version};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn key(parts: &[&str]) -> Identity {
    Identity::new(parts.iter().copied())
}

#[test]
fn create_only_rejects_duplicates() {
    let store = InMemoryKvStore::new();
    let k = key(&["entities", "workflow", "wc"]);
    store.create_only(&k, "{}").unwrap();
    match store.create_only(&k, "{}") {
        Err(KvError::AlreadyExists(_)) => {}
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
}

#[test]
fn update_only_against_stale_version_fails() {
    let store = InMemoryKvStore::new();
    let k = key(&["entities", "invocation", "wf", "a"]);
    let v1 = store.create_only(&k, "1").unwrap();
    let v2 = store.update_only(&k, "2", Some(v1)).unwrap();
    assert!(v2 > v1);
    // v1 is stale now
    match store.update_only(&k, "3", Some(v1)) {
        Err(KvError::PreconditionFailed(_)) => {}
        other => panic!("expected PreconditionFailed, got {:?}", other),
    }
    assert_eq!(store.get(&k).unwrap().value, "2");
}

#[test]
fn update_only_without_version_requires_existence() {
    let store = InMemoryKvStore::new();
    let k = key(&["entities", "request", "wf", "missing"]);
    assert!(matches!(store.update_only(&k, "x", None), Err(KvError::NotFound(_))));
    assert!(matches!(store.update_only(&k, "x", Some(Version(1))), Err(KvError::PreconditionFailed(_))));
}

#[test]
fn reserved_characters_are_rejected_at_encode_time() {
    let store = InMemoryKvStore::new();
    let k = key(&["entities", "workflow", "word-count"]);
    assert!(matches!(store.set(&k, "{}"), Err(KvError::ReservedCharacter(_))));
    assert!(store.is_empty());
}

#[test]
fn append_preserves_insertion_order() {
    let store = InMemoryKvStore::new();
    let dir = key(&["queues", "dataset", "wf", "inv", "arguments"]);
    // interleave unrelated writes so revisions are not contiguous
    for i in 0..12 {
        store.append(&dir, &i.to_string()).unwrap();
        store.set(&key(&["noise", &i.to_string()]), "n").unwrap();
    }
    let mut children = store.list_children(&dir).unwrap();
    children.sort_by(|a, b| a.0.cmp(&b.0));
    let values: Vec<String> = children.into_iter().map(|(_, v)| v.value).collect();
    let expected: Vec<String> = (0..12).map(|i| i.to_string()).collect();
    assert_eq!(values, expected);
}

#[test]
fn list_children_is_shallow_and_empty_for_missing_dirs() {
    let store = InMemoryKvStore::new();
    store.set(&key(&["entity_trees", "relationships", "wf", "a", "mapped", "b"]), "{}").unwrap();
    store.set(&key(&["entity_trees", "relationships", "wf", "a", "mapped", "c"]), "{}").unwrap();
    store.set(&key(&["entity_trees", "relationships", "wf", "a", "reduced", "d"]), "{}").unwrap();
    let mapped = store.list_children(&key(&["entity_trees", "relationships", "wf", "a", "mapped"])).unwrap();
    assert_eq!(mapped.len(), 2);
    let shallow = store.list_children(&key(&["entity_trees", "relationships", "wf", "a"])).unwrap();
    assert!(shallow.is_empty());
    let missing = store.list_children(&key(&["entity_trees", "nothing"])).unwrap();
    assert!(missing.is_empty());
}

#[test]
fn delete_tree_twice_reports_not_found_once_empty() {
    let store = InMemoryKvStore::new();
    let dir = key(&["queues", "dataset", "wf", "inv", "post_reduce"]);
    store.append(&dir, "a").unwrap();
    store.append(&dir, "b").unwrap();
    store.delete_tree(&dir).unwrap();
    assert!(matches!(store.delete_tree(&dir), Err(KvError::NotFound(_))));
    assert!(store.dump(&dir).unwrap().is_empty());
}

#[test]
fn watch_returns_after_change() {
    let store = Arc::new(InMemoryKvStore::new());
    let k = key(&["entities", "request", "wf", "r1"]);
    let v1 = store.create_only(&k, "{\"is_done\":false}").unwrap();

    let writer = store.clone();
    let wk = k.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        writer.update_only(&wk, "{\"is_done\":true}", Some(v1)).unwrap();
    });

    let changed = store.watch(&k, Some(v1), Some(Duration::from_secs(5))).unwrap();
    assert!(changed.version > v1);
    assert_eq!(changed.value, "{\"is_done\":true}");
    handle.join().unwrap();
}

#[test]
fn watch_with_stale_since_returns_immediately() {
    let store = InMemoryKvStore::new();
    let k = key(&["entities", "request", "wf", "r2"]);
    let v1 = store.create_only(&k, "a").unwrap();
    store.update_only(&k, "b", Some(v1)).unwrap();
    let node = store.watch(&k, Some(v1), Some(Duration::from_millis(10))).unwrap();
    assert_eq!(node.value, "b");
}

#[test]
fn watch_faults_on_close_and_timeout() {
    let store = Arc::new(InMemoryKvStore::new());
    let k = key(&["entities", "request", "wf", "r3"]);
    store.create_only(&k, "a").unwrap();

    assert!(matches!(store.watch(&k, None, Some(Duration::from_millis(20))), Err(KvError::WaitFault(_))));

    let closer = store.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        closer.close();
    });
    assert!(matches!(store.watch(&k, None, None), Err(KvError::WaitFault(_))));
    handle.join().unwrap();
}

#[test]
fn watch_without_baseline_waits_for_creation() {
    let store = Arc::new(InMemoryKvStore::new());
    let k = key(&["entities", "request", "wf", "r4"]);
    assert!(matches!(store.watch(&k, None, Some(Duration::from_millis(20))), Err(KvError::WaitFault(_))));

    let writer = store.clone();
    let wk = k.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        writer.create_only(&wk, "created").unwrap()
    });
    let node = store.watch(&k, None, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(node.value, "created");
    let created = handle.join().unwrap();
    assert_eq!(node.version, created);

    store.delete_tree(&k).unwrap();
    assert!(matches!(store.watch(&k, Some(created), Some(Duration::from_secs(1))), Err(KvError::NotFound(_))));
}
