use jobx_persistence::new_sqlite_for_test;
use jobx_persistence::DieselKvStore;
use kv::{Identity, KvError, KvStore};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn setup_memory() -> DieselKvStore {
  // cada prueba con su propia BD en memoria compartida
  let url = format!("file:kv{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple());
  new_sqlite_for_test(&url).expect("sqlite store")
}

fn setup_file() -> (DieselKvStore, std::path::PathBuf) {
  let path = std::env::temp_dir().join(format!("jobx_kv_{}.db", uuid::Uuid::new_v4().simple()));
  let store = new_sqlite_for_test(path.to_str().expect("utf8 path")).expect("sqlite store");
  (store, path)
}

fn key(parts: &[&str]) -> Identity {
  Identity::new(parts.iter().copied())
}

#[test]
fn create_update_and_cas_conflict() {
  let store = setup_memory();
  let k = key(&["entities", "invocation", "wf", "a"]);
  let v1 = store.create_only(&k, "{\"n\":1}").unwrap();
  assert!(matches!(store.create_only(&k, "{}"), Err(KvError::AlreadyExists(_))));
  let v2 = store.update_only(&k, "{\"n\":2}", Some(v1)).unwrap();
  assert!(v2 > v1);
  assert!(matches!(store.update_only(&k, "{\"n\":3}", Some(v1)), Err(KvError::PreconditionFailed(_))));
  let node = store.get(&k).unwrap();
  assert_eq!(node.value, "{\"n\":2}");
  assert_eq!(node.version, v2);
  let missing = key(&["entities", "invocation", "wf", "b"]);
  assert!(matches!(store.update_only(&missing, "x", None), Err(KvError::NotFound(_))));
}

#[test]
fn append_lists_in_order_and_children_are_shallow() {
  let store = setup_memory();
  let dir = key(&["queues", "dataset", "wf", "inv", "post_reduce"]);
  for i in 0..5 {
    store.append(&dir, &i.to_string()).unwrap();
  }
  store.set(&key(&["queues", "dataset", "wf", "inv", "post_reduce_other", "x"]), "no").unwrap();
  let mut children = store.list_children(&dir).unwrap();
  children.sort_by(|a, b| a.0.cmp(&b.0));
  let values: Vec<String> = children.into_iter().map(|(_, v)| v.value).collect();
  assert_eq!(values, vec!["0", "1", "2", "3", "4"]);
  assert!(store.list_children(&key(&["queues", "dataset", "wf"])).unwrap().is_empty());
}

#[test]
fn delete_tree_is_prefix_exact_and_reports_not_found() {
  let store = setup_memory();
  let dir = key(&["entity_trees", "relationships", "wf", "a", "mapped"]);
  store.set(&dir.child("b"), "{}").unwrap();
  // `_` is a LIKE wildcard, so this key matches the pattern but not the prefix
  let sibling = key(&["entityxtrees", "relationships", "wf", "a", "mapped", "b"]);
  store.set(&sibling, "{}").unwrap();
  store.delete_tree(&dir).unwrap();
  assert!(matches!(store.delete_tree(&dir), Err(KvError::NotFound(_))));
  assert!(store.get(&sibling).is_ok());
  assert!(matches!(store.delete(&dir.child("b")), Err(KvError::NotFound(_))));
}

#[test]
fn watch_sees_update_from_other_thread() {
  let (store, path) = setup_file();
  let store = Arc::new(store);
  let k = key(&["entities", "request", "wf", "r"]);
  let v1 = store.create_only(&k, "pending").unwrap();
  let writer = store.clone();
  let wk = k.clone();
  let handle = thread::spawn(move || {
    thread::sleep(Duration::from_millis(50));
    writer.update_only(&wk, "done", Some(v1)).unwrap();
  });
  let node = store.watch(&k, Some(v1), Some(Duration::from_secs(10))).unwrap();
  assert_eq!(node.value, "done");
  handle.join().unwrap();
  assert!(matches!(store.watch(&k, None, Some(Duration::from_millis(60))), Err(KvError::WaitFault(_))));
  let _ = std::fs::remove_file(path);
}

#[test]
fn watch_without_baseline_waits_for_creation() {
  let (store, path) = setup_file();
  let store = Arc::new(store);
  let k = key(&["entities", "request", "wf", "later"]);
  assert!(matches!(store.watch(&k, None, Some(Duration::from_millis(60))), Err(KvError::WaitFault(_))));

  let writer = store.clone();
  let wk = k.clone();
  let handle = thread::spawn(move || {
    thread::sleep(Duration::from_millis(50));
    writer.create_only(&wk, "created").unwrap()
  });
  let node = store.watch(&k, None, Some(Duration::from_secs(10))).unwrap();
  assert_eq!(node.value, "created");
  let created = handle.join().unwrap();
  assert_eq!(node.version, created);

  // con versión de referencia, un nodo borrado es NotFound
  store.delete_tree(&k).unwrap();
  assert!(matches!(store.watch(&k, Some(created), Some(Duration::from_secs(1))), Err(KvError::NotFound(_))));
  let _ = std::fs::remove_file(path);
}
