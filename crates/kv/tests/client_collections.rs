use kv::{Identity, InMemoryKvStore, KvClient, KvError, KvQueue, KvTree};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    k: String,
    n: i64,
}

fn client() -> KvClient {
    KvClient::new(Arc::new(InMemoryKvStore::new()))
}

#[test]
fn typed_get_and_cas_roundtrip() {
    let c = client();
    let k = Identity::new(["entities", "job", "wf", "count"]);
    let v = c.create_only(&k, &Record { k: "a".into(), n: 1 }).unwrap();
    let (got_v, got): (_, Record) = c.get(&k).unwrap();
    assert_eq!(got_v, v);
    assert_eq!(got.n, 1);
    c.update_only(&k, &Record { k: "a".into(), n: 2 }, Some(v)).unwrap();
    assert!(c.update_only(&k, &Record { k: "a".into(), n: 3 }, Some(v)).unwrap_err().is_precondition_failed());
}

#[test]
fn queue_lists_in_insertion_order_and_deletes() {
    let c = client();
    let q = KvQueue::new(c.clone(), Identity::new(["dataset", "wf", "inv", "arguments"]));
    for n in 0..5 {
        q.add(&Record { k: format!("k{}", n), n }).unwrap();
    }
    let items: Vec<Record> = q.list_data().unwrap();
    assert_eq!(items.iter().map(|r| r.n).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

    let keyed: Vec<(String, Record)> = q.list_keys_with_data().unwrap();
    q.delete_key(&keyed[0].0).unwrap();
    assert_eq!(q.list_data::<Record>().unwrap().len(), 4);

    q.delete().unwrap();
    assert!(matches!(q.delete(), Err(KvError::NotFound(_))));
    assert!(q.list_data::<Record>().unwrap().is_empty());
}

#[test]
fn tree_add_is_create_only() {
    let c = client();
    let t = KvTree::new(c, Identity::new(["relationships", "wf", "from", "mapped"]));
    t.add("to1", &json!({})).unwrap();
    assert!(t.add("to1", &json!({})).unwrap_err().is_already_exists());
    t.set("to2", &json!({"reduced_by": "r"})).unwrap();
    let mut keys = t.list_keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["to1".to_string(), "to2".to_string()]);
    let data: serde_json::Value = t.get("to2").unwrap();
    assert_eq!(data["reduced_by"], "r");
    assert!(t.exists().unwrap());
    t.delete().unwrap();
    assert!(!t.exists().unwrap());
}
