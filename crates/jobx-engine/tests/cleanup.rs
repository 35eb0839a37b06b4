mod common;

use common::{harness, harness_on, test_config, text, WF};
use jobx_domain::{DatasetKind, DatasetQueue, Invocation, Request};
use jobx_engine::{EngineConfig, RequestCleanup, SubmitOutcome};
use kv::{Identity, InMemoryKvStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn finished_request(h: &mut common::Harness) -> (String, String) {
  h.install_word_count();
  let outcome = h.lifecycle
                 .submit(WF, "word_count", vec![text("d", "one two")], json!({}), false)
                 .unwrap();
  let SubmitOutcome::Accepted { request_id } = outcome else {
    panic!("non-blocking submit must be accepted");
  };
  h.drain();
  let root = h.engine.entities().load::<Request>(&[WF, request_id.as_str()]).unwrap().data.invocation_id;
  (request_id, root)
}

#[test]
fn pass_prunes_the_whole_request_graph() {
  let (mut h, store) = harness();
  let (request_id, root) = finished_request(&mut h);

  let report = RequestCleanup::new(h.engine.clone()).run_pass(WF).unwrap();
  assert_eq!(report.requests, 1);
  // root, two children, their two reductions and the root reduction
  assert_eq!(report.invocations, 6);

  for prefix in [["entities", "invocation", WF],
                 ["queues", "dataset", WF],
                 ["entity_trees", "relationships", WF],
                 ["entity_trees", "claims", WF]]
  {
    assert!(store.dump(&Identity::new(prefix)).unwrap().is_empty(), "leftovers under {:?}", prefix);
  }
  assert!(h.engine.entities().try_load::<Request>(&[WF, request_id.as_str()]).unwrap().is_none());
  assert!(h.engine.entities().try_load::<Invocation>(&[WF, root.as_str()]).unwrap().is_none());
  // the queue entry is consumed
  assert!(store.dump(&Identity::new(["queues", "request_cleanup", WF])).unwrap().is_empty());
}

#[test]
fn pruning_twice_only_reports_what_is_gone() {
  let (mut h, _store) = harness();
  let (request_id, root) = finished_request(&mut h);
  let cleanup = RequestCleanup::new(h.engine.clone());

  // a partially pruned graph: the root datasets are already deleted
  DatasetQueue::new(h.engine.client().clone(), WF, &root, DatasetKind::Arguments).delete().unwrap();
  let first = cleanup.prune_request(WF, &request_id).unwrap();
  assert!(first.already_gone >= 1);
  assert_eq!(first.requests, 1);

  let second = cleanup.prune_request(WF, &request_id).unwrap();
  assert_eq!(second.requests, 0);
  assert_eq!(second.deleted, 0);
  assert_eq!(second.already_gone, 1);
}

#[test]
fn simulate_lists_without_deleting() {
  let (mut h, store) = harness();
  let (request_id, _root) = finished_request(&mut h);
  let before = store.len();

  let report = RequestCleanup::new(h.engine.clone()).simulate(true).run_pass(WF).unwrap();
  assert_eq!(report.deleted, 0);
  assert!(report.planned.iter().any(|p| p == &format!("request {}", request_id)));
  assert_eq!(store.len(), before);
}

#[test]
fn quiet_period_defers_recent_requests() {
  let (mut h, store) = harness();
  let _ = finished_request(&mut h);
  let mut config = h.engine.config().clone();
  config.cleanup_quiet_period = std::time::Duration::from_secs(3600);
  let patient = common::harness_on(store.clone(), config);

  let report = RequestCleanup::new(patient.engine.clone()).run_pass(WF).unwrap();
  assert_eq!(report, jobx_engine::CleanupReport::default());
  assert_eq!(store.dump(&Identity::new(["queues", "request_cleanup", WF])).unwrap().len(), 1);
}

// El que espera se rinde antes de que la petición termine: el grafo se
// poda igualmente porque la cola la alimenta el procesador.
#[test]
fn abandoned_blocking_request_is_still_pruned() {
  let store = Arc::new(InMemoryKvStore::new());
  let config = EngineConfig { wait_timeout: Some(Duration::from_millis(20)), ..test_config() };
  let mut h = harness_on(store.clone(), config);
  h.install_word_count();

  let packaged = h.lifecycle
                  .package_request(WF, "word_count", vec![text("d", "one two")], json!({}), true)
                  .unwrap();
  h.lifecycle.push_request(&packaged).unwrap();
  match h.lifecycle.block_for_result(&packaged) {
    Err(e) => assert_eq!(e.classification(), "wait_fault"),
    Ok(c) => panic!("nothing was processed yet, got {:?}", c.pairs),
  }
  assert!(store.dump(&Identity::new(["queues", "request_cleanup", WF])).unwrap().is_empty());

  assert!(h.drain().iter().all(Result::is_ok));
  assert!(h.engine.entities().load::<Request>(&[WF, packaged.request_id()]).unwrap().data.is_done);

  let report = RequestCleanup::new(h.engine.clone()).run_pass(WF).unwrap();
  assert_eq!(report.requests, 1);
  assert!(store.dump(&Identity::new(["entities", "invocation", WF])).unwrap().is_empty());
  assert!(h.engine.entities().try_load::<Request>(&[WF, packaged.request_id()]).unwrap().is_none());
}
