mod common;

use async_trait::async_trait;
use common::{harness, sorted, text, Harness, WF};
use jobx_engine::{Dispatcher, MessageSource, RawMessage, SubmitOutcome};
use serde_json::json;
use std::collections::VecDeque;

struct ScriptedSource(VecDeque<RawMessage>);

#[async_trait]
impl MessageSource for ScriptedSource {
  async fn next_message(&mut self) -> Option<RawMessage> {
    self.0.pop_front()
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_drives_a_blocking_request_to_completion() {
  let (h, _store) = harness();
  h.install_word_count();
  let Harness { processor, lifecycle, source, .. } = h;

  let dispatcher = Dispatcher::new(processor);
  let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
  let running = tokio::spawn(async move {
    dispatcher.run(source, async {
                 let _ = stop_rx.await;
               })
              .await
  });

  let outcome = tokio::task::spawn_blocking(move || {
                  lifecycle.submit(WF, "word_count", vec![text("d", "red green red")], json!({}), true)
                })
                .await
                .unwrap()
                .unwrap();
  match outcome {
    SubmitOutcome::Completed { pairs, body, .. } => {
      assert_eq!(sorted(pairs), vec![(json!("green"), json!(1)), (json!("red"), json!(2))]);
      assert_eq!(body.unwrap()["pairs"].as_array().map(Vec::len), Some(2));
    }
    other => panic!("expected a completed request, got {:?}", other),
  }

  stop_tx.send(()).unwrap();
  let stats = running.await.unwrap();
  // root map, three child maps, three child reductions and the root reduction
  assert_eq!(stats.received, 8);
  assert_eq!(stats.processed, 8);
  assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn dispatcher_stops_when_the_source_closes() {
  let (h, _store) = harness();
  h.install_word_count();
  let packaged = h.lifecycle
                  .package_request(WF, "word_count", vec![text("d", "solo")], json!({}), true)
                  .unwrap();
  h.lifecycle.push_request(&packaged).unwrap();
  let Harness { processor, mut source, .. } = h;
  let root = source.try_next().unwrap();

  let script = ScriptedSource(VecDeque::from(vec![RawMessage { topic: "mr.wc.map".into(), body: "{not json".into() },
                                                  root.clone(),
                                                  root]));
  let stats = Dispatcher::new(processor).run(script, std::future::pending::<()>()).await;
  assert_eq!(stats.received, 3);
  assert_eq!(stats.failed, 1);
  assert_eq!(stats.processed + stats.duplicates, 2);
}
