#![allow(dead_code)]
// Fixture compartida: workflow "wc" de conteo de palabras sobre el broker en
// proceso. `split` mapea cada texto a un hijo `count` por palabra; `count`
// devuelve `(palabra, 1)`; ambos steps reducen con `sum_counts`.
use jobx_domain::{ArgumentSpec, Handler, HandlerType, Job, Pair, Step};
use jobx_engine::{in_memory_broker, Engine, EngineConfig, EngineError, HandleOutcome, HandlerArguments,
                  HandlerOutput, InMemorySource, InMemoryTransport, NativeHandlerRunner, Notifier, RequestLifecycle,
                  StepProcessor, WorkflowAdmin};
use kv::{InMemoryKvStore, KvStore};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};

pub const WF: &str = "wc";

#[derive(Default)]
pub struct RecordingNotifier {
  pub events: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
  pub fn count(&self, subject: &str) -> usize {
    self.events.lock().unwrap().iter().filter(|(s, _)| s == subject).count()
  }
}

impl Notifier for RecordingNotifier {
  fn notify(&self, subject: &str, message: &str) {
    self.events.lock().unwrap().push((subject.to_string(), message.to_string()));
  }
}

pub struct Harness {
  pub engine: Arc<Engine>,
  pub runner: Arc<NativeHandlerRunner>,
  pub transport: Arc<InMemoryTransport>,
  pub source: InMemorySource,
  pub processor: StepProcessor,
  pub lifecycle: RequestLifecycle,
  pub admin: WorkflowAdmin,
  pub notifier: Arc<RecordingNotifier>,
}

pub fn test_config() -> EngineConfig {
  EngineConfig { cleanup_quiet_period: std::time::Duration::ZERO,
                 wait_timeout: Some(std::time::Duration::from_secs(10)),
                 ..EngineConfig::default() }
}

pub fn harness() -> (Harness, Arc<InMemoryKvStore>) {
  let store = Arc::new(InMemoryKvStore::new());
  (harness_on(store.clone(), test_config()), store)
}

pub fn harness_on(store: Arc<dyn KvStore>, config: EngineConfig) -> Harness {
  let runner = Arc::new(NativeHandlerRunner::new());
  let (tx, source) = in_memory_broker();
  let transport = Arc::new(tx);
  let notifier = Arc::new(RecordingNotifier::default());
  let engine = Arc::new(Engine::new(config, store, runner.clone(), transport.clone()).with_notifier(notifier.clone()));
  let admin = WorkflowAdmin::new(engine.entities().clone());
  Harness { processor: StepProcessor::new(engine.clone()),
            lifecycle: RequestLifecycle::new(engine.clone()),
            engine,
            runner,
            transport,
            source,
            admin,
            notifier }
}

pub fn pairs_of(args: &HandlerArguments, name: &str) -> Vec<Pair> {
  args.get(name)
      .and_then(JsonValue::as_array)
      .map(|items| {
        items.iter()
             .filter_map(|item| item.as_array().map(|kv| (kv[0].clone(), kv[1].clone())))
             .collect()
      })
      .unwrap_or_default()
}

fn sum(values: &JsonValue) -> i64 {
  values.as_array().map(|vl| vl.iter().filter_map(JsonValue::as_i64).sum()).unwrap_or(0)
}

fn handler(name: &str, handler_type: HandlerType, arg: &str) -> Handler {
  Handler::new(WF, name, handler_type, vec![ArgumentSpec::new(arg, "pairs")], name, "native")
}

impl Harness {
  /// Registra el workflow de conteo de palabras.
  pub fn install_word_count(&self) {
    self.admin.create_workflow(WF, "conteo de palabras").unwrap();
    self.admin.save_handler(handler("split_words", HandlerType::Mapper, "arguments")).unwrap();
    self.admin.save_handler(handler("emit_word", HandlerType::Mapper, "arguments")).unwrap();
    self.admin.save_handler(handler("sum_counts", HandlerType::Reducer, "results")).unwrap();
    self.admin.create_step(Step::new(WF, "split", "trocea textos", "split_words").with_reducer("sum_counts")).unwrap();
    self.admin.create_step(Step::new(WF, "count", "una palabra", "emit_word").with_reducer("sum_counts")).unwrap();
    self.admin.create_job(Job::new(WF, "word_count", "cuenta palabras", "split")).unwrap();

    self.runner.register(WF, "split_words", vec![ArgumentSpec::new("arguments", "pairs")], |args, _ctx| {
                 let words: Vec<Pair> = pairs_of(args, "arguments").into_iter()
                                                                   .flat_map(|(_, text)| {
                                                                     text.as_str()
                                                                         .unwrap_or_default()
                                                                         .split_whitespace()
                                                                         .map(|w| (json!(w), json!(1)))
                                                                         .collect::<Vec<_>>()
                                                                   })
                                                                   .collect();
                 Ok(HandlerOutput::map_to("split_words", "count", words))
               });
    self.runner.register(WF, "emit_word", vec![ArgumentSpec::new("arguments", "pairs")], |args, _ctx| {
                 Ok(HandlerOutput::returning("emit_word", pairs_of(args, "arguments")))
               });
    self.runner.register(WF, "sum_counts", vec![ArgumentSpec::new("results", "groups")], |args, _ctx| {
                 let totals = pairs_of(args, "results").into_iter().map(|(k, vl)| (k, json!(sum(&vl)))).collect();
                 Ok(HandlerOutput::pairs("sum_counts", totals))
               });
  }

  /// Procesa en este hilo todos los mensajes pendientes del broker.
  pub fn drain(&mut self) -> Vec<Result<HandleOutcome, EngineError>> {
    let mut outcomes = Vec::new();
    while let Some(raw) = self.source.try_next() {
      outcomes.push(self.processor.handle_raw(&raw.body));
    }
    outcomes
  }
}

pub fn text(doc: &str, body: &str) -> Pair {
  (json!(doc), json!(body))
}

/// Resultado ordenado por clave para comparar sin depender del orden de
/// los hijos.
pub fn sorted(mut pairs: Vec<Pair>) -> Vec<Pair> {
  pairs.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
  pairs
}
