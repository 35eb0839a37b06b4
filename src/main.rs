use anyhow::{bail, Context};
use jobx_domain::{ArgumentSpec, Handler, HandlerType, Job, Pair, Step};
use jobx_engine::{in_memory_broker, Dispatcher, Engine, EngineConfig, HandlerArguments, HandlerOutput,
                  NativeHandlerRunner, RequestLifecycle, StepProcessor, SubmitOutcome, WorkflowAdmin};
use kv::{InMemoryKvStore, KvStore};
use log::{info, warn};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

const WF: &str = "wordcount";

/// Demo de extremo a extremo: registra un workflow de conteo de palabras,
/// arranca el dispatcher sobre el broker en proceso y envía una petición
/// bloqueante con las palabras de la línea de comandos.
///
/// Almacén: Diesel si hay `MR_DB_URL`/`DATABASE_URL`, si no en memoria.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  dotenvy::dotenv().ok();

  let words: Vec<String> = std::env::args().skip(1).collect();
  let text = if words.is_empty() { "the quick brown fox jumps over the lazy dog".to_string() } else { words.join(" ") };

  let config = EngineConfig::from_env().context("configuración MR_* inválida")?;
  let store: Arc<dyn KvStore> = if std::env::var("MR_DB_URL").is_ok() || std::env::var("DATABASE_URL").is_ok() {
    info!("using Diesel kv store");
    Arc::new(jobx_persistence::new_from_env().context("no se pudo abrir el almacén")?)
  } else {
    info!("MR_DB_URL not set, using in-memory kv store");
    Arc::new(InMemoryKvStore::new())
  };

  let runner = Arc::new(NativeHandlerRunner::new());
  register_word_count(&runner);
  let (transport, source) = in_memory_broker();
  let engine = Arc::new(Engine::new(config, store, runner, Arc::new(transport)));
  install_word_count(&WorkflowAdmin::new(engine.entities().clone()))?;

  let dispatcher = Dispatcher::new(StepProcessor::new(engine.clone()));
  let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
  let running = tokio::spawn(async move {
    dispatcher.run(source, async {
                 let _ = stop_rx.await;
               })
              .await
  });

  let lifecycle = RequestLifecycle::new(engine.clone());
  let outcome = tokio::task::spawn_blocking(move || {
                  lifecycle.submit(WF, "count_words", vec![(json!("argv"), json!(text))], json!({"source": "cli"}), true)
                })
                .await
                .context("la tarea de envío terminó de forma anómala")?;
  let _ = stop_tx.send(());
  let stats = running.await.context("el dispatcher terminó de forma anómala")?;
  info!("dispatcher stats: {:?}", stats);

  match outcome? {
    SubmitOutcome::Completed { request_id, mut pairs, .. } => {
      pairs.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
      println!("request {}", request_id);
      for (word, count) in pairs {
        println!("{:>16} {}", word.as_str().unwrap_or_default(), count);
      }
    }
    SubmitOutcome::Accepted { request_id } => bail!("la petición {} no debería ser asíncrona", request_id),
  }
  Ok(())
}

fn pairs_of(args: &HandlerArguments, name: &str) -> Vec<Pair> {
  args.get(name)
      .and_then(JsonValue::as_array)
      .map(|items| {
        items.iter()
             .filter_map(|item| match item.as_array().map(Vec::as_slice) {
               Some([k, v]) => Some((k.clone(), v.clone())),
               _ => None,
             })
             .collect()
      })
      .unwrap_or_default()
}

fn register_word_count(runner: &NativeHandlerRunner) {
  runner.register(WF, "split_words", vec![ArgumentSpec::new("arguments", "pairs")], |args, ctx| {
          let words: Vec<Pair> = pairs_of(args, "arguments").iter()
                                                            .filter_map(|(_, text)| text.as_str())
                                                            .flat_map(str::split_whitespace)
                                                            .map(|w| (json!(w.to_lowercase()), json!(1)))
                                                            .collect();
          ctx.log(log::Level::Debug, &format!("{} words", words.len()));
          Ok(HandlerOutput::map_to("split_words", "count", words))
        });
  runner.register(WF, "emit_word", vec![ArgumentSpec::new("arguments", "pairs")], |args, _ctx| {
          Ok(HandlerOutput::returning("emit_word", pairs_of(args, "arguments")))
        });
  runner.register(WF, "sum_counts", vec![ArgumentSpec::new("results", "groups")], |args, _ctx| {
          let totals = pairs_of(args, "results").into_iter()
                                                .map(|(word, counts)| {
                                                  let total: i64 = counts.as_array()
                                                                         .map(|vl| vl.iter().filter_map(JsonValue::as_i64).sum())
                                                                         .unwrap_or(0);
                                                  (word, json!(total))
                                                })
                                                .collect();
          Ok(HandlerOutput::pairs("sum_counts", totals))
        });
}

/// Crea las definiciones si no existen (el almacén puede ser persistente).
fn install_word_count(admin: &WorkflowAdmin) -> anyhow::Result<()> {
  match admin.create_workflow(WF, "conteo de palabras") {
    Ok(_) => {}
    Err(e) if is_already_exists(&e) => {
      warn!("workflow [{}] already installed", WF);
      return Ok(());
    }
    Err(e) => return Err(e.into()),
  }
  for (name, handler_type, arg) in [("split_words", HandlerType::Mapper, "arguments"),
                                    ("emit_word", HandlerType::Mapper, "arguments"),
                                    ("sum_counts", HandlerType::Reducer, "results")]
  {
    admin.save_handler(Handler::new(WF, name, handler_type, vec![ArgumentSpec::new(arg, "pairs")], name, "native"))?;
  }
  admin.create_step(Step::new(WF, "split", "trocea el texto en palabras", "split_words").with_reducer("sum_counts"))?;
  admin.create_step(Step::new(WF, "count", "emite una palabra", "emit_word").with_reducer("sum_counts"))?;
  admin.create_job(Job::new(WF, "count_words", "cuenta las palabras de un texto", "split"))?;
  Ok(())
}

fn is_already_exists(e: &jobx_engine::EngineError) -> bool {
  matches!(e, jobx_engine::EngineError::Domain(d) if d.is_already_exists())
}
