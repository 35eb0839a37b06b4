//! Pool de workers sobre una fuente de mensajes.
//!
//! Cada mensaje se procesa en su propia tarea bloqueante; un semáforo
//! dimensionado por el crédito de mensajes en vuelo acota cuántas corren a
//! la vez. El permiso se adquiere antes de leer el siguiente mensaje y se
//! libera al terminar la tarea.
use crate::errors::EngineError;
use crate::processor::{HandleOutcome, StepProcessor};
use crate::transport::MessageSource;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
  pub received: usize,
  pub processed: usize,
  pub duplicates: usize,
  pub abandoned: usize,
  pub failed: usize,
}

impl DispatchStats {
  fn record(&mut self, result: &Result<HandleOutcome, EngineError>) {
    match result {
      Ok(HandleOutcome::Duplicate) => self.duplicates += 1,
      Ok(HandleOutcome::Abandoned) => self.abandoned += 1,
      Ok(_) => self.processed += 1,
      Err(_) => self.failed += 1,
    }
  }
}

pub struct Dispatcher {
  processor: StepProcessor,
  permits: Arc<Semaphore>,
}

impl Dispatcher {
  pub fn new(processor: StepProcessor) -> Self {
    let credit = processor.engine().config().max_in_flight.max(1);
    Self { processor, permits: Arc::new(Semaphore::new(credit)) }
  }

  /// Consume mensajes hasta que la fuente se cierra o `shutdown` termina.
  /// Las tareas en curso se esperan antes de volver.
  pub async fn run<S, F>(&self, mut source: S, shutdown: F) -> DispatchStats
    where S: MessageSource,
          F: Future<Output = ()>
  {
    let mut stats = DispatchStats::default();
    let mut workers: JoinSet<Result<HandleOutcome, EngineError>> = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
      let permit = tokio::select! {
        _ = &mut shutdown => break,
        permit = self.permits.clone().acquire_owned() => match permit {
          Ok(p) => p,
          Err(_) => break,
        },
      };
      let message = tokio::select! {
        _ = &mut shutdown => break,
        message = source.next_message() => message,
      };
      let Some(raw) = message else {
        info!("message source closed");
        break;
      };
      stats.received += 1;
      debug!("dispatching message from [{}]", raw.topic);
      let processor = self.processor.clone();
      workers.spawn_blocking(move || {
               let _permit = permit;
               processor.handle_raw(&raw.body)
             });

      while let Some(done) = workers.try_join_next() {
        Self::collect(&mut stats, done);
      }
    }

    while let Some(done) = workers.join_next().await {
      Self::collect(&mut stats, done);
    }
    info!("dispatcher stopped: {:?}", stats);
    stats
  }

  fn collect(stats: &mut DispatchStats, done: Result<Result<HandleOutcome, EngineError>, tokio::task::JoinError>) {
    match done {
      Ok(result) => {
        if let Err(e) = &result {
          if e.is_caller_error() {
            warn!("message rejected: {}", e);
          } else {
            error!("message failed: {}", e);
          }
        }
        stats.record(&result);
      }
      Err(e) => {
        error!("worker task panicked: {}", e);
        stats.failed += 1;
      }
    }
  }
}
