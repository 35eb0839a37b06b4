// cleanup.rs
use crate::engine::Engine;
use crate::errors::EngineError;
use crate::trace::invocation_graph;
use chrono::Utc;
use jobx_domain::{ClaimTree, DatasetKind, DatasetQueue, DomainError, Invocation, RelationKind, RelationshipTree,
                  Request, RequestCleanupQueue, SessionTree};
use log::{debug, info, warn};
use std::sync::Arc;

/// Encola `request_id` para la poda asíncrona si la limpieza está activa.
pub fn schedule_cleanup(engine: &Engine, workflow_name: &str, request_id: &str) -> Result<bool, EngineError> {
  if !engine.config().do_cleanup_requests {
    return Ok(false);
  }
  RequestCleanupQueue::new(engine.client().clone(), workflow_name).add(request_id)?;
  debug!("request [{}] scheduled for cleanup", request_id);
  Ok(true)
}

/// Resumen de una poda. En modo simulación `planned` lista lo que se
/// borraría y `deleted` queda a cero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
  pub requests: usize,
  pub invocations: usize,
  pub deleted: usize,
  pub already_gone: usize,
  pub planned: Vec<String>,
}

impl CleanupReport {
  fn absorb(&mut self, other: CleanupReport) {
    self.requests += other.requests;
    self.invocations += other.invocations;
    self.deleted += other.deleted;
    self.already_gone += other.already_gone;
    self.planned.extend(other.planned);
  }
}

/// Poda el grafo de peticiones terminadas. Es idempotente: lo que ya no
/// existe se cuenta en `already_gone` y no es un error.
pub struct RequestCleanup {
  engine: Arc<Engine>,
  simulate: bool,
}

impl RequestCleanup {
  pub fn new(engine: Arc<Engine>) -> Self {
    Self { engine, simulate: false }
  }

  pub fn simulate(mut self, simulate: bool) -> Self {
    self.simulate = simulate;
    self
  }

  fn prune<F>(&self, report: &mut CleanupReport, label: String, op: F) -> Result<(), EngineError>
    where F: FnOnce() -> Result<(), DomainError>
  {
    if self.simulate {
      info!("cleanup (simulated): would delete {}", label);
      report.planned.push(label);
      return Ok(());
    }
    match op() {
      Ok(()) => {
        debug!("cleanup: deleted {}", label);
        report.deleted += 1;
        Ok(())
      }
      Err(e) if e.is_not_found() => {
        warn!("cleanup: {} already gone", label);
        report.already_gone += 1;
        Ok(())
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Borra datasets, relaciones, sesiones, reclamos e invocaciones del grafo
  /// de la petición y, por último, la propia petición.
  pub fn prune_request(&self, workflow_name: &str, request_id: &str) -> Result<CleanupReport, EngineError> {
    let mut report = CleanupReport::default();
    let entities = self.engine.entities();
    let client = self.engine.client();
    let Some(request) = entities.try_load::<Request>(&[workflow_name, request_id])? else {
      warn!("cleanup: request [{}] already gone", request_id);
      report.already_gone += 1;
      return Ok(report);
    };

    let graph = invocation_graph(client, workflow_name, &request.data.invocation_id)?;
    for node in &graph.nodes {
      let id = node.invocation_id.as_str();
      for kind in DatasetKind::ALL {
        self.prune(&mut report, format!("dataset {}/{}", id, kind), || {
              DatasetQueue::new(client.clone(), workflow_name, id, kind).delete()
            })?;
      }
      for kind in RelationKind::ALL {
        self.prune(&mut report, format!("relationships {}/{}", id, kind), || {
              RelationshipTree::new(client.clone(), workflow_name, id, kind).delete()
            })?;
      }
      self.prune(&mut report, format!("sessions {}", id), || {
            SessionTree::new(client.clone(), workflow_name, id).delete()
          })?;
      self.prune(&mut report, format!("claims {}", id), || {
            ClaimTree::new(client.clone(), workflow_name, id).delete()
          })?;
      self.prune(&mut report, format!("invocation {}", id), || {
            entities.delete::<Invocation>(&[workflow_name, id])
          })?;
      report.invocations += 1;
    }
    self.prune(&mut report, format!("request {}", request_id), || {
          entities.delete::<Request>(&[workflow_name, request_id])
        })?;
    report.requests += 1;
    info!("cleanup of request [{}]: {} invocations, {} nodes deleted",
          request_id,
          report.invocations,
          report.deleted);
    Ok(report)
  }

  /// Una pasada sobre la cola de limpieza del workflow. Respeta el tamaño de
  /// lote y deja sin tocar las entradas más recientes que el periodo de
  /// silencio.
  pub fn run_pass(&self, workflow_name: &str) -> Result<CleanupReport, EngineError> {
    let config = self.engine.config();
    let queue = RequestCleanupQueue::new(self.engine.client().clone(), workflow_name);
    let quiet = chrono::Duration::from_std(config.cleanup_quiet_period).unwrap_or_else(|_| chrono::Duration::zero());
    let now = Utc::now();
    let mut report = CleanupReport::default();
    for (key, entry) in queue.list()?.into_iter().take(config.cleanup_batch_size) {
      if now - entry.queued_at < quiet {
        debug!("cleanup: request [{}] still in its quiet period", entry.request_id);
        break;
      }
      report.absorb(self.prune_request(workflow_name, &entry.request_id)?);
      if !self.simulate {
        if let Err(e) = queue.remove(&key) {
          if !e.is_not_found() {
            return Err(e.into());
          }
        }
      }
    }
    Ok(report)
  }
}
