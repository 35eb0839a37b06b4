//! Ciclo de vida de una petición: empaquetar, empujar y (si es bloqueante)
//! esperar al resultado.
use crate::engine::Engine;
use crate::errors::EngineError;
use jobx_domain::{DatasetKind, DatasetQueue, Handler, Invocation, Job, Pair, PairRecord, Record, Request, Step};
use kv::KvError;
use log::{debug, info};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;

/// Petición creada y lista para despachar.
#[derive(Debug, Clone)]
pub struct PackagedRequest {
  pub request: Record<Request>,
  pub invocation: Invocation,
  pub handler: Handler,
}

impl PackagedRequest {
  pub fn request_id(&self) -> &str {
    &self.request.data.request_id
  }
}

#[derive(Debug, Clone)]
pub struct CompletedRequest {
  pub request: Request,
  pub pairs: Vec<Pair>,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
  /// Petición bloqueante terminada. `body` es lo que devolvió el escritor de
  /// resultados.
  Completed { request_id: String, pairs: Vec<Pair>, body: Option<JsonValue> },
  /// Petición no bloqueante aceptada; el resultado lo entrega el escritor.
  Accepted { request_id: String },
}

#[derive(Clone)]
pub struct RequestLifecycle {
  engine: Arc<Engine>,
}

impl RequestLifecycle {
  pub fn new(engine: Arc<Engine>) -> Self {
    Self { engine }
  }

  /// Crea la invocación raíz con su dataset de argumentos y la petición sin
  /// terminar.
  pub fn package_request(&self,
                         workflow_name: &str,
                         job_name: &str,
                         arguments: Vec<Pair>,
                         context: JsonValue,
                         is_blocking: bool)
                         -> Result<PackagedRequest, EngineError> {
    let entities = self.engine.entities();
    let job = entities.load::<Job>(&[workflow_name, job_name])?.data;
    let step = entities.load::<Step>(&[workflow_name, job.initial_step_name.as_str()])?.data;
    let handler = entities.load::<Handler>(&[workflow_name, step.map_handler_name.as_str()])?.data;

    let invocation = entities.create(Invocation::root(workflow_name, &step.step_name))?.data;
    let dataset = DatasetQueue::new(self.engine.client().clone(),
                                    workflow_name,
                                    &invocation.invocation_id,
                                    DatasetKind::Arguments);
    for (key, value) in arguments {
      dataset.add(&PairRecord::new(key, value))?;
    }
    let request = entities.create(Request::new(workflow_name,
                                               job_name,
                                               &invocation.invocation_id,
                                               context,
                                               is_blocking))?;
    info!("request [{}] packaged for job [{}] (root invocation [{}])",
          request.data.request_id,
          job_name,
          invocation.invocation_id);
    Ok(PackagedRequest { request, invocation, handler })
  }

  pub fn push_request(&self, packaged: &PackagedRequest) -> Result<(), EngineError> {
    self.engine
        .push_invocation(packaged.request_id(), &packaged.invocation, Some(&packaged.handler))
  }

  /// Espera sobre el `watch` de la petición hasta que quede terminada y lee
  /// el `post_reduce` de la raíz. Un fallo se devuelve como `RequestFailed`.
  /// La limpieza la encola el procesador al terminar la petición, así que
  /// rendirse aquí con `WaitFault` no deja el grafo huérfano.
  pub fn block_for_result(&self, packaged: &PackagedRequest) -> Result<CompletedRequest, EngineError> {
    let wf = packaged.request.data.workflow_name.as_str();
    let request_id = packaged.request_id();
    let entities = self.engine.entities();
    let deadline = self.engine.config().wait_timeout.map(|t| Instant::now() + t);
    let mut since = packaged.request.version;

    let request = loop {
      let timeout = match deadline {
        Some(d) => {
          let now = Instant::now();
          if now >= d {
            return Err(KvError::WaitFault(format!("tiempo de espera agotado para la petición {}", request_id)).into());
          }
          Some(d - now)
        }
        None => None,
      };
      let record = entities.watch::<Request>(&[wf, request_id], since, timeout)?;
      if record.data.is_done {
        break record.data;
      }
      debug!("request [{}] changed but is not done yet", request_id);
      since = record.version;
    };

    if let Some(failed_id) = request.failed_invocation_id.as_deref() {
      return Err(self.failure_of(&request, failed_id));
    }
    let pairs = DatasetQueue::new(self.engine.client().clone(), wf, &request.invocation_id, DatasetKind::PostReduce)
      .list::<PairRecord>()?
      .into_iter()
      .map(PairRecord::into_pair)
      .collect();
    Ok(CompletedRequest { request, pairs })
  }

  fn failure_of(&self, request: &Request, failed_invocation_id: &str) -> EngineError {
    let stored = self.engine
                     .entities()
                     .try_load::<Invocation>(&[request.workflow_name.as_str(), failed_invocation_id])
                     .ok()
                     .flatten()
                     .and_then(|r| r.data.error);
    let (classification, message) = match stored.as_deref().and_then(|text| text.split_once(": ")) {
      Some((c, m)) => (c.to_string(), m.to_string()),
      None => ("unknown".to_string(), "la invocación no dejó detalle del error".to_string()),
    };
    EngineError::RequestFailed { request_id: request.request_id.clone(),
                                 invocation_id: failed_invocation_id.to_string(),
                                 classification,
                                 message }
  }

  /// Empaqueta y empuja. Si es bloqueante espera y entrega el resultado por
  /// el escritor configurado.
  pub fn submit(&self,
                workflow_name: &str,
                job_name: &str,
                arguments: Vec<Pair>,
                context: JsonValue,
                is_blocking: bool)
                -> Result<SubmitOutcome, EngineError> {
    let packaged = self.package_request(workflow_name, job_name, arguments, context, is_blocking)?;
    self.push_request(&packaged)?;
    if !is_blocking {
      return Ok(SubmitOutcome::Accepted { request_id: packaged.request_id().to_string() });
    }
    let completed = self.block_for_result(&packaged)?;
    let body = self.engine.result_writer().render(&completed.request, &completed.pairs)?;
    Ok(SubmitOutcome::Completed { request_id: completed.request.request_id, pairs: completed.pairs, body })
  }
}
