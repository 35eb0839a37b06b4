use crate::config::EngineConfig;
use crate::handler::{HandlerContext, HandlerRunner};
use crate::notify::{LogNotifier, Notifier};
use crate::results::{InlineResultWriter, ResultWriter};
use crate::transport::{Transport, WireMessage, WIRE_FORMAT_VERSION};
use crate::errors::EngineError;
use jobx_domain::{Direction, EntityStore, Handler, Invocation, SessionTree};
use kv::{KvClient, KvStore};
use log::debug;
use std::sync::Arc;

/// Registro explícito del proceso: almacén, capacidades externas y
/// configuración. Se construye una vez y se comparte por `Arc`.
pub struct Engine {
  config: EngineConfig,
  client: KvClient,
  entities: EntityStore,
  runner: Arc<dyn HandlerRunner>,
  transport: Arc<dyn Transport>,
  notifier: Arc<dyn Notifier>,
  result_writer: Arc<dyn ResultWriter>,
}

impl Engine {
  pub fn new(config: EngineConfig,
             store: Arc<dyn KvStore>,
             runner: Arc<dyn HandlerRunner>,
             transport: Arc<dyn Transport>)
             -> Self {
    let client = KvClient::new(store);
    let entities = EntityStore::with_max_attempts(client.clone(), config.atomic_update_max_attempts);
    Self { config,
           client,
           entities,
           runner,
           transport,
           notifier: Arc::new(LogNotifier),
           result_writer: Arc::new(InlineResultWriter) }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_result_writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
    self.result_writer = writer;
    self
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn client(&self) -> &KvClient {
    &self.client
  }

  pub fn entities(&self) -> &EntityStore {
    &self.entities
  }

  pub fn runner(&self) -> &Arc<dyn HandlerRunner> {
    &self.runner
  }

  pub fn notifier(&self) -> &Arc<dyn Notifier> {
    &self.notifier
  }

  pub fn result_writer(&self) -> &Arc<dyn ResultWriter> {
    &self.result_writer
  }

  /// Contexto de capacidades para un handler que corre en `invocation`.
  pub fn handler_context(&self, request_id: &str, invocation: &Invocation) -> HandlerContext {
    HandlerContext::new(&invocation.workflow_name,
                        request_id,
                        &invocation.invocation_id,
                        SessionTree::new(self.client.clone(), &invocation.workflow_name, &invocation.invocation_id),
                        self.notifier.clone(),
                        self.config.file_root.clone())
  }

  /// Publica `invocation` en el tópico de su dirección. `handler` decide el
  /// sufijo de capacidad.
  pub fn push_invocation(&self,
                         request_id: &str,
                         invocation: &Invocation,
                         handler: Option<&Handler>)
                         -> Result<(), EngineError> {
    let capability = handler.and_then(|h| h.topic_suffix());
    let topic = match invocation.direction {
      Direction::Map => self.config.map_topic(&invocation.workflow_name, capability),
      Direction::Reduce => self.config.reduce_topic(&invocation.workflow_name, capability),
    };
    let message = WireMessage { format_version: WIRE_FORMAT_VERSION,
                                workflow_name: invocation.workflow_name.clone(),
                                request_id: request_id.to_string(),
                                invocation_id: invocation.invocation_id.clone(),
                                step_name: invocation.step_name.clone() };
    debug!("queueing {} of step [{}] invocation [{}]",
           invocation.direction,
           invocation.step_name,
           invocation.invocation_id);
    self.transport.push_one(&topic, invocation.direction, &message)
  }
}
