// request.rs
use crate::entity::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Una petición de ejecución de un job. En el camino feliz se modifica
/// exactamente dos veces: se crea sin terminar y luego se marca terminada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
  pub workflow_name: String,
  pub request_id: String,
  pub job_name: String,
  /// Invocación raíz (map, sin padre).
  pub invocation_id: String,
  #[serde(default)]
  pub context: JsonValue,
  pub is_blocking: bool,
  pub is_done: bool,
  #[serde(default)]
  pub failed_invocation_id: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub done_at: Option<DateTime<Utc>>,
}

impl Request {
  pub fn new(workflow_name: &str, job_name: &str, invocation_id: &str, context: JsonValue, is_blocking: bool) -> Self {
    Self { workflow_name: workflow_name.to_string(),
           request_id: crate::new_id(),
           job_name: job_name.to_string(),
           invocation_id: invocation_id.to_string(),
           context,
           is_blocking,
           is_done: false,
           failed_invocation_id: None,
           created_at: Utc::now(),
           done_at: None }
  }

  pub fn mark_done(&mut self) {
    self.is_done = true;
    self.done_at = Some(Utc::now());
  }

  pub fn mark_failed(&mut self, invocation_id: &str) {
    self.failed_invocation_id = Some(invocation_id.to_string());
    self.mark_done();
  }

  pub fn is_failed(&self) -> bool {
    self.failed_invocation_id.is_some()
  }
}

impl Entity for Request {
  const CLASS: &'static str = "request";

  fn identity(&self) -> Vec<String> {
    vec![self.workflow_name.clone(), self.request_id.clone()]
  }
}
