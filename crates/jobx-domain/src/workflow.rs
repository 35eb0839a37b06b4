// workflow.rs
use crate::entity::Entity;
use serde::{Deserialize, Serialize};

/// Espacio de nombres raíz: agrupa jobs, steps y handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_name: String,
  pub description: String,
  /// Hash de todas las versiones de handlers (ver
  /// `handler::compute_handlers_state`).
  #[serde(default)]
  pub handlers_state: Option<String>,
}

impl Workflow {
  pub fn new(workflow_name: &str, description: &str) -> Self {
    Self { workflow_name: workflow_name.to_string(),
           description: description.to_string(),
           handlers_state: None }
  }
}

impl Entity for Workflow {
  const CLASS: &'static str = "workflow";

  fn identity(&self) -> Vec<String> {
    vec![self.workflow_name.clone()]
  }
}
