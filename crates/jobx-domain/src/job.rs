// job.rs
use crate::entity::Entity;
use crate::DomainError;
use serde::{Deserialize, Serialize};

/// Job: punto de entrada con nombre que arranca en `initial_step_name`.
/// Inmutable tras su creación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
  pub workflow_name: String,
  pub job_name: String,
  pub description: String,
  pub initial_step_name: String,
}

impl Job {
  pub fn new(workflow_name: &str, job_name: &str, description: &str, initial_step_name: &str) -> Self {
    Self { workflow_name: workflow_name.to_string(),
           job_name: job_name.to_string(),
           description: description.to_string(),
           initial_step_name: initial_step_name.to_string() }
  }
}

impl Entity for Job {
  const CLASS: &'static str = "job";

  fn identity(&self) -> Vec<String> {
    vec![self.workflow_name.clone(), self.job_name.clone()]
  }

  fn presave(&mut self) -> Result<(), DomainError> {
    if self.initial_step_name.trim().is_empty() {
      return Err(DomainError::ValidationError("El job necesita un step inicial".to_string()));
    }
    Ok(())
  }
}
