// step.rs
use crate::entity::Entity;
use crate::DomainError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  pub workflow_name: String,
  pub step_name: String,
  pub description: String,
  pub map_handler_name: String,
  #[serde(default)]
  pub combine_handler_name: Option<String>,
  #[serde(default)]
  pub reduce_handler_name: Option<String>,
}

impl Step {
  pub fn new(workflow_name: &str, step_name: &str, description: &str, map_handler_name: &str) -> Self {
    Self { workflow_name: workflow_name.to_string(),
           step_name: step_name.to_string(),
           description: description.to_string(),
           map_handler_name: map_handler_name.to_string(),
           combine_handler_name: None,
           reduce_handler_name: None }
  }

  pub fn with_combiner(mut self, handler_name: &str) -> Self {
    self.combine_handler_name = Some(handler_name.to_string());
    self
  }

  pub fn with_reducer(mut self, handler_name: &str) -> Self {
    self.reduce_handler_name = Some(handler_name.to_string());
    self
  }

  /// Los tres handlers (si existen) deben ser distintos entre sí.
  pub fn validate(&self) -> Result<(), DomainError> {
    if self.map_handler_name.trim().is_empty() {
      return Err(DomainError::ValidationError(format!("Step [{}] sin handler de map", self.step_name)));
    }
    let map = Some(self.map_handler_name.as_str());
    let combine = self.combine_handler_name.as_deref();
    let reduce = self.reduce_handler_name.as_deref();
    if map == reduce || map == combine || (combine.is_some() && combine == reduce) {
      return Err(DomainError::ValidationError(format!("Step [{}]: los handlers de map, combine y reduce deben \
                                                        ser distintos",
                                                       self.step_name)));
    }
    Ok(())
  }
}

impl Entity for Step {
  const CLASS: &'static str = "step";

  fn identity(&self) -> Vec<String> {
    vec![self.workflow_name.clone(), self.step_name.clone()]
  }

  fn presave(&mut self) -> Result<(), DomainError> {
    self.validate()
  }
}
