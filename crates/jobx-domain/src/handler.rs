// handler.rs
use crate::entity::Entity;
use crate::DomainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Capacidad requerida por defecto (sin partición de tópico).
pub const CAPABILITY_NONE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
  Mapper,
  Combiner,
  Reducer,
}

/// Un argumento declarado: nombre y tipo (texto libre, p. ej. "int").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
  pub name: String,
  pub arg_type: String,
}

impl ArgumentSpec {
  pub fn new(name: &str, arg_type: &str) -> Self {
    Self { name: name.to_string(), arg_type: arg_type.to_string() }
  }
}

/// Definición de un handler. `version` se deriva del contenido de `source`
/// en cada `presave`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
  pub workflow_name: String,
  pub handler_name: String,
  pub description: String,
  pub argument_spec: Vec<ArgumentSpec>,
  pub source: String,
  pub source_type: String,
  #[serde(default)]
  pub version: String,
  pub handler_type: HandlerType,
  pub required_capability: String,
}

impl Handler {
  pub fn new(workflow_name: &str,
             handler_name: &str,
             handler_type: HandlerType,
             argument_spec: Vec<ArgumentSpec>,
             source: &str,
             source_type: &str)
             -> Self {
    Self { workflow_name: workflow_name.to_string(),
           handler_name: handler_name.to_string(),
           description: String::new(),
           argument_spec,
           source: source.to_string(),
           source_type: source_type.to_string(),
           version: source_version(source),
           handler_type,
           required_capability: CAPABILITY_NONE.to_string() }
  }

  pub fn with_capability(mut self, capability: &str) -> Self {
    self.required_capability = capability.to_string();
    self
  }

  /// Sufijo de tópico, si la capacidad requerida no es `none`.
  pub fn topic_suffix(&self) -> Option<&str> {
    let cap = self.required_capability.trim();
    if cap.is_empty() || cap == CAPABILITY_NONE {
      None
    } else {
      Some(cap)
    }
  }
}

impl Entity for Handler {
  const CLASS: &'static str = "handler";

  fn identity(&self) -> Vec<String> {
    vec![self.workflow_name.clone(), self.handler_name.clone()]
  }

  fn presave(&mut self) -> Result<(), DomainError> {
    if self.source_type.trim().is_empty() {
      return Err(DomainError::ValidationError(format!("Handler [{}] sin tipo de fuente", self.handler_name)));
    }
    self.version = source_version(&self.source);
    Ok(())
  }
}

/// Versión direccionada por contenido del código fuente.
pub fn source_version(source: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(source.as_bytes());
  format!("{:x}", hasher.finalize())
}

/// Estado agregado de los handlers de un workflow: SHA-256 sobre la lista
/// ordenada de `(nombre, versión)`. Independiente del orden de entrada.
pub fn compute_handlers_state<'a, I>(handlers: I) -> String
  where I: IntoIterator<Item = &'a Handler>
{
  let mut pairs: Vec<(&str, &str)> = handlers.into_iter()
                                             .map(|h| (h.handler_name.as_str(), h.version.as_str()))
                                             .collect();
  pairs.sort();
  let mut hasher = Sha256::new();
  for (name, version) in pairs {
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(version.as_bytes());
    hasher.update(b"\n");
  }
  format!("{:x}", hasher.finalize())
}
