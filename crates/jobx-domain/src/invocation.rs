// invocation.rs
//
// Un nodo del grafo de invocaciones. El estado de fan-out es una variante
// (`FanOut`) en lugar de dos contadores opcionales: o no hubo fan-out, o hay
// `count` fijo y `waiting` decreciente.
use crate::entity::Entity;
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  Map,
  Reduce,
}

impl Direction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Direction::Map => "map",
      Direction::Reduce => "reduce",
    }
  }
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FanOut {
  /// Sin contadores: aún mapeando, hoja que devolvió resultados, o reducción.
  #[default]
  Leaf,
  /// Se mapeó a `count` hijos; `waiting` cuenta los que faltan por reducir.
  FannedOut { count: u64, waiting: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
  pub workflow_name: String,
  pub invocation_id: String,
  #[serde(default)]
  pub parent_invocation_id: Option<String>,
  pub step_name: String,
  pub direction: Direction,
  #[serde(default)]
  pub fan_out: FanOut,
  #[serde(default)]
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl Invocation {
  pub fn new(workflow_name: &str, parent_invocation_id: Option<&str>, step_name: &str, direction: Direction) -> Self {
    Self { workflow_name: workflow_name.to_string(),
           invocation_id: crate::new_id(),
           parent_invocation_id: parent_invocation_id.map(str::to_string),
           step_name: step_name.to_string(),
           direction,
           fan_out: FanOut::Leaf,
           error: None,
           created_at: Utc::now() }
  }

  /// Invocación raíz de una petición.
  pub fn root(workflow_name: &str, step_name: &str) -> Self {
    Self::new(workflow_name, None, step_name, Direction::Map)
  }

  pub fn is_fanned_out(&self) -> bool {
    matches!(self.fan_out, FanOut::FannedOut { .. })
  }

  pub fn mapped_count(&self) -> Option<u64> {
    match self.fan_out {
      FanOut::FannedOut { count, .. } => Some(count),
      FanOut::Leaf => None,
    }
  }

  pub fn mapped_waiting(&self) -> Option<u64> {
    match self.fan_out {
      FanOut::FannedOut { waiting, .. } => Some(waiting),
      FanOut::Leaf => None,
    }
  }

  /// Publica el fan-out total de una vez (`count == waiting`). Sólo puede
  /// hacerse una vez y nunca con cero hijos.
  pub fn set_fan_out(&mut self, count: u64) -> Result<(), DomainError> {
    if count == 0 {
      return Err(DomainError::ValidationError(format!("Invocación [{}]: fan-out de cero hijos", self.invocation_id)));
    }
    if self.is_fanned_out() {
      return Err(DomainError::ValidationError(format!("Invocación [{}]: el fan-out ya estaba fijado",
                                                      self.invocation_id)));
    }
    self.fan_out = FanOut::FannedOut { count, waiting: count };
    Ok(())
  }

  /// Resta un hijo pendiente y devuelve los que quedan.
  pub fn decrement_waiting(&mut self) -> Result<u64, DomainError> {
    match &mut self.fan_out {
      FanOut::FannedOut { waiting, .. } if *waiting > 0 => {
        *waiting -= 1;
        Ok(*waiting)
      }
      FanOut::FannedOut { .. } => {
        Err(DomainError::ValidationError(format!("Invocación [{}]: contador de espera ya en cero",
                                                 self.invocation_id)))
      }
      FanOut::Leaf => {
        Err(DomainError::ValidationError(format!("Invocación [{}]: no tiene fan-out que decrementar",
                                                 self.invocation_id)))
      }
    }
  }
}

impl Entity for Invocation {
  const CLASS: &'static str = "invocation";

  fn identity(&self) -> Vec<String> {
    vec![self.workflow_name.clone(), self.invocation_id.clone()]
  }
}
