// errors.rs
use kv::KvError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DomainError {
  #[error(transparent)]
  Kv(#[from] KvError),
  #[error("Actualización atómica agotada para [{identity}] tras {attempts} intentos")]
  AtomicUpdateExhausted { identity: String, attempts: u32 },
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
}

impl DomainError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, DomainError::Kv(KvError::NotFound(_)))
  }

  pub fn is_already_exists(&self) -> bool {
    matches!(self, DomainError::Kv(KvError::AlreadyExists(_)))
  }

  pub fn is_precondition_failed(&self) -> bool {
    matches!(self, DomainError::Kv(KvError::PreconditionFailed(_)))
  }
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}
