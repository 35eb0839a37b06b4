use jobx_domain::DomainError;
use kv::KvError;
use thiserror::Error;

// Errores comunes del motor.
//
// Los errores de KV y de dominio se envuelven tal cual; el resto son
// propios del motor: argumentos inválidos para un handler, fallos del
// handler (con su salida capturada), mensajes mal formados y errores de
// transporte. `classification()` da una etiqueta estable para el llamador.
#[derive(Error, Debug)]
pub enum EngineError {
  /// Errores del modelo de entidades.
  #[error("Error de dominio: {0}")]
  Domain(#[from] DomainError),

  /// Errores del almacén KV.
  #[error("Error de KV: {0}")]
  Kv(#[from] KvError),

  /// Los argumentos no encajan con la especificación del handler.
  #[error("Argumentos inválidos para [{handler}]: {message}")]
  ArgumentMarshal { handler: String, message: String },

  /// El handler falló durante su ejecución.
  #[error("Error ejecutando handler [{handler}]: {message}")]
  HandlerExecution {
    handler: String,
    message: String,
    stdout: String,
    stderr: String,
  },

  /// Mensaje de cola ilegible o de versión desconocida.
  #[error("Formato de mensaje inválido: {0}")]
  WireFormat(String),

  #[error("Error de transporte: {0}")]
  Transport(String),

  /// Una petición bloqueante terminó con fallo.
  #[error("Petición [{request_id}] fallida en invocación [{invocation_id}] ({classification}): {message}")]
  RequestFailed {
    request_id: String,
    invocation_id: String,
    classification: String,
    message: String,
  },

  #[error("Error de serializacion: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Error de validacion: {0}")]
  Validation(String),

  #[error("Error de E/S: {0}")]
  Io(#[from] std::io::Error),
}

fn kv_classification(e: &KvError) -> &'static str {
  match e {
    KvError::AlreadyExists(_) => "already_exists",
    KvError::NotFound(_) => "not_found",
    KvError::PreconditionFailed(_) => "precondition_failed",
    KvError::ReservedCharacter(_) => "reserved_character",
    KvError::WaitFault(_) => "wait_fault",
    KvError::Encoding(_) => "serialization",
    KvError::Storage(_) => "storage",
  }
}

impl EngineError {
  pub fn handler_failure(handler: &str, message: impl Into<String>) -> Self {
    EngineError::HandlerExecution { handler: handler.to_string(),
                                    message: message.into(),
                                    stdout: String::new(),
                                    stderr: String::new() }
  }

  /// Etiqueta estable del tipo de fallo.
  pub fn classification(&self) -> &str {
    match self {
      EngineError::Domain(DomainError::Kv(e)) | EngineError::Kv(e) => kv_classification(e),
      EngineError::Domain(DomainError::AtomicUpdateExhausted { .. }) => "atomic_update_exhausted",
      EngineError::Domain(DomainError::ValidationError(_)) | EngineError::Validation(_) => "validation",
      EngineError::Domain(DomainError::SerializationError(_)) | EngineError::Serialization(_) => "serialization",
      EngineError::ArgumentMarshal { .. } => "argument_marshal",
      EngineError::HandlerExecution { .. } => "handler_execution",
      EngineError::WireFormat(_) => "wire_format",
      EngineError::Transport(_) => "transport",
      EngineError::RequestFailed { classification, .. } => classification.as_str(),
      EngineError::Io(_) => "io",
    }
  }

  /// Errores atribuibles a la entrada del llamador (equivalente a 4xx).
  pub fn is_caller_error(&self) -> bool {
    matches!(self.classification(), "reserved_character" | "argument_marshal" | "validation")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classification_sees_through_domain_wrapping() {
    let e = EngineError::from(DomainError::from(KvError::WaitFault("closed".into())));
    assert_eq!(e.classification(), "wait_fault");
    let e = EngineError::ArgumentMarshal { handler: "h".into(), message: "missing".into() };
    assert!(e.is_caller_error());
    assert!(!EngineError::handler_failure("h", "boom").is_caller_error());
  }
}
