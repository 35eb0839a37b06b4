//! Capacidad de transporte y broker en proceso.
//!
//! El núcleo sólo necesita `push_one(tópico, clase, mensaje)` para publicar
//! y una fuente de mensajes crudos para consumir. El cuerpo de cada mensaje
//! es un sobre JSON con la clase de trabajo (map/reduce) y el `WireMessage`.
use crate::errors::EngineError;
use async_trait::async_trait;
use jobx_domain::Direction;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Versión actual del formato de `WireMessage`.
pub const WIRE_FORMAT_VERSION: u32 = 1;

/// Mensaje mínimo: un puntero a la invocación, nunca una copia del estado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
  pub format_version: u32,
  pub workflow_name: String,
  pub request_id: String,
  pub invocation_id: String,
  pub step_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
  job_class: Direction,
  message: WireMessage,
}

pub fn encode_envelope(job_class: Direction, message: &WireMessage) -> Result<String, EngineError> {
  Ok(serde_json::to_string(&Envelope { job_class, message: message.clone() })?)
}

/// Decodifica un mensaje crudo y devuelve su clase de trabajo.
pub fn classify(raw: &str) -> Result<(Direction, WireMessage), EngineError> {
  let envelope: Envelope = serde_json::from_str(raw).map_err(|e| EngineError::WireFormat(e.to_string()))?;
  if envelope.message.format_version == 0 || envelope.message.format_version > WIRE_FORMAT_VERSION {
    return Err(EngineError::WireFormat(format!("versión de formato no soportada: {}",
                                               envelope.message.format_version)));
  }
  Ok((envelope.job_class, envelope.message))
}

/// Mensaje tal como lo entrega el broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
  pub topic: String,
  pub body: String,
}

/// Lado productor del transporte.
pub trait Transport: Send + Sync {
  fn push_one(&self, topic: &str, job_class: Direction, message: &WireMessage) -> Result<(), EngineError>;
}

/// Lado consumidor: `None` cuando el broker se cierra.
#[async_trait]
pub trait MessageSource: Send {
  async fn next_message(&mut self) -> Option<RawMessage>;
}

/// Productor del broker en proceso. Guarda el historial de tópicos para
/// diagnóstico.
pub struct InMemoryTransport {
  sender: mpsc::UnboundedSender<RawMessage>,
  topics: Mutex<Vec<String>>,
}

impl InMemoryTransport {
  pub fn pushed_topics(&self) -> Vec<String> {
    self.topics.lock().map(|t| t.clone()).unwrap_or_default()
  }
}

impl Transport for InMemoryTransport {
  fn push_one(&self, topic: &str, job_class: Direction, message: &WireMessage) -> Result<(), EngineError> {
    let body = encode_envelope(job_class, message)?;
    self.sender
        .send(RawMessage { topic: topic.to_string(), body })
        .map_err(|_| EngineError::Transport("broker cerrado".to_string()))?;
    if let Ok(mut topics) = self.topics.lock() {
      topics.push(topic.to_string());
    }
    debug!("pushed {} message for invocation [{}] to [{}]", job_class, message.invocation_id, topic);
    Ok(())
  }
}

/// Consumidor del broker en proceso.
pub struct InMemorySource {
  receiver: mpsc::UnboundedReceiver<RawMessage>,
}

#[async_trait]
impl MessageSource for InMemorySource {
  async fn next_message(&mut self) -> Option<RawMessage> {
    self.receiver.recv().await
  }
}

impl InMemorySource {
  /// Extrae un mensaje sin esperar (útil para avanzar paso a paso).
  pub fn try_next(&mut self) -> Option<RawMessage> {
    self.receiver.try_recv().ok()
  }
}

/// Crea un broker en proceso: todos los tópicos comparten una cola.
pub fn in_memory_broker() -> (InMemoryTransport, InMemorySource) {
  let (sender, receiver) = mpsc::unbounded_channel();
  (InMemoryTransport { sender, topics: Mutex::new(Vec::new()) }, InMemorySource { receiver })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn message() -> WireMessage {
    WireMessage { format_version: WIRE_FORMAT_VERSION,
                  workflow_name: "wf".into(),
                  request_id: "r".into(),
                  invocation_id: "i".into(),
                  step_name: "s".into() }
  }

  #[test]
  fn envelope_classifies_back() {
    let raw = encode_envelope(Direction::Reduce, &message()).unwrap();
    let (class, msg) = classify(&raw).unwrap();
    assert_eq!(class, Direction::Reduce);
    assert_eq!(msg, message());
  }

  #[test]
  fn unknown_versions_and_garbage_are_rejected() {
    let mut m = message();
    m.format_version = WIRE_FORMAT_VERSION + 1;
    let raw = encode_envelope(Direction::Map, &m).unwrap();
    assert!(matches!(classify(&raw), Err(EngineError::WireFormat(_))));
    assert!(matches!(classify("not json"), Err(EngineError::WireFormat(_))));
  }

  #[test]
  fn broker_delivers_in_order() {
    let (tx, mut rx) = in_memory_broker();
    tx.push_one("mr.wf.map", Direction::Map, &message()).unwrap();
    tx.push_one("mr.wf.reduce", Direction::Reduce, &message()).unwrap();
    let first = tokio_test::block_on(rx.next_message()).unwrap();
    assert_eq!(first.topic, "mr.wf.map");
    assert_eq!(rx.try_next().map(|m| m.topic), Some("mr.wf.reduce".to_string()));
    assert_eq!(tx.pushed_topics().len(), 2);
  }
}
