// cleanup_queue.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use kv::{Identity, KvClient, KvQueue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupEntry {
  pub request_id: String,
  pub queued_at: DateTime<Utc>,
}

/// Peticiones terminadas pendientes de poda: `queues/request_cleanup/<wf>`.
#[derive(Clone)]
pub struct RequestCleanupQueue {
  queue: KvQueue,
}

impl RequestCleanupQueue {
  pub fn new(client: KvClient, workflow_name: &str) -> Self {
    Self { queue: KvQueue::new(client, Identity::new(["request_cleanup", workflow_name])) }
  }

  pub fn add(&self, request_id: &str) -> Result<(), DomainError> {
    self.queue.add(&CleanupEntry { request_id: request_id.to_string(), queued_at: Utc::now() })?;
    Ok(())
  }

  /// Entradas `(clave, entrada)` en orden de llegada.
  pub fn list(&self) -> Result<Vec<(String, CleanupEntry)>, DomainError> {
    Ok(self.queue.list_keys_with_data()?)
  }

  pub fn remove(&self, key: &str) -> Result<(), DomainError> {
    self.queue.delete_key(key)?;
    Ok(())
  }
}
