// dataset.rs
use crate::DomainError;
use kv::{Identity, KvClient, KvQueue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
  Arguments,
  PostCombine,
  PostReduce,
}

impl DatasetKind {
  pub const ALL: [DatasetKind; 3] = [DatasetKind::Arguments, DatasetKind::PostCombine, DatasetKind::PostReduce];

  pub fn as_str(&self) -> &'static str {
    match self {
      DatasetKind::Arguments => "arguments",
      DatasetKind::PostCombine => "post_combine",
      DatasetKind::PostReduce => "post_reduce",
    }
  }
}

impl fmt::Display for DatasetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Lista ordenada de registros de una invocación para una fase de datos:
/// `queues/dataset/<wf>/<invocación>/<tipo>`.
#[derive(Clone)]
pub struct DatasetQueue {
  queue: KvQueue,
  kind: DatasetKind,
}

impl DatasetQueue {
  pub fn new(client: KvClient, workflow_name: &str, invocation_id: &str, kind: DatasetKind) -> Self {
    let identity = Identity::new(["dataset", workflow_name, invocation_id, kind.as_str()]);
    Self { queue: KvQueue::new(client, identity), kind }
  }

  pub fn kind(&self) -> DatasetKind {
    self.kind
  }

  pub fn add<T: Serialize>(&self, record: &T) -> Result<(), DomainError> {
    self.queue.add(record)?;
    Ok(())
  }

  /// Registros en orden de inserción.
  pub fn list<T: DeserializeOwned>(&self) -> Result<Vec<T>, DomainError> {
    Ok(self.queue.list_data()?)
  }

  /// Borra todo el dataset. `NotFound` si ya estaba vacío.
  pub fn delete(&self) -> Result<(), DomainError> {
    self.queue.delete()?;
    Ok(())
  }
}
