// sessions.rs
use crate::DomainError;
use kv::{Identity, KvClient, KvTree};
use serde_json::Value as JsonValue;

/// Espacio clave/valor privado de una invocación, expuesto a los handlers
/// como `session_get`/`session_set`.
#[derive(Clone)]
pub struct SessionTree {
  tree: KvTree,
}

impl SessionTree {
  pub fn new(client: KvClient, workflow_name: &str, invocation_id: &str) -> Self {
    Self { tree: KvTree::new(client, Identity::new(["sessions", workflow_name, invocation_id])) }
  }

  pub fn get(&self, name: &str) -> Result<Option<JsonValue>, DomainError> {
    match self.tree.get::<JsonValue>(name) {
      Ok(v) => Ok(Some(v)),
      Err(e) if e.is_not_found() => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  pub fn set(&self, name: &str, value: &JsonValue) -> Result<(), DomainError> {
    self.tree.set(name, value)?;
    Ok(())
  }

  pub fn list(&self) -> Result<Vec<(String, JsonValue)>, DomainError> {
    Ok(self.tree.list()?)
  }

  pub fn delete(&self) -> Result<(), DomainError> {
    self.tree.delete()?;
    Ok(())
  }
}
