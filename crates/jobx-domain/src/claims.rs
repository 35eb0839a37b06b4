// claims.rs
use crate::invocation::Direction;
use crate::DomainError;
use chrono::Utc;
use kv::{Identity, KvClient, KvTree};
use serde_json::json;

/// Marcas de "ya procesado" por (invocación, dirección):
/// `entity_trees/claims/<wf>/<invocación>/<dirección>`. La primera
/// entrega reclama con `create_only`; una reentrega encuentra la marca.
#[derive(Clone)]
pub struct ClaimTree {
  tree: KvTree,
}

impl ClaimTree {
  pub fn new(client: KvClient, workflow_name: &str, invocation_id: &str) -> Self {
    Self { tree: KvTree::new(client, Identity::new(["claims", workflow_name, invocation_id])) }
  }

  /// `true` si este llamador obtuvo el reclamo; `false` si ya existía.
  pub fn claim(&self, direction: Direction) -> Result<bool, DomainError> {
    match self.tree.add(direction.as_str(), &json!({ "claimed_at": Utc::now().to_rfc3339() })) {
      Ok(_) => Ok(true),
      Err(e) if e.is_already_exists() => Ok(false),
      Err(e) => Err(e.into()),
    }
  }

  pub fn delete(&self) -> Result<(), DomainError> {
    self.tree.delete()?;
    Ok(())
  }
}
