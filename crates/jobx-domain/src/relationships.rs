// relationships.rs
use crate::DomainError;
use kv::{Identity, KvClient, KvTree};
use serde_json::{json, Value as JsonValue};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
  /// Invocación de map → invocación hija creada por su fan-out.
  Mapped,
  /// Invocación de map → invocación de reduce que la consumió.
  Reduced,
}

impl RelationKind {
  pub const ALL: [RelationKind; 2] = [RelationKind::Mapped, RelationKind::Reduced];

  pub fn as_str(&self) -> &'static str {
    match self {
      RelationKind::Mapped => "mapped",
      RelationKind::Reduced => "reduced",
    }
  }
}

impl fmt::Display for RelationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Aristas salientes de una invocación para un tipo de relación:
/// `entity_trees/relationships/<wf>/<desde>/<tipo>/<hacia>`.
#[derive(Clone)]
pub struct RelationshipTree {
  tree: KvTree,
  kind: RelationKind,
}

impl RelationshipTree {
  pub fn new(client: KvClient, workflow_name: &str, from_invocation_id: &str, kind: RelationKind) -> Self {
    let identity = Identity::new(["relationships", workflow_name, from_invocation_id, kind.as_str()]);
    Self { tree: KvTree::new(client, identity), kind }
  }

  pub fn kind(&self) -> RelationKind {
    self.kind
  }

  /// Añade la arista con `create_only`: una arista repetida es un error de
  /// programación y se devuelve como `AlreadyExists`.
  pub fn add_entity(&self, to_invocation_id: &str, metadata: Option<JsonValue>) -> Result<(), DomainError> {
    self.tree.add(to_invocation_id, &metadata.unwrap_or_else(|| json!({})))?;
    Ok(())
  }

  pub fn list_entities(&self) -> Result<Vec<String>, DomainError> {
    Ok(self.tree.list_keys()?)
  }

  pub fn list_entities_and_data(&self) -> Result<Vec<(String, JsonValue)>, DomainError> {
    Ok(self.tree.list()?)
  }

  pub fn delete(&self) -> Result<(), DomainError> {
    self.tree.delete()?;
    Ok(())
  }
}
