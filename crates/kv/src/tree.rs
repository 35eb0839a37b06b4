// Archivo: tree.rs
// Propósito: árbol de hijos con nombre sobre el KV (`entity_trees/<...>`).
// Los hijos no tienen identidad propia: sólo un nombre y datos pequeños.
use crate::client::KvClient;
use crate::domain::Version;
use crate::errors::Result;
use crate::identity::{Identity, TREE_ROOT};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone)]
pub struct KvTree {
    client: KvClient,
    root: Identity,
}

impl KvTree {
    /// `tree_identity` se cuelga de `TREE_ROOT`.
    pub fn new(client: KvClient, tree_identity: Identity) -> Self {
        let root = Identity::new([TREE_ROOT]).join(&tree_identity);
        Self { client, root }
    }

    pub fn root(&self) -> &Identity {
        &self.root
    }

    /// Añade un hijo con `create_only`: un duplicado es `AlreadyExists`.
    pub fn add<T: Serialize>(&self, name: &str, data: &T) -> Result<Version> {
        self.client.create_only(&self.root.child(name), data)
    }

    /// Escribe un hijo sin condiciones.
    pub fn set<T: Serialize>(&self, name: &str, data: &T) -> Result<Version> {
        self.client.set(&self.root.child(name), data)
    }

    pub fn update<T: Serialize>(&self, name: &str, data: &T) -> Result<Version> {
        self.client.update_only(&self.root.child(name), data, None)
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let (_, value) = self.client.get(&self.root.child(name))?;
        Ok(value)
    }

    /// Lista `(nombre, datos)`; orden no garantizado.
    pub fn list<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>> {
        Ok(self.client
               .list::<T>(&self.root)?
               .into_iter()
               .map(|(name, _, value)| (name, value))
               .collect())
    }

    pub fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.client
               .store()
               .list_children(&self.root)?
               .into_iter()
               .map(|(name, _)| name)
               .collect())
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(!self.list_keys()?.is_empty())
    }

    /// Borra el árbol completo. `NotFound` si estaba vacío.
    pub fn delete(&self) -> Result<()> {
        self.client.delete_tree(&self.root)
    }
}
