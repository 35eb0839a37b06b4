// Archivo: queue.rs
// Propósito: cola ordenada sobre el KV. Los miembros no se consumen al
// leerse: la única diferencia con un directorio normal es que el listado
// respeta el orden de inserción.
use crate::client::KvClient;
use crate::errors::Result;
use crate::identity::{Identity, QUEUE_ROOT};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Cola ordenada con raíz `queues/<...>`.
#[derive(Clone)]
pub struct KvQueue {
    client: KvClient,
    root: Identity,
}

impl KvQueue {
    /// `tree_identity` se cuelga de `QUEUE_ROOT`.
    pub fn new(client: KvClient, tree_identity: Identity) -> Self {
        let root = Identity::new([QUEUE_ROOT]).join(&tree_identity);
        debug!("queue resource created: [{}]", root);
        Self { client, root }
    }

    pub fn root(&self) -> &Identity {
        &self.root
    }

    /// Añade un registro al final; devuelve la clave asignada.
    pub fn add<T: Serialize>(&self, record: &T) -> Result<String> {
        let (name, _) = self.client.append(&self.root, record)?;
        Ok(name)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let (_, value) = self.client.get(&self.root.child(key))?;
        Ok(value)
    }

    /// Lista `(clave, registro)` en orden de inserción.
    pub fn list_keys_with_data<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>> {
        let mut items = self.client.list::<T>(&self.root)?;
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items.into_iter().map(|(k, _, v)| (k, v)).collect())
    }

    /// Lista los registros en orden de inserción.
    pub fn list_data<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        Ok(self.list_keys_with_data()?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn delete_key(&self, key: &str) -> Result<()> {
        self.client.delete(&self.root.child(key))
    }

    /// Borra la cola completa. `NotFound` si estaba vacía.
    pub fn delete(&self) -> Result<()> {
        self.client.delete_tree(&self.root)
    }
}
