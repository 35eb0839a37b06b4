// Archivo: client.rs
// Propósito: implementar `KvClient`, la envoltura tipada sobre `KvStore` que
// aplica el `ValueCodec` configurado. El resto del sistema no ve cadenas
// codificadas, sólo tipos serde.
use crate::domain::{Version, VersionedValue};
use crate::errors::Result;
use crate::identity::Identity;
use crate::repository::{JsonCodec, KvStore, ValueCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cliente tipado del almacén. Barato de clonar.
#[derive(Clone)]
pub struct KvClient {
    store: Arc<dyn KvStore>,
    codec: Arc<dyn ValueCodec>,
}

impl KvClient {
    /// Crea el cliente con el codec JSON por defecto.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_codec(store, Arc::new(JsonCodec))
    }

    pub fn with_codec(store: Arc<dyn KvStore>, codec: Arc<dyn ValueCodec>) -> Self {
        Self { store, codec }
    }

    /// Acceso al almacén subyacente.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_value(value)?;
        self.codec.encode(&json)
    }

    pub fn decode<T: DeserializeOwned>(&self, raw: &str) -> Result<T> {
        let json = self.codec.decode(raw)?;
        Ok(serde_json::from_value(json)?)
    }

    fn decode_versioned<T: DeserializeOwned>(&self, node: VersionedValue) -> Result<(Version, T)> {
        Ok((node.version, self.decode(&node.value)?))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &Identity) -> Result<(Version, T)> {
        let node = self.store.get(key)?;
        self.decode_versioned(node)
    }

    pub fn set<T: Serialize>(&self, key: &Identity, value: &T) -> Result<Version> {
        self.store.set(key, &self.encode(value)?)
    }

    pub fn create_only<T: Serialize>(&self, key: &Identity, value: &T) -> Result<Version> {
        self.store.create_only(key, &self.encode(value)?)
    }

    pub fn update_only<T: Serialize>(&self, key: &Identity, value: &T, expected: Option<Version>) -> Result<Version> {
        self.store.update_only(key, &self.encode(value)?, expected)
    }

    pub fn delete(&self, key: &Identity) -> Result<()> {
        self.store.delete(key)
    }

    pub fn delete_tree(&self, prefix: &Identity) -> Result<()> {
        self.store.delete_tree(prefix)
    }

    /// Lista los hijos decodificados de `prefix` (orden no garantizado).
    pub fn list<T: DeserializeOwned>(&self, prefix: &Identity) -> Result<Vec<(String, Version, T)>> {
        self.store
            .list_children(prefix)?
            .into_iter()
            .map(|(name, node)| {
                let (version, value) = self.decode_versioned(node)?;
                Ok((name, version, value))
            })
            .collect()
    }

    pub fn append<T: Serialize>(&self, prefix: &Identity, value: &T) -> Result<(String, Version)> {
        self.store.append(prefix, &self.encode(value)?)
    }

    pub fn watch<T: DeserializeOwned>(&self,
                                      key: &Identity,
                                      since: Option<Version>,
                                      timeout: Option<Duration>)
                                      -> Result<(Version, T)> {
        let node = self.store.watch(key, since, timeout)?;
        self.decode_versioned(node)
    }
}
