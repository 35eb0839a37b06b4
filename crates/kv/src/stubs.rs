// Archivo: stubs.rs
// Propósito: implementación en memoria de `KvStore` para pruebas y wiring
// rápido.
//
// Los nodos viven en un `BTreeMap` protegido por un único `Mutex`; cada
// escritura incrementa una revisión global que se usa como versión del nodo.
// Un `Condvar` despierta a los `watch` pendientes tras cada escritura. No es
// durable ni distribuido.
use crate::domain::{in_order_name, Version, VersionedValue};
use crate::errors::{KvError, Result};
use crate::identity::Identity;
use crate::repository::KvStore;
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StoreState {
    nodes: BTreeMap<String, VersionedValue>,
    revision: u64,
    closed: bool,
}

impl StoreState {
    fn next_version(&mut self) -> Version {
        self.revision = self.revision.saturating_add(1);
        Version(self.revision)
    }

    fn current(&self, path: &str) -> Option<Version> {
        self.nodes.get(path).map(|n| n.version)
    }
}

/// Almacén KV en memoria con CAS, append ordenado y watch.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    state: Mutex<StoreState>,
    changed: Condvar,
}

impl InMemoryKvStore {
    /// Crea un almacén vacío.
    pub fn new() -> Self {
        Self { state: Mutex::new(StoreState::default()),
               changed: Condvar::new() }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `KvError::Storage`.
    fn lock(&self) -> std::result::Result<MutexGuard<'_, StoreState>, KvError> {
        self.state.lock().map_err(|e| KvError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Cierra el canal de notificaciones: todos los `watch` pendientes (y los
    /// futuros) fallan con `WaitFault`.
    pub fn close(&self) {
        if let Ok(mut state) = self.lock() {
            state.closed = true;
        }
        self.changed.notify_all();
    }

    /// Devuelve todas las claves con su valor bajo `prefix` (recursivo).
    /// Útil para inspección en pruebas.
    pub fn dump(&self, prefix: &Identity) -> Result<Vec<(String, String)>> {
        let root = prefix.encode()?;
        let dir = format!("{}/", root);
        let state = self.lock()?;
        Ok(state.nodes
                .iter()
                .filter(|(k, _)| **k == root || k.starts_with(&dir))
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect())
    }

    /// Número total de nodos almacenados.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, path: String, value: &str, mut state: MutexGuard<'_, StoreState>) -> Version {
        let version = state.next_version();
        state.nodes.insert(path, VersionedValue { version, value: value.to_string() });
        drop(state);
        self.changed.notify_all();
        version
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &Identity) -> Result<VersionedValue> {
        let path = key.encode()?;
        let state = self.lock()?;
        state.nodes
             .get(&path)
             .cloned()
             .ok_or(KvError::NotFound(path))
    }

    fn set(&self, key: &Identity, value: &str) -> Result<Version> {
        let path = key.encode()?;
        let state = self.lock()?;
        Ok(self.write(path, value, state))
    }

    fn create_only(&self, key: &Identity, value: &str) -> Result<Version> {
        let path = key.encode()?;
        let state = self.lock()?;
        if state.nodes.contains_key(&path) {
            return Err(KvError::AlreadyExists(path));
        }
        Ok(self.write(path, value, state))
    }

    fn update_only(&self, key: &Identity, value: &str, expected: Option<Version>) -> Result<Version> {
        let path = key.encode()?;
        let state = self.lock()?;
        match (state.current(&path), expected) {
            (None, None) => return Err(KvError::NotFound(path)),
            (None, Some(v)) => {
                return Err(KvError::PreconditionFailed(format!("{} ausente (se esperaba versión {})", path, v)));
            }
            (Some(current), Some(v)) if current != v => {
                return Err(KvError::PreconditionFailed(format!("{} en versión {} (se esperaba {})", path, current, v)));
            }
            _ => {}
        }
        Ok(self.write(path, value, state))
    }

    fn delete(&self, key: &Identity) -> Result<()> {
        let path = key.encode()?;
        let mut state = self.lock()?;
        if state.nodes.remove(&path).is_none() {
            return Err(KvError::NotFound(path));
        }
        state.next_version();
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    fn delete_tree(&self, prefix: &Identity) -> Result<()> {
        let root = prefix.encode()?;
        let dir = format!("{}/", root);
        let mut state = self.lock()?;
        let doomed: Vec<String> = state.nodes
                                       .keys()
                                       .filter(|k| **k == root || k.starts_with(&dir))
                                       .cloned()
                                       .collect();
        if doomed.is_empty() {
            return Err(KvError::NotFound(root));
        }
        for k in doomed {
            state.nodes.remove(&k);
        }
        state.next_version();
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    fn list_children(&self, prefix: &Identity) -> Result<Vec<(String, VersionedValue)>> {
        let dir = format!("{}/", prefix.encode()?);
        let state = self.lock()?;
        Ok(state.nodes
                .range(dir.clone()..)
                .take_while(|(k, _)| k.starts_with(&dir))
                .filter_map(|(k, v)| {
                    let name = &k[dir.len()..];
                    if name.contains('/') {
                        None
                    } else {
                        Some((name.to_string(), v.clone()))
                    }
                })
                .collect())
    }

    fn append(&self, prefix: &Identity, value: &str) -> Result<(String, Version)> {
        let root = prefix.encode()?;
        let mut state = self.lock()?;
        let version = state.next_version();
        let name = in_order_name(version);
        state.nodes.insert(format!("{}/{}", root, name), VersionedValue { version, value: value.to_string() });
        drop(state);
        self.changed.notify_all();
        Ok((name, version))
    }

    fn watch(&self, key: &Identity, since: Option<Version>, timeout: Option<Duration>) -> Result<VersionedValue> {
        let path = key.encode()?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock()?;
        let baseline = match since {
            Some(v) => Some(v),
            None => state.current(&path),
        };
        loop {
            if state.closed {
                return Err(KvError::WaitFault(format!("canal de watch cerrado: {}", path)));
            }
            match (state.nodes.get(&path), baseline) {
                (Some(node), Some(base)) if node.version != base => return Ok(node.clone()),
                (Some(node), None) => return Ok(node.clone()),
                (None, Some(_)) => return Err(KvError::NotFound(path)),
                _ => {}
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(KvError::WaitFault(format!("timeout esperando cambios en {}", path)));
                    }
                    let (guard, _) = self.changed
                                         .wait_timeout(state, deadline - now)
                                         .map_err(|e| KvError::Storage(format!("mutex poisoned: {:?}", e)))?;
                    guard
                }
                None => self.changed
                            .wait(state)
                            .map_err(|e| KvError::Storage(format!("mutex poisoned: {:?}", e)))?,
            };
        }
    }
}
