// Archivo: repository.rs
// Propósito: definir el trait `KvStore` (contrato mínimo de un almacén KV
// consistente con compare-and-swap y watch) y el trait `ValueCodec` que
// define la serialización de los valores.
use crate::domain::{Version, VersionedValue};
use crate::errors::{KvError, Result};
use crate::identity::Identity;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Contrato del almacén KV.
///
/// Las claves son identidades jerárquicas; cada nodo lleva una versión
/// asignada por el almacén que sirve como token CAS. Las implementaciones
/// deben ser seguras entre hilos: los workers no comparten nada salvo el
/// almacén.
pub trait KvStore: Send + Sync {
    /// Lee un nodo. `NotFound` si no existe.
    fn get(&self, key: &Identity) -> Result<VersionedValue>;

    /// Escribe incondicionalmente (crea o reemplaza).
    fn set(&self, key: &Identity, value: &str) -> Result<Version>;

    /// Crea el nodo sólo si no existe; `AlreadyExists` en caso contrario.
    fn create_only(&self, key: &Identity, value: &str) -> Result<Version>;

    /// Actualiza un nodo existente. Con `expected` la escritura sólo se
    /// aplica si la versión almacenada coincide (`PreconditionFailed` si no).
    /// Sin `expected` basta con que el nodo exista (`NotFound` si no).
    fn update_only(&self, key: &Identity, value: &str, expected: Option<Version>) -> Result<Version>;

    /// Elimina un nodo. `NotFound` si no existe.
    fn delete(&self, key: &Identity) -> Result<()>;

    /// Elimina el nodo y todos sus descendientes (borrado de directorio).
    /// `NotFound` si no había nada que borrar.
    fn delete_tree(&self, prefix: &Identity) -> Result<()>;

    /// Lista los hijos inmediatos de `prefix` como `(nombre, valor)`. El
    /// orden no está garantizado. Un directorio inexistente se lista vacío.
    fn list_children(&self, prefix: &Identity) -> Result<Vec<(String, VersionedValue)>>;

    /// Crea un hijo de `prefix` cuyo nombre deriva de la revisión asignada
    /// (ver `in_order_name`), garantizando orden de inserción.
    fn append(&self, prefix: &Identity, value: &str) -> Result<(String, Version)>;

    /// Suspende al llamador hasta que la versión del nodo difiera de `since`
    /// (o de la versión actual si `since` es `None`) y devuelve el nuevo
    /// valor. `WaitFault` si el canal se cierra o vence `timeout`.
    ///
    /// Con `since == None` un nodo inexistente no es un error: se espera a
    /// que alguien lo cree. Si hay versión de referencia y el nodo falta (o
    /// se borra durante la espera) el resultado es `NotFound`.
    fn watch(&self, key: &Identity, since: Option<Version>, timeout: Option<Duration>) -> Result<VersionedValue>;
}

/// Serialización enchufable de los valores del almacén.
pub trait ValueCodec: Send + Sync {
    fn encode(&self, value: &JsonValue) -> Result<String>;
    fn decode(&self, raw: &str) -> Result<JsonValue>;
}

/// Codec por defecto: JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode(&self, value: &JsonValue) -> Result<String> {
        serde_json::to_string(value).map_err(KvError::from)
    }

    fn decode(&self, raw: &str) -> Result<JsonValue> {
        serde_json::from_str(raw).map_err(KvError::from)
    }
}
