// Archivo: domain.rs
// Propósito: tipos básicos compartidos por el contrato `KvStore` (versión y
// valor versionado).
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token de versión asignado por el almacén. Es opaco para los llamadores
/// salvo por su uso como token CAS; las implementaciones lo hacen crecer de
/// forma monótona (revisión global, como el `modified_index` de etcd).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub u64);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Valor crudo (ya codificado) junto a la versión del nodo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub version: Version,
    pub value: String,
}

/// Nombre del hijo creado por `append`: la revisión rellenada con ceros, de
/// modo que el orden lexicográfico coincide con el orden de inserción.
pub fn in_order_name(version: Version) -> String {
    format!("{:020}", version.0)
}
