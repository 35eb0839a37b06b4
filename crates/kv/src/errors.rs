// Archivo: errors.rs
// Propósito: definir los errores de la capa KV y el alias Result<T> usado por
// las APIs del crate.
use thiserror::Error;

/// Errores de la capa KV.
///
/// - `AlreadyExists`: `create_only` sobre una clave existente.
/// - `NotFound`: la clave (o el directorio) no existe.
/// - `PreconditionFailed`: la versión almacenada no coincide con la esperada.
/// - `ReservedCharacter`: un segmento de identidad contiene `/` o `-`.
/// - `WaitFault`: el canal de `watch` se cerró o expiró.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// La clave ya existe.
    #[error("Ya existe: {0}")]
    AlreadyExists(String),
    /// La clave no existe.
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Conflicto optimista (versión esperada distinta de la almacenada).
    #[error("Precondición fallida: {0}")]
    PreconditionFailed(String),
    /// Segmento de identidad inválido.
    #[error("Carácter reservado en segmento: {0}")]
    ReservedCharacter(String),
    /// Falla mientras se esperaba un cambio.
    #[error("Falla de espera: {0}")]
    WaitFault(String),
    /// Error al codificar/decodificar un valor.
    #[error("Error de codificación: {0}")]
    Encoding(String),
    /// Error genérico de almacenamiento (BD, mutex envenenado, etc.).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound(_))
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, KvError::PreconditionFailed(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, KvError::AlreadyExists(_))
    }
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Encoding(e.to_string())
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, KvError>;
