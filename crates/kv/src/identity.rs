// Archivo: identity.rs
// Propósito: representar identidades jerárquicas (tuplas de segmentos) y su
// codificación a rutas `a/b/c` del almacén.
use crate::errors::{KvError, Result};
use std::fmt;

/// Raíz de los registros de entidades.
pub const ENTITY_ROOT: &str = "entities";
/// Raíz de las colas ordenadas (datasets, limpieza).
pub const QUEUE_ROOT: &str = "queues";
/// Raíz de los árboles de relaciones/sesiones.
pub const TREE_ROOT: &str = "entity_trees";

const SEPARATOR: char = '/';
const RESERVED: [char; 2] = ['/', '-'];

/// Identidad jerárquica. Los segmentos se validan al codificar, no al
/// construir, para que los errores lleguen al llamador como
/// `ReservedCharacter` en el momento de tocar el almacén.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    segments: Vec<String>,
}

impl Identity {
    pub fn new<I, S>(segments: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        Self { segments: segments.into_iter().map(Into::into).collect() }
    }

    /// Devuelve una nueva identidad con `segment` añadido al final.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Concatena otra identidad.
    pub fn join(&self, other: &Identity) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Codifica la identidad como ruta. Falla con `ReservedCharacter` si
    /// algún segmento está vacío o contiene `/` o `-`.
    pub fn encode(&self) -> Result<String> {
        for segment in &self.segments {
            validate_segment(segment)?;
        }
        Ok(self.segments.join(&SEPARATOR.to_string()))
    }

    /// Operación inversa de `encode`.
    pub fn decode(path: &str) -> Result<Self> {
        let identity = Identity::new(path.split(SEPARATOR));
        identity.encode()?;
        Ok(identity)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Valida un segmento suelto.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(KvError::ReservedCharacter("segmento vacío".into()));
    }
    if segment.contains(&RESERVED[..]) {
        return Err(KvError::ReservedCharacter(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_segments_with_slash() {
        let id = Identity::new([ENTITY_ROOT, "invocation", "wf", "abc"]);
        assert_eq!(id.encode().unwrap(), "entities/invocation/wf/abc");
    }

    #[test]
    fn rejects_reserved_characters() {
        let dash = Identity::new(["entities", "my-workflow"]);
        assert!(matches!(dash.encode(), Err(KvError::ReservedCharacter(_))));
        let slash = Identity::new(["entities", "a/b"]);
        assert!(matches!(slash.encode(), Err(KvError::ReservedCharacter(_))));
        let empty = Identity::new(["entities", ""]);
        assert!(matches!(empty.encode(), Err(KvError::ReservedCharacter(_))));
    }

    #[test]
    fn decode_roundtrips_path() {
        let id = Identity::decode("queues/dataset/wf/inv/post_reduce").unwrap();
        assert_eq!(id.len(), 5);
        assert_eq!(id.last(), Some("post_reduce"));
    }
}
