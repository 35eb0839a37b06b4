// entity.rs
//
// Registro genérico de entidades sobre el KV: cada entidad vive en
// `entities/<clase>/<identidad...>` y lleva la versión capturada al cargarla.
// `save` es "enforce-pristine": sólo escribe si nadie la tocó desde la carga.
use crate::DomainError;
use kv::{Identity, KvClient, Version, ENTITY_ROOT};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Intentos por defecto de `atomic_update`.
pub const DEFAULT_ATOMIC_UPDATE_MAX_ATTEMPTS: u32 = 5;

/// Contrato de un tipo persistido como entidad.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync {
  /// Nombre de clase usado en la ruta (`entities/<CLASS>/...`).
  const CLASS: &'static str;

  /// Segmentos de identidad (sin la raíz ni la clase).
  fn identity(&self) -> Vec<String>;

  /// Hook ejecutado antes de cada escritura (validación, campos derivados).
  fn presave(&mut self) -> Result<(), DomainError> {
    Ok(())
  }
}

/// Ruta completa de una entidad.
pub fn entity_key<E: Entity>(identity: &[&str]) -> Identity {
  Identity::new([ENTITY_ROOT, E::CLASS]).join(&Identity::new(identity.iter().copied()))
}

fn record_key<E: Entity>(data: &E) -> Identity {
  Identity::new([ENTITY_ROOT, E::CLASS]).join(&Identity::new(data.identity()))
}

/// Entidad junto a la versión observada. `version == None` significa que aún
/// no se ha persistido.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<E> {
  pub data: E,
  pub version: Option<Version>,
}

impl<E> Record<E> {
  pub fn new(data: E) -> Self {
    Self { data, version: None }
  }

  pub fn is_persisted(&self) -> bool {
    self.version.is_some()
  }
}

/// Acceso tipado a entidades.
#[derive(Clone)]
pub struct EntityStore {
  client: KvClient,
  max_attempts: u32,
}

impl EntityStore {
  pub fn new(client: KvClient) -> Self {
    Self::with_max_attempts(client, DEFAULT_ATOMIC_UPDATE_MAX_ATTEMPTS)
  }

  pub fn with_max_attempts(client: KvClient, max_attempts: u32) -> Self {
    Self { client, max_attempts: max_attempts.max(1) }
  }

  pub fn client(&self) -> &KvClient {
    &self.client
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  /// Persiste una entidad nueva (`create_only`).
  pub fn create<E: Entity>(&self, data: E) -> Result<Record<E>, DomainError> {
    let mut record = Record::new(data);
    self.save(&mut record)?;
    Ok(record)
  }

  pub fn load<E: Entity>(&self, identity: &[&str]) -> Result<Record<E>, DomainError> {
    let (version, data) = self.client.get::<E>(&entity_key::<E>(identity))?;
    Ok(Record { data, version: Some(version) })
  }

  /// Igual que `load` pero traduce `NotFound` a `None`.
  pub fn try_load<E: Entity>(&self, identity: &[&str]) -> Result<Option<Record<E>>, DomainError> {
    match self.load(identity) {
      Ok(record) => Ok(Some(record)),
      Err(e) if e.is_not_found() => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// Escribe la entidad. Nueva: `create_only`. Cargada: `update_only` con la
  /// versión capturada; un cambio concurrente produce `PreconditionFailed`.
  pub fn save<E: Entity>(&self, record: &mut Record<E>) -> Result<(), DomainError> {
    record.data.presave()?;
    let key = record_key(&record.data);
    let version = match record.version {
      None => self.client.create_only(&key, &record.data)?,
      Some(expected) => self.client.update_only(&key, &record.data, Some(expected))?,
    };
    debug!("entity saved: [{}] v{}", key, version);
    record.version = Some(version);
    Ok(())
  }

  /// Relee la entidad desde el almacén.
  pub fn refresh<E: Entity>(&self, record: &mut Record<E>) -> Result<(), DomainError> {
    let (version, data) = self.client.get::<E>(&record_key(&record.data))?;
    record.data = data;
    record.version = Some(version);
    Ok(())
  }

  pub fn delete<E: Entity>(&self, identity: &[&str]) -> Result<(), DomainError> {
    self.client.delete(&entity_key::<E>(identity))?;
    Ok(())
  }

  /// Lista las entidades hijas de `parent` (p. ej. todos los handlers de un
  /// workflow). Orden no garantizado.
  pub fn list<E: Entity>(&self, parent: &[&str]) -> Result<Vec<Record<E>>, DomainError> {
    Ok(self.client
           .list::<E>(&entity_key::<E>(parent))?
           .into_iter()
           .map(|(_, version, data)| Record { data, version: Some(version) })
           .collect())
  }

  /// Espera a que la entidad cambie respecto a `since` (o a su versión
  /// actual) y devuelve el nuevo estado.
  pub fn watch<E: Entity>(&self,
                          identity: &[&str],
                          since: Option<Version>,
                          timeout: Option<Duration>)
                          -> Result<Record<E>, DomainError> {
    let (version, data) = self.client.watch::<E>(&entity_key::<E>(identity), since, timeout)?;
    Ok(Record { data, version: Some(version) })
  }

  /// Lee, aplica `mutate` y escribe con CAS; ante `PreconditionFailed`
  /// vuelve a leer y reintenta hasta `max_attempts`.
  pub fn atomic_update<E, F>(&self, identity: &[&str], mut mutate: F) -> Result<Record<E>, DomainError>
    where E: Entity,
          F: FnMut(&mut E) -> Result<(), DomainError>
  {
    for attempt in 1..=self.max_attempts {
      let mut record = self.load::<E>(identity)?;
      mutate(&mut record.data)?;
      match self.save(&mut record) {
        Ok(()) => return Ok(record),
        Err(e) if e.is_precondition_failed() => {
          warn!("atomic update conflict on [{}] (attempt {}/{})",
                identity.join("/"),
                attempt,
                self.max_attempts);
        }
        Err(e) => return Err(e),
      }
    }
    Err(DomainError::AtomicUpdateExhausted { identity: format!("{}/{}", E::CLASS, identity.join("/")),
                                             attempts: self.max_attempts })
  }
}
