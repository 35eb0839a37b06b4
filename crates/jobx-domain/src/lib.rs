//! Modelo de entidades del motor map-reduce (workflow, job, step, handler,
//! request, invocation) y las colecciones ordenadas que lo acompañan
//! (datasets, relaciones, sesiones, reclamos y cola de limpieza).
pub mod claims;
pub mod cleanup_queue;
pub mod dataset;
pub mod entity;
pub mod errors;
pub mod handler;
pub mod invocation;
pub mod job;
pub mod pair;
pub mod relationships;
pub mod request;
pub mod sessions;
pub mod step;
pub mod workflow;

pub use claims::ClaimTree;
pub use cleanup_queue::{CleanupEntry, RequestCleanupQueue};
pub use dataset::{DatasetKind, DatasetQueue};
pub use entity::{entity_key, Entity, EntityStore, Record, DEFAULT_ATOMIC_UPDATE_MAX_ATTEMPTS};
pub use errors::DomainError;
pub use handler::{compute_handlers_state, source_version, ArgumentSpec, Handler, HandlerType, CAPABILITY_NONE};
pub use invocation::{Direction, FanOut, Invocation};
pub use job::Job;
pub use pair::{cmp_keys, group_by_key, merge_by_key, Group, Pair, PairRecord};
pub use relationships::{RelationKind, RelationshipTree};
pub use request::Request;
pub use sessions::SessionTree;
pub use step::Step;
pub use workflow::Workflow;

/// Identificador opaco apto para el almacén (hex sin guiones).
pub fn new_id() -> String {
  uuid::Uuid::new_v4().simple().to_string()
}
