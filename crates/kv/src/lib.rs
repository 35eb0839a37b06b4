//! Crate `kv`: contrato y cliente del almacén KV consistente
//!
//! Este crate define el contrato `KvStore` (get / create-only / CAS /
//! delete / listado de hijos / append ordenado / watch), la codificación de
//! identidades jerárquicas, el cliente tipado `KvClient` y dos bloques
//! reutilizables: `KvQueue` (lista ordenada) y `KvTree` (hijos con nombre).
//! También expone `InMemoryKvStore`, útil para pruebas.
//!
//! Diseño resumido:
//! - Locking optimista: cada nodo lleva una `Version` asignada por el
//!   almacén; `update_only` con versión esperada es el único mecanismo de
//!   exclusión mutua.
//! - Los segmentos de identidad no pueden contener `/` ni `-`.
//!
//! Ejemplo rápido:
//! ```rust
//! use kv::{Identity, KvClient, InMemoryKvStore};
//! use std::sync::Arc;
//! let client = KvClient::new(Arc::new(InMemoryKvStore::new()));
//! let key = Identity::new(["entities", "workflow", "wc"]);
//! client.create_only(&key, &serde_json::json!({"description": "demo"})).unwrap();
//! ```
pub mod client;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod queue;
pub mod repository;
pub mod stubs;
pub mod tree;

pub use client::*;
pub use domain::*;
pub use errors::*;
pub use identity::*;
pub use queue::*;
pub use repository::*;
pub use stubs::*;
pub use tree::*;
