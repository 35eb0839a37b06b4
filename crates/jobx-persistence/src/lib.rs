//! Implementación durable del trait `KvStore` sobre Diesel (SQLite por
//! defecto, Postgres con la feature `pg`). La implementación detallada está
//! en `kv_persistence.rs`.

mod kv_persistence;
pub mod schema;

#[cfg(not(feature = "pg"))]
pub use kv_persistence::new_sqlite_for_test;
pub use kv_persistence::{new_from_env, DieselKvStore, MIGRATIONS};
