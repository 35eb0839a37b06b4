use crate::schema::kv_nodes::dsl as nodes_dsl;
use crate::schema::kv_revision::dsl as rev_dsl;
use crate::schema;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use kv::{in_order_name, Identity, KvError, KvStore, Version, VersionedValue};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
#[cfg(feature = "pg")]
type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;
/// Intervalo de sondeo de `watch`: la BD no ofrece notificaciones.
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Almacén KV sobre una tabla `kv_nodes` y un contador global `kv_revision`.
///
/// Cada escritura toma la siguiente revisión dentro de su transacción; la
/// actualización de la fila de revisión serializa a los escritores, de modo
/// que la comprobación de versión y la escritura son atómicas.
pub struct DieselKvStore {
  pool: Arc<DbPool>,
}
impl DieselKvStore {
  pub fn new(database_url: &str) -> Result<Self, KvError> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let builder = Pool::builder().max_size(4);
    #[cfg(not(feature = "pg"))]
    let builder = builder.connection_customizer(Box::new(SqlitePragmas));
    let pool = builder.build(manager)
                      .map_err(|e| KvError::Storage(format!("no se pudo crear el pool de conexiones: {}", e)))?;
    let store = DieselKvStore { pool: Arc::new(pool) };
    store.prepare()?;
    info!("kv store ready");
    Ok(store)
  }
  fn prepare(&self) -> Result<(), KvError> {
    let mut c = self.conn()?;
    #[cfg(not(feature = "pg"))]
    {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
    }
    c.run_pending_migrations(MIGRATIONS).map_err(|e| {
                                          warn!("migrations failed: {}", e);
                                          KvError::Storage(format!("migraciones: {}", e))
                                        })?;
    Ok(())
  }
  fn conn_raw(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>, r2d2::Error> {
    self.pool.get()
  }
  // Ausente es `None`, no un error.
  fn try_get(&self, key: &Identity) -> Result<Option<VersionedValue>, KvError> {
    match self.get(key) {
      Ok(node) => Ok(Some(node)),
      Err(KvError::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>, KvError> {
    self.conn_raw().map_err(|e| KvError::Storage(format!("pool: {}", e)))
  }
}
// busy_timeout es por conexión: se aplica a cada conexión del pool.
#[cfg(not(feature = "pg"))]
#[derive(Debug)]
struct SqlitePragmas;
#[cfg(not(feature = "pg"))]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
    diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(conn).map_err(diesel::r2d2::Error::QueryError)?;
    Ok(())
  }
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::kv_nodes)]
struct NodeRow {
  pub node_key: String,
  pub parent_key: String,
  pub node_name: String,
  pub node_value: String,
  pub version: i64,
}
impl NodeRow {
  fn into_versioned(self) -> VersionedValue {
    VersionedValue { version: Version(self.version as u64),
                     value: self.node_value }
  }
}
/// Error interno de transacción: fallo de BD o resultado KV que aborta.
enum TxError {
  Db(DieselError),
  Kv(KvError),
}
impl From<DieselError> for TxError {
  fn from(e: DieselError) -> Self {
    TxError::Db(e)
  }
}
impl From<TxError> for KvError {
  fn from(e: TxError) -> Self {
    match e {
      TxError::Db(e) => KvError::Storage(format!("db: {}", e)),
      TxError::Kv(e) => e,
    }
  }
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, KvError> {
  res.map_err(|e| KvError::Storage(format!("db: {}", e)))
}
fn split_key(key: &Identity) -> Result<(String, String, String), KvError> {
  let full = key.encode()?;
  let segments = key.segments();
  let (name, parent) = match segments.split_last() {
    Some((name, parent)) => (name.clone(), parent.join("/")),
    None => return Err(KvError::ReservedCharacter("identidad vacía".into())),
  };
  Ok((full, parent, name))
}
fn next_revision(conn: &mut DbConn) -> std::result::Result<i64, DieselError> {
  diesel::update(rev_dsl::kv_revision.filter(rev_dsl::id.eq(1))).set(rev_dsl::revision.eq(rev_dsl::revision + 1))
                                                                 .execute(conn)?;
  rev_dsl::kv_revision.filter(rev_dsl::id.eq(1)).select(rev_dsl::revision).first::<i64>(conn)
}
fn find_node(conn: &mut DbConn, key: &str) -> std::result::Result<Option<NodeRow>, DieselError> {
  nodes_dsl::kv_nodes.filter(nodes_dsl::node_key.eq(key)).first::<NodeRow>(conn).optional()
}
fn insert_node(conn: &mut DbConn,
               key: &str,
               parent: &str,
               name: &str,
               value: &str,
               version: i64)
               -> std::result::Result<(), DieselError> {
  let row = NodeRow { node_key: key.to_string(),
                      parent_key: parent.to_string(),
                      node_name: name.to_string(),
                      node_value: value.to_string(),
                      version };
  diesel::insert_into(nodes_dsl::kv_nodes).values(&row).execute(conn)?;
  Ok(())
}
fn write_node(conn: &mut DbConn, key: &str, value: &str, version: i64) -> std::result::Result<usize, DieselError> {
  diesel::update(nodes_dsl::kv_nodes.filter(nodes_dsl::node_key.eq(key))).set((nodes_dsl::node_value.eq(value),
                                                                                nodes_dsl::version.eq(version)))
                                                                           .execute(conn)
}
impl KvStore for DieselKvStore {
  fn get(&self, key: &Identity) -> Result<VersionedValue, KvError> {
    let full = key.encode()?;
    let mut conn = self.conn()?;
    let row = map_db_err(find_node(&mut conn, &full))?;
    row.map(NodeRow::into_versioned).ok_or(KvError::NotFound(full))
  }
  fn set(&self, key: &Identity, value: &str) -> Result<Version, KvError> {
    let (full, parent, name) = split_key(key)?;
    let mut conn = self.conn()?;
    let v = conn.transaction::<i64, TxError, _>(|c| {
                  let v = next_revision(c)?;
                  if find_node(c, &full)?.is_some() {
                    write_node(c, &full, value, v)?;
                  } else {
                    insert_node(c, &full, &parent, &name, value, v)?;
                  }
                  Ok(v)
                })?;
    debug!("set [{}] v{}", full, v);
    Ok(Version(v as u64))
  }
  fn create_only(&self, key: &Identity, value: &str) -> Result<Version, KvError> {
    let (full, parent, name) = split_key(key)?;
    let mut conn = self.conn()?;
    let v = conn.transaction::<i64, TxError, _>(|c| {
                  let v = next_revision(c)?;
                  if find_node(c, &full)?.is_some() {
                    return Err(TxError::Kv(KvError::AlreadyExists(full.clone())));
                  }
                  insert_node(c, &full, &parent, &name, value, v)?;
                  Ok(v)
                })?;
    Ok(Version(v as u64))
  }
  fn update_only(&self, key: &Identity, value: &str, expected: Option<Version>) -> Result<Version, KvError> {
    let full = key.encode()?;
    let mut conn = self.conn()?;
    let v = conn.transaction::<i64, TxError, _>(|c| {
                  let v = next_revision(c)?;
                  let current = match find_node(c, &full)? {
                    Some(row) => row,
                    None if expected.is_some() => {
                      return Err(TxError::Kv(KvError::PreconditionFailed(format!("{} no existe", full))))
                    }
                    None => return Err(TxError::Kv(KvError::NotFound(full.clone()))),
                  };
                  if let Some(exp) = expected {
                    if current.version as u64 != exp.0 {
                      return Err(TxError::Kv(KvError::PreconditionFailed(format!("{} esperada v{}, almacenada v{}",
                                                                                 full, exp, current.version))));
                    }
                  }
                  let affected =
                    diesel::update(nodes_dsl::kv_nodes.filter(nodes_dsl::node_key.eq(&full))
                                                      .filter(nodes_dsl::version.eq(current.version)))
                      .set((nodes_dsl::node_value.eq(value), nodes_dsl::version.eq(v)))
                      .execute(c)?;
                  if affected != 1 {
                    return Err(TxError::Kv(KvError::PreconditionFailed(full.clone())));
                  }
                  Ok(v)
                })?;
    Ok(Version(v as u64))
  }
  fn delete(&self, key: &Identity) -> Result<(), KvError> {
    let full = key.encode()?;
    let mut conn = self.conn()?;
    let affected =
      map_db_err(diesel::delete(nodes_dsl::kv_nodes.filter(nodes_dsl::node_key.eq(&full))).execute(&mut conn))?;
    if affected == 0 {
      return Err(KvError::NotFound(full));
    }
    Ok(())
  }
  fn delete_tree(&self, prefix: &Identity) -> Result<(), KvError> {
    let full = prefix.encode()?;
    let dir = format!("{}/", full);
    let mut conn = self.conn()?;
    // `_` es comodín en LIKE: se filtra de nuevo por prefijo exacto.
    let candidates: Vec<String> =
      map_db_err(nodes_dsl::kv_nodes.filter(nodes_dsl::node_key.eq(&full)
                                                               .or(nodes_dsl::node_key.like(format!("{}%", dir))))
                                    .select(nodes_dsl::node_key)
                                    .load::<String>(&mut conn))?;
    let keys: Vec<String> = candidates.into_iter().filter(|k| *k == full || k.starts_with(&dir)).collect();
    if keys.is_empty() {
      return Err(KvError::NotFound(full));
    }
    map_db_err(diesel::delete(nodes_dsl::kv_nodes.filter(nodes_dsl::node_key.eq_any(&keys))).execute(&mut conn))?;
    debug!("deleted tree [{}] ({} nodes)", full, keys.len());
    Ok(())
  }
  fn list_children(&self, prefix: &Identity) -> Result<Vec<(String, VersionedValue)>, KvError> {
    let full = prefix.encode()?;
    let mut conn = self.conn()?;
    let rows = map_db_err(nodes_dsl::kv_nodes.filter(nodes_dsl::parent_key.eq(&full)).load::<NodeRow>(&mut conn))?;
    Ok(rows.into_iter().map(|r| (r.node_name.clone(), r.into_versioned())).collect())
  }
  fn append(&self, prefix: &Identity, value: &str) -> Result<(String, Version), KvError> {
    let parent = prefix.encode()?;
    let mut conn = self.conn()?;
    let (name, v) = conn.transaction::<(String, i64), TxError, _>(|c| {
                          let v = next_revision(c)?;
                          let name = in_order_name(Version(v as u64));
                          let full = format!("{}/{}", parent, name);
                          insert_node(c, &full, &parent, &name, value, v)?;
                          Ok((name, v))
                        })?;
    Ok((name, Version(v as u64)))
  }
  fn watch(&self, key: &Identity, since: Option<Version>, timeout: Option<Duration>) -> Result<VersionedValue, KvError> {
    let baseline = match since {
      Some(v) => Some(v),
      None => self.try_get(key)?.map(|n| n.version),
    };
    let started = Instant::now();
    loop {
      match (self.try_get(key)?, baseline) {
        (Some(node), Some(base)) if node.version != base => return Ok(node),
        (Some(node), None) => return Ok(node),
        (None, Some(_)) => return Err(KvError::NotFound(key.to_string())),
        _ => {}
      }
      if let Some(limit) = timeout {
        if started.elapsed() >= limit {
          return Err(KvError::WaitFault(format!("timeout esperando cambios en {}", key)));
        }
      }
      thread::sleep(WATCH_POLL_INTERVAL);
    }
  }
}
#[cfg(feature = "pg")]
pub fn new_from_env() -> Result<DieselKvStore, KvError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("MR_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                      .map_err(|_| KvError::Storage("MR_DB_URL / DATABASE_URL not set".into()))?;
  if !(url.starts_with("postgres") || url.starts_with("postgresql://") || url.contains('@')) {
    return Err(KvError::Storage("jobx-persistence: MR_DB_URL does not look like Postgres URL".into()));
  }
  DieselKvStore::new(&url)
}
#[cfg(not(feature = "pg"))]
pub fn new_from_env() -> Result<DieselKvStore, KvError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("MR_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                      .map_err(|_| KvError::Storage("MR_DB_URL / DATABASE_URL not set".into()))?;
  let url_l = url.to_lowercase();
  if url_l.starts_with("postgres") {
    return Err(KvError::Storage("jobx-persistence was compiled without 'pg' feature; enable the 'pg' feature to use \
                                 Postgres"
                                          .into()));
  }
  DieselKvStore::new(&url)
}
// Helper de pruebas: SQLite explícito, sin leer el entorno.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(database_url: &str) -> Result<DieselKvStore, KvError> {
  DieselKvStore::new(database_url)
}
