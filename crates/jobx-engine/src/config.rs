use crate::errors::EngineError;
use jobx_domain::DEFAULT_ATOMIC_UPDATE_MAX_ATTEMPTS;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOPIC_MAP_TEMPLATE: &str = "mr.{workflow_name}.map";
pub const DEFAULT_TOPIC_REDUCE_TEMPLATE: &str = "mr.{workflow_name}.reduce";

/// Configuracion del motor.
///
/// `Default` da los valores de producción; `from_env` los sobrescribe con
/// las variables `MR_*` (cargando antes `.env` si existe).
#[derive(Clone, Debug)]
pub struct EngineConfig {
  pub atomic_update_max_attempts: u32,
  /// Crédito de mensajes en vuelo (cota de workers concurrentes).
  pub max_in_flight: usize,
  /// Cota opcional de las esperas bloqueantes.
  pub wait_timeout: Option<Duration>,
  pub topic_map_template: String,
  pub topic_reduce_template: String,
  pub do_cleanup_requests: bool,
  pub cleanup_batch_size: usize,
  pub cleanup_quiet_period: Duration,
  pub idempotency_fence: bool,
  /// Raíz de la capacidad de ficheros de los handlers.
  pub file_root: PathBuf,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig { atomic_update_max_attempts: DEFAULT_ATOMIC_UPDATE_MAX_ATTEMPTS,
                   max_in_flight: 32,
                   wait_timeout: None,
                   topic_map_template: DEFAULT_TOPIC_MAP_TEMPLATE.to_string(),
                   topic_reduce_template: DEFAULT_TOPIC_REDUCE_TEMPLATE.to_string(),
                   do_cleanup_requests: true,
                   cleanup_batch_size: 1000,
                   cleanup_quiet_period: Duration::from_millis(500),
                   idempotency_fence: true,
                   file_root: PathBuf::from("/tmp/mr_files") }
  }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, EngineError> {
  match std::env::var(name) {
    Ok(raw) if raw.trim().is_empty() => Ok(None),
    Ok(raw) => raw.trim()
                  .parse::<T>()
                  .map(Some)
                  .map_err(|_| EngineError::Validation(format!("{} tiene un valor inválido: {}", name, raw))),
    Err(_) => Ok(None),
  }
}

fn env_flag(name: &str) -> Result<Option<bool>, EngineError> {
  match std::env::var(name) {
    Ok(raw) => match raw.trim().to_lowercase().as_str() {
      "" => Ok(None),
      "1" | "true" | "yes" | "on" => Ok(Some(true)),
      "0" | "false" | "no" | "off" => Ok(Some(false)),
      _ => Err(EngineError::Validation(format!("{} tiene un valor inválido: {}", name, raw))),
    },
    Err(_) => Ok(None),
  }
}

fn env_seconds(name: &str) -> Result<Option<Duration>, EngineError> {
  match env_parse::<f64>(name)? {
    Some(s) if s >= 0.0 && s.is_finite() => Ok(Some(Duration::from_secs_f64(s))),
    Some(_) => Err(EngineError::Validation(format!("{} debe ser un número de segundos no negativo", name))),
    None => Ok(None),
  }
}

impl EngineConfig {
  pub fn from_env() -> Result<Self, EngineError> {
    dotenvy::dotenv().ok();
    let mut cfg = EngineConfig::default();
    if let Some(v) = env_parse::<u32>("MR_ATOMIC_UPDATE_MAX_ATTEMPTS")? {
      cfg.atomic_update_max_attempts = v.max(1);
    }
    if let Some(v) = env_parse::<usize>("MR_MAX_IN_FLIGHT")? {
      cfg.max_in_flight = v.max(1);
    }
    if let Some(v) = env_seconds("MR_WAIT_TIMEOUT_S")? {
      cfg.wait_timeout = Some(v);
    }
    if let Ok(v) = std::env::var("MR_TOPIC_MAP_TEMPLATE") {
      if !v.trim().is_empty() {
        cfg.topic_map_template = v;
      }
    }
    if let Ok(v) = std::env::var("MR_TOPIC_REDUCE_TEMPLATE") {
      if !v.trim().is_empty() {
        cfg.topic_reduce_template = v;
      }
    }
    if let Some(v) = env_flag("MR_DO_CLEANUP_REQUESTS")? {
      cfg.do_cleanup_requests = v;
    }
    if let Some(v) = env_parse::<usize>("MR_CLEANUP_BATCH_SIZE")? {
      cfg.cleanup_batch_size = v.max(1);
    }
    if let Some(v) = env_seconds("MR_CLEANUP_MANDATORY_QUIET_PERIOD_S")? {
      cfg.cleanup_quiet_period = v;
    }
    if let Some(v) = env_flag("MR_IDEMPOTENCY_FENCE")? {
      cfg.idempotency_fence = v;
    }
    if let Ok(v) = std::env::var("MR_FILE_ROOT") {
      if !v.trim().is_empty() {
        cfg.file_root = PathBuf::from(v);
      }
    }
    Ok(cfg)
  }

  pub fn map_topic(&self, workflow_name: &str, capability: Option<&str>) -> String {
    render_topic(&self.topic_map_template, workflow_name, capability)
  }

  pub fn reduce_topic(&self, workflow_name: &str, capability: Option<&str>) -> String {
    render_topic(&self.topic_reduce_template, workflow_name, capability)
  }
}

/// Sustituye `{workflow_name}` y añade la capacidad como sufijo.
pub fn render_topic(template: &str, workflow_name: &str, capability: Option<&str>) -> String {
  let topic = template.replace("{workflow_name}", workflow_name);
  match capability {
    Some(cap) => format!("{}.{}", topic, cap),
    None => topic,
  }
}
