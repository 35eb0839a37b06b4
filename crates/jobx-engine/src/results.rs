use crate::errors::EngineError;
use crate::handler::pairs_argument;
use jobx_domain::{Pair, Request};
use log::info;
use serde_json::{json, Value as JsonValue};
use std::fs;
use std::path::PathBuf;

/// Entrega del resultado de una petición terminada. Para peticiones no
/// bloqueantes es el único punto donde el resultado es observable.
pub trait ResultWriter: Send + Sync {
  fn render(&self, request: &Request, pairs: &[Pair]) -> Result<Option<JsonValue>, EngineError>;
}

/// Devuelve el resultado como cuerpo de respuesta `{"pairs": [...]}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineResultWriter;

impl ResultWriter for InlineResultWriter {
  fn render(&self, _request: &Request, pairs: &[Pair]) -> Result<Option<JsonValue>, EngineError> {
    Ok(Some(json!({ "pairs": pairs_argument(pairs) })))
  }
}

/// Escribe `<dir>/<request_id>.json` y no devuelve cuerpo.
#[derive(Debug, Clone)]
pub struct FileResultWriter {
  dir: PathBuf,
}

impl FileResultWriter {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn path_for(&self, request_id: &str) -> PathBuf {
    self.dir.join(format!("{}.json", request_id))
  }
}

impl ResultWriter for FileResultWriter {
  fn render(&self, request: &Request, pairs: &[Pair]) -> Result<Option<JsonValue>, EngineError> {
    fs::create_dir_all(&self.dir)?;
    let body = json!({
      "request_id": request.request_id,
      "workflow_name": request.workflow_name,
      "job_name": request.job_name,
      "pairs": pairs_argument(pairs),
    });
    let path = self.path_for(&request.request_id);
    fs::write(&path, serde_json::to_vec_pretty(&body)?)?;
    info!("result for request [{}] written to {}", request.request_id, path.display());
    Ok(None)
  }
}
