//! Capacidad de ejecución de handlers.
//!
//! El motor no sabe cómo se ejecuta un handler: sólo consume
//! `HandlerRunner::run_handler(nombre, argumentos, contexto)`, que devuelve
//! una secuencia perezosa y no reiniciable de elementos más la salida
//! capturada. En un mapper el primer elemento es la directiva
//! (`MapTo(step)` o `Return`) y el resto son pares.
use crate::errors::EngineError;
use crate::notify::Notifier;
use jobx_domain::{Group, Pair, SessionTree};
use log::{log, Level};
use serde_json::{json, Map, Value as JsonValue};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Mapa de argumentos entregado al handler (`arguments`, `results`, ...).
pub type HandlerArguments = Map<String, JsonValue>;

/// Pares como argumento de handler: `[[k, v], ...]`.
pub fn pairs_argument(pairs: &[Pair]) -> JsonValue {
  JsonValue::Array(pairs.iter().map(|(k, v)| json!([k, v])).collect())
}

/// Grupos como argumento de handler: `[[k, [v, ...]], ...]`.
pub fn groups_argument(groups: &[Group]) -> JsonValue {
  JsonValue::Array(groups.iter().map(|g| json!([g.key, g.values])).collect())
}

/// Secuencia perezosa de pares.
pub type PairStream = Box<dyn Iterator<Item = Result<Pair, EngineError>> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
  /// Cada par siguiente crea una invocación hija del step indicado.
  MapTo(String),
  /// Los pares siguientes son el resultado de esta invocación.
  Return,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerItem {
  Directive(Directive),
  Pair(Pair),
}

/// Resultado de `run_handler`.
pub struct HandlerOutput {
  items: Box<dyn Iterator<Item = Result<HandlerItem, EngineError>> + Send>,
  handler: String,
  pub stdout: String,
  pub stderr: String,
}

impl HandlerOutput {
  pub fn new<I>(handler: &str, items: I) -> Self
    where I: Iterator<Item = Result<HandlerItem, EngineError>> + Send + 'static
  {
    Self { items: Box::new(items), handler: handler.to_string(), stdout: String::new(), stderr: String::new() }
  }

  /// Salida de un mapper que mapea hacia `step`.
  pub fn map_to(handler: &str, step: &str, pairs: Vec<Pair>) -> Self {
    let first = std::iter::once(Ok(HandlerItem::Directive(Directive::MapTo(step.to_string()))));
    Self::new(handler, first.chain(pairs.into_iter().map(|p| Ok(HandlerItem::Pair(p)))))
  }

  /// Salida de un mapper que devuelve resultados.
  pub fn returning(handler: &str, pairs: Vec<Pair>) -> Self {
    let first = std::iter::once(Ok(HandlerItem::Directive(Directive::Return)));
    Self::new(handler, first.chain(pairs.into_iter().map(|p| Ok(HandlerItem::Pair(p)))))
  }

  /// Salida de un combinador o reductor: sólo pares.
  pub fn pairs(handler: &str, pairs: Vec<Pair>) -> Self {
    Self::new(handler, pairs.into_iter().map(|p| Ok(HandlerItem::Pair(p))))
  }

  pub fn with_output(mut self, stdout: &str, stderr: &str) -> Self {
    self.stdout = stdout.to_string();
    self.stderr = stderr.to_string();
    self
  }

  fn failure(&self, message: String) -> EngineError {
    EngineError::HandlerExecution { handler: self.handler.clone(),
                                    message,
                                    stdout: self.stdout.clone(),
                                    stderr: self.stderr.clone() }
  }

  /// Consume la directiva inicial y devuelve el resto como pares.
  pub fn into_directive(mut self) -> Result<(Directive, PairStream), EngineError> {
    let directive = match self.items.next() {
      Some(Ok(HandlerItem::Directive(d))) => d,
      Some(Ok(HandlerItem::Pair(_))) => {
        return Err(self.failure("el primer elemento debe ser una directiva MapTo/Return".to_string()))
      }
      Some(Err(e)) => return Err(e),
      None => return Err(self.failure("el handler no produjo ninguna directiva".to_string())),
    };
    Ok((directive, self.into_pairs()))
  }

  /// Interpreta todos los elementos como pares; una directiva es un error.
  pub fn into_pairs(self) -> PairStream {
    let handler = self.handler;
    let stdout = self.stdout;
    let stderr = self.stderr;
    Box::new(self.items.map(move |item| match item {
                         Ok(HandlerItem::Pair(p)) => Ok(p),
                         Ok(HandlerItem::Directive(d)) => {
                           Err(EngineError::HandlerExecution { handler: handler.clone(),
                                                               message: format!("directiva inesperada: {:?}", d),
                                                               stdout: stdout.clone(),
                                                               stderr: stderr.clone() })
                         }
                         Err(e) => Err(e),
                       }))
  }
}

/// Capacidades ofrecidas a un handler durante su ejecución: ficheros, log,
/// sesión de la invocación y notificaciones.
#[derive(Clone)]
pub struct HandlerContext {
  pub workflow_name: String,
  pub request_id: String,
  pub invocation_id: String,
  session: SessionTree,
  notifier: Arc<dyn Notifier>,
  file_root: PathBuf,
}

impl HandlerContext {
  pub fn new(workflow_name: &str,
             request_id: &str,
             invocation_id: &str,
             session: SessionTree,
             notifier: Arc<dyn Notifier>,
             file_root: PathBuf)
             -> Self {
    Self { workflow_name: workflow_name.to_string(),
           request_id: request_id.to_string(),
           invocation_id: invocation_id.to_string(),
           session,
           notifier,
           file_root }
  }

  pub fn session_get(&self, name: &str) -> Result<Option<JsonValue>, EngineError> {
    Ok(self.session.get(name)?)
  }

  pub fn session_set(&self, name: &str, value: &JsonValue) -> Result<(), EngineError> {
    Ok(self.session.set(name, value)?)
  }

  pub fn log(&self, level: Level, message: &str) {
    log!(target: "jobx::handler", level, "[{}] {}", self.invocation_id, message);
  }

  pub fn notify(&self, subject: &str, message: &str) {
    self.notifier.notify(subject, message);
  }

  /// Ruta dentro del directorio del workflow; rechaza rutas absolutas y `..`.
  pub fn file_path(&self, relative: &str) -> Result<PathBuf, EngineError> {
    let rel = Path::new(relative);
    if relative.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
      return Err(EngineError::Validation(format!("ruta de fichero no permitida: {}", relative)));
    }
    Ok(self.file_root.join(&self.workflow_name).join(rel))
  }

  pub fn write_file(&self, relative: &str, data: &[u8]) -> Result<PathBuf, EngineError> {
    let path = self.file_path(relative)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(&path, data)?;
    Ok(path)
  }

  pub fn read_file(&self, relative: &str) -> Result<Vec<u8>, EngineError> {
    Ok(fs::read(self.file_path(relative)?)?)
  }
}

/// Estrategia de ejecución de handlers (nativa, subproceso, intérprete...).
pub trait HandlerRunner: Send + Sync {
  fn run_handler(&self,
                 workflow_name: &str,
                 handler_name: &str,
                 arguments: HandlerArguments,
                 context: &HandlerContext)
                 -> Result<HandlerOutput, EngineError>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn directive_is_split_from_pairs() {
    let out = HandlerOutput::map_to("h", "next", vec![(json!("a"), json!(1))]);
    let (d, pairs) = out.into_directive().unwrap();
    assert_eq!(d, Directive::MapTo("next".into()));
    let pairs: Vec<Pair> = pairs.collect::<Result<_, _>>().unwrap();
    assert_eq!(pairs, vec![(json!("a"), json!(1))]);
  }

  #[test]
  fn missing_directive_is_handler_failure() {
    let out = HandlerOutput::pairs("h", vec![(json!("a"), json!(1))]).with_output("out", "err");
    match out.into_directive() {
      Err(EngineError::HandlerExecution { stdout, stderr, .. }) => {
        assert_eq!(stdout, "out");
        assert_eq!(stderr, "err");
      }
      _ => panic!("expected handler failure"),
    }
  }
}
