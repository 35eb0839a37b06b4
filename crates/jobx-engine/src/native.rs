use crate::errors::EngineError;
use crate::handler::{HandlerArguments, HandlerContext, HandlerOutput, HandlerRunner};
use dashmap::DashMap;
use jobx_domain::ArgumentSpec;
use log::debug;
use std::sync::Arc;

/// Función de handler compilada en el propio binario.
pub type NativeHandlerFn =
  Arc<dyn Fn(&HandlerArguments, &HandlerContext) -> Result<HandlerOutput, EngineError> + Send + Sync>;

#[derive(Clone)]
struct NativeHandler {
  argument_spec: Vec<ArgumentSpec>,
  func: NativeHandlerFn,
}

/// Ejecutor de handlers registrados como closures de Rust, indexados por
/// `(workflow, handler)`.
#[derive(Default)]
pub struct NativeHandlerRunner {
  handlers: DashMap<(String, String), NativeHandler>,
}

impl NativeHandlerRunner {
  pub fn new() -> Self {
    Self { handlers: DashMap::new() }
  }

  /// Registra (o reemplaza) un handler. `argument_spec` lista los argumentos
  /// que deben estar presentes en cada llamada.
  pub fn register<F>(&self, workflow_name: &str, handler_name: &str, argument_spec: Vec<ArgumentSpec>, func: F)
    where F: Fn(&HandlerArguments, &HandlerContext) -> Result<HandlerOutput, EngineError> + Send + Sync + 'static
  {
    self.handlers.insert((workflow_name.to_string(), handler_name.to_string()),
                         NativeHandler { argument_spec, func: Arc::new(func) });
  }

  pub fn unregister(&self, workflow_name: &str, handler_name: &str) -> bool {
    self.handlers.remove(&(workflow_name.to_string(), handler_name.to_string())).is_some()
  }

  pub fn contains(&self, workflow_name: &str, handler_name: &str) -> bool {
    self.handlers.contains_key(&(workflow_name.to_string(), handler_name.to_string()))
  }
}

fn marshal(handler_name: &str, spec: &[ArgumentSpec], arguments: &HandlerArguments) -> Result<(), EngineError> {
  for arg in spec {
    if !arguments.contains_key(&arg.name) {
      return Err(EngineError::ArgumentMarshal { handler: handler_name.to_string(),
                                                message: format!("falta el argumento [{}] ({})", arg.name, arg.arg_type) });
    }
  }
  Ok(())
}

impl HandlerRunner for NativeHandlerRunner {
  fn run_handler(&self,
                 workflow_name: &str,
                 handler_name: &str,
                 arguments: HandlerArguments,
                 context: &HandlerContext)
                 -> Result<HandlerOutput, EngineError> {
    // Se clona la entrada para no retener el guard del DashMap durante la
    // ejecución del handler.
    let handler = self.handlers
                      .get(&(workflow_name.to_string(), handler_name.to_string()))
                      .map(|h| h.value().clone())
                      .ok_or_else(|| EngineError::handler_failure(handler_name, "handler no registrado"))?;
    marshal(handler_name, &handler.argument_spec, &arguments)?;
    debug!("running native handler [{}] for invocation [{}]", handler_name, context.invocation_id);
    (handler.func)(&arguments, context)
  }
}
