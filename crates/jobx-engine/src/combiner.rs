// combiner.rs
use crate::engine::Engine;
use crate::errors::EngineError;
use crate::funnel::InvocationContext;
use crate::handler::{pairs_argument, HandlerArguments};
use jobx_domain::{group_by_key, Group, Pair};
use log::debug;
use serde_json::Value as JsonValue;

/// Convierte un par emitido por un combinador propio en grupo: una lista se
/// toma como la lista de valores, cualquier otro valor como lista de uno.
pub fn group_from_output(key: JsonValue, value: JsonValue) -> Group {
  match value {
    JsonValue::Array(values) => Group::new(key, values),
    other => Group::new(key, vec![other]),
  }
}

/// Agrupa la salida de un mapper hoja. Sin combinador en el step se usa
/// `group_by_key`, que agrupa pero no reduce.
pub fn combine(engine: &Engine, ctx: &InvocationContext, pairs: Vec<Pair>) -> Result<Vec<Group>, EngineError> {
  let Some(name) = ctx.step.combine_handler_name.as_deref() else {
    return Ok(group_by_key(pairs));
  };
  debug!("combining {} pairs of invocation [{}] with [{}]", pairs.len(), ctx.invocation_id(), name);
  let mut arguments = HandlerArguments::new();
  arguments.insert("pairs".to_string(), pairs_argument(&pairs));
  let hctx = engine.handler_context(ctx.request_id(), &ctx.invocation.data);
  let output = engine.runner().run_handler(ctx.workflow_name(), name, arguments, &hctx)?;
  output.into_pairs().map(|p| p.map(|(k, v)| group_from_output(k, v))).collect()
}
