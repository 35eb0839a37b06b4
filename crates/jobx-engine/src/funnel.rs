use crate::errors::EngineError;
use crate::transport::{WireMessage, WIRE_FORMAT_VERSION};
use jobx_domain::{Direction, EntityStore, Handler, Invocation, Job, Record, Request, Step, Workflow};

/// Estado completo de una invocación en vuelo, resuelto desde el almacén.
#[derive(Debug, Clone)]
pub struct InvocationContext {
  pub workflow: Workflow,
  pub request: Record<Request>,
  pub invocation: Record<Invocation>,
  pub job: Job,
  pub step: Step,
  /// Handler map si la dirección es map; handler reduce (si existe) si es
  /// reduce.
  pub handler: Option<Handler>,
}

impl InvocationContext {
  pub fn workflow_name(&self) -> &str {
    &self.workflow.workflow_name
  }

  pub fn request_id(&self) -> &str {
    &self.request.data.request_id
  }

  pub fn invocation_id(&self) -> &str {
    &self.invocation.data.invocation_id
  }

  pub fn direction(&self) -> Direction {
    self.invocation.data.direction
  }
}

/// Convierte un contexto en mensaje (`deflate`) y un mensaje en contexto
/// (`inflate`). El mensaje sólo lleva identidades: todo lo demás se relee en
/// el momento del despacho.
#[derive(Clone)]
pub struct MessageFunnel {
  entities: EntityStore,
}

impl MessageFunnel {
  pub fn new(entities: EntityStore) -> Self {
    Self { entities }
  }

  pub fn deflate(&self, ctx: &InvocationContext) -> WireMessage {
    WireMessage { format_version: WIRE_FORMAT_VERSION,
                  workflow_name: ctx.workflow.workflow_name.clone(),
                  request_id: ctx.request.data.request_id.clone(),
                  invocation_id: ctx.invocation.data.invocation_id.clone(),
                  step_name: ctx.step.step_name.clone() }
  }

  pub fn inflate(&self, message: &WireMessage) -> Result<InvocationContext, EngineError> {
    let wf = message.workflow_name.as_str();
    let workflow = self.entities.load::<Workflow>(&[wf])?.data;
    let request = self.entities.load::<Request>(&[wf, message.request_id.as_str()])?;
    let invocation = self.entities.load::<Invocation>(&[wf, message.invocation_id.as_str()])?;
    if invocation.data.step_name != message.step_name {
      return Err(EngineError::WireFormat(format!("el mensaje apunta al step [{}] pero la invocación [{}] es de [{}]",
                                                 message.step_name,
                                                 message.invocation_id,
                                                 invocation.data.step_name)));
    }
    let job = self.entities.load::<Job>(&[wf, request.data.job_name.as_str()])?.data;
    let step = self.entities.load::<Step>(&[wf, message.step_name.as_str()])?.data;
    let handler = match invocation.data.direction {
      Direction::Map => Some(self.entities.load::<Handler>(&[wf, step.map_handler_name.as_str()])?.data),
      Direction::Reduce => match step.reduce_handler_name.as_deref() {
        Some(name) => Some(self.entities.load::<Handler>(&[wf, name])?.data),
        None => None,
      },
    };
    Ok(InvocationContext { workflow, request, invocation, job, step, handler })
  }
}
