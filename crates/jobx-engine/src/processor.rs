//! Máquina de estados de las invocaciones.
//!
//! Cada mensaje despachado es un map o un reduce sobre una invocación. El
//! map ejecuta el handler del step y, según su directiva, crea hijos
//! (`MapTo`) o guarda un resultado combinado (`Return`). El reduce lee el
//! resultado de la invocación de map que reduce, lo pasa por el reductor y
//! lo guarda en su `post_reduce`; después decrementa el contador del abuelo
//! y, si llega a cero, encola la siguiente reducción. Sin abuelo, la
//! petición está terminada.
use crate::cleanup::schedule_cleanup;
use crate::combiner::combine;
use crate::engine::Engine;
use crate::errors::EngineError;
use crate::funnel::{InvocationContext, MessageFunnel};
use crate::handler::{groups_argument, pairs_argument, Directive, HandlerArguments, PairStream};
use crate::transport::{classify, WireMessage};
use jobx_domain::{merge_by_key, ClaimTree, DatasetKind, DatasetQueue, Direction, Group, Handler, Invocation, Pair,
                  PairRecord, RelationKind, RelationshipTree, Request, Step};
use log::{debug, error, info, warn};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Qué hizo el procesador con un mensaje.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
  /// El map creó `children` invocaciones hijas.
  Mapped { children: u64 },
  /// El map devolvió resultados; se encoló su reducción.
  Returned { groups: usize },
  /// Reducción guardada; `request_done` si cerró la petición.
  Reduced { request_done: bool },
  /// Reentrega de un mensaje ya reclamado.
  Duplicate,
  /// La petición ya estaba terminada (p. ej. por un fallo de otra rama).
  Abandoned,
}

#[derive(Clone)]
pub struct StepProcessor {
  engine: Arc<Engine>,
  funnel: MessageFunnel,
}

impl StepProcessor {
  pub fn new(engine: Arc<Engine>) -> Self {
    let funnel = MessageFunnel::new(engine.entities().clone());
    Self { engine, funnel }
  }

  pub fn engine(&self) -> &Arc<Engine> {
    &self.engine
  }

  /// Punto de entrada del transporte: clasifica y despacha un mensaje crudo.
  pub fn handle_raw(&self, raw: &str) -> Result<HandleOutcome, EngineError> {
    let (job_class, message) = classify(raw)?;
    self.handle(job_class, &message)
  }

  pub fn handle(&self, job_class: Direction, message: &WireMessage) -> Result<HandleOutcome, EngineError> {
    let ctx = self.funnel.inflate(message)?;
    if ctx.direction() != job_class {
      return Err(EngineError::WireFormat(format!("mensaje de {} para la invocación [{}] de {}",
                                                 job_class,
                                                 ctx.invocation_id(),
                                                 ctx.direction())));
    }
    if ctx.request.data.is_done {
      warn!("request [{}] already done, dropping {} of invocation [{}]",
            ctx.request_id(),
            job_class,
            ctx.invocation_id());
      return Ok(HandleOutcome::Abandoned);
    }
    if self.engine.config().idempotency_fence {
      let claims = ClaimTree::new(self.engine.client().clone(), ctx.workflow_name(), ctx.invocation_id());
      if !claims.claim(job_class)? {
        warn!("duplicate {} delivery for invocation [{}], acknowledging", job_class, ctx.invocation_id());
        return Ok(HandleOutcome::Duplicate);
      }
    }

    let result = match job_class {
      Direction::Map => self.handle_map(&ctx),
      Direction::Reduce => self.handle_reduce(&ctx),
    };
    if let Err(e) = &result {
      self.record_failure(&ctx, e);
    }
    result
  }

  fn dataset(&self, workflow_name: &str, invocation_id: &str, kind: DatasetKind) -> DatasetQueue {
    DatasetQueue::new(self.engine.client().clone(), workflow_name, invocation_id, kind)
  }

  fn edges(&self, workflow_name: &str, invocation_id: &str, kind: RelationKind) -> RelationshipTree {
    RelationshipTree::new(self.engine.client().clone(), workflow_name, invocation_id, kind)
  }

  fn handle_map(&self, ctx: &InvocationContext) -> Result<HandleOutcome, EngineError> {
    let handler = ctx.handler
                     .as_ref()
                     .ok_or_else(|| EngineError::Validation(format!("step [{}] sin handler de map", ctx.step.step_name)))?;
    let arguments: Vec<Pair> = self.dataset(ctx.workflow_name(), ctx.invocation_id(), DatasetKind::Arguments)
                                   .list::<PairRecord>()?
                                   .into_iter()
                                   .map(PairRecord::into_pair)
                                   .collect();
    debug!("mapping invocation [{}] of step [{}] with {} argument pairs",
           ctx.invocation_id(),
           ctx.step.step_name,
           arguments.len());
    let mut handler_args = HandlerArguments::new();
    handler_args.insert("arguments".to_string(), pairs_argument(&arguments));
    let hctx = self.engine.handler_context(ctx.request_id(), &ctx.invocation.data);
    let output = self.engine
                     .runner()
                     .run_handler(ctx.workflow_name(), &handler.handler_name, handler_args, &hctx)?;
    let (directive, pairs) = output.into_directive()?;
    match directive {
      Directive::MapTo(next_step) => self.map_to_downstream(ctx, &next_step, pairs),
      Directive::Return => self.collect_result(ctx, pairs),
    }
  }

  /// Crea un hijo por par. El fan-out se publica de una vez cuando ya se
  /// conocen todos los hijos, y sólo después se empujan sus mensajes.
  fn map_to_downstream(&self,
                       ctx: &InvocationContext,
                       next_step: &str,
                       pairs: PairStream)
                       -> Result<HandleOutcome, EngineError> {
    let wf = ctx.workflow_name();
    let parent_id = ctx.invocation_id();
    let entities = self.engine.entities();
    let step = entities.load::<Step>(&[wf, next_step])?.data;
    let handler = entities.load::<Handler>(&[wf, step.map_handler_name.as_str()])?.data;
    let mapped = self.edges(wf, parent_id, RelationKind::Mapped);

    let mut children: Vec<Invocation> = Vec::new();
    for pair in pairs {
      let (key, value) = pair?;
      let child = entities.create(Invocation::new(wf, Some(parent_id), &step.step_name, Direction::Map))?.data;
      self.dataset(wf, &child.invocation_id, DatasetKind::Arguments)
          .add(&PairRecord::new(key, value))?;
      mapped.add_entity(&child.invocation_id, None)?;
      children.push(child);
    }

    if children.is_empty() {
      debug!("invocation [{}] mapped to no children, treating it as a leaf", parent_id);
      return self.collect_result(ctx, Box::new(std::iter::empty()));
    }

    let count = children.len() as u64;
    entities.atomic_update::<Invocation, _>(&[wf, parent_id], |inv| inv.set_fan_out(count))?;
    for child in &children {
      self.engine.push_invocation(ctx.request_id(), child, Some(&handler))?;
    }
    info!("invocation [{}] fanned out to {} children of step [{}]", parent_id, count, step.step_name);
    Ok(HandleOutcome::Mapped { children: count })
  }

  /// Combina la salida de un mapper hoja, la guarda en `post_combine` y
  /// refleja la invocación hacia reduce.
  fn collect_result(&self, ctx: &InvocationContext, pairs: PairStream) -> Result<HandleOutcome, EngineError> {
    let pairs: Vec<Pair> = pairs.collect::<Result<_, _>>()?;
    let groups = combine(&self.engine, ctx, pairs)?;
    let post_combine = self.dataset(ctx.workflow_name(), ctx.invocation_id(), DatasetKind::PostCombine);
    for group in &groups {
      post_combine.add(group)?;
    }
    self.queue_reduce(ctx.request_id(), &ctx.invocation.data)?;
    Ok(HandleOutcome::Returned { groups: groups.len() })
  }

  /// Encola la reducción de `target` (una invocación de map). La reducción
  /// usa el step de `target` y queda enlazada con una arista `reduced`.
  pub fn queue_reduce(&self, request_id: &str, target: &Invocation) -> Result<Invocation, EngineError> {
    let wf = target.workflow_name.as_str();
    let entities = self.engine.entities();
    let step = entities.load::<Step>(&[wf, target.step_name.as_str()])?.data;
    let handler = match step.reduce_handler_name.as_deref() {
      Some(name) => Some(entities.load::<Handler>(&[wf, name])?.data),
      None => None,
    };
    let reduction = entities.create(Invocation::new(wf,
                                                    Some(&target.invocation_id),
                                                    &target.step_name,
                                                    Direction::Reduce))?
                            .data;
    self.edges(wf, &target.invocation_id, RelationKind::Reduced)
        .add_entity(&reduction.invocation_id, None)?;
    self.engine.push_invocation(request_id, &reduction, handler.as_ref())?;
    Ok(reduction)
  }

  fn handle_reduce(&self, ctx: &InvocationContext) -> Result<HandleOutcome, EngineError> {
    let wf = ctx.workflow_name();
    let target_id = ctx.invocation
                       .data
                       .parent_invocation_id
                       .as_deref()
                       .ok_or_else(|| EngineError::Validation(format!("reducción [{}] sin invocación padre",
                                                                      ctx.invocation_id())))?;
    let target = self.engine.entities().load::<Invocation>(&[wf, target_id])?.data;
    let groups = if target.is_fanned_out() {
      self.mapping_groups(&target)?
    } else {
      self.dataset(wf, &target.invocation_id, DatasetKind::PostCombine).list::<Group>()?
    };
    debug!("reducing invocation [{}] ({} groups)", target.invocation_id, groups.len());

    let results: Vec<Pair> = match &ctx.handler {
      Some(handler) => {
        let mut handler_args = HandlerArguments::new();
        handler_args.insert("results".to_string(), groups_argument(&groups));
        let hctx = self.engine.handler_context(ctx.request_id(), &ctx.invocation.data);
        self.engine
            .runner()
            .run_handler(wf, &handler.handler_name, handler_args, &hctx)?
            .into_pairs()
            .collect::<Result<_, _>>()?
      }
      None => groups.into_iter().map(|g| (g.key, JsonValue::Array(g.values))).collect(),
    };

    self.store_reduction(&target, &results)?;
    match target.parent_invocation_id.as_deref() {
      Some(parent_id) => {
        if self.decrement_parent(wf, parent_id)? {
          let parent = self.engine.entities().load::<Invocation>(&[wf, parent_id])?.data;
          debug!("all children of [{}] reduced, queueing its reduction", parent_id);
          self.queue_reduce(ctx.request_id(), &parent)?;
        }
        Ok(HandleOutcome::Reduced { request_done: false })
      }
      None => {
        self.complete_request(ctx, &results)?;
        Ok(HandleOutcome::Reduced { request_done: true })
      }
    }
  }

  /// Resultado de una invocación que hizo fan-out: el `post_reduce` de cada
  /// hijo, fusionado por clave. El orden entre hijos no está definido.
  fn mapping_groups(&self, target: &Invocation) -> Result<Vec<Group>, EngineError> {
    let wf = target.workflow_name.as_str();
    let mut pairs: Vec<Pair> = Vec::new();
    for child_id in self.edges(wf, &target.invocation_id, RelationKind::Mapped).list_entities()? {
      let child_pairs = self.dataset(wf, &child_id, DatasetKind::PostReduce).list::<PairRecord>()?;
      pairs.extend(child_pairs.into_iter().map(PairRecord::into_pair));
    }
    Ok(merge_by_key(pairs))
  }

  fn store_reduction(&self, target: &Invocation, results: &[Pair]) -> Result<(), EngineError> {
    let post_reduce = self.dataset(&target.workflow_name, &target.invocation_id, DatasetKind::PostReduce);
    for (key, value) in results {
      post_reduce.add(&PairRecord::new(key.clone(), value.clone()))?;
    }
    Ok(())
  }

  /// Decrementa `mapped_waiting` de la invocación con CAS. Devuelve `true`
  /// sólo para el llamador cuyo decremento la dejó en cero.
  pub fn decrement_parent(&self, workflow_name: &str, invocation_id: &str) -> Result<bool, EngineError> {
    let record = self.engine
                     .entities()
                     .atomic_update::<Invocation, _>(&[workflow_name, invocation_id], |inv| {
                       inv.decrement_waiting()?;
                       Ok(())
                     })?;
    Ok(record.data.mapped_waiting() == Some(0))
  }

  fn complete_request(&self, ctx: &InvocationContext, results: &[Pair]) -> Result<(), EngineError> {
    let wf = ctx.workflow_name();
    let mut newly_done = false;
    let request = self.engine
                      .entities()
                      .atomic_update::<Request, _>(&[wf, ctx.request_id()], |r| {
                        newly_done = !r.is_done;
                        if newly_done {
                          r.mark_done();
                        }
                        Ok(())
                      })?
                      .data;
    if !newly_done {
      warn!("request [{}] was already done when its final reduction landed", request.request_id);
      return Ok(());
    }
    info!("request [{}] done with {} result pairs", request.request_id, results.len());
    if !request.is_blocking {
      if let Some(body) = self.engine.result_writer().render(&request, results)? {
        info!("result of request [{}]: {}", request.request_id, body);
      }
    }
    // también las bloqueantes: el periodo de silencio deja leer al que espera
    schedule_cleanup(&self.engine, wf, &request.request_id)?;
    self.engine
        .notifier()
        .notify("request done", &format!("request [{}] of job [{}] finished", request.request_id, request.job_name));
    Ok(())
  }

  /// Guarda el error en la invocación y marca la petición como fallida.
  /// Ambos pasos son de mejor esfuerzo: un fallo aquí sólo se registra.
  fn record_failure(&self, ctx: &InvocationContext, failure: &EngineError) {
    let wf = ctx.workflow_name();
    let invocation_id = ctx.invocation_id();
    let mut text = format!("{}: {}", failure.classification(), failure);
    if let EngineError::HandlerExecution { stdout, stderr, .. } = failure {
      for (label, output) in [("stdout", stdout), ("stderr", stderr)] {
        if !output.is_empty() {
          text.push_str(&format!("\n{}: {}", label, output));
        }
      }
    }
    error!("{} of invocation [{}] failed: {}", ctx.direction(), invocation_id, failure);

    let entities = self.engine.entities();
    if let Err(e) = entities.atomic_update::<Invocation, _>(&[wf, invocation_id], |inv| {
                              inv.error = Some(text.clone());
                              Ok(())
                            })
    {
      warn!("could not store error on invocation [{}]: {}", invocation_id, e);
    }

    let mut newly_failed = false;
    match entities.atomic_update::<Request, _>(&[wf, ctx.request_id()], |r| {
                    newly_failed = !r.is_done;
                    if newly_failed {
                      r.mark_failed(invocation_id);
                    }
                    Ok(())
                  }) {
      Ok(request) if newly_failed => {
        self.engine.notifier().notify("request failed",
                                      &format!("request [{}] failed in invocation [{}]: {}",
                                               request.data.request_id, invocation_id, failure));
        if let Err(e) = schedule_cleanup(&self.engine, wf, &request.data.request_id) {
          warn!("could not schedule cleanup of request [{}]: {}", request.data.request_id, e);
        }
      }
      Ok(_) => debug!("request [{}] already done, failure of [{}] only recorded", ctx.request_id(), invocation_id),
      Err(e) => warn!("could not mark request [{}] as failed: {}", ctx.request_id(), e),
    }
  }
}
