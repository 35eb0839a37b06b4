// admin.rs
use crate::errors::EngineError;
use jobx_domain::{compute_handlers_state, EntityStore, Handler, Job, Record, Step, Workflow};
use log::info;

/// Alta y mantenimiento de las definiciones de un workflow.
#[derive(Clone)]
pub struct WorkflowAdmin {
  entities: EntityStore,
}

impl WorkflowAdmin {
  pub fn new(entities: EntityStore) -> Self {
    Self { entities }
  }

  pub fn create_workflow(&self, workflow_name: &str, description: &str) -> Result<Record<Workflow>, EngineError> {
    let record = self.entities.create(Workflow::new(workflow_name, description))?;
    info!("workflow [{}] created", workflow_name);
    Ok(record)
  }

  /// Crea un step. Los handlers pueden registrarse después; lo que se valida
  /// aquí es que map, combine y reduce sean distintos.
  pub fn create_step(&self, step: Step) -> Result<Record<Step>, EngineError> {
    self.entities.load::<Workflow>(&[step.workflow_name.as_str()])?;
    Ok(self.entities.create(step)?)
  }

  pub fn create_job(&self, job: Job) -> Result<Record<Job>, EngineError> {
    let wf = job.workflow_name.as_str();
    if self.entities.try_load::<Step>(&[wf, job.initial_step_name.as_str()])?.is_none() {
      return Err(EngineError::Validation(format!("job [{}]: el step inicial [{}] no existe",
                                                 job.job_name, job.initial_step_name)));
    }
    Ok(self.entities.create(job)?)
  }

  /// Crea o reemplaza un handler y recalcula el estado de handlers del
  /// workflow.
  pub fn save_handler(&self, handler: Handler) -> Result<Record<Handler>, EngineError> {
    let wf = handler.workflow_name.clone();
    let existing = self.entities
                       .try_load::<Handler>(&[wf.as_str(), handler.handler_name.as_str()])?
                       .and_then(|r| r.version);
    let mut record = Record { data: handler, version: existing };
    self.entities.save(&mut record)?;
    self.refresh_handlers_state(&wf)?;
    Ok(record)
  }

  pub fn delete_handler(&self, workflow_name: &str, handler_name: &str) -> Result<(), EngineError> {
    self.entities.delete::<Handler>(&[workflow_name, handler_name])?;
    self.refresh_handlers_state(workflow_name)?;
    Ok(())
  }

  /// Recalcula `handlers_state` con los handlers guardados ahora mismo.
  pub fn refresh_handlers_state(&self, workflow_name: &str) -> Result<String, EngineError> {
    let handlers: Vec<Handler> = self.entities
                                     .list::<Handler>(&[workflow_name])?
                                     .into_iter()
                                     .map(|r| r.data)
                                     .collect();
    let state = compute_handlers_state(&handlers);
    let next = state.clone();
    self.entities.atomic_update::<Workflow, _>(&[workflow_name], |wf| {
                   wf.handlers_state = Some(next.clone());
                   Ok(())
                 })?;
    Ok(state)
  }
}
