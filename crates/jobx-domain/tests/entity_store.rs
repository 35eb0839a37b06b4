use jobx_domain::{DomainError, EntityStore, Invocation, Record, Workflow};
use kv::{InMemoryKvStore, KvClient};
use std::sync::Arc;

fn store(max_attempts: u32) -> EntityStore {
  EntityStore::with_max_attempts(KvClient::new(Arc::new(InMemoryKvStore::new())), max_attempts)
}

#[test]
fn create_then_load_roundtrip() {
  let es = store(5);
  let created = es.create(Workflow::new("wc", "word count")).unwrap();
  assert!(created.is_persisted());
  let loaded = es.load::<Workflow>(&["wc"]).unwrap();
  assert_eq!(loaded.data, created.data);
  assert_eq!(loaded.version, created.version);
  assert!(es.try_load::<Workflow>(&["missing"]).unwrap().is_none());
}

#[test]
fn creating_twice_is_already_exists() {
  let es = store(5);
  es.create(Workflow::new("wc", "")).unwrap();
  let err = es.create(Workflow::new("wc", "")).unwrap_err();
  assert!(err.is_already_exists());
}

#[test]
fn save_with_stale_version_is_rejected() {
  let es = store(5);
  es.create(Workflow::new("wc", "a")).unwrap();
  let mut first = es.load::<Workflow>(&["wc"]).unwrap();
  let mut second = es.load::<Workflow>(&["wc"]).unwrap();
  first.data.description = "b".into();
  es.save(&mut first).unwrap();
  second.data.description = "c".into();
  assert!(es.save(&mut second).unwrap_err().is_precondition_failed());
  es.refresh(&mut second).unwrap();
  assert_eq!(second.data.description, "b");
}

#[test]
fn atomic_update_retries_after_conflict() {
  let es = store(5);
  let mut inv = Invocation::root("wf", "s");
  inv.set_fan_out(3).unwrap();
  let id = inv.invocation_id.clone();
  es.create(inv).unwrap();

  let other = es.clone();
  let mut calls = 0;
  let updated = es.atomic_update::<Invocation, _>(&["wf", id.as_str()], |inv| {
                    calls += 1;
                    if calls == 1 {
                      // a concurrent worker lands its decrement first
                      other.atomic_update::<Invocation, _>(&["wf", id.as_str()], |o| o.decrement_waiting().map(|_| ()))?;
                    }
                    inv.decrement_waiting()?;
                    Ok(())
                  })
                  .unwrap();
  assert_eq!(calls, 2);
  assert_eq!(updated.data.mapped_waiting(), Some(1));
  assert_eq!(updated.data.mapped_count(), Some(3));
}

#[test]
fn atomic_update_gives_up_after_ceiling() {
  let es = store(3);
  es.create(Workflow::new("wc", "0")).unwrap();
  let other = es.clone();
  let mut calls = 0;
  let err = es.atomic_update::<Workflow, _>(&["wc"], |wf| {
                calls += 1;
                let mut rec: Record<Workflow> = other.load(&["wc"])?;
                rec.data.description = format!("bump{}", calls);
                other.save(&mut rec)?;
                wf.description = "mine".into();
                Ok(())
              })
              .unwrap_err();
  assert_eq!(calls, 3);
  assert!(matches!(err, DomainError::AtomicUpdateExhausted { attempts: 3, .. }));
}

#[test]
fn list_returns_children_of_parent() {
  let es = store(5);
  for _ in 0..3 {
    es.create(Invocation::root("wf", "s")).unwrap();
  }
  es.create(Invocation::root("other", "s")).unwrap();
  assert_eq!(es.list::<Invocation>(&["wf"]).unwrap().len(), 3);
}
