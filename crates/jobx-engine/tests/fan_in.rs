mod common;

use common::{harness_on, test_config, WF};
use jobx_domain::{Invocation, Workflow};
use kv::InMemoryKvStore;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Para cada N en 1..=50 un padre publica su fan-out de N hijos y N hilos lo
// decrementan en un orden barajado: exactamente uno ve el cruce a cero,
// con el tope de reintentos por defecto.
#[test]
fn waiting_reaches_zero_exactly_once() {
  let mut rng = StdRng::seed_from_u64(0x5eed);
  for n in 1..=50u64 {
    let h = harness_on(Arc::new(InMemoryKvStore::new()), test_config());
    let entities = h.engine.entities();
    entities.create(Workflow::new(WF, "fan in")).unwrap();
    let parent = entities.create(Invocation::root(WF, "split")).unwrap().data;
    let parent_id = parent.invocation_id.clone();
    entities.atomic_update::<Invocation, _>(&[WF, parent_id.as_str()], |inv| inv.set_fan_out(n))
            .unwrap();

    let mut order: Vec<u64> = (0..n).collect();
    order.shuffle(&mut rng);
    let crossings = AtomicUsize::new(0);
    std::thread::scope(|s| {
      for child in order {
        let processor = h.processor.clone();
        let crossings = &crossings;
        let parent_id = parent_id.as_str();
        s.spawn(move || {
          if child % 3 == 0 {
            std::thread::yield_now();
          }
          if processor.decrement_parent(WF, parent_id).unwrap() {
            crossings.fetch_add(1, Ordering::SeqCst);
          }
        });
      }
    });

    assert_eq!(crossings.load(Ordering::SeqCst), 1, "N = {}", n);
    let parent = entities.load::<Invocation>(&[WF, parent_id.as_str()]).unwrap().data;
    assert_eq!(parent.mapped_count(), Some(n));
    assert_eq!(parent.mapped_waiting(), Some(0));
    // one more decrement than the fan-out is a bug, not a second crossing
    assert!(h.processor.decrement_parent(WF, &parent_id).is_err());
  }
}

#[test]
fn fan_out_cannot_be_published_twice() {
  let h = harness_on(Arc::new(InMemoryKvStore::new()), test_config());
  let entities = h.engine.entities();
  let parent = entities.create(Invocation::root(WF, "split")).unwrap().data;
  let id = parent.invocation_id.as_str();
  entities.atomic_update::<Invocation, _>(&[WF, id], |inv| inv.set_fan_out(2)).unwrap();
  assert!(entities.atomic_update::<Invocation, _>(&[WF, id], |inv| inv.set_fan_out(2)).is_err());
}
