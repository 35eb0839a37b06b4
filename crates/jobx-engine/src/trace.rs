//! Recorrido forense del grafo de invocaciones de una petición.
use crate::errors::EngineError;
use jobx_domain::{DatasetKind, DatasetQueue, EntityStore, Invocation, RelationKind, RelationshipTree};
use kv::KvClient;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Serialize)]
pub struct TraceNode {
  pub invocation_id: String,
  /// `None` si la entidad ya no existe (p. ej. poda parcial).
  pub invocation: Option<Invocation>,
  pub arguments: Vec<JsonValue>,
  pub post_combine: Vec<JsonValue>,
  pub post_reduce: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEdge {
  pub from: String,
  pub to: String,
  pub relation: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InvocationGraph {
  pub nodes: Vec<TraceNode>,
  pub edges: Vec<TraceEdge>,
}

impl InvocationGraph {
  pub fn node(&self, invocation_id: &str) -> Option<&TraceNode> {
    self.nodes.iter().find(|n| n.invocation_id == invocation_id)
  }

  pub fn children_of(&self, invocation_id: &str, relation: RelationKind) -> Vec<&str> {
    self.edges
        .iter()
        .filter(|e| e.from == invocation_id && e.relation == relation.as_str())
        .map(|e| e.to.as_str())
        .collect()
  }
}

/// Recorre en anchura las aristas `mapped` y `reduced` desde `root_id`.
pub fn invocation_graph(client: &KvClient, workflow_name: &str, root_id: &str) -> Result<InvocationGraph, EngineError> {
  let entities = EntityStore::new(client.clone());
  let mut graph = InvocationGraph::default();
  let mut seen: HashSet<String> = HashSet::new();
  let mut pending: VecDeque<String> = VecDeque::new();
  seen.insert(root_id.to_string());
  pending.push_back(root_id.to_string());

  while let Some(id) = pending.pop_front() {
    let invocation = entities.try_load::<Invocation>(&[workflow_name, id.as_str()])?.map(|r| r.data);
    let dataset = |kind| DatasetQueue::new(client.clone(), workflow_name, &id, kind).list::<JsonValue>();
    graph.nodes.push(TraceNode { invocation_id: id.clone(),
                                 invocation,
                                 arguments: dataset(DatasetKind::Arguments)?,
                                 post_combine: dataset(DatasetKind::PostCombine)?,
                                 post_reduce: dataset(DatasetKind::PostReduce)? });
    for kind in RelationKind::ALL {
      for to in RelationshipTree::new(client.clone(), workflow_name, &id, kind).list_entities()? {
        graph.edges.push(TraceEdge { from: id.clone(), to: to.clone(), relation: kind.as_str().to_string() });
        if seen.insert(to.clone()) {
          pending.push_back(to);
        }
      }
    }
  }
  Ok(graph)
}
