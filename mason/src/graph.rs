//! Builds the in-memory dependency graph snapshot from the state store.

use mason_graph::{BiGraph, Vertex};

use crate::error::{BuildError, StateError};
use crate::state::{EdgeKind, ResourceId, StateStore, TaskId};

/// The build graph: store-owned vertex ids with edge kinds as edge data.
pub type BuildGraph = BiGraph<ResourceId, TaskId, EdgeKind>;

/// Streams vertices and edges out of the store into an immutable snapshot.
/// The description resource is included so that a changed description shows
/// up in the pending subgraph like any other changed resource.
pub fn snapshot(store: &StateStore) -> Result<BuildGraph, StateError> {
  let mut graph = BuildGraph::new();
  graph.add_resource(ResourceId::DESCRIPTION);
  for (id, _) in store.resources()? {
    graph.add_resource(id);
  }
  for (id, _) in store.tasks()? {
    graph.add_task(id);
  }
  for (from, to, kind) in store.edges_rt()? {
    graph.add_edge_rt(from, to, kind)
      .map_err(|_| StateError::InvalidEdge { from: from.raw(), to: to.raw() })?;
  }
  for (from, to, kind) in store.edges_tr()? {
    graph.add_edge_tr(from, to, kind)
      .map_err(|_| StateError::InvalidEdge { from: from.raw(), to: to.raw() })?;
  }
  Ok(graph)
}

/// The subgraph the next execution will walk: everything forward-reachable
/// from the pending sets.
pub fn pending_subgraph(store: &StateStore, graph: &BuildGraph) -> Result<BuildGraph, StateError> {
  Ok(graph.subgraph(store.pending_resources()?, store.pending_tasks()?))
}

/// Renders the cycles of `graph` with human-readable vertex names, one list of
/// names per strongly-connected component.
pub fn named_cycles(store: &StateStore, graph: &BuildGraph) -> Result<Vec<Vec<String>>, StateError> {
  let mut named = Vec::new();
  for component in graph.cycles() {
    let mut names = Vec::with_capacity(component.len());
    for vertex in component {
      names.push(vertex_name(store, vertex)?);
    }
    named.push(names);
  }
  Ok(named)
}

pub(crate) fn vertex_name(store: &StateStore, vertex: Vertex<ResourceId, TaskId>) -> Result<String, StateError> {
  match vertex {
    Vertex::Resource(id) => Ok(store.resource(id)?.path),
    Vertex::Task(id) => Ok(store.task(id)?.name()),
  }
}

#[cfg(test)]
mod test {
  use crate::resource::Resource;
  use crate::task::Task;

  use super::*;

  #[test]
  fn snapshot_mirrors_the_store() {
    let mut store = StateStore::open_in_memory().unwrap();
    let tx = store.transaction().unwrap();
    let input = tx.put_resource(&Resource::new("/in")).unwrap();
    let output = tx.put_resource(&Resource::new("/out")).unwrap();
    let task = tx.put_task(&Task::new(vec![vec!["cc".into()]], "/p")).unwrap();
    tx.put_edge_rt(input, task, EdgeKind::Explicit).unwrap();
    tx.put_edge_tr(task, output, EdgeKind::Both).unwrap();
    tx.commit().unwrap();

    let graph = snapshot(&store).unwrap();
    assert!(graph.contains_resource(ResourceId::DESCRIPTION));
    assert_eq!(graph.resource_count(), 3);
    assert_eq!(graph.task_count(), 1);
    assert_eq!(graph.outgoing_of_resource(input).collect::<Vec<_>>(), vec![(task, EdgeKind::Explicit)]);
    assert_eq!(graph.outgoing_of_task(task).collect::<Vec<_>>(), vec![(output, EdgeKind::Both)]);
  }

  #[test]
  fn pending_subgraph_is_rooted_at_the_pending_sets() {
    let mut store = StateStore::open_in_memory().unwrap();
    let tx = store.transaction().unwrap();
    let input = tx.put_resource(&Resource::new("/in")).unwrap();
    let output = tx.put_resource(&Resource::new("/out")).unwrap();
    let other = tx.put_resource(&Resource::new("/other")).unwrap();
    let task = tx.put_task(&Task::new(vec![vec!["cc".into()]], "/p")).unwrap();
    tx.put_edge_rt(input, task, EdgeKind::Explicit).unwrap();
    tx.put_edge_tr(task, output, EdgeKind::Explicit).unwrap();
    tx.add_pending_resource(input).unwrap();
    tx.commit().unwrap();

    let graph = snapshot(&store).unwrap();
    let sub = pending_subgraph(&store, &graph).unwrap();
    assert!(sub.contains_resource(input));
    assert!(sub.contains_task(task));
    assert!(sub.contains_resource(output));
    assert!(!sub.contains_resource(other));
    assert!(!sub.contains_resource(ResourceId::DESCRIPTION));
  }
}
