//! GraphViz rendering of the dependency graph.

use std::io::{self, Write};

use mason_graph::Vertex;

use crate::error::StateError;
use crate::state::{EdgeKind, ResourceId, StateStore, TaskId};
use crate::graph::BuildGraph;

/// Controls what [`graphviz`] emits.
#[derive(Clone, Copy, Default, Debug)]
pub struct RenderOptions {
  /// Render full resource paths instead of file names.
  pub full_names: bool,
  /// When set, only edges with this origin are rendered: `Explicit` and
  /// `Implicit` include edges of kind both; `Both` renders only those.
  pub edges: Option<EdgeKind>,
}

/// Writes `graph` in dot format. Cycles are grouped into clusters; edge style
/// encodes origin: solid=explicit, dashed=implicit, bold=both.
pub fn graphviz<W: Write>(
  store: &StateStore,
  graph: &BuildGraph,
  writer: &mut W,
  options: &RenderOptions,
) -> Result<(), RenderError> {
  writeln!(writer, "digraph build {{")?;

  for (index, component) in graph.cycles().into_iter().enumerate() {
    writeln!(writer, "  subgraph cluster_cycle_{index} {{")?;
    writeln!(writer, "    label=\"cycle {index}\";")?;
    writeln!(writer, "    color=red;")?;
    for vertex in component {
      writeln!(writer, "    {};", node_id(vertex))?;
    }
    writeln!(writer, "  }}")?;
  }

  for id in graph.resources() {
    let label = resource_label(store, id, options)?;
    writeln!(writer, "  {} [shape=ellipse, label=\"{}\"];", node_id(Vertex::Resource(id)), escape(&label))?;
  }
  for id in graph.tasks() {
    let label = store.task(id)?.name();
    writeln!(writer, "  {} [shape=box, label=\"{}\"];", node_id(Vertex::Task(id)), escape(&label))?;
  }

  for (from, to, kind) in graph.edges_rt() {
    if let Some(attributes) = edge_attributes(kind, options) {
      writeln!(writer, "  {} -> {}{};", node_id(Vertex::Resource(from)), node_id(Vertex::Task(to)), attributes)?;
    }
  }
  for (from, to, kind) in graph.edges_tr() {
    if let Some(attributes) = edge_attributes(kind, options) {
      writeln!(writer, "  {} -> {}{};", node_id(Vertex::Task(from)), node_id(Vertex::Resource(to)), attributes)?;
    }
  }

  writeln!(writer, "}}")?;
  Ok(())
}

/// Rendering can fail on the writer or when resolving names from the store.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
  #[error("io: {0}")]
  Io(#[from] io::Error),
  #[error(transparent)]
  State(#[from] StateError),
}

fn resource_label(store: &StateStore, id: ResourceId, options: &RenderOptions) -> Result<String, StateError> {
  let path = store.resource(id)?.path;
  if options.full_names {
    return Ok(path);
  }
  Ok(path.rsplit('/').next().unwrap_or(&path).to_string())
}

fn node_id(vertex: Vertex<ResourceId, TaskId>) -> String {
  match vertex {
    Vertex::Resource(id) => format!("r{}", id.raw()),
    Vertex::Task(id) => format!("t{}", id.raw()),
  }
}

fn edge_attributes(kind: EdgeKind, options: &RenderOptions) -> Option<&'static str> {
  let included = match options.edges {
    None => true,
    Some(EdgeKind::Explicit) => kind.is_explicit(),
    Some(EdgeKind::Implicit) => kind.is_implicit(),
    Some(EdgeKind::Both) => kind == EdgeKind::Both,
  };
  if !included {
    return None;
  }
  Some(match kind {
    EdgeKind::Explicit => "",
    EdgeKind::Implicit => " [style=dashed]",
    EdgeKind::Both => " [style=bold]",
  })
}

fn escape(label: &str) -> String {
  label.replace('\\', "\\\\").replace('"', "\\\"")
}
