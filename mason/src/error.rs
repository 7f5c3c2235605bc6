use thiserror::Error;

/// Failures of the persistent state store.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("sqlite: {0}")]
  Sql(#[from] rusqlite::Error),
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("command list encoding: {0}")]
  Encoding(#[from] serde_json::Error),
  #[error("{entity} not found: id {id}")]
  NotFound { entity: &'static str, id: i64 },
  #[error("{entity} already exists: {key}")]
  AlreadyExists { entity: &'static str, key: String },
  #[error("edge references a vertex that does not exist: {from} -> {to}")]
  InvalidEdge { from: i64, to: i64 },
}

/// Failures that abort a build run. Individual task failures are not errors;
/// they are accumulated in the build summary so one run reports all of them.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("build description error: {0}")]
  Description(String),
  #[error("dependency cycle detected:{}", render_cycles(.0))]
  Cycle(Vec<Vec<String>>),
  #[error(transparent)]
  State(#[from] StateError),
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

fn render_cycles(cycles: &[Vec<String>]) -> String {
  let mut out = String::new();
  for cycle in cycles {
    out.push_str("\n  ");
    out.push_str(&cycle.join(" -> "));
  }
  out
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn cycle_error_lists_all_involved_vertices() {
    let error = BuildError::Cycle(vec![
      vec!["a".to_string(), "task 1".to_string()],
      vec!["b".to_string(), "task 2".to_string()],
    ]);
    let message = error.to_string();
    assert!(message.contains("a -> task 1"));
    assert!(message.contains("b -> task 2"));
  }
}
