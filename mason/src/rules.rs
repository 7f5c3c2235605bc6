//! Build description ingestion: a description is a JSON list of rules, each a
//! task plus its declared inputs and outputs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::scan;
use crate::task::Task;

/// One rule of a build description.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Rule {
  /// Non-empty ordered sequence of argv-style commands.
  pub commands: Vec<Vec<String>>,
  /// Working directory the commands run in.
  #[serde(default = "default_cwd")]
  pub cwd: String,
  /// Optional human-readable label.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display: Option<String>,
  /// Declared input resource paths.
  #[serde(default)]
  pub inputs: Vec<String>,
  /// Declared output resource paths.
  #[serde(default)]
  pub outputs: Vec<String>,
}

fn default_cwd() -> String { ".".to_string() }

impl Rule {
  /// The task this rule declares, with its identity fields populated.
  pub fn task(&self) -> Task {
    let task = Task::new(self.commands.clone(), self.cwd.clone());
    match &self.display {
      Some(display) => task.with_display(display.clone()),
      None => task,
    }
  }
}

/// A parsed and validated build description: its path, the fingerprint of its
/// bytes, and its rules.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Description {
  pub path: String,
  pub fingerprint: Vec<u8>,
  pub rules: Vec<Rule>,
}

impl Description {
  /// Reads and parses the description file at `path`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, BuildError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
      BuildError::Description(format!("cannot read {}: {}", path.display(), e))
    })?;
    Self::from_bytes(path.to_string_lossy().into_owned(), &bytes)
  }

  /// Parses description `bytes`, recording `path` as the description resource
  /// path and fingerprinting the raw bytes.
  pub fn from_bytes(path: String, bytes: &[u8]) -> Result<Self, BuildError> {
    let rules: Vec<Rule> = serde_json::from_slice(bytes)
      .map_err(|e| BuildError::Description(format!("cannot parse {}: {}", path, e)))?;
    validate(&rules)?;
    Ok(Self { path, fingerprint: scan::fingerprint(bytes), rules })
  }

  /// Re-serializes the rules in normalized, pretty-printed form.
  pub fn normalized(&self) -> Result<String, BuildError> {
    let mut out = serde_json::to_string_pretty(&self.rules)
      .map_err(|e| BuildError::Description(e.to_string()))?;
    out.push('\n');
    Ok(out)
  }
}

fn validate(rules: &[Rule]) -> Result<(), BuildError> {
  let mut keys: Vec<(&Vec<Vec<String>>, &str)> = Vec::with_capacity(rules.len());
  for rule in rules {
    if rule.commands.is_empty() {
      return Err(BuildError::Description("rule has an empty command list".to_string()));
    }
    if rule.commands.iter().any(|argv| argv.is_empty()) {
      return Err(BuildError::Description("rule has a command with no arguments".to_string()));
    }
    if rule.inputs.iter().chain(rule.outputs.iter()).any(|path| path.is_empty()) {
      return Err(BuildError::Description(
        "the empty resource path is reserved and cannot appear in a rule".to_string(),
      ));
    }
    keys.push((&rule.commands, rule.cwd.as_str()));
  }
  keys.sort_unstable();
  for window in keys.windows(2) {
    if window[0] == window[1] {
      return Err(BuildError::Description(format!(
        "two rules declare the same task in {}: {:?}",
        window[0].1, window[0].0,
      )));
    }
  }
  Ok(())
}

#[cfg(test)]
mod test {
  use assert_matches::assert_matches;

  use super::*;

  fn rule_json() -> &'static str {
    r#"[{
      "commands": [["gcc", "-c", "foo.c", "-o", "foo.o"]],
      "cwd": "/p",
      "inputs": ["/p/foo.c"],
      "outputs": ["/p/foo.o"]
    }]"#
  }

  #[test]
  fn parses_rules_and_fingerprints_bytes() {
    let description = Description::from_bytes("BUILD".to_string(), rule_json().as_bytes()).unwrap();
    assert_eq!(description.rules.len(), 1);
    assert_eq!(description.rules[0].cwd, "/p");
    assert_eq!(description.fingerprint, scan::fingerprint(rule_json().as_bytes()));

    let task = description.rules[0].task();
    assert_eq!(task.working_dir, "/p");
    assert_eq!(task.commands[0][0], "gcc");
  }

  #[test]
  fn rejects_unparseable_description() {
    let result = Description::from_bytes("BUILD".to_string(), b"not json");
    assert_matches!(result, Err(BuildError::Description(_)));
  }

  #[test]
  fn rejects_empty_command_list() {
    let json = r#"[{"commands": [], "inputs": [], "outputs": ["a"]}]"#;
    let result = Description::from_bytes("BUILD".to_string(), json.as_bytes());
    assert_matches!(result, Err(BuildError::Description(m)) => {
      assert!(m.contains("empty command list"));
    });
  }

  #[test]
  fn rejects_empty_resource_path() {
    let json = r#"[{"commands": [["touch", "a"]], "inputs": [""], "outputs": []}]"#;
    let result = Description::from_bytes("BUILD".to_string(), json.as_bytes());
    assert_matches!(result, Err(BuildError::Description(m)) => {
      assert!(m.contains("reserved"));
    });
  }

  #[test]
  fn rejects_duplicate_task_keys() {
    let json = r#"[
      {"commands": [["touch", "a"]], "cwd": "/p", "outputs": ["a"]},
      {"commands": [["touch", "a"]], "cwd": "/p", "outputs": ["b"]}
    ]"#;
    let result = Description::from_bytes("BUILD".to_string(), json.as_bytes());
    assert_matches!(result, Err(BuildError::Description(m)) => {
      assert!(m.contains("same task"));
    });
  }

  #[test]
  fn cwd_defaults_to_current_directory() {
    let json = r#"[{"commands": [["true"]]}]"#;
    let description = Description::from_bytes("BUILD".to_string(), json.as_bytes()).unwrap();
    assert_eq!(description.rules[0].cwd, ".");
  }

  #[test]
  fn normalized_round_trips() {
    let description = Description::from_bytes("BUILD".to_string(), rule_json().as_bytes()).unwrap();
    let normalized = description.normalized().unwrap();
    let reparsed = Description::from_bytes("BUILD".to_string(), normalized.as_bytes()).unwrap();
    assert_eq!(description.rules, reparsed.rules);
  }
}
