use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::TempDir;

use mason::{CommandRunner, Engine, RunOutput};

/// A temporary project directory with a BUILD description.
pub struct Project {
  pub dir: TempDir,
}

impl Project {
  pub fn new(rules: &serde_json::Value) -> Project {
    let dir = dev_shared::create_temp_dir();
    let project = Project { dir };
    project.write_description(rules);
    project
  }

  pub fn write_description(&self, rules: &serde_json::Value) {
    let mut payload = serde_json::to_string_pretty(rules).expect("failed to serialize rules");
    payload.push('\n');
    fs::write(self.build_file(), payload).expect("failed to write BUILD");
  }

  pub fn build_file(&self) -> PathBuf {
    self.dir.path().join("BUILD")
  }

  /// Absolute path of a file inside the project, as a string.
  pub fn path(&self, relative: &str) -> String {
    self.dir.path().join(relative).to_string_lossy().into_owned()
  }

  pub fn write(&self, relative: &str, contents: &str) {
    dev_shared::write_file(self.dir.path().join(relative), contents).expect("failed to write file");
  }

  pub fn engine(&self) -> Engine {
    Engine::open(self.build_file()).expect("failed to open engine")
  }
}

/// What one scripted task does when "run".
#[derive(Clone, Default)]
pub struct Behavior {
  /// Files actually written to disk, so scans observe the effect.
  pub effects: Vec<(String, String)>,
  /// Reported observed reads.
  pub reads: Vec<String>,
  /// Reported observed writes.
  pub writes: Vec<String>,
  pub exit_code: i32,
}

impl Behavior {
  pub fn writes_file(mut self, path: &str, contents: &str) -> Self {
    self.effects.push((path.to_string(), contents.to_string()));
    self
  }

  pub fn reads_path(mut self, path: &str) -> Self {
    self.reads.push(path.to_string());
    self
  }

  pub fn fails(mut self, exit_code: i32) -> Self {
    self.exit_code = exit_code;
    self
  }
}

/// Command runner driven by a behavior table instead of real processes,
/// keyed by the first command of the task. Unknown tasks succeed and do
/// nothing. Records every invocation.
#[derive(Default)]
pub struct ScriptedRunner {
  behaviors: Mutex<HashMap<String, Behavior>>,
  invocations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// (Re)programs the behavior of the task whose first command is `key`.
  pub fn set(&self, key: &str, behavior: Behavior) {
    self.behaviors.lock().unwrap().insert(key.to_string(), behavior);
  }

  pub fn invocations(&self) -> Vec<String> {
    self.invocations.lock().unwrap().clone()
  }

  pub fn invocation_count(&self) -> usize {
    self.invocations.lock().unwrap().len()
  }
}

impl CommandRunner for ScriptedRunner {
  fn run(&self, commands: &[Vec<String>], _working_dir: &str) -> Result<RunOutput, io::Error> {
    let key = commands.first().map(|argv| argv.join(" ")).unwrap_or_default();
    self.invocations.lock().unwrap().push(key.clone());

    let behavior = self.behaviors.lock().unwrap().get(&key).cloned().unwrap_or_default();
    for (path, contents) in &behavior.effects {
      if let Some(parent) = std::path::Path::new(path).parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(path, contents)?;
    }
    let mut output = RunOutput {
      exit_code: behavior.exit_code,
      reads: behavior.reads.into_iter().collect(),
      writes: behavior.writes.into_iter().collect(),
      ..RunOutput::default()
    };
    if output.exit_code != 0 {
      output.stderr = format!("{key}: scripted failure");
    }
    Ok(output)
  }
}
