//! The command-runner interface: the platform boundary the executor talks to.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What one task execution did: its exit status, the absolute paths it was
/// observed reading and writing, captured diagnostics, and an optional label.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct RunOutput {
  pub exit_code: i32,
  pub reads: BTreeSet<String>,
  pub writes: BTreeSet<String>,
  pub stderr: String,
  pub display: Option<String>,
}

impl RunOutput {
  #[inline]
  pub fn success(&self) -> bool { self.exit_code == 0 }

  /// Drops observed paths outside `root`. Runners filter their observations
  /// before returning them.
  pub fn retain_under(&mut self, root: &Path) {
    self.reads.retain(|p| Path::new(p).starts_with(root));
    self.writes.retain(|p| Path::new(p).starts_with(root));
  }
}

/// Runs one task's commands in order inside a working directory and reports
/// the observed file accesses of the whole process tree.
///
/// Implementations are shared across the executor's workers.
pub trait CommandRunner: Sync {
  fn run(&self, commands: &[Vec<String>], working_dir: &str) -> Result<RunOutput, io::Error>;
}

/// Runner that executes commands as child processes.
///
/// Syscall-level observation of file accesses is platform work that lives
/// behind this trait, not here: this runner reports empty read and write sets
/// and only contributes exit codes and captured stderr.
#[derive(Clone, Default, Debug)]
pub struct ProcessRunner {
  root: Option<PathBuf>,
}

impl ProcessRunner {
  pub fn new() -> Self { Self::default() }

  /// Restricts reported observations to paths under `root`.
  pub fn with_root(root: impl Into<PathBuf>) -> Self {
    Self { root: Some(root.into()) }
  }
}

impl CommandRunner for ProcessRunner {
  fn run(&self, commands: &[Vec<String>], working_dir: &str) -> Result<RunOutput, io::Error> {
    let mut output = RunOutput::default();
    for argv in commands {
      let Some((program, arguments)) = argv.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
      };
      let result = Command::new(program)
        .args(arguments)
        .current_dir(working_dir)
        .output()?;
      output.stderr.push_str(&String::from_utf8_lossy(&result.stderr));
      // Nonzero exit aborts the remaining commands of this task.
      let code = result.status.code().unwrap_or(-1);
      if code != 0 {
        output.exit_code = code;
        break;
      }
    }
    if let Some(root) = &self.root {
      output.retain_under(root);
    }
    Ok(output)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn retain_under_filters_foreign_paths() {
    let mut output = RunOutput::default();
    output.reads.insert("/p/a".to_string());
    output.reads.insert("/tmp/scratch".to_string());
    output.writes.insert("/p/out".to_string());
    output.writes.insert("/dev/null".to_string());

    output.retain_under(Path::new("/p"));
    assert_eq!(output.reads.iter().collect::<Vec<_>>(), vec!["/p/a"]);
    assert_eq!(output.writes.iter().collect::<Vec<_>>(), vec!["/p/out"]);
  }

  #[cfg(unix)]
  #[test]
  fn process_runner_reports_exit_and_stderr() {
    let runner = ProcessRunner::new();
    let output = runner.run(
      &[
        vec!["sh".to_string(), "-c".to_string(), "echo oops >&2; exit 3".to_string()],
        vec!["sh".to_string(), "-c".to_string(), "echo never".to_string()],
      ],
      ".",
    ).unwrap();
    assert_eq!(output.exit_code, 3);
    assert!(output.stderr.contains("oops"));
  }

  #[cfg(unix)]
  #[test]
  fn process_runner_runs_commands_in_order() {
    let dir = dev_shared::create_temp_dir();
    let wd = dir.path().to_string_lossy().into_owned();
    let runner = ProcessRunner::new();
    let output = runner.run(
      &[
        vec!["sh".to_string(), "-c".to_string(), "printf one > log".to_string()],
        vec!["sh".to_string(), "-c".to_string(), "printf ,two >> log".to_string()],
      ],
      &wd,
    ).unwrap();
    assert!(output.success());
    assert_eq!(std::fs::read_to_string(dir.path().join("log")).unwrap(), "one,two");
  }
}
