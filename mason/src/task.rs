use std::cmp::Ordering;

/// A unit of work: an ordered sequence of argv-style commands executed in a
/// working directory. The natural key is (commands, working_dir); `display`
/// and `last_executed` do not participate in identity.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Task {
  pub commands: Vec<Vec<String>>,
  pub working_dir: String,
  pub display: Option<String>,
  /// Unix milliseconds of the last successful execution; 0 = never ran.
  pub last_executed: i64,
}

impl Task {
  pub fn new(commands: Vec<Vec<String>>, working_dir: impl Into<String>) -> Self {
    Self { commands, working_dir: working_dir.into(), display: None, last_executed: 0 }
  }

  pub fn with_display(mut self, display: impl Into<String>) -> Self {
    self.display = Some(display.into());
    self
  }

  /// Orders tasks by their natural key.
  pub fn cmp_key(&self, other: &Self) -> Ordering {
    self.commands.cmp(&other.commands).then_with(|| self.working_dir.cmp(&other.working_dir))
  }

  /// Human-readable name: the display label when present, otherwise the first
  /// command joined with spaces.
  pub fn name(&self) -> String {
    if let Some(display) = &self.display {
      return display.clone();
    }
    match self.commands.first() {
      Some(argv) => argv.join(" "),
      None => String::new(),
    }
  }
}
