//! The mason command-line interface.

use std::io::{self, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use notify::{RecursiveMode, Watcher};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mason::render::{self, RenderOptions};
use mason::{
  CancelToken, Description, EdgeKind, Engine, ExecuteOptions, FsScanner, ProcessRunner,
};

#[derive(Parser)]
#[command(name = "mason", version, about = "Incremental, dependency-aware build engine")]
struct Cli {
  /// Build description file.
  #[arg(short, long, global = true, default_value = "./BUILD")]
  file: PathBuf,
  /// When to color diagnostic output.
  #[arg(long, global = true, value_enum, default_value = "auto")]
  color: Color,
  /// Verbose diagnostics.
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sync the description and run everything out of date.
  Build {
    /// Report what would run without running it.
    #[arg(short = 'n', long)]
    dryrun: bool,
    /// Worker pool size; defaults to the number of logical CPUs.
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,
    /// Keep rebuilding whenever watched files change.
    #[arg(long)]
    autopilot: bool,
    /// Directory to watch in autopilot mode; defaults to the description's
    /// directory.
    #[arg(long)]
    watchdir: Option<PathBuf>,
    /// Milliseconds to let changes settle before rebuilding.
    #[arg(long, default_value_t = 100)]
    delay: u64,
  },
  /// Print the dependency graph in GraphViz dot format.
  Graph {
    /// Restrict to the subgraph reachable from pending work.
    #[arg(long)]
    changes: bool,
    /// Render the stored graph without syncing the description first.
    #[arg(long)]
    cached: bool,
    /// Label resources with full paths instead of file names.
    #[arg(long)]
    full: bool,
    /// Only render edges with this origin.
    #[arg(long, value_enum)]
    edges: Option<Edges>,
  },
  /// Show pending work.
  Status,
  /// Delete declared outputs and mark their producers for rebuild.
  Clean {
    /// Also delete the state file.
    #[arg(long)]
    purge: bool,
  },
  /// Create an empty build description if none exists.
  Init,
  /// Parse the description and re-emit it in normalized form.
  Convert {
    /// Where to write; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Remove vertices with no edges at all (experimental).
  Gc,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Color {
  Auto,
  Never,
  Always,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Edges {
  Explicit,
  Implicit,
  Both,
}

impl From<Edges> for EdgeKind {
  fn from(edges: Edges) -> Self {
    match edges {
      Edges::Explicit => EdgeKind::Explicit,
      Edges::Implicit => EdgeKind::Implicit,
      Edges::Both => EdgeKind::Both,
    }
  }
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose, cli.color);
  match run(cli) {
    Ok(code) => std::process::exit(code),
    Err(error) => {
      tracing::error!("{error:#}");
      std::process::exit(1);
    }
  }
}

fn init_tracing(verbose: bool, color: Color) {
  let default = if verbose { "mason=debug" } else { "mason=info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  let ansi = match color {
    Color::Auto => io::stderr().is_terminal(),
    Color::Always => true,
    Color::Never => false,
  };
  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(io::stderr).with_ansi(ansi).compact())
    .init();
}

fn run(cli: Cli) -> Result<i32> {
  match cli.command {
    Command::Build { dryrun, threads, autopilot, watchdir, delay } => {
      let options = ExecuteOptions {
        threads: threads.unwrap_or(ExecuteOptions::default().threads),
        dry_run: dryrun,
      };
      if autopilot {
        cmd_autopilot(&cli.file, &options, watchdir, delay)
      } else {
        cmd_build(&cli.file, &options)
      }
    }
    Command::Graph { changes, cached, full, edges } => {
      cmd_graph(&cli.file, changes, cached, full, edges.map(Into::into))
    }
    Command::Status => cmd_status(&cli.file),
    Command::Clean { purge } => cmd_clean(&cli.file, purge),
    Command::Init => cmd_init(&cli.file),
    Command::Convert { output } => cmd_convert(&cli.file, output.as_deref()),
    Command::Gc => cmd_gc(&cli.file),
  }
}

fn cmd_build(file: &Path, options: &ExecuteOptions) -> Result<i32> {
  let mut engine = Engine::open(file)?;
  let (_, summary) = engine.build(&ProcessRunner::new(), &FsScanner, options, &CancelToken::new())
    .context("build failed")?;

  let mut stdout = io::stdout().lock();
  for name in &summary.would_run {
    writeln!(stdout, "would run: {name}")?;
  }
  if !options.dry_run && summary.executed.is_empty() && summary.failures.is_empty() {
    writeln!(stdout, "nothing to do")?;
  }
  for failure in &summary.failures {
    tracing::error!(
      task = %failure.name,
      exit_code = failure.exit_code,
      "task failed\n{}",
      failure.stderr.trim_end(),
    );
  }
  Ok(if summary.success() && !summary.cancelled { 0 } else { 1 })
}

fn cmd_autopilot(
  file: &Path,
  options: &ExecuteOptions,
  watchdir: Option<PathBuf>,
  delay: u64,
) -> Result<i32> {
  let watchdir = match watchdir {
    Some(dir) => dir,
    None => file.parent().unwrap_or(Path::new(".")).to_path_buf(),
  };
  let state_path = mason::state_path_for(file);

  let (event_tx, event_rx) = std::sync::mpsc::channel();
  let mut watcher = notify::recommended_watcher(move |event| {
    let _ = event_tx.send(event);
  }).context("create filesystem watcher")?;
  watcher.watch(&watchdir, RecursiveMode::Recursive)
    .with_context(|| format!("watch {}", watchdir.display()))?;
  tracing::info!(dir = %watchdir.display(), "autopilot watching");

  loop {
    let code = cmd_build(file, options)?;
    if code != 0 {
      tracing::warn!("build failed; waiting for changes");
    }
    // Block until something relevant changes, then let the burst settle.
    loop {
      let Ok(event) = event_rx.recv() else { return Ok(0) };
      if relevant(event, &state_path) {
        break;
      }
    }
    let deadline = Instant::now() + Duration::from_millis(delay);
    loop {
      let now = Instant::now();
      if now >= deadline {
        break;
      }
      if event_rx.recv_timeout(deadline - now).is_err() {
        break;
      }
    }
  }
}

/// The state file (and its sqlite journal siblings) is written by the build
/// itself; reacting to it would rebuild forever.
fn relevant(event: Result<notify::Event, notify::Error>, state_path: &Path) -> bool {
  let state_prefix = state_path.to_string_lossy().into_owned();
  match event {
    Err(_) => false,
    Ok(event) => event.paths.iter().any(|p| !p.to_string_lossy().starts_with(&state_prefix)),
  }
}

fn cmd_graph(
  file: &Path,
  changes: bool,
  cached: bool,
  full: bool,
  edges: Option<EdgeKind>,
) -> Result<i32> {
  let mut engine = Engine::open(file)?;
  if !cached {
    engine.sync(&FsScanner)?;
  }
  let graph = mason::graph::snapshot(engine.store())?;
  let graph = if changes {
    mason::graph::pending_subgraph(engine.store(), &graph)?
  } else {
    graph
  };
  let options = RenderOptions { full_names: full, edges };
  render::graphviz(engine.store(), &graph, &mut io::stdout().lock(), &options)?;
  Ok(0)
}

fn cmd_status(file: &Path) -> Result<i32> {
  let engine = Engine::open(file)?;
  let report = engine.status()?;
  let mut stdout = io::stdout().lock();
  writeln!(stdout, "{} resources, {} tasks", report.resource_count, report.task_count)?;
  if report.pending_resources.is_empty() && report.pending_tasks.is_empty() {
    writeln!(stdout, "nothing pending")?;
    return Ok(0);
  }
  for (_, path) in &report.pending_resources {
    writeln!(stdout, "pending resource: {path}")?;
  }
  for (_, name) in &report.pending_tasks {
    writeln!(stdout, "pending task: {name}")?;
  }
  Ok(0)
}

fn cmd_clean(file: &Path, purge: bool) -> Result<i32> {
  let mut engine = Engine::open(file)?;
  let stats = engine.clean()?;
  println!("removed {} output file(s)", stats.files_removed);
  if purge {
    engine.purge()?;
    println!("removed state file");
  }
  Ok(0)
}

fn cmd_init(file: &Path) -> Result<i32> {
  if file.exists() {
    println!("{} already exists", file.display());
    return Ok(0);
  }
  std::fs::write(file, "[]\n").with_context(|| format!("write {}", file.display()))?;
  println!("created {}", file.display());
  Ok(0)
}

fn cmd_convert(file: &Path, output: Option<&Path>) -> Result<i32> {
  let description = Description::load(file)?;
  let normalized = description.normalized()?;
  match output {
    Some(path) => std::fs::write(path, normalized)
      .with_context(|| format!("write {}", path.display()))?,
    None => io::stdout().lock().write_all(normalized.as_bytes())?,
  }
  Ok(0)
}

fn cmd_gc(file: &Path) -> Result<i32> {
  let mut engine = Engine::open(file)?;
  let (resources, tasks) = engine.gc()?;
  println!("removed {resources} resource(s) and {tasks} task(s)");
  Ok(0)
}
