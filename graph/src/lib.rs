#![forbid(unsafe_code)]

//! A bipartite dependency graph over two vertex colors, conventionally called
//! *resources* and *tasks*. Edges always connect vertices of different colors.
//!
//! The graph is an immutable snapshot once built: it supports typed iteration
//! in insertion order, extraction of the induced subgraph reachable from a set
//! of roots, detection of non-trivial strongly-connected components (Tarjan),
//! and a parallel topological walk driven by a caller-supplied driver.
//!
//! Vertices are caller-owned identifiers (any `Copy + Eq + Hash` type); the
//! graph stores no payload besides per-edge data.
//!
//! # Examples
//!
//! ```
//! use mason_graph::BiGraph;
//!
//! let mut graph = BiGraph::new();
//! graph.add_resource("main.c");
//! graph.add_task(1);
//! graph.add_resource("main.o");
//! graph.add_edge_rt("main.c", 1, ()).unwrap();
//! graph.add_edge_tr(1, "main.o", ()).unwrap();
//!
//! assert_eq!(graph.resource_count(), 2);
//! assert_eq!(graph.task_count(), 1);
//! assert!(graph.cycles().is_empty());
//! ```

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;

/// A vertex of either color.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Vertex<R, T> {
  Resource(R),
  Task(T),
}

/// Failures from graph mutation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
  /// An edge operation referenced a vertex that is not in the graph.
  VertexMissing,
}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::VertexMissing => write!(f, "edge endpoint was not found in the graph"),
    }
  }
}

impl std::error::Error for Error {}

/// Adjacency of one vertex, as indices into the opposite color's vertex list.
#[derive(Clone, Debug)]
struct Adjacency<E> {
  out: Vec<(usize, E)>,
  inc: Vec<(usize, E)>,
}

impl<E> Default for Adjacency<E> {
  #[inline]
  fn default() -> Self {
    Self { out: Vec::new(), inc: Vec::new() }
  }
}

/// Bipartite graph over resource identifiers `R` and task identifiers `T`,
/// with edge data `E`.
#[derive(Clone, Debug)]
pub struct BiGraph<R, T, E> {
  resources: Vec<R>,
  tasks: Vec<T>,
  resource_index: HashMap<R, usize>,
  task_index: HashMap<T, usize>,
  resource_adj: Vec<Adjacency<E>>,
  task_adj: Vec<Adjacency<E>>,
}

impl<R, T, E> Default for BiGraph<R, T, E> {
  #[inline]
  fn default() -> Self {
    Self {
      resources: Vec::new(),
      tasks: Vec::new(),
      resource_index: HashMap::new(),
      task_index: HashMap::new(),
      resource_adj: Vec::new(),
      task_adj: Vec::new(),
    }
  }
}

impl<R, T, E> BiGraph<R, T, E>
where
  R: Copy + Eq + Hash,
  T: Copy + Eq + Hash,
  E: Copy,
{
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Adds resource vertex `resource`, returning `false` if it was already present.
  pub fn add_resource(&mut self, resource: R) -> bool {
    if self.resource_index.contains_key(&resource) {
      return false;
    }
    self.resource_index.insert(resource, self.resources.len());
    self.resources.push(resource);
    self.resource_adj.push(Adjacency::default());
    true
  }

  /// Adds task vertex `task`, returning `false` if it was already present.
  pub fn add_task(&mut self, task: T) -> bool {
    if self.task_index.contains_key(&task) {
      return false;
    }
    self.task_index.insert(task, self.tasks.len());
    self.tasks.push(task);
    self.task_adj.push(Adjacency::default());
    true
  }

  #[inline]
  pub fn contains_resource(&self, resource: R) -> bool { self.resource_index.contains_key(&resource) }
  #[inline]
  pub fn contains_task(&self, task: T) -> bool { self.task_index.contains_key(&task) }

  /// Adds a resource→task edge. Endpoints must already be vertices.
  ///
  /// The caller is responsible for not adding the same edge twice; the graph
  /// does not deduplicate.
  pub fn add_edge_rt(&mut self, from: R, to: T, data: E) -> Result<(), Error> {
    let (Some(&from), Some(&to)) = (self.resource_index.get(&from), self.task_index.get(&to)) else {
      return Err(Error::VertexMissing);
    };
    self.resource_adj[from].out.push((to, data));
    self.task_adj[to].inc.push((from, data));
    Ok(())
  }

  /// Adds a task→resource edge. Endpoints must already be vertices.
  pub fn add_edge_tr(&mut self, from: T, to: R, data: E) -> Result<(), Error> {
    let (Some(&from), Some(&to)) = (self.task_index.get(&from), self.resource_index.get(&to)) else {
      return Err(Error::VertexMissing);
    };
    self.task_adj[from].out.push((to, data));
    self.resource_adj[to].inc.push((from, data));
    Ok(())
  }

  #[inline]
  pub fn resource_count(&self) -> usize { self.resources.len() }
  #[inline]
  pub fn task_count(&self) -> usize { self.tasks.len() }
  #[inline]
  pub fn is_empty(&self) -> bool { self.resources.is_empty() && self.tasks.is_empty() }

  /// Iterates all resource vertices in insertion order.
  #[inline]
  pub fn resources(&self) -> impl Iterator<Item = R> + '_ { self.resources.iter().copied() }
  /// Iterates all task vertices in insertion order.
  #[inline]
  pub fn tasks(&self) -> impl Iterator<Item = T> + '_ { self.tasks.iter().copied() }

  /// Iterates all resource→task edges in insertion order of their source vertex.
  pub fn edges_rt(&self) -> impl Iterator<Item = (R, T, E)> + '_ {
    self.resource_adj.iter().enumerate().flat_map(move |(ri, adj)| {
      adj.out.iter().map(move |&(ti, e)| (self.resources[ri], self.tasks[ti], e))
    })
  }

  /// Iterates all task→resource edges in insertion order of their source vertex.
  pub fn edges_tr(&self) -> impl Iterator<Item = (T, R, E)> + '_ {
    self.task_adj.iter().enumerate().flat_map(move |(ti, adj)| {
      adj.out.iter().map(move |&(ri, e)| (self.tasks[ti], self.resources[ri], e))
    })
  }

  /// Iterates the task successors of `resource` with their edge data.
  pub fn outgoing_of_resource(&self, resource: R) -> impl Iterator<Item = (T, E)> + '_ {
    self.resource_index.get(&resource)
      .into_iter()
      .flat_map(move |&ri| self.resource_adj[ri].out.iter().map(move |&(ti, e)| (self.tasks[ti], e)))
  }

  /// Iterates the task predecessors of `resource` with their edge data.
  pub fn incoming_of_resource(&self, resource: R) -> impl Iterator<Item = (T, E)> + '_ {
    self.resource_index.get(&resource)
      .into_iter()
      .flat_map(move |&ri| self.resource_adj[ri].inc.iter().map(move |&(ti, e)| (self.tasks[ti], e)))
  }

  /// Iterates the resource successors of `task` with their edge data.
  pub fn outgoing_of_task(&self, task: T) -> impl Iterator<Item = (R, E)> + '_ {
    self.task_index.get(&task)
      .into_iter()
      .flat_map(move |&ti| self.task_adj[ti].out.iter().map(move |&(ri, e)| (self.resources[ri], e)))
  }

  /// Iterates the resource predecessors of `task` with their edge data.
  pub fn incoming_of_task(&self, task: T) -> impl Iterator<Item = (R, E)> + '_ {
    self.task_index.get(&task)
      .into_iter()
      .flat_map(move |&ti| self.task_adj[ti].inc.iter().map(move |&(ri, e)| (self.resources[ri], e)))
  }

  /// Returns the induced subgraph reachable from the given roots by following
  /// forward edges. Roots that are not vertices of this graph are ignored.
  /// Empty root sets produce an empty subgraph.
  pub fn subgraph(
    &self,
    resource_roots: impl IntoIterator<Item = R>,
    task_roots: impl IntoIterator<Item = T>,
  ) -> Self {
    let combined = self.combined_len();
    let mut reachable = vec![false; combined];
    let mut queue = VecDeque::new();
    for root in resource_roots {
      if let Some(&ri) = self.resource_index.get(&root) {
        queue.push_back(ri);
      }
    }
    for root in task_roots {
      if let Some(&ti) = self.task_index.get(&root) {
        queue.push_back(self.resources.len() + ti);
      }
    }
    while let Some(v) = queue.pop_front() {
      if reachable[v] {
        continue;
      }
      reachable[v] = true;
      for succ in self.successors(v) {
        if !reachable[succ] {
          queue.push_back(succ);
        }
      }
    }

    let mut sub = Self::new();
    for (ri, &resource) in self.resources.iter().enumerate() {
      if reachable[ri] {
        sub.add_resource(resource);
      }
    }
    for (ti, &task) in self.tasks.iter().enumerate() {
      if reachable[self.resources.len() + ti] {
        sub.add_task(task);
      }
    }
    for (from, to, e) in self.edges_rt() {
      if sub.contains_resource(from) && sub.contains_task(to) {
        sub.add_edge_rt(from, to, e).expect("BUG: subgraph endpoint missing");
      }
    }
    for (from, to, e) in self.edges_tr() {
      if sub.contains_task(from) && sub.contains_resource(to) {
        sub.add_edge_tr(from, to, e).expect("BUG: subgraph endpoint missing");
      }
    }
    sub
  }

  /// Finds all non-trivial strongly-connected components with Tarjan's
  /// algorithm (iterative, so deep graphs do not overflow the stack).
  ///
  /// A well-formed build graph has none, but erroneous rule sets can produce
  /// them; they are returned as values so the caller can report all of them
  /// together. Components and their members are ordered by vertex insertion
  /// order. Trivial components (single vertices) are omitted; self-loops
  /// cannot exist in a bipartite graph.
  pub fn cycles(&self) -> Vec<Vec<Vertex<R, T>>> {
    let combined = self.combined_len();
    let mut index = vec![usize::MAX; combined];
    let mut lowlink = vec![0usize; combined];
    let mut on_stack = vec![false; combined];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<usize>> = Vec::new();

    // Explicit DFS frames: (vertex, position into its successor list).
    let mut frames: Vec<(usize, usize)> = Vec::new();
    for start in 0..combined {
      if index[start] != usize::MAX {
        continue;
      }
      frames.push((start, 0));
      while let Some(&mut (v, ref mut pos)) = frames.last_mut() {
        if *pos == 0 {
          index[v] = next_index;
          lowlink[v] = next_index;
          next_index += 1;
          stack.push(v);
          on_stack[v] = true;
        }
        if *pos < self.successor_slice(v).len() {
          let succ = self.successor_at(v, *pos);
          *pos += 1;
          if index[succ] == usize::MAX {
            frames.push((succ, 0));
          } else if on_stack[succ] {
            lowlink[v] = lowlink[v].min(index[succ]);
          }
        } else {
          frames.pop();
          if let Some(&(parent, _)) = frames.last() {
            lowlink[parent] = lowlink[parent].min(lowlink[v]);
          }
          if lowlink[v] == index[v] {
            let mut component = Vec::new();
            loop {
              let w = stack.pop().expect("BUG: tarjan stack underflow");
              on_stack[w] = false;
              component.push(w);
              if w == v {
                break;
              }
            }
            if component.len() > 1 {
              component.sort_unstable();
              components.push(component);
            }
          }
        }
      }
    }

    components.sort_unstable_by_key(|c| c[0]);
    components.into_iter()
      .map(|c| c.into_iter().map(|v| self.vertex_at(v)).collect())
      .collect()
  }

  #[inline]
  fn combined_len(&self) -> usize { self.resources.len() + self.tasks.len() }

  #[inline]
  fn vertex_at(&self, v: usize) -> Vertex<R, T> {
    if v < self.resources.len() {
      Vertex::Resource(self.resources[v])
    } else {
      Vertex::Task(self.tasks[v - self.resources.len()])
    }
  }

  #[inline]
  fn successor_slice(&self, v: usize) -> &[(usize, E)] {
    if v < self.resources.len() {
      &self.resource_adj[v].out
    } else {
      &self.task_adj[v - self.resources.len()].out
    }
  }

  #[inline]
  fn successor_at(&self, v: usize, pos: usize) -> usize {
    let (succ, _) = self.successor_slice(v)[pos];
    if v < self.resources.len() {
      self.resources.len() + succ
    } else {
      succ
    }
  }

  fn successors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
    let offset = if v < self.resources.len() { self.resources.len() } else { 0 };
    self.successor_slice(v).iter().map(move |&(succ, _)| succ + offset)
  }
}

/// Whether a visited vertex releases its successors toward the ready frontier.
///
/// `Hold` keeps every successor (and transitively their descendants, unless
/// reachable another way) out of the walk; this is how failed branches are
/// withheld while independent branches continue.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Release {
  Release,
  Hold,
}

/// Whether a ready task is handed to the worker pool or passed through.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Decision {
  Run,
  Skip,
}

/// Coordinator-side callbacks of [`BiGraph::walk`]. All methods run on the
/// walking thread; only the `execute` closure passed to `walk` runs on
/// workers.
pub trait WalkDriver<R, T, O> {
  /// Called when `resource` becomes ready. Resources are passive; the return
  /// value only controls whether its successors are released.
  fn resource_ready(&mut self, resource: R) -> Release;
  /// Called when `task` becomes ready, deciding whether it is executed on a
  /// worker or skipped. A skipped task still releases its successors.
  fn task_ready(&mut self, task: T) -> Decision;
  /// Called with the outcome of an executed `task`.
  fn task_finished(&mut self, task: T, outcome: O) -> Release;
  /// Polled before dispatching work; once true, no new work is released but
  /// in-flight outcomes are still delivered.
  fn cancelled(&self) -> bool { false }
}

/// Counters reported by [`BiGraph::walk`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct WalkStats {
  /// Resources that became ready and were visited.
  pub resources_visited: usize,
  /// Tasks that became ready (executed or skipped).
  pub tasks_visited: usize,
  /// Tasks handed to the worker pool.
  pub tasks_executed: usize,
  /// Vertices that never became ready: successors of held vertices, members
  /// of cycles, and everything left when the walk was cancelled.
  pub unreached: usize,
}

impl<R, T, E> BiGraph<R, T, E>
where
  R: Copy + Eq + Hash,
  T: Copy + Eq + Hash + Send,
  E: Copy,
{
  /// Walks the graph in parallel topological order.
  ///
  /// A vertex is ready when all its in-edges have been processed; the walk
  /// starts at vertices with in-degree 0. Ready resources are visited on the
  /// walking thread. Ready tasks are offered to `driver`; tasks it decides to
  /// run are executed by `execute` on a pool of `threads` workers, and their
  /// outcomes are delivered back to `driver` on the walking thread in
  /// completion order. Successors are released according to the driver's
  /// [`Release`] verdicts.
  ///
  /// The walk always terminates: vertices on cycles simply never become ready
  /// and are counted in [`WalkStats::unreached`].
  pub fn walk<O, X, D>(&self, threads: NonZeroUsize, execute: X, driver: &mut D) -> WalkStats
  where
    O: Send,
    X: Fn(T) -> O + Sync,
    D: WalkDriver<R, T, O>,
  {
    let combined = self.combined_len();
    let resource_count = self.resources.len();
    let mut indegree = vec![0usize; combined];
    for adj in self.resource_adj.iter() {
      for &(ti, _) in &adj.out {
        indegree[resource_count + ti] += 1;
      }
    }
    for adj in self.task_adj.iter() {
      for &(ri, _) in &adj.out {
        indegree[ri] += 1;
      }
    }
    let mut ready: VecDeque<usize> = (0..combined).filter(|&v| indegree[v] == 0).collect();
    let mut stats = WalkStats::default();

    let (job_tx, job_rx) = mpsc::channel::<T>();
    let job_rx = Mutex::new(job_rx);
    let (outcome_tx, outcome_rx) = mpsc::channel::<(T, O)>();

    thread::scope(|scope| {
      for _ in 0..threads.get() {
        let job_rx = &job_rx;
        let outcome_tx = outcome_tx.clone();
        let execute = &execute;
        scope.spawn(move || {
          loop {
            // Hold the lock only while receiving, not while executing.
            let job = { job_rx.lock().expect("BUG: walk job lock poisoned").recv() };
            let Ok(task) = job else { break };
            if outcome_tx.send((task, execute(task))).is_err() {
              break;
            }
          }
        });
      }
      drop(outcome_tx);

      let mut in_flight = 0usize;
      let mut released = 0usize;
      loop {
        while !driver.cancelled() {
          let Some(v) = ready.pop_front() else { break };
          released += 1;
          let release = if v < resource_count {
            stats.resources_visited += 1;
            driver.resource_ready(self.resources[v])
          } else {
            let task = self.tasks[v - resource_count];
            stats.tasks_visited += 1;
            match driver.task_ready(task) {
              Decision::Run => {
                stats.tasks_executed += 1;
                job_tx.send(task).expect("BUG: walk worker pool disconnected");
                in_flight += 1;
                continue;
              }
              Decision::Skip => Release::Release,
            }
          };
          if release == Release::Release {
            self.release_successors(v, &mut indegree, &mut ready);
          }
        }
        if in_flight == 0 {
          break;
        }
        let (task, outcome) = outcome_rx.recv().expect("BUG: walk worker pool disconnected");
        in_flight -= 1;
        if driver.task_finished(task, outcome) == Release::Release {
          let v = resource_count + self.task_index[&task];
          self.release_successors(v, &mut indegree, &mut ready);
        }
      }
      drop(job_tx);

      stats.unreached = combined - released;
    });

    stats
  }

  fn release_successors(&self, v: usize, indegree: &mut [usize], ready: &mut VecDeque<usize>) {
    let offset = if v < self.resources.len() { self.resources.len() } else { 0 };
    for &(succ, _) in self.successor_slice(v) {
      let idx = succ + offset;
      indegree[idx] -= 1;
      if indegree[idx] == 0 {
        ready.push_back(idx);
      }
    }
  }
}
