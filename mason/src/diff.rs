//! Linear-time sorted-difference: the change detector used to reconcile
//! declared rules against stored state and observed accesses against stored
//! implicit edges.

use std::cmp::Ordering;
use std::iter::Peekable;

/// One element of the tagged stream emitted by [`sorted_diff_by`].
///
/// `Unchanged` carries the element from the *next* sequence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Change<T> {
  Unchanged(T),
  Added(T),
  Removed(T),
}

impl<T> Change<T> {
  #[inline]
  pub fn value(&self) -> &T {
    match self {
      Change::Unchanged(v) | Change::Added(v) | Change::Removed(v) => v,
    }
  }

  #[inline]
  pub fn into_value(self) -> T {
    match self {
      Change::Unchanged(v) | Change::Added(v) | Change::Removed(v) => v,
    }
  }
}

/// Compares two sorted sequences, lazily emitting every element tagged with
/// whether it appears in both (`Unchanged`), only in `next` (`Added`), or only
/// in `prev` (`Removed`). Runs in O(|prev| + |next|).
///
/// Both inputs must be sorted consistently with `cmp`; ties advance both
/// sides. An empty side degrades to a pure-added or pure-removed tail.
pub fn sorted_diff_by<T, P, N, F>(prev: P, next: N, cmp: F) -> SortedDiff<P::IntoIter, N::IntoIter, F>
where
  P: IntoIterator<Item = T>,
  N: IntoIterator<Item = T>,
  F: FnMut(&T, &T) -> Ordering,
{
  SortedDiff { prev: prev.into_iter().peekable(), next: next.into_iter().peekable(), cmp }
}

/// [`sorted_diff_by`] with the natural order of `T`.
pub fn sorted_diff<T, P, N>(prev: P, next: N) -> SortedDiff<P::IntoIter, N::IntoIter, fn(&T, &T) -> Ordering>
where
  T: Ord,
  P: IntoIterator<Item = T>,
  N: IntoIterator<Item = T>,
{
  sorted_diff_by(prev, next, T::cmp)
}

/// Iterator returned by [`sorted_diff_by`].
pub struct SortedDiff<P: Iterator, N: Iterator, F> {
  prev: Peekable<P>,
  next: Peekable<N>,
  cmp: F,
}

impl<T, P, N, F> Iterator for SortedDiff<P, N, F>
where
  P: Iterator<Item = T>,
  N: Iterator<Item = T>,
  F: FnMut(&T, &T) -> Ordering,
{
  type Item = Change<T>;

  fn next(&mut self) -> Option<Change<T>> {
    match (self.prev.peek(), self.next.peek()) {
      (None, None) => None,
      (Some(_), None) => self.prev.next().map(Change::Removed),
      (None, Some(_)) => self.next.next().map(Change::Added),
      (Some(p), Some(n)) => match (self.cmp)(p, n) {
        Ordering::Equal => {
          self.prev.next();
          self.next.next().map(Change::Unchanged)
        }
        Ordering::Less => self.prev.next().map(Change::Removed),
        Ordering::Greater => self.next.next().map(Change::Added),
      },
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn collect(prev: &[i32], next: &[i32]) -> Vec<Change<i32>> {
    sorted_diff(prev.iter().copied(), next.iter().copied()).collect()
  }

  #[test]
  fn equal_sequences_are_unchanged() {
    let changes = collect(&[1, 2, 3], &[1, 2, 3]);
    assert_eq!(changes, vec![Change::Unchanged(1), Change::Unchanged(2), Change::Unchanged(3)]);
  }

  #[test]
  fn disjoint_sequences_interleave() {
    let changes = collect(&[1, 3], &[2, 4]);
    assert_eq!(changes, vec![
      Change::Removed(1),
      Change::Added(2),
      Change::Removed(3),
      Change::Added(4),
    ]);
  }

  #[test]
  fn empty_prev_is_pure_added() {
    let changes = collect(&[], &[1, 2]);
    assert_eq!(changes, vec![Change::Added(1), Change::Added(2)]);
  }

  #[test]
  fn empty_next_is_pure_removed() {
    let changes = collect(&[1, 2], &[]);
    assert_eq!(changes, vec![Change::Removed(1), Change::Removed(2)]);
  }

  #[test]
  fn both_empty_is_empty() {
    assert!(collect(&[], &[]).is_empty());
  }

  #[test]
  fn union_and_counts_match() {
    let prev = vec![1, 2, 4, 6, 9];
    let next = vec![2, 3, 4, 7, 9, 10];
    let changes = collect(&prev, &next);

    let removed: Vec<_> = changes.iter().filter_map(|c| match c {
      Change::Removed(v) => Some(*v),
      _ => None,
    }).collect();
    let added: Vec<_> = changes.iter().filter_map(|c| match c {
      Change::Added(v) => Some(*v),
      _ => None,
    }).collect();
    let unchanged: Vec<_> = changes.iter().filter_map(|c| match c {
      Change::Unchanged(v) => Some(*v),
      _ => None,
    }).collect();

    assert_eq!(removed, vec![1, 6]);
    assert_eq!(added, vec![3, 7, 10]);
    assert_eq!(unchanged, vec![2, 4, 9]);
    assert_eq!(removed.len() + added.len() + unchanged.len() * 2, prev.len() + next.len());

    // The tagged stream covers the union of both inputs, in order.
    let mut union: Vec<_> = changes.iter().map(|c| *c.value()).collect();
    let mut expected: Vec<_> = prev.iter().chain(next.iter()).copied().collect();
    union.sort_unstable();
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(union, expected);
  }

  #[test]
  fn custom_comparator_diffs_by_key() {
    let prev = vec![("a", 1), ("b", 1)];
    let next = vec![("b", 2), ("c", 2)];
    let changes: Vec<_> = sorted_diff_by(prev, next, |p, n| p.0.cmp(n.0)).collect();
    assert_eq!(changes, vec![
      Change::Removed(("a", 1)),
      Change::Unchanged(("b", 2)),
      Change::Added(("c", 2)),
    ]);
  }
}
