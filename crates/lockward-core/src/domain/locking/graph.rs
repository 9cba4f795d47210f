//! Wait-for graph used for deadlock detection
//!
//! An edge `a -> b` means "actor `a` is blocked on a resource held by actor
//! `b`". The graph is kept acyclic: an edge that would close a cycle is
//! refused, and the refusal is what the coordinator reports as a deadlock.

use super::types::ActorId;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Rejection of an edge that would close a wait cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("wait edge {waiter} -> {holder} would close a cycle")]
pub struct WouldCycle {
    pub waiter: ActorId,
    pub holder: ActorId,
    /// The cycle that the edge would close, starting and ending at `waiter`
    pub cycle: Vec<ActorId>,
}

/// Directed graph of blocking dependencies between actors
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
    edges: BTreeMap<ActorId, BTreeSet<ActorId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `waiter -> holder` unless it would make the graph cyclic
    pub fn add_edge(&mut self, waiter: &ActorId, holder: &ActorId) -> Result<(), WouldCycle> {
        if waiter == holder {
            return Err(WouldCycle {
                waiter: waiter.clone(),
                holder: holder.clone(),
                cycle: vec![waiter.clone(), waiter.clone()],
            });
        }

        if let Some(path) = self.find_path(holder, waiter) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(waiter.clone());
            cycle.extend(path);
            return Err(WouldCycle {
                waiter: waiter.clone(),
                holder: holder.clone(),
                cycle,
            });
        }

        self.edges
            .entry(waiter.clone())
            .or_default()
            .insert(holder.clone());
        Ok(())
    }

    /// Drop every outgoing edge of `actor`, returning how many were removed
    pub fn remove_edges_from(&mut self, actor: &ActorId) -> usize {
        self.edges.remove(actor).map(|out| out.len()).unwrap_or(0)
    }

    /// Actors that `actor` currently waits on
    pub fn waits_on(&self, actor: &ActorId) -> impl Iterator<Item = &ActorId> {
        self.edges.get(actor).into_iter().flatten()
    }

    /// All edges in `(waiter, holder)` order
    pub fn edges(&self) -> impl Iterator<Item = (&ActorId, &ActorId)> {
        self.edges
            .iter()
            .flat_map(|(waiter, out)| out.iter().map(move |holder| (waiter, holder)))
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Full cycle check over the whole graph
    pub fn is_acyclic(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        self.edges
            .keys()
            .all(|node| !self.has_cycle(node, &mut visited, &mut on_path))
    }

    /// Depth-first search for a path `from -> ... -> to`, both ends included
    fn find_path(&self, from: &ActorId, to: &ActorId) -> Option<Vec<ActorId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.walk(from, to, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk<'a>(
        &'a self,
        node: &'a ActorId,
        target: &ActorId,
        visited: &mut HashSet<&'a ActorId>,
        path: &mut Vec<ActorId>,
    ) -> bool {
        if !visited.insert(node) {
            return false;
        }

        path.push(node.clone());
        if node == target {
            return true;
        }

        for next in self.waits_on(node) {
            if self.walk(next, target, visited, path) {
                return true;
            }
        }

        path.pop();
        false
    }

    fn has_cycle<'a>(
        &'a self,
        node: &'a ActorId,
        visited: &mut HashSet<&'a ActorId>,
        on_path: &mut HashSet<&'a ActorId>,
    ) -> bool {
        if on_path.contains(node) {
            return true;
        }
        if !visited.insert(node) {
            return false;
        }

        on_path.insert(node);
        for next in self.waits_on(node) {
            if self.has_cycle(next, visited, on_path) {
                return true;
            }
        }
        on_path.remove(node);

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str) -> ActorId {
        ActorId::from(id)
    }

    #[test]
    fn test_add_edge_accepts_chain() {
        let mut graph = WaitForGraph::new();

        graph.add_edge(&actor("a"), &actor("b")).unwrap();
        graph.add_edge(&actor("b"), &actor("c")).unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_add_edge_rejects_two_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(&actor("a"), &actor("b")).unwrap();

        let err = graph.add_edge(&actor("b"), &actor("a")).unwrap_err();

        assert_eq!(err.waiter, actor("b"));
        assert_eq!(err.holder, actor("a"));
        assert_eq!(err.cycle, vec![actor("b"), actor("a"), actor("b")]);
        // The rejected edge is not inserted
        assert_eq!(graph.len(), 1);
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_add_edge_rejects_long_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(&actor("a"), &actor("b")).unwrap();
        graph.add_edge(&actor("b"), &actor("c")).unwrap();
        graph.add_edge(&actor("c"), &actor("d")).unwrap();

        let err = graph.add_edge(&actor("d"), &actor("a")).unwrap_err();

        assert_eq!(
            err.cycle,
            vec![actor("d"), actor("a"), actor("b"), actor("c"), actor("d")]
        );
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = WaitForGraph::new();
        let err = graph.add_edge(&actor("a"), &actor("a")).unwrap_err();

        assert_eq!(err.cycle, vec![actor("a"), actor("a")]);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(&actor("a"), &actor("b")).unwrap();
        graph.add_edge(&actor("a"), &actor("c")).unwrap();
        graph.add_edge(&actor("b"), &actor("d")).unwrap();

        assert!(graph.add_edge(&actor("c"), &actor("d")).is_ok());
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_remove_edges_from_breaks_cycle_risk() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(&actor("a"), &actor("b")).unwrap();

        assert_eq!(graph.remove_edges_from(&actor("a")), 1);
        assert!(graph.is_empty());
        assert!(graph.add_edge(&actor("b"), &actor("a")).is_ok());
    }

    #[test]
    fn test_edges_are_ordered() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(&actor("t2"), &actor("t1")).unwrap();
        graph.add_edge(&actor("t0"), &actor("t1")).unwrap();

        let waiters: Vec<_> = graph.edges().map(|(w, _)| w.as_str()).collect();
        assert_eq!(waiters, vec!["t0", "t2"]);
    }
}
