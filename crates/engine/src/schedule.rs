//! Resolution of the declared dependency partial order into a total order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::EngineError;
use crate::system::SystemId;

/// "`before` must run before `after`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub before: SystemId,
    pub after: SystemId,
}

/// Deterministic total order over registered systems.
///
/// Every declared edge between registered systems is respected; among systems
/// that are free to run, the one declared first runs first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    order: Vec<usize>,
}

impl Schedule {
    /// Topologically sort `systems` (in declaration order) under `edges`.
    ///
    /// Edges naming a system that is not registered are dropped.
    pub fn resolve(systems: &[SystemId], edges: &[Edge]) -> Result<Self, EngineError> {
        let index: HashMap<SystemId, usize> =
            systems.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); systems.len()];
        let mut in_degree = vec![0usize; systems.len()];
        for edge in edges {
            let (Some(&b), Some(&a)) = (index.get(&edge.before), index.get(&edge.after)) else {
                tracing::debug!(
                    before = edge.before.name(),
                    after = edge.after.name(),
                    "ignoring ordering edge to unregistered system"
                );
                continue;
            };
            if b == a || successors[b].contains(&a) {
                continue;
            }
            successors[b].push(a);
            in_degree[a] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(systems.len());
        while let Some(Reverse(next)) = ready.pop() {
            order.push(next);
            for &succ in &successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if order.len() != systems.len() {
            let stuck = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| systems[i].name())
                .collect();
            return Err(EngineError::DependencyCycle(stuck));
        }

        Ok(Self { order })
    }

    /// Declaration indices in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Assets;
    struct Movement;
    struct Demo;
    struct Scene;
    struct Trace;

    fn edge(before: SystemId, after: SystemId) -> Edge {
        Edge { before, after }
    }

    fn engine_edges() -> Vec<Edge> {
        vec![
            edge(SystemId::of::<Demo>(), SystemId::of::<Movement>()),
            edge(SystemId::of::<Assets>(), SystemId::of::<Scene>()),
            edge(SystemId::of::<Movement>(), SystemId::of::<Scene>()),
            edge(SystemId::of::<Scene>(), SystemId::of::<Trace>()),
        ]
    }

    fn names(systems: &[SystemId], schedule: &Schedule) -> Vec<&'static str> {
        schedule.order().iter().map(|&i| systems[i].name()).collect()
    }

    fn respects(systems: &[SystemId], schedule: &Schedule, edges: &[Edge]) -> bool {
        let pos = |id: SystemId| {
            schedule
                .order()
                .iter()
                .position(|&i| systems[i] == id)
                .unwrap()
        };
        edges.iter().all(|e| pos(e.before) < pos(e.after))
    }

    /// Heap's algorithm.
    fn permutations(items: Vec<SystemId>) -> Vec<Vec<SystemId>> {
        fn go(k: usize, items: &mut Vec<SystemId>, out: &mut Vec<Vec<SystemId>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            go(k - 1, items, out);
            for i in 0..k - 1 {
                if k % 2 == 0 {
                    items.swap(i, k - 1);
                } else {
                    items.swap(0, k - 1);
                }
                go(k - 1, items, out);
            }
        }
        let mut items = items;
        let mut out = Vec::new();
        let n = items.len();
        go(n, &mut items, &mut out);
        out
    }

    #[test]
    fn producers_run_before_consumers() {
        let systems = vec![
            SystemId::of::<Trace>(),
            SystemId::of::<Scene>(),
            SystemId::of::<Movement>(),
            SystemId::of::<Assets>(),
            SystemId::of::<Demo>(),
        ];
        let schedule = Schedule::resolve(&systems, &engine_edges()).unwrap();
        assert_eq!(
            names(&systems, &schedule),
            vec!["Assets", "Demo", "Movement", "Scene", "Trace"]
        );
    }

    #[test]
    fn ties_broken_by_declaration_order() {
        let systems = vec![
            SystemId::of::<Movement>(),
            SystemId::of::<Assets>(),
            SystemId::of::<Scene>(),
        ];
        let schedule = Schedule::resolve(&systems, &[]).unwrap();
        assert_eq!(schedule.order(), &[0, 1, 2]);
    }

    #[test]
    fn every_declaration_permutation_respects_edges() {
        let base = vec![
            SystemId::of::<Assets>(),
            SystemId::of::<Movement>(),
            SystemId::of::<Demo>(),
            SystemId::of::<Scene>(),
            SystemId::of::<Trace>(),
        ];
        let edges = engine_edges();
        let perms = permutations(base);
        assert_eq!(perms.len(), 120);
        for systems in perms {
            let first = Schedule::resolve(&systems, &edges).unwrap();
            let second = Schedule::resolve(&systems, &edges).unwrap();
            assert_eq!(first, second);
            assert!(respects(&systems, &first, &edges), "{systems:?}");
        }
    }

    #[test]
    fn edges_to_unregistered_systems_are_ignored() {
        let systems = vec![SystemId::of::<Movement>(), SystemId::of::<Scene>()];
        let schedule = Schedule::resolve(&systems, &engine_edges()).unwrap();
        assert_eq!(names(&systems, &schedule), vec!["Movement", "Scene"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let systems = vec![SystemId::of::<Scene>(), SystemId::of::<Trace>()];
        let edges = vec![
            edge(SystemId::of::<Scene>(), SystemId::of::<Trace>()),
            edge(SystemId::of::<Trace>(), SystemId::of::<Scene>()),
        ];
        match Schedule::resolve(&systems, &edges) {
            Err(EngineError::DependencyCycle(names)) => {
                assert_eq!(names, vec!["Scene", "Trace"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn empty_set_resolves() {
        let schedule = Schedule::resolve(&[], &[]).unwrap();
        assert!(schedule.is_empty());
    }
}
