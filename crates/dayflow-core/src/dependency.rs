//! Dependency graph over a candidate task set.
//!
//! Dependencies are stored by identifier only; the graph here is an
//! id-keyed adjacency map restricted to the set under consideration.
//! Edges pointing outside the set are ignored for ordering but kept for
//! admission: a task whose out-of-set dependency is not completed is held
//! out of packing entirely.

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, Result};
use crate::id::TaskId;
use crate::task::Task;

/// Dependency graph induced by one user's candidate tasks.
#[derive(Debug)]
pub struct DependencyGraph {
    /// task -> in-set dependencies.
    edges: HashMap<TaskId, Vec<TaskId>>,
    /// task -> dependencies outside the set.
    external: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn build(tasks: &[Task]) -> Self {
        let in_set: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
        let mut edges: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut external: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in tasks {
            let (inside, outside): (Vec<TaskId>, Vec<TaskId>) = task
                .dependencies
                .iter()
                .copied()
                .partition(|dep| in_set.contains(dep));
            edges.insert(task.id, inside);
            external.insert(task.id, outside);
        }
        Self { edges, external }
    }

    /// All dependency ids referenced outside the set.
    pub fn external_dependencies(&self) -> HashSet<TaskId> {
        self.external.values().flatten().copied().collect()
    }

    /// Find one back edge `(from, to)` if the in-set graph is cyclic.
    pub fn find_cycle(&self) -> Option<(TaskId, TaskId)> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        for &start in self.edges.keys() {
            if let Some(edge) = self.cycle_from(start, &mut visited, &mut on_path) {
                return Some(edge);
            }
        }
        None
    }

    fn cycle_from(
        &self,
        node: TaskId,
        visited: &mut HashSet<TaskId>,
        on_path: &mut HashSet<TaskId>,
    ) -> Option<(TaskId, TaskId)> {
        if on_path.contains(&node) {
            return None; // caller reports the back edge
        }
        if !visited.insert(node) {
            return None;
        }
        on_path.insert(node);
        if let Some(deps) = self.edges.get(&node) {
            for &dep in deps {
                if on_path.contains(&dep) {
                    return Some((node, dep));
                }
                if let Some(edge) = self.cycle_from(dep, visited, on_path) {
                    return Some(edge);
                }
            }
        }
        on_path.remove(&node);
        None
    }

    /// Tasks admissible for packing: every dependency is either completed
    /// outside the set, or itself an admissible member of the set (and so
    /// will be placed earlier). Computed as a fixpoint so blockage
    /// propagates through dependency chains.
    pub fn admissible(&self, completed_outside: &HashSet<TaskId>) -> HashSet<TaskId> {
        let mut blocked: HashSet<TaskId> = self
            .external
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| !completed_outside.contains(d)))
            .map(|(&id, _)| id)
            .collect();
        loop {
            let newly_blocked: Vec<TaskId> = self
                .edges
                .iter()
                .filter(|(id, deps)| {
                    !blocked.contains(id) && deps.iter().any(|d| blocked.contains(d))
                })
                .map(|(&id, _)| id)
                .collect();
            if newly_blocked.is_empty() {
                break;
            }
            blocked.extend(newly_blocked);
        }
        self.edges
            .keys()
            .copied()
            .filter(|id| !blocked.contains(id))
            .collect()
    }

    /// Flatten `preferred` (a comparator-sorted id sequence) into an order
    /// where every in-set dependency precedes its dependent: walk the
    /// preference list and emit each task's unemitted dependencies first,
    /// depth-first, deeper dependencies in preference order themselves.
    ///
    /// The graph must be acyclic (`find_cycle` first); a cycle encountered
    /// here is still reported rather than looping.
    pub fn flatten_preferred(&self, preferred: &[TaskId]) -> Result<Vec<TaskId>> {
        let rank: HashMap<TaskId, usize> =
            preferred.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut order = Vec::with_capacity(preferred.len());
        let mut emitted = HashSet::new();
        let mut on_path = HashSet::new();
        for &id in preferred {
            self.emit(id, &rank, &mut order, &mut emitted, &mut on_path)?;
        }
        Ok(order)
    }

    fn emit(
        &self,
        node: TaskId,
        rank: &HashMap<TaskId, usize>,
        order: &mut Vec<TaskId>,
        emitted: &mut HashSet<TaskId>,
        on_path: &mut HashSet<TaskId>,
    ) -> Result<()> {
        if emitted.contains(&node) || !rank.contains_key(&node) {
            return Ok(());
        }
        on_path.insert(node);
        let mut deps: Vec<TaskId> = self
            .edges
            .get(&node)
            .map(|d| d.iter().copied().filter(|d| rank.contains_key(d)).collect())
            .unwrap_or_default();
        deps.sort_by_key(|d| rank.get(d).copied().unwrap_or(usize::MAX));
        for dep in deps {
            if on_path.contains(&dep) {
                return Err(CoreError::CycleDetected { from: node, to: dep });
            }
            self.emit(dep, rank, order, emitted, on_path)?;
        }
        on_path.remove(&node);
        emitted.insert(node);
        order.push(node);
        Ok(())
    }
}

/// Whether replacing `task_id`'s dependencies with `new_deps` would close a
/// cycle in the user's task graph.
pub fn would_create_cycle(tasks: &[Task], task_id: TaskId, new_deps: &[TaskId]) -> bool {
    let mut graph: HashMap<TaskId, Vec<TaskId>> = tasks
        .iter()
        .map(|t| (t.id, t.dependencies.clone()))
        .collect();
    graph.insert(task_id, new_deps.to_vec());

    // A new cycle must pass through task_id, so one DFS from it suffices.
    fn reaches(
        graph: &HashMap<TaskId, Vec<TaskId>>,
        from: TaskId,
        target: TaskId,
        seen: &mut HashSet<TaskId>,
    ) -> bool {
        if !seen.insert(from) {
            return false;
        }
        match graph.get(&from) {
            Some(deps) => deps
                .iter()
                .any(|&d| d == target || reaches(graph, d, target, seen)),
            None => false,
        }
    }

    let mut seen = HashSet::new();
    new_deps
        .iter()
        .any(|&d| d == task_id || reaches(&graph, d, task_id, &mut seen))
}
