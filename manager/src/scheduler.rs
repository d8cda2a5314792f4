//! Scheduler policies: a three-stage select/score/pick strategy for placing
//! a task on one of the configured worker nodes.
//!
//! Both policies share the same `pick` logic (lowest score wins, ties broken
//! by candidate order); only candidate selection and scoring differ.

use shared::{Node, Task};
use std::collections::HashMap;
use std::sync::Mutex;

pub trait Scheduler: Send + Sync {
    /// Nodes able to host `task`. An empty return aborts placement.
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node>;

    /// Fitness per candidate node name. Lower is better.
    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64>;

    /// Candidate with the minimum score. Ties go to the first candidate with
    /// that score, matching the candidate slice's order.
    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
        candidates
            .iter()
            .min_by(|a, b| {
                let sa = scores.get(&a.name).copied().unwrap_or(f64::INFINITY);
                let sb = scores.get(&b.name).copied().unwrap_or(f64::INFINITY);
                sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    /// Runs all three stages; `None` means no candidate could host the task.
    fn place(&self, task: &Task, nodes: &[Node]) -> Option<Node> {
        let candidates = self.select_candidate_nodes(task, nodes);
        if candidates.is_empty() {
            return None;
        }
        let scores = self.score(task, &candidates);
        self.pick(&scores, &candidates)
    }
}

/// Rotates placement across all nodes. Candidates are always the full node
/// set; the next node after the last pick scores `0.1`, everyone else `1.0`.
/// The cursor is scheduler state mutated on every `score` call, so it is
/// guarded by its own mutex rather than requiring `&mut self`.
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self {
            cursor: Mutex::new(0),
        }
    }
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobin {
    fn select_candidate_nodes(&self, _task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes.to_vec()
    }

    fn score(&self, _task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        let mut scores = HashMap::with_capacity(candidates.len());
        if candidates.is_empty() {
            return scores;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(|poison| poison.into_inner());
        let next = (*cursor + 1) % candidates.len();
        *cursor = next;
        for (index, node) in candidates.iter().enumerate() {
            scores.insert(node.name.clone(), if index == next { 0.1 } else { 1.0 });
        }
        scores
    }
}

/// Enhanced Parallel Virtual Machine scheduler: admits only nodes with
/// enough free memory for the task, then scores by current CPU utilisation
/// plus the memory-pressure delta the task would introduce.
#[derive(Default)]
pub struct Epvm;

impl Epvm {
    pub fn new() -> Self {
        Self
    }

    /// `1 / (1 - x/capacity)` for `x < capacity`; a large sentinel otherwise,
    /// so a node already at or past capacity is never favoured.
    fn memory_pressure(allocated: f64, capacity: f64) -> f64 {
        if capacity <= 0.0 || allocated >= capacity {
            return 1e9;
        }
        1.0 / (1.0 - allocated / capacity)
    }
}

impl Scheduler for Epvm {
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter(|node| node.available_memory() >= task.memory)
            .cloned()
            .collect()
    }

    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        candidates
            .iter()
            .map(|node| {
                let capacity = node.memory as f64;
                let before = Self::memory_pressure(node.memory_allocated as f64, capacity);
                let after = Self::memory_pressure(
                    (node.memory_allocated + task.memory) as f64,
                    capacity,
                );
                let score = node.cpu_utilization + (after - before);
                (node.name.clone(), score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Node {
        let mut n = Node::new(name, format!("http://{name}"));
        n.memory = 1024;
        n
    }

    #[test]
    fn round_robin_rotates_through_all_nodes() {
        let scheduler = RoundRobin::new();
        let nodes = vec![node("a"), node("b"), node("c")];
        let task = Task::new("t", "img");

        let mut picks = Vec::new();
        for _ in 0..6 {
            picks.push(scheduler.place(&task, &nodes).unwrap().name);
        }
        // Over two full rotations each node is picked exactly twice.
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for p in &picks {
            *counts.entry(p.as_str()).or_default() += 1;
        }
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&2));
        assert_eq!(counts.get("c"), Some(&2));
    }

    #[test]
    fn epvm_rejects_nodes_without_enough_memory() {
        let scheduler = Epvm::new();
        let mut small = node("small");
        small.memory = 10;
        let mut task = Task::new("t", "img");
        task.memory = 1024;

        assert!(scheduler.place(&task, &[small]).is_none());
    }

    #[test]
    fn epvm_prefers_less_pressured_node() {
        let scheduler = Epvm::new();
        let mut idle = node("idle");
        idle.memory = 4096;
        let mut busy = node("busy");
        busy.memory = 4096;
        busy.memory_allocated = 3000;

        let mut task = Task::new("t", "img");
        task.memory = 512;

        let picked = scheduler.place(&task, &[busy, idle]).unwrap();
        assert_eq!(picked.name, "idle");
    }
}
