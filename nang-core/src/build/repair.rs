//! Connectivity repair: make every node reachable from the entry point.

use crate::dataset::VectorSet;
use crate::distance::l2_distance_squared;
use crate::graph::NodeId;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Outcome of [`repair_connectivity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepairReport {
    /// Edges added or redirected
    pub edges_changed: usize,
    /// Nodes still unreachable when repair gave up
    pub unreachable: usize,
}

/// Attach every node unreachable from `entry`.
///
/// An unreached node is linked from the nearest reached node that still has
/// spare degree (`< max_degree`). If every reached node is full, the nearest
/// one's farthest edge is redirected instead, which may orphan another node;
/// passes repeat until the graph is connected or `N` passes elapse.
pub(crate) fn repair_connectivity(
    vectors: VectorSet<'_>,
    adjacency: &mut [Vec<NodeId>],
    entry: NodeId,
    max_degree: usize,
) -> RepairReport {
    let n = adjacency.len();
    let mut edges_changed = 0;

    for pass in 0..n.max(1) {
        let mut reached = vec![false; n];
        flood(adjacency, entry, &mut reached);

        let orphans: Vec<NodeId> =
            (0..n).filter(|&id| !reached[id]).map(|id| id as NodeId).collect();
        if orphans.is_empty() {
            return RepairReport { edges_changed, unreachable: 0 };
        }
        debug!(pass, orphans = orphans.len(), "repairing graph connectivity");

        for orphan in orphans {
            if reached[orphan as usize] {
                continue;
            }
            if attach(vectors, adjacency, &reached, orphan, max_degree) {
                edges_changed += 1;
                flood(adjacency, orphan, &mut reached);
            }
        }
    }

    let mut reached = vec![false; n];
    flood(adjacency, entry, &mut reached);
    let unreachable = reached.iter().filter(|&&r| !r).count();
    if unreachable > 0 {
        warn!(unreachable, "connectivity repair incomplete");
    }
    RepairReport { edges_changed, unreachable }
}

/// Mark everything reachable from `start`
fn flood(adjacency: &[Vec<NodeId>], start: NodeId, reached: &mut [bool]) {
    let mut queue = VecDeque::from([start]);
    reached[start as usize] = true;
    while let Some(id) = queue.pop_front() {
        for &next in &adjacency[id as usize] {
            if !reached[next as usize] {
                reached[next as usize] = true;
                queue.push_back(next);
            }
        }
    }
}

/// Link `orphan` from a reached node; `false` if no reached node can take it
fn attach(
    vectors: VectorSet<'_>,
    adjacency: &mut [Vec<NodeId>],
    reached: &[bool],
    orphan: NodeId,
    max_degree: usize,
) -> bool {
    if max_degree == 0 {
        return false;
    }
    let target = vectors.row(orphan as usize);

    let mut nearest: Option<(usize, f32)> = None;
    let mut nearest_open: Option<(usize, f32)> = None;
    for (id, &is_reached) in reached.iter().enumerate() {
        if !is_reached {
            continue;
        }
        let d = l2_distance_squared(vectors.row(id), target);
        if nearest.is_none_or(|(_, best)| d < best) {
            nearest = Some((id, d));
        }
        if adjacency[id].len() < max_degree && nearest_open.is_none_or(|(_, best)| d < best) {
            nearest_open = Some((id, d));
        }
    }

    if let Some((id, _)) = nearest_open {
        adjacency[id].push(orphan);
        return true;
    }
    let Some((id, _)) = nearest else {
        return false;
    };

    let source = vectors.row(id);
    let farthest = adjacency[id]
        .iter()
        .enumerate()
        .map(|(slot, &n)| (slot, l2_distance_squared(source, vectors.row(n as usize))))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(slot, _)| slot);
    match farthest {
        Some(slot) => {
            adjacency[id][slot] = orphan;
            true
        }
        None => false,
    }
}
