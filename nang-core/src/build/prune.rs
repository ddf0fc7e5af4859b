//! Diversity pruning and reverse-edge merging.
//!
//! A candidate `c` of node `p` is dropped when some already-kept neighbor `s`
//! covers it: `B * d(s, c) < d(p, c)`. Walking candidates nearest first, this
//! keeps short edges and spreads the remaining ones over distinct directions,
//! which is what lets greedy search make progress from far away. Distances
//! here are squared, so the test is applied as `B² * d²(s, c) < d²(p, c)`.

use crate::dataset::VectorSet;
use crate::distance::l2_distance_squared;
use crate::graph::{Neighbor, NodeId};
use rayon::prelude::*;

/// Select up to `max_count` diverse neighbors for `base`.
///
/// # Arguments
///
/// * `vectors` - Vector data the ids refer to
/// * `base` - Node the neighbors are selected for; skipped if present
/// * `candidates` - Pool ascending by distance from `base`
/// * `max_count` - Upper bound on the selection
/// * `b` - Diversity threshold (1.0 = relative-neighborhood rule)
///
/// # Starvation fallback
///
/// When diversity leaves fewer than `max_count / 2` edges, the nearest
/// rejected candidates are added back until that floor is met.
pub(crate) fn select_diverse(
    vectors: VectorSet<'_>,
    base: NodeId,
    candidates: &[Neighbor],
    max_count: usize,
    b: f32,
) -> Vec<Neighbor> {
    let b_squared = b * b;
    let mut selected: Vec<Neighbor> = Vec::with_capacity(max_count);

    for &candidate in candidates {
        if selected.len() >= max_count {
            break;
        }
        if candidate.id == base {
            continue;
        }
        let here = vectors.row(candidate.id as usize);
        let covered = selected.iter().any(|kept| {
            b_squared * l2_distance_squared(vectors.row(kept.id as usize), here)
                < candidate.distance
        });
        if !covered {
            selected.push(candidate);
        }
    }

    let floor = max_count / 2;
    if selected.len() < floor {
        for &candidate in candidates {
            if selected.len() >= floor {
                break;
            }
            if candidate.id != base && !selected.iter().any(|s| s.id == candidate.id) {
                selected.push(candidate);
            }
        }
        selected.sort_unstable();
    }

    selected
}

/// Prune every node's best `pl` candidates down to `range` diverse edges
pub(crate) fn prune_all(
    vectors: VectorSet<'_>,
    candidates: &[Vec<Neighbor>],
    pl: usize,
    range: usize,
    b: f32,
) -> Vec<Vec<Neighbor>> {
    candidates
        .par_iter()
        .enumerate()
        .map(|(node, pool)| {
            let pool = &pool[..pool.len().min(pl)];
            select_diverse(vectors, node as NodeId, pool, range, b)
        })
        .collect()
}

/// Give every edge `p -> q` a chance to appear as `q -> p`.
///
/// Each node's forward list is unioned with its incoming edges. Lists that
/// fit within `cap` are kept whole; longer ones are re-pruned to `cap` with
/// [`select_diverse`].
pub(crate) fn merge_reverse(
    vectors: VectorSet<'_>,
    forward: Vec<Vec<Neighbor>>,
    cap: usize,
    b: f32,
) -> Vec<Vec<NodeId>> {
    let mut incoming: Vec<Vec<Neighbor>> = vec![Vec::new(); forward.len()];
    for (p, edges) in forward.iter().enumerate() {
        for edge in edges {
            incoming[edge.id as usize].push(Neighbor::new(p as NodeId, edge.distance));
        }
    }

    forward
        .into_par_iter()
        .zip(incoming.into_par_iter())
        .enumerate()
        .map(|(node, (mut merged, reverse))| {
            merged.extend(reverse);
            merged.sort_unstable();
            merged.dedup_by_key(|n| n.id);
            // Equal ids carry equal distances, so duplicates sort adjacent
            let merged = if merged.len() > cap {
                select_diverse(vectors, node as NodeId, &merged, cap, b)
            } else {
                merged
            };
            merged.into_iter().map(|n| n.id).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_candidates(vectors: VectorSet<'_>, base: NodeId, ids: &[NodeId]) -> Vec<Neighbor> {
        let mut out: Vec<Neighbor> = ids
            .iter()
            .map(|&id| {
                Neighbor::new(
                    id,
                    l2_distance_squared(vectors.row(base as usize), vectors.row(id as usize)),
                )
            })
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_collinear_candidates_are_covered() {
        // base at 0, candidates at 1, 2, 3 on one ray and one at -1.5
        let data = [0.0, 1.0, 2.0, 3.0, -1.5];
        let vectors = VectorSet::new(&data, 1).unwrap();
        let candidates = sorted_candidates(vectors, 0, &[1, 2, 3, 4]);

        let selected = select_diverse(vectors, 0, &candidates, 4, 1.0);
        let ids: Vec<NodeId> = selected.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_larger_threshold_keeps_more_edges() {
        let data = [0.0, 1.0, 2.0, 3.0];
        let vectors = VectorSet::new(&data, 1).unwrap();
        let candidates = sorted_candidates(vectors, 0, &[1, 2, 3]);

        let strict = select_diverse(vectors, 0, &candidates, 3, 1.0);
        let loose = select_diverse(vectors, 0, &candidates, 3, 2.0);
        assert!(loose.len() > strict.len());
    }

    #[test]
    fn test_starvation_fallback_fills_half() {
        // Every candidate on one ray: diversity alone keeps just the nearest
        let data: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let vectors = VectorSet::new(&data, 1).unwrap();
        let ids: Vec<NodeId> = (1..9).collect();
        let candidates = sorted_candidates(vectors, 0, &ids);

        let selected = select_diverse(vectors, 0, &candidates, 6, 1.0);
        let ids: Vec<NodeId> = selected.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_base_never_selected() {
        let data = [0.0, 1.0, -1.0];
        let vectors = VectorSet::new(&data, 1).unwrap();
        let candidates = sorted_candidates(vectors, 0, &[0, 1, 2]);

        let selected = select_diverse(vectors, 0, &candidates, 3, 1.0);
        assert!(selected.iter().all(|n| n.id != 0));
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_merge_adds_reverse_edges_within_cap() {
        let data = [0.0, 1.0, 5.0];
        let vectors = VectorSet::new(&data, 1).unwrap();
        // 0 -> 1, 2 -> 1; node 1 has no forward edges
        let forward = vec![
            vec![Neighbor::new(1, 1.0)],
            vec![],
            vec![Neighbor::new(1, 16.0)],
        ];

        let merged = merge_reverse(vectors, forward, 2, 1.0);
        assert_eq!(merged[0], vec![1]);
        assert_eq!(merged[1], vec![0, 2]);
        assert_eq!(merged[2], vec![1]);
    }

    #[test]
    fn test_merge_respects_cap() {
        let data: Vec<f32> = (0..6).map(|i| i as f32 * 10.0).collect();
        let vectors = VectorSet::new(&data, 1).unwrap();
        // Everyone points at node 0
        let forward: Vec<Vec<Neighbor>> = (0..6)
            .map(|i| if i == 0 { vec![] } else { sorted_candidates(vectors, i, &[0]) })
            .collect();

        let merged = merge_reverse(vectors, forward, 2, 1.0);
        assert!(merged.iter().all(|list| list.len() <= 2));
        assert_eq!(merged[0][0], 1);
    }
}
