//! NN-descent refinement of an approximate k-nearest-neighbor graph.
//!
//! # Rounds
//!
//! Every node owns a pool of at most `L` candidates kept sorted by distance.
//! A round samples up to `S` fresh ("new") and `S` already-joined ("old")
//! entries from the top `K` of each pool, adds the reverse samples, and joins
//! every new×new and new×old pair: each pair is offered to both endpoints'
//! pools. Freshly inserted entries are new again, so work concentrates where
//! the graph is still improving.
//!
//! # Parallelism
//!
//! Joins are computed in parallel over waves of nodes against a frozen copy
//! of each pool's acceptance threshold, then applied sequentially in node
//! order. The outcome depends only on the seed, never on thread scheduling.

use crate::dataset::VectorSet;
use crate::distance::l2_distance_squared;
use crate::graph::{Neighbor, NodeId};
use crate::params::BuildConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index;
use rayon::prelude::*;
use tracing::debug;

/// A round whose update count falls below `CONVERGENCE_DELTA * N * K` ends
/// refinement early.
const CONVERGENCE_DELTA: f64 = 0.001;

/// Nodes whose joins are materialized together before being applied
const JOIN_WAVE: usize = 1024;

const INIT_STREAM: u64 = 0;
const REVERSE_STREAM: u64 = 1;

/// Per-node RNG derived from the build seed, a stream tag and the node id
fn node_rng(seed: u64, stream: u64, node: usize) -> StdRng {
    let mixed = seed
        ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (node as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    StdRng::seed_from_u64(mixed)
}

#[derive(Debug, Clone, Copy)]
struct PoolEntry {
    id: NodeId,
    distance: f32,
    is_new: bool,
}

/// Bounded candidate list, ascending by distance, ids unique
#[derive(Debug, Clone, Default)]
pub(crate) struct Pool {
    entries: Vec<PoolEntry>,
}

impl Pool {
    fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity + 1) }
    }

    /// Distance a candidate must beat to enter a pool of `cap` entries
    fn threshold(&self, cap: usize) -> f32 {
        if self.entries.len() < cap {
            f32::INFINITY
        } else {
            self.entries.last().map_or(f32::INFINITY, |e| e.distance)
        }
    }

    /// Insert `id` unless it is already present or too far; `true` on insert
    pub(crate) fn insert(&mut self, id: NodeId, distance: f32, cap: usize) -> bool {
        if cap == 0 || distance >= self.threshold(cap) {
            return false;
        }
        let pos = self.entries.partition_point(|e| e.distance < distance);
        // A duplicate id always carries the identical distance
        if self.entries[pos..]
            .iter()
            .take_while(|e| e.distance == distance)
            .any(|e| e.id == id)
        {
            return false;
        }
        self.entries.insert(pos, PoolEntry { id, distance, is_new: true });
        self.entries.truncate(cap);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries as distance-ordered neighbors
    pub(crate) fn neighbors(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.entries.iter().map(|e| Neighbor::new(e.id, e.distance))
    }

    /// Take up to `s` new and `s` old entries from the first `k`; sampled new
    /// entries become old.
    fn sample(&mut self, k: usize, s: usize) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut fresh = Vec::with_capacity(s);
        let mut stale = Vec::with_capacity(s);
        for entry in self.entries.iter_mut().take(k) {
            if entry.is_new {
                if fresh.len() < s {
                    fresh.push(entry.id);
                    entry.is_new = false;
                }
            } else if stale.len() < s {
                stale.push(entry.id);
            }
        }
        (fresh, stale)
    }
}

/// Refine random pools into approximate `L`-nearest-neighbor lists.
///
/// Returns one pool per row, each ascending by distance and free of the
/// row's own id.
pub(crate) fn refine(vectors: VectorSet<'_>, config: &BuildConfig) -> Vec<Pool> {
    let n = vectors.rows();
    let mut pools = initialize(vectors, config);

    let stop_below = CONVERGENCE_DELTA * n as f64 * config.k as f64;
    for round in 0..config.iter {
        let updates = refine_round(vectors, config, &mut pools, round);
        debug!(round, updates, "refinement round complete");
        if (updates as f64) < stop_below {
            debug!(round, "refinement converged");
            break;
        }
    }
    pools
}

/// Fill each pool with `L` distinct random non-self neighbors
fn initialize(vectors: VectorSet<'_>, config: &BuildConfig) -> Vec<Pool> {
    let n = vectors.rows();
    let l = config.l.min(n.saturating_sub(1));

    (0..n)
        .into_par_iter()
        .map(|node| {
            let mut pool = Pool::with_capacity(l);
            if l == 0 {
                return pool;
            }
            let mut rng = node_rng(config.seed, INIT_STREAM, node);
            let here = vectors.row(node);
            for pick in index::sample(&mut rng, n - 1, l) {
                let other = if pick >= node { pick + 1 } else { pick };
                pool.insert(other as NodeId, l2_distance_squared(here, vectors.row(other)), l);
            }
            pool
        })
        .collect()
}

fn refine_round(
    vectors: VectorSet<'_>,
    config: &BuildConfig,
    pools: &mut [Pool],
    round: usize,
) -> usize {
    let n = pools.len();
    let (k, s, l) = (config.k, config.s, config.l);

    let samples: Vec<(Vec<NodeId>, Vec<NodeId>)> =
        pools.par_iter_mut().map(|pool| pool.sample(k, s)).collect();

    let mut reverse_new: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    let mut reverse_old: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for (u, (fresh, stale)) in samples.iter().enumerate() {
        for &v in fresh {
            reverse_new[v as usize].push(u as NodeId);
        }
        for &v in stale {
            reverse_old[v as usize].push(u as NodeId);
        }
    }

    let stream = REVERSE_STREAM + round as u64;
    let join_lists: Vec<(Vec<NodeId>, Vec<NodeId>)> = samples
        .into_par_iter()
        .zip(reverse_new.into_par_iter().zip(reverse_old.into_par_iter()))
        .enumerate()
        .map(|(u, ((mut fresh, mut stale), (mut rev_new, mut rev_old)))| {
            let mut rng = node_rng(config.seed, stream, u);
            rev_new.shuffle(&mut rng);
            rev_new.truncate(s);
            rev_old.shuffle(&mut rng);
            rev_old.truncate(s);

            fresh.extend(rev_new);
            fresh.sort_unstable();
            fresh.dedup();
            stale.extend(rev_old);
            stale.sort_unstable();
            stale.dedup();
            stale.retain(|id| fresh.binary_search(id).is_err());
            (fresh, stale)
        })
        .collect();

    let mut updates = 0;
    for wave_start in (0..n).step_by(JOIN_WAVE) {
        let wave = wave_start..(wave_start + JOIN_WAVE).min(n);
        let thresholds: Vec<f32> = pools.iter().map(|p| p.threshold(l)).collect();

        let proposals: Vec<Vec<(NodeId, NodeId, f32)>> = join_lists[wave]
            .par_iter()
            .map(|(fresh, stale)| local_join(vectors, fresh, stale, &thresholds))
            .collect();

        for (a, b, distance) in proposals.into_iter().flatten() {
            if pools[a as usize].insert(b, distance, l) {
                updates += 1;
            }
            if pools[b as usize].insert(a, distance, l) {
                updates += 1;
            }
        }
    }
    updates
}

/// Score every new×new and new×old pair around one node, keeping the pairs
/// that could improve at least one endpoint.
fn local_join(
    vectors: VectorSet<'_>,
    fresh: &[NodeId],
    stale: &[NodeId],
    thresholds: &[f32],
) -> Vec<(NodeId, NodeId, f32)> {
    let mut out = Vec::new();
    let mut offer = |a: NodeId, b: NodeId| {
        if a == b {
            return;
        }
        let d = l2_distance_squared(vectors.row(a as usize), vectors.row(b as usize));
        if d < thresholds[a as usize] || d < thresholds[b as usize] {
            out.push((a, b, d));
        }
    };

    for (i, &a) in fresh.iter().enumerate() {
        for &b in &fresh[i + 1..] {
            offer(a, b);
        }
        for &b in stale {
            offer(a, b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BuildParameters;

    fn grid(n: usize) -> Vec<f32> {
        // Points on a 2-d lattice so true neighbors are easy to reason about
        let side = (n as f64).sqrt().ceil() as usize;
        (0..n).flat_map(|i| [(i % side) as f32, (i / side) as f32]).collect()
    }

    #[test]
    fn test_pool_insert_keeps_order_and_bound() {
        let mut pool = Pool::default();
        assert!(pool.insert(3, 3.0, 3));
        assert!(pool.insert(1, 1.0, 3));
        assert!(pool.insert(2, 2.0, 3));
        assert!(!pool.insert(9, 9.0, 3));
        assert!(pool.insert(0, 0.5, 3));

        let ids: Vec<NodeId> = pool.neighbors().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_pool_rejects_duplicates() {
        let mut pool = Pool::default();
        assert!(pool.insert(5, 2.0, 4));
        assert!(pool.insert(6, 2.0, 4));
        assert!(!pool.insert(5, 2.0, 4));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_sample_marks_new_as_old() {
        let mut pool = Pool::default();
        for id in 0..6 {
            pool.insert(id, id as f32, 6);
        }
        let (fresh, stale) = pool.sample(4, 2);
        assert_eq!(fresh, vec![0, 1]);
        assert!(stale.is_empty());

        let (fresh, stale) = pool.sample(4, 2);
        assert_eq!(fresh, vec![2, 3]);
        assert_eq!(stale, vec![0, 1]);
    }

    #[test]
    fn test_initialize_excludes_self() {
        let data = grid(30);
        let vectors = VectorSet::new(&data, 2).unwrap();
        let config = BuildParameters::new(5, 8, 0, 4, 8, 4, 6, 1.0, 1.0).validate(30).unwrap();

        let pools = initialize(vectors, &config);
        for (node, pool) in pools.iter().enumerate() {
            assert_eq!(pool.len(), 8);
            assert!(pool.neighbors().all(|n| n.id as usize != node));
        }
    }

    #[test]
    fn test_refine_finds_lattice_neighbors() {
        let data = grid(100);
        let vectors = VectorSet::new(&data, 2).unwrap();
        let config = BuildParameters::new(8, 12, 10, 8, 8, 4, 8, 1.0, 1.0).validate(100).unwrap();

        let pools = refine(vectors, &config);

        // Every interior lattice point has four neighbors at distance 1
        let mut hits = 0;
        for pool in &pools {
            let nearest = pool.neighbors().next().unwrap();
            if nearest.distance <= 1.0 {
                hits += 1;
            }
        }
        assert!(hits >= 95, "only {hits} nodes found a unit neighbor");
    }

    #[test]
    fn test_refine_is_deterministic() {
        let data = grid(64);
        let vectors = VectorSet::new(&data, 2).unwrap();
        let config = BuildParameters::new(6, 10, 4, 5, 6, 4, 6, 1.0, 1.0).validate(64).unwrap();

        let first: Vec<Vec<NodeId>> =
            refine(vectors, &config).iter().map(|p| p.neighbors().map(|n| n.id).collect()).collect();
        let second: Vec<Vec<NodeId>> =
            refine(vectors, &config).iter().map(|p| p.neighbors().map(|n| n.id).collect()).collect();
        assert_eq!(first, second);
    }
}
