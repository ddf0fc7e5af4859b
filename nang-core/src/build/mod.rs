//! Graph construction: refinement, pruning, merging and repair.
//!
//! # Pipeline
//!
//! 1. Validate and clamp the parameters against the row count
//! 2. NN-descent refinement of random neighbor pools ([`descent`])
//! 3. Pick the medoid as entry point
//! 4. Diversity-prune each node's best `PL` candidates to `RANGE` edges
//! 5. Merge reverse edges up to the merge cap
//! 6. Repair connectivity from the entry point
//! 7. Lay the lists out in a fixed-stride [`ProximityGraph`]
//!
//! Every stage is deterministic for a fixed seed and input order.

mod descent;
mod prune;
mod repair;

use crate::dataset::VectorSet;
use crate::distance::l2_distance_squared;
use crate::error::Result;
use crate::graph::{Neighbor, NodeId, ProximityGraph};
use crate::params::{BuildConfig, BuildParameters};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Builds a [`ProximityGraph`] from a vector set
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    params: BuildParameters,
}

impl GraphBuilder {
    /// Builder for the given raw parameters
    #[must_use]
    pub fn new(params: BuildParameters) -> Self {
        Self { params }
    }

    /// Build the graph.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are missing or
    /// invalid. Oversized bounds are clamped, not rejected.
    pub fn build(&self, vectors: VectorSet<'_>) -> Result<ProximityGraph> {
        let rows = vectors.rows();
        let config = self.params.validate(rows)?;
        let started = Instant::now();
        info!(rows, dim = vectors.dim(), k = config.k, r = config.r, "building graph");

        let pools = descent::refine(vectors, &config);
        let candidates: Vec<Vec<Neighbor>> =
            pools.iter().map(|pool| pool.neighbors().collect()).collect();
        drop(pools);
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "refinement finished");

        let entry = medoid(vectors);
        let adjacency = link(vectors, &candidates, &config, entry);

        let graph = ProximityGraph::from_adjacency(
            vectors.dim(),
            vec![entry],
            &adjacency,
            vectors.as_slice().to_vec(),
        )?;
        info!(
            rows,
            entry,
            stride = graph.stride(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graph built"
        );
        Ok(graph)
    }
}

/// Prune, merge and repair refined candidates into final neighbor lists
fn link(
    vectors: VectorSet<'_>,
    candidates: &[Vec<Neighbor>],
    config: &BuildConfig,
    entry: NodeId,
) -> Vec<Vec<NodeId>> {
    let forward = prune::prune_all(vectors, candidates, config.pl, config.range, config.b);
    let mut adjacency = prune::merge_reverse(vectors, forward, config.merge_cap(), config.b);

    let report = repair::repair_connectivity(vectors, &mut adjacency, entry, config.r);
    debug!(
        edges_changed = report.edges_changed,
        unreachable = report.unreachable,
        "connectivity repair finished"
    );
    adjacency
}

/// Row closest to the centroid
pub(crate) fn medoid(vectors: VectorSet<'_>) -> NodeId {
    let dim = vectors.dim();
    let mut sums = vec![0.0f64; dim];
    for row in vectors.iter() {
        for (sum, &x) in sums.iter_mut().zip(row) {
            *sum += f64::from(x);
        }
    }
    let rows = vectors.rows() as f64;
    let centroid: Vec<f32> = sums.iter().map(|&s| (s / rows) as f32).collect();

    (0..vectors.rows())
        .into_par_iter()
        .map(|id| Neighbor::new(id as NodeId, l2_distance_squared(vectors.row(id), &centroid)))
        .min()
        .map_or(0, |n| n.id)
}
