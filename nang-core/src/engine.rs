//! The capability interface between the index lifecycle and a graph
//! implementation.
//!
//! [`crate::NangIndex`] only manages state: readiness, snapshots and the
//! blob protocol. Everything that knows what a graph *is* sits behind
//! [`GraphEngine`], with [`NangEngine`] as the default implementation.

use crate::build::GraphBuilder;
use crate::codec;
use crate::dataset::{ExclusionBitset, VectorSet};
use crate::error::Result;
use crate::graph::{ProximityGraph, QueryResult, SearchScratch};
use crate::params::BuildParameters;
use rayon::prelude::*;

/// Build, search and (de)serialize one kind of graph
pub trait GraphEngine: Send + Sync {
    /// Immutable graph shared between concurrent readers
    type Graph: Send + Sync + 'static;

    /// Build a graph over `vectors`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `params` is incomplete or invalid.
    fn build(&self, vectors: VectorSet<'_>, params: &BuildParameters) -> Result<Self::Graph>;

    /// Answer one query of `dim(graph)` floats
    fn search(
        &self,
        graph: &Self::Graph,
        query: &[f32],
        ef: usize,
        topk: usize,
        exclusion: Option<&ExclusionBitset>,
    ) -> QueryResult;

    /// Answer every query in `queries` on the rayon pool, in input order
    fn search_batch(
        &self,
        graph: &Self::Graph,
        queries: VectorSet<'_>,
        ef: usize,
        topk: usize,
        exclusion: Option<&ExclusionBitset>,
    ) -> Vec<QueryResult> {
        queries
            .as_slice()
            .par_chunks_exact(queries.dim())
            .map(|query| self.search(graph, query, ef, topk, exclusion))
            .collect()
    }

    /// Flatten a graph into a self-describing blob
    fn encode(&self, graph: &Self::Graph) -> Vec<u8>;

    /// Rebuild a graph from [`Self::encode`] output.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if `bytes` is corrupt or from an
    /// incompatible format version.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Graph>;

    /// Approximate heap footprint in bytes
    fn size_of(&self, graph: &Self::Graph) -> usize;

    /// Number of indexed vectors
    fn count(&self, graph: &Self::Graph) -> usize;

    /// Vector dimension
    fn dim(&self, graph: &Self::Graph) -> usize;
}

/// NN-descent graph with diversity pruning and beam search
#[derive(Debug, Clone, Copy, Default)]
pub struct NangEngine;

impl GraphEngine for NangEngine {
    type Graph = ProximityGraph;

    fn build(&self, vectors: VectorSet<'_>, params: &BuildParameters) -> Result<ProximityGraph> {
        GraphBuilder::new(params.clone()).build(vectors)
    }

    fn search(
        &self,
        graph: &ProximityGraph,
        query: &[f32],
        ef: usize,
        topk: usize,
        exclusion: Option<&ExclusionBitset>,
    ) -> QueryResult {
        let mut scratch = SearchScratch::new(graph.len());
        graph.search(query, ef, topk, exclusion, &mut scratch)
    }

    /// Each rayon worker reuses one scratch across its share of the batch
    fn search_batch(
        &self,
        graph: &ProximityGraph,
        queries: VectorSet<'_>,
        ef: usize,
        topk: usize,
        exclusion: Option<&ExclusionBitset>,
    ) -> Vec<QueryResult> {
        queries
            .as_slice()
            .par_chunks_exact(queries.dim())
            .map_init(
                || SearchScratch::new(graph.len()),
                |scratch, query| graph.search(query, ef, topk, exclusion, scratch),
            )
            .collect()
    }

    fn encode(&self, graph: &ProximityGraph) -> Vec<u8> {
        codec::encode(graph)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ProximityGraph> {
        codec::decode(bytes)
    }

    fn size_of(&self, graph: &ProximityGraph) -> usize {
        graph.memory_usage()
    }

    fn count(&self, graph: &ProximityGraph) -> usize {
        graph.len()
    }

    fn dim(&self, graph: &ProximityGraph) -> usize {
        graph.dim()
    }
}
