//! NANG - static graph-based approximate nearest-neighbor index
//!
//! NANG builds a degree-bounded proximity graph over a fixed set of vectors
//! once, then answers top-K Euclidean queries by beam search over that graph.
//! The graph serializes to a single named blob that can be split into
//! size-bounded slices for hosts that cap object sizes.
//!
//! # Features
//!
//! - NN-descent refinement with diversity pruning and reverse-edge merging
//! - Beam search with exclusion filtering (excluded ids still route traffic)
//! - Parallel batch queries on rayon, results in submission order
//! - Versioned little-endian blob format with lossless slicing
//! - Lock-free graph replacement: in-flight queries keep their snapshot
//!
//! # Example
//!
//! ```no_run
//! use nang_core::{BuildParameters, NangIndex, SearchParameters, SerializeOptions, VectorSet};
//!
//! # fn main() -> nang_core::Result<()> {
//! let data: Vec<f32> = (0..64 * 1000).map(|i| (i % 97) as f32).collect();
//! let index = NangIndex::new();
//!
//! let params = BuildParameters::new(30, 40, 8, 10, 30, 16, 24, 1.0, 1.0);
//! index.build_all(VectorSet::new(&data, 64)?, &params)?;
//!
//! // Ten nearest neighbors of the first vector
//! let results = index.query(&data[..64], &SearchParameters::new(20, 10), None)?;
//! assert_eq!(results[0].len(), 10);
//!
//! // Persist in slices of at most 4 MB and reload elsewhere
//! let blobs = index.serialize(&SerializeOptions::from_megabytes(4))?;
//! let restored = NangIndex::new();
//! restored.load(&blobs)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Lifecycle
//!
//! An index starts empty. `build_all` or `load` make it ready; from then on
//! it is never empty again, and a later build or load replaces the graph
//! atomically. Incremental insertion is not supported: `train` and
//! `add_without_ids` always fail.

pub mod binary_set;
mod build;
pub mod codec;
mod dataset;
pub mod distance;
mod engine;
mod error;
pub mod graph;
mod header;
mod params;
mod persist;

pub use binary_set::{Binary, BinarySet, INDEX_BLOB_NAME, RAW_DATA_BLOB, SLICE_META};
pub use build::GraphBuilder;
pub use dataset::{ExclusionBitset, VectorSet};
pub use distance::{euclidean_distance, l2_distance_squared};
pub use engine::{GraphEngine, NangEngine};
pub use error::{ErrorKind, NangError, Result};
pub use graph::{
    PLACEHOLDER_DISTANCE, ProximityGraph, QueryResult, SENTINEL_ID, SearchResult,
};
pub use header::{GraphHeader, HEADER_SIZE, MAGIC, VERSION};
pub use params::{
    BuildConfig, BuildParameters, DEFAULT_SEED, SearchParameters, SerializeOptions,
};

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A NANG index: build once, query many times, serialize and load.
///
/// All methods take `&self`; the index is `Send + Sync` and can be shared
/// between threads. The graph lives behind an atomically swapped
/// reference-counted pointer, so queries never block a concurrent
/// `build_all`/`load` and never observe a half-installed graph.
pub struct NangIndex<E: GraphEngine = NangEngine> {
    /// Graph implementation
    engine: E,

    /// Current graph, `None` until the first successful build or load
    graph: ArcSwapOption<E::Graph>,
}

impl NangIndex<NangEngine> {
    /// Empty index using the default engine
    #[must_use]
    pub fn new() -> Self {
        Self::with_engine(NangEngine)
    }
}

impl Default for NangIndex<NangEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GraphEngine> std::fmt::Debug for NangIndex<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NangIndex").field("ready", &self.is_ready()).finish_non_exhaustive()
    }
}

impl<E: GraphEngine> NangIndex<E> {
    /// Empty index backed by `engine`
    pub fn with_engine(engine: E) -> Self {
        Self { engine, graph: ArcSwapOption::empty() }
    }

    /// Build a graph over `vectors` and make it the current one.
    ///
    /// # Arguments
    ///
    /// * `vectors` - Row-major vectors; row `i` gets id `i`
    /// * `params` - Build parameters; all except `seed` are required
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a parameter is missing or invalid.
    /// On error the previous graph (if any) stays in place.
    pub fn build_all(&self, vectors: VectorSet<'_>, params: &BuildParameters) -> Result<()> {
        let graph = self.engine.build(vectors, params)?;
        self.graph.store(Some(Arc::new(graph)));
        Ok(())
    }

    /// Training is not part of this index type.
    ///
    /// # Errors
    ///
    /// Always returns [`NangError::UnsupportedOperation`].
    pub fn train(&self, _vectors: VectorSet<'_>, _params: &BuildParameters) -> Result<()> {
        Err(NangError::UnsupportedOperation(
            "NANG does not need training; call build_all".into(),
        ))
    }

    /// Incremental insertion is not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`NangError::UnsupportedOperation`].
    pub fn add_without_ids(&self, _vectors: VectorSet<'_>, _params: &BuildParameters) -> Result<()> {
        Err(NangError::UnsupportedOperation(
            "NANG is build-once; rebuild with build_all to change the vector set".into(),
        ))
    }

    /// Answer a batch of queries.
    ///
    /// # Arguments
    ///
    /// * `queries` - Row-major query vectors, `dim()` floats each
    /// * `params` - Frontier size and number of results
    /// * `exclusion` - Ids that must not appear in any result row
    ///
    /// # Returns
    ///
    /// One row of exactly `topk` results per query, in query order.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::UninitializedIndex`] before a build or load, a
    /// configuration error for invalid `params`, and
    /// [`NangError::DimensionMismatch`] if `queries.len()` is not a multiple
    /// of `dim()`.
    pub fn query(
        &self,
        queries: &[f32],
        params: &SearchParameters,
        exclusion: Option<&ExclusionBitset>,
    ) -> Result<Vec<QueryResult>> {
        self.query_checked(queries, None, params, exclusion)
    }

    /// Like [`NangIndex::query`], but fails unless the graph searched has
    /// dimension `expected_dim`.
    ///
    /// The check and the search use the same graph snapshot, so a concurrent
    /// `build_all`/`load` cannot change the row width between them.
    ///
    /// # Errors
    ///
    /// As [`NangIndex::query`], plus [`NangError::DimensionMismatch`] when
    /// the index dimension differs from `expected_dim`.
    pub fn query_with_dim(
        &self,
        queries: &[f32],
        expected_dim: usize,
        params: &SearchParameters,
        exclusion: Option<&ExclusionBitset>,
    ) -> Result<Vec<QueryResult>> {
        self.query_checked(queries, Some(expected_dim), params, exclusion)
    }

    fn query_checked(
        &self,
        queries: &[f32],
        expected_dim: Option<usize>,
        params: &SearchParameters,
        exclusion: Option<&ExclusionBitset>,
    ) -> Result<Vec<QueryResult>> {
        let graph = self.snapshot()?;
        let (ef, topk) = params.resolve()?;

        let dim = self.engine.dim(&graph);
        if let Some(expected) = expected_dim.filter(|&expected| expected != dim) {
            return Err(NangError::DimensionMismatch { expected: dim, actual: expected });
        }
        if queries.len() % dim != 0 {
            return Err(NangError::DimensionMismatch { expected: dim, actual: queries.len() % dim });
        }
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let queries = VectorSet::new(queries, dim)?;
        Ok(self.engine.search_batch(&graph, queries, ef, topk, exclusion))
    }

    /// Serialize the current graph into a [`BinarySet`].
    ///
    /// The graph is stored under [`INDEX_BLOB_NAME`], split into slices when
    /// `options.slice_size` is set and the blob exceeds it.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::UninitializedIndex`] before a build or load, and
    /// a configuration error for a zero slice size.
    pub fn serialize(&self, options: &SerializeOptions) -> Result<BinarySet> {
        let graph = self.snapshot()?;
        let started = Instant::now();

        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, self.engine.encode(&graph));
        if let Some(slice_size) = options.slice_size {
            set = set.disassemble(slice_size)?;
        }

        debug!(
            bytes = set.total_size(),
            blobs = set.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "index serialized"
        );
        Ok(set)
    }

    /// Replace the current graph with one decoded from `set`.
    ///
    /// Sliced sets are reassembled first. Blobs other than the index blob,
    /// such as [`RAW_DATA_BLOB`], are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::Deserialization`] if the index blob is missing,
    /// its slices are incomplete, or it fails to decode. On error the
    /// previous graph (if any) stays in place.
    pub fn load(&self, set: &BinarySet) -> Result<()> {
        let bytes = set.reassemble_blob(INDEX_BLOB_NAME)?;
        let graph = self.engine.decode(&bytes)?;
        info!(
            rows = self.engine.count(&graph),
            dim = self.engine.dim(&graph),
            bytes = bytes.len(),
            "index loaded"
        );
        self.graph.store(Some(Arc::new(graph)));
        Ok(())
    }

    /// Number of indexed vectors.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::UninitializedIndex`] before a build or load.
    pub fn count(&self) -> Result<usize> {
        let graph = self.snapshot()?;
        Ok(self.engine.count(&graph))
    }

    /// Vector dimension.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::UninitializedIndex`] before a build or load.
    pub fn dim(&self) -> Result<usize> {
        let graph = self.snapshot()?;
        Ok(self.engine.dim(&graph))
    }

    /// Approximate memory held by the graph, in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::UninitializedIndex`] before a build or load.
    pub fn size_estimate(&self) -> Result<usize> {
        let graph = self.snapshot()?;
        Ok(self.engine.size_of(&graph))
    }

    /// Whether a graph has been built or loaded
    pub fn is_ready(&self) -> bool {
        self.graph.load().is_some()
    }

    /// Shared handle to the current graph; stays valid across later
    /// `build_all`/`load` calls.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::UninitializedIndex`] before a build or load.
    pub fn snapshot(&self) -> Result<Arc<E::Graph>> {
        self.graph.load_full().ok_or(NangError::UninitializedIndex)
    }
}
