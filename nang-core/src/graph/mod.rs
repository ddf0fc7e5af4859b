//! The proximity graph and its search routine.
//!
//! # Layout
//!
//! Adjacency is stored as one flat array with a fixed number of slots per
//! node (the *stride*), so node `i`'s neighbors live at
//! `neighbors[i * stride..(i + 1) * stride]`. No per-node allocation and no
//! indirection: a neighbor scan is one contiguous read. Unused slots hold
//! [`INVALID_NODE_ID`] and are skipped by [`ProximityGraph::neighbors_iter`].
//!
//! The graph also owns a copy of the indexed vectors, row-major, since every
//! search step needs them for distance evaluation.

mod node;
mod search;
mod visited;

pub use node::{INVALID_NODE_ID, Neighbor, NodeId};
pub use search::{PLACEHOLDER_DISTANCE, QueryResult, SENTINEL_ID, SearchResult, SearchScratch};
pub use visited::VisitedSet;

use crate::error::{NangError, Result};
use std::collections::VecDeque;
use std::mem;

/// Immutable, degree-bounded proximity graph over a fixed vector set
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityGraph {
    dim: usize,
    count: usize,
    stride: usize,
    entry_points: Vec<NodeId>,
    neighbors: Vec<NodeId>,
    vectors: Vec<f32>,
}

impl ProximityGraph {
    /// Assemble a graph from per-node neighbor lists.
    ///
    /// The stride is the largest list length, so sparse graphs do not pay
    /// for slots they never use.
    ///
    /// # Errors
    ///
    /// Returns an error if `vectors` does not hold `adjacency.len()` rows of
    /// `dim` floats, or if any entry point or neighbor id is out of range.
    pub fn from_adjacency(
        dim: usize,
        entry_points: Vec<NodeId>,
        adjacency: &[Vec<NodeId>],
        vectors: Vec<f32>,
    ) -> Result<Self> {
        let count = adjacency.len();
        let stride = adjacency.iter().map(Vec::len).max().unwrap_or(0);

        let mut neighbors = vec![INVALID_NODE_ID; count * stride];
        for (slots, list) in neighbors.chunks_exact_mut(stride.max(1)).zip(adjacency) {
            slots[..list.len()].copy_from_slice(list);
        }

        Self::from_raw(dim, count, stride, entry_points, neighbors, vectors)
    }

    /// Assemble a graph from its flat representation, validating every id.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::Deserialization`] if the buffers disagree with
    /// `count`, `stride` and `dim`, or reference nodes that do not exist.
    pub fn from_raw(
        dim: usize,
        count: usize,
        stride: usize,
        entry_points: Vec<NodeId>,
        neighbors: Vec<NodeId>,
        vectors: Vec<f32>,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(NangError::corrupt("graph dimension is zero"));
        }
        if neighbors.len() != count * stride {
            return Err(NangError::corrupt(format!(
                "adjacency holds {} slots, expected {count} x {stride}",
                neighbors.len()
            )));
        }
        if vectors.len() != count * dim {
            return Err(NangError::corrupt(format!(
                "vector block holds {} floats, expected {count} x {dim}",
                vectors.len()
            )));
        }
        if count > 0 && entry_points.is_empty() {
            return Err(NangError::corrupt("non-empty graph without an entry point"));
        }
        if let Some(&bad) = entry_points.iter().find(|&&id| id as usize >= count) {
            return Err(NangError::corrupt(format!("entry point {bad} out of range ({count} nodes)")));
        }
        if let Some(&bad) =
            neighbors.iter().find(|&&id| id != INVALID_NODE_ID && id as usize >= count)
        {
            return Err(NangError::corrupt(format!("neighbor id {bad} out of range ({count} nodes)")));
        }

        Ok(Self { dim, count, stride, entry_points, neighbors, vectors })
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the graph has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Vector dimension
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Neighbor slots per node; an upper bound on every out-degree
    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Designated search entry points
    #[must_use]
    pub fn entry_points(&self) -> &[NodeId] {
        &self.entry_points
    }

    /// Zero-allocation iterator over the valid neighbors of `id`.
    ///
    /// Returns an empty iterator for ids outside the graph.
    #[inline]
    pub fn neighbors_iter(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let start = id as usize * self.stride;
        let slots = self.neighbors.get(start..start + self.stride).unwrap_or(&[]);
        slots.iter().copied().take_while(|&n| n != INVALID_NODE_ID)
    }

    /// Out-degree of `id`
    #[must_use]
    pub fn degree(&self, id: NodeId) -> usize {
        self.neighbors_iter(id).count()
    }

    /// Vector of node `id`; panics if out of range
    #[inline]
    #[must_use]
    pub fn vector(&self, id: NodeId) -> &[f32] {
        let start = id as usize * self.dim;
        &self.vectors[start..start + self.dim]
    }

    /// All vectors, row-major
    #[must_use]
    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// Flat slot array (`len() * stride()` entries)
    #[must_use]
    pub fn raw_neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    /// Heap bytes held by the graph
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.neighbors.len() * mem::size_of::<NodeId>()
            + self.vectors.len() * mem::size_of::<f32>()
            + self.entry_points.len() * mem::size_of::<NodeId>()
    }

    /// Nodes not reachable from any entry point by following edges
    #[must_use]
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        let mut reached = vec![false; self.count];
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for &ep in &self.entry_points {
            if !reached[ep as usize] {
                reached[ep as usize] = true;
                queue.push_back(ep);
            }
        }
        while let Some(id) = queue.pop_front() {
            for n in self.neighbors_iter(id) {
                if !reached[n as usize] {
                    reached[n as usize] = true;
                    queue.push_back(n);
                }
            }
        }

        reached
            .iter()
            .enumerate()
            .filter(|&(_, &r)| !r)
            .map(|(id, _)| id as NodeId)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn line_graph() -> ProximityGraph {
        // 0 -> 1 -> 2, node 2 points back to 0
        let adjacency = vec![vec![1], vec![2, 0], vec![0]];
        let vectors = vec![0.0, 0.0, 1.0, 0.0, 2.0, 0.0];
        ProximityGraph::from_adjacency(2, vec![0], &adjacency, vectors).unwrap()
    }

    #[test]
    fn test_fixed_stride_layout() {
        let graph = line_graph();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dim(), 2);
        assert_eq!(graph.stride(), 2);
        assert_eq!(graph.raw_neighbors(), &[1, INVALID_NODE_ID, 2, 0, 0, INVALID_NODE_ID]);
    }

    #[test]
    fn test_neighbors_iter_skips_empty_slots() {
        let graph = line_graph();
        assert_eq!(graph.neighbors_iter(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(graph.neighbors_iter(1).collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(graph.degree(2), 1);
        assert_eq!(graph.neighbors_iter(99).count(), 0);
    }

    #[test]
    fn test_vector_access() {
        let graph = line_graph();
        assert_eq!(graph.vector(2), &[2.0, 0.0]);
        assert_eq!(graph.vectors().len(), 6);
    }

    #[test]
    fn test_reachability() {
        let graph = line_graph();
        assert!(graph.unreachable_nodes().is_empty());

        let adjacency = vec![vec![1], vec![0], vec![0]];
        let graph =
            ProximityGraph::from_adjacency(1, vec![0], &adjacency, vec![0.0, 1.0, 2.0]).unwrap();
        assert_eq!(graph.unreachable_nodes(), vec![2]);
    }

    #[test]
    fn test_from_raw_rejects_bad_ids() {
        let err = ProximityGraph::from_raw(1, 2, 1, vec![0], vec![1, 5], vec![0.0, 1.0]);
        assert_eq!(err.unwrap_err().kind(), ErrorKind::Deserialization);

        let err = ProximityGraph::from_raw(1, 2, 1, vec![7], vec![1, 0], vec![0.0, 1.0]);
        assert_eq!(err.unwrap_err().kind(), ErrorKind::Deserialization);

        let err = ProximityGraph::from_raw(1, 2, 1, vec![0], vec![1, 0], vec![0.0]);
        assert_eq!(err.unwrap_err().kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn test_single_node_graph_has_zero_stride() {
        let graph = ProximityGraph::from_adjacency(3, vec![0], &[vec![]], vec![1.0; 3]).unwrap();
        assert_eq!(graph.stride(), 0);
        assert_eq!(graph.neighbors_iter(0).count(), 0);
        assert!(graph.unreachable_nodes().is_empty());
    }

    #[test]
    fn test_memory_usage_counts_buffers() {
        let graph = line_graph();
        assert_eq!(graph.memory_usage(), 6 * 4 + 6 * 4 + 4);
    }
}
