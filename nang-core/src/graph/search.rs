//! Beam search over a [`ProximityGraph`] with exclusion filtering.
//!
//! # Algorithm
//!
//! The frontier starts at the entry points (topped up with their neighbors)
//! and is bounded by `ef`. Each step pops the closest unexpanded candidate
//! and scores its neighbors; the search stops once the closest candidate is
//! farther than the worst of the `ef` best nodes seen.
//!
//! Excluded ids still steer the traversal, since their edges may be the only
//! way toward the query's true neighbors. They are simply never offered to
//! the result heap, which tracks the best `topk` non-excluded nodes evaluated
//! at any point during the walk.

use crate::dataset::ExclusionBitset;
use crate::distance::l2_distance_squared;
use crate::graph::node::{Neighbor, NodeId};
use crate::graph::visited::VisitedSet;
use crate::graph::ProximityGraph;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Id reported in result slots nothing could fill
pub const SENTINEL_ID: i64 = -1;

/// Distance reported alongside [`SENTINEL_ID`]
pub const PLACEHOLDER_DISTANCE: f32 = f32::MAX;

/// One (id, distance) slot of a query result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// External id, or [`SENTINEL_ID`] for an unfilled slot
    pub id: i64,
    /// Squared L2 distance, or [`PLACEHOLDER_DISTANCE`]
    pub distance: f32,
}

impl SearchResult {
    /// The filler for unused slots
    pub const EMPTY: Self = Self { id: SENTINEL_ID, distance: PLACEHOLDER_DISTANCE };

    /// Whether this slot holds a real neighbor
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.id != SENTINEL_ID
    }
}

/// Exactly `topk` slots for one query, ascending by distance, valid entries
/// first and sentinel padding after.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    slots: Vec<SearchResult>,
}

impl QueryResult {
    /// Pad `found` (already sorted ascending) out to `topk` slots
    #[must_use]
    pub fn padded(found: impl IntoIterator<Item = SearchResult>, topk: usize) -> Self {
        let mut slots: Vec<SearchResult> = found.into_iter().take(topk).collect();
        slots.resize(topk, SearchResult::EMPTY);
        Self { slots }
    }

    /// All slots
    #[must_use]
    pub fn as_slice(&self) -> &[SearchResult] {
        &self.slots
    }

    /// Number of slots (always the requested `topk`)
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the row has zero slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ids of every slot, sentinels included
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.slots.iter().map(|s| s.id).collect()
    }

    /// Distances of every slot, placeholders included
    #[must_use]
    pub fn distances(&self) -> Vec<f32> {
        self.slots.iter().map(|s| s.distance).collect()
    }

    /// Number of slots holding a real neighbor
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_valid()).count()
    }
}

/// Private per-worker search state, reusable across queries
#[derive(Debug)]
pub struct SearchScratch {
    visited: VisitedSet,
    frontier: BinaryHeap<Reverse<Neighbor>>,
    best: BinaryHeap<Neighbor>,
    hits: BinaryHeap<Neighbor>,
}

impl SearchScratch {
    /// Scratch sized for a graph of `nodes` nodes
    #[must_use]
    pub fn new(nodes: usize) -> Self {
        Self {
            visited: VisitedSet::new(nodes),
            frontier: BinaryHeap::new(),
            best: BinaryHeap::new(),
            hits: BinaryHeap::new(),
        }
    }

    fn prepare(&mut self, nodes: usize) {
        self.visited.ensure_capacity(nodes);
        self.visited.reset();
        self.frontier.clear();
        self.best.clear();
        self.hits.clear();
    }
}

impl ProximityGraph {
    /// Find the `topk` nearest non-excluded nodes to `query`.
    ///
    /// # Arguments
    ///
    /// * `query` - Query vector, `dim()` floats
    /// * `ef` - Frontier size; callers raise it to at least `topk`
    /// * `topk` - Number of result slots
    /// * `exclusion` - Ids that must not appear in the result
    /// * `scratch` - Worker-private state, reset on entry
    pub fn search(
        &self,
        query: &[f32],
        ef: usize,
        topk: usize,
        exclusion: Option<&ExclusionBitset>,
        scratch: &mut SearchScratch,
    ) -> QueryResult {
        debug_assert_eq!(query.len(), self.dim);
        scratch.prepare(self.len());

        if self.is_empty() || topk == 0 {
            return QueryResult::padded([], topk);
        }
        let ef = ef.max(topk).max(1);

        for &ep in &self.entry_points {
            self.visit(query, ep, ef, topk, exclusion, scratch);
        }
        // Top the frontier up with the entry points' neighbors
        for &ep in &self.entry_points {
            for n in self.neighbors_iter(ep) {
                if scratch.best.len() >= ef {
                    break;
                }
                self.visit(query, n, ef, topk, exclusion, scratch);
            }
        }

        while let Some(Reverse(current)) = scratch.frontier.pop() {
            if scratch.best.len() >= ef
                && scratch.best.peek().is_some_and(|worst| current.distance > worst.distance)
            {
                break;
            }

            for n in self.neighbors_iter(current.id) {
                self.visit(query, n, ef, topk, exclusion, scratch);
            }
        }

        let mut hits = std::mem::take(&mut scratch.hits).into_vec();
        hits.sort_unstable();
        let found = hits
            .iter()
            .map(|n| SearchResult { id: i64::from(n.id), distance: n.distance });
        let result = QueryResult::padded(found, topk);

        hits.clear();
        scratch.hits = BinaryHeap::from(hits);
        result
    }

    /// Score `id` once per query and offer it to the frontier and results
    #[inline]
    fn visit(
        &self,
        query: &[f32],
        id: NodeId,
        ef: usize,
        topk: usize,
        exclusion: Option<&ExclusionBitset>,
        scratch: &mut SearchScratch,
    ) {
        if !scratch.visited.insert(id) {
            return;
        }
        let candidate = Neighbor::new(id, l2_distance_squared(query, self.vector(id)));

        if !exclusion.is_some_and(|bits| bits.test(id as usize)) {
            scratch.hits.push(candidate);
            if scratch.hits.len() > topk {
                scratch.hits.pop();
            }
        }

        let improves = scratch.best.len() < ef
            || scratch.best.peek().is_some_and(|worst| candidate < *worst);
        if improves {
            scratch.frontier.push(Reverse(candidate));
            scratch.best.push(candidate);
            if scratch.best.len() > ef {
                scratch.best.pop();
            }
        }
    }
}
