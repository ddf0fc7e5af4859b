//! Generation-stamped visited set for graph traversal.
//!
//! Replaces `HashSet<NodeId>` with O(1) array indexing. Resetting bumps a
//! generation counter instead of zeroing the array, so a search worker can
//! reuse one set across many queries.

use crate::graph::node::NodeId;

/// Dense visited set keyed by [`NodeId`]
#[derive(Debug)]
pub struct VisitedSet {
    stamps: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    /// Visited set able to hold ids `0..capacity`
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { stamps: vec![0; capacity], generation: 1 }
    }

    /// Forget every visit. Full memset only once every 65534 resets.
    pub fn reset(&mut self) {
        if self.generation == u16::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Grow to cover ids `0..capacity`
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.stamps.len() {
            self.stamps.resize(capacity, 0);
        }
    }

    /// Mark `id` visited; `true` if it had not been visited yet
    #[inline]
    pub fn insert(&mut self, id: NodeId) -> bool {
        let slot = &mut self.stamps[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }

    /// Whether `id` was visited since the last reset
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.stamps.get(id as usize).is_some_and(|&s| s == self.generation)
    }
}
