//! Node identifiers and distance-ordered neighbor entries.
//!
//! # Ordering
//!
//! [`Neighbor`] orders by distance using `f32::total_cmp`, then by id. NaN
//! distances sort after every finite distance instead of panicking, and ties
//! break deterministically so builds and searches are reproducible.

use std::cmp::Ordering;

/// Dense node id (row index in the source vector set)
pub type NodeId = u32;

/// Sentinel value marking an empty neighbor slot
pub const INVALID_NODE_ID: NodeId = NodeId::MAX;

/// A node together with its distance to some reference point
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    /// Node id
    pub id: NodeId,
    /// Squared L2 distance to the reference point
    pub distance: f32,
}

impl Neighbor {
    /// Create a neighbor entry
    #[inline]
    #[must_use]
    pub const fn new(id: NodeId, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then_with(|| self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_neighbor_ordering() {
        let near = Neighbor::new(1, 0.5);
        let far = Neighbor::new(2, 1.0);
        let tie = Neighbor::new(3, 0.5);

        assert!(near < far);
        assert!(near < tie); // equal distance, lower id first
        assert_ne!(near, tie);
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut entries = vec![
            Neighbor::new(0, f32::NAN),
            Neighbor::new(1, 3.0),
            Neighbor::new(2, 0.1),
        ];
        entries.sort();

        assert_eq!(entries[0].id, 2);
        assert_eq!(entries[1].id, 1);
        assert!(entries[2].distance.is_nan());
    }

    #[test]
    fn test_neighbor_in_heap() {
        let mut heap = BinaryHeap::new();
        heap.push(Neighbor::new(1, 0.5));
        heap.push(Neighbor::new(2, 1.0));
        heap.push(Neighbor::new(3, 0.1));

        // Max-heap: largest distance first
        assert_eq!(heap.pop().map(|n| n.id), Some(2));
        assert_eq!(heap.pop().map(|n| n.id), Some(1));
        assert_eq!(heap.pop().map(|n| n.id), Some(3));
    }
}
