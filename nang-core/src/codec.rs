//! Flat little-endian encoding of a [`ProximityGraph`].
//!
//! # Layout
//!
//! ```text
//! [ GraphHeader: 64 bytes ]
//! [ entry ids:   entry_count x u32 ]
//! [ adjacency:   count x stride x u32, empty slots = u32::MAX ]
//! [ vectors:     count x dim x f32 ]
//! ```
//!
//! Decoding validates the header before touching the body, then allocates
//! each buffer at its final size.

use crate::error::{NangError, Result};
use crate::graph::{NodeId, ProximityGraph};
use crate::header::{GraphHeader, HEADER_SIZE};

/// Serialize `graph` into a self-describing blob
#[must_use]
pub fn encode(graph: &ProximityGraph) -> Vec<u8> {
    let header = GraphHeader::new(
        graph.dim() as u32,
        graph.len() as u64,
        graph.stride() as u32,
        graph.entry_points().len() as u32,
    );
    let mut out = Vec::with_capacity(HEADER_SIZE + header.body_len as usize);
    out.extend_from_slice(&header.to_bytes());

    for &id in graph.entry_points() {
        out.extend_from_slice(&id.to_le_bytes());
    }
    for &id in graph.raw_neighbors() {
        out.extend_from_slice(&id.to_le_bytes());
    }
    for &x in graph.vectors() {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Reconstruct a graph from a blob produced by [`encode`].
///
/// # Errors
///
/// Returns [`NangError::Deserialization`] if the header is invalid, the blob
/// length disagrees with the header, or any id is out of range.
pub fn decode(bytes: &[u8]) -> Result<ProximityGraph> {
    let header = GraphHeader::from_bytes(bytes)?;

    let expected = usize::try_from(header.body_len)
        .ok()
        .and_then(|body| body.checked_add(HEADER_SIZE))
        .ok_or_else(|| NangError::corrupt("graph body too large for this platform"))?;
    if bytes.len() != expected {
        return Err(NangError::corrupt(format!(
            "blob is {} bytes, header describes {expected}",
            bytes.len()
        )));
    }

    let count = usize::try_from(header.count)
        .map_err(|_| NangError::corrupt("node count too large for this platform"))?;
    let dim = header.dim as usize;
    let stride = header.stride as usize;
    let entry_count = header.entry_count as usize;

    let body = &bytes[HEADER_SIZE..];
    let (entries, body) = body.split_at(entry_count * 4);
    let (adjacency, vectors) = body.split_at(count * stride * 4);

    ProximityGraph::from_raw(
        dim,
        count,
        stride,
        read_ids(entries),
        read_ids(adjacency),
        read_floats(vectors),
    )
}

fn read_ids(bytes: &[u8]) -> Vec<NodeId> {
    bytes
        .chunks_exact(4)
        .map(|c| NodeId::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn read_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
