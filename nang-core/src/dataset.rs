//! Borrowed views over caller-owned vector data and exclusion masks.

use crate::error::{NangError, Result};

/// N row-major vectors of dimension D, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct VectorSet<'a> {
    data: &'a [f32],
    dim: usize,
}

impl<'a> VectorSet<'a> {
    /// Wrap a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::DegenerateInput`] if `dim` is zero or `data` is
    /// empty, and [`NangError::DimensionMismatch`] if `data.len()` is not a
    /// multiple of `dim`.
    pub fn new(data: &'a [f32], dim: usize) -> Result<Self> {
        if dim == 0 || data.is_empty() {
            return Err(NangError::DegenerateInput { rows: data.len().checked_div(dim).unwrap_or(0), dim });
        }
        if data.len() % dim != 0 {
            return Err(NangError::DimensionMismatch { expected: dim, actual: data.len() % dim });
        }
        Ok(Self { data, dim })
    }

    /// Number of rows
    #[must_use]
    pub fn rows(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Vector dimension
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The whole flat buffer
    #[must_use]
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Row `i`; panics if out of range
    #[must_use]
    pub fn row(&self, i: usize) -> &'a [f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterate rows in order
    pub fn iter(&self) -> std::slice::ChunksExact<'a, f32> {
        self.data.chunks_exact(self.dim)
    }
}

/// One bit per external id; a set bit keeps that id out of query results.
///
/// Bit `i` is stored in byte `i / 8` at position `i % 8` (least significant
/// bit first). Ids at or beyond [`Self::len`] are never excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionBitset {
    bytes: Vec<u8>,
    len: usize,
}

impl ExclusionBitset {
    /// An all-clear bitset covering `len` ids
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { bytes: vec![0; len.div_ceil(8)], len }
    }

    /// Copy `len` bits out of a packed byte buffer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `bytes` holds fewer than `len` bits.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Result<Self> {
        let needed = len.div_ceil(8);
        if bytes.len() < needed {
            return Err(NangError::config(format!(
                "bitset of {len} bits needs {needed} bytes, got {}",
                bytes.len()
            )));
        }
        let mut bytes = bytes[..needed].to_vec();
        // Stray bits past `len` must not leak into `count_ones`
        if len % 8 != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= (1u8 << (len % 8)) - 1;
            }
        }
        Ok(Self { bytes, len })
    }

    /// Mark `id` as excluded, growing the bitset if needed
    pub fn set(&mut self, id: usize) {
        if id >= self.len {
            self.len = id + 1;
            self.bytes.resize(self.len.div_ceil(8), 0);
        }
        self.bytes[id / 8] |= 1 << (id % 8);
    }

    /// Clear the exclusion for `id`
    pub fn clear(&mut self, id: usize) {
        if id < self.len {
            self.bytes[id / 8] &= !(1 << (id % 8));
        }
    }

    /// Whether `id` is excluded
    #[inline]
    #[must_use]
    pub fn test(&self, id: usize) -> bool {
        id < self.len && self.bytes[id / 8] & (1 << (id % 8)) != 0
    }

    /// Number of ids covered
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitset covers no ids
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of excluded ids
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Packed bytes, LSB first
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
