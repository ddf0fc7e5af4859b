//! Fixed-size header at the front of every serialized graph blob.

use crate::error::{NangError, Result};

/// Magic bytes identifying a NANG graph blob
pub const MAGIC: &[u8; 8] = b"NANGIDX\0";

/// Current blob format version
pub const VERSION: u32 = 1;

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Maximum supported vector dimensions.
/// This is a sanity check to catch corrupted headers.
const MAX_DIMENSIONS: u32 = 65_536;

/// Header of a serialized graph.
///
/// Encoded little endian as:
///
/// | offset | field         | type     |
/// |--------|---------------|----------|
/// | 0      | magic         | [u8; 8]  |
/// | 8      | version       | u32      |
/// | 12     | dim           | u32      |
/// | 16     | count         | u64      |
/// | 24     | stride        | u32      |
/// | 28     | entry_count   | u32      |
/// | 32     | body_len      | u64      |
/// | 40     | reserved      | [u8; 24] |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphHeader {
    /// Magic bytes for blob type identification
    pub magic: [u8; 8],
    /// Blob format version
    pub version: u32,
    /// Vector dimension
    pub dim: u32,
    /// Number of nodes
    pub count: u64,
    /// Neighbor slots per node
    pub stride: u32,
    /// Number of entry point ids
    pub entry_count: u32,
    /// Bytes following the header
    pub body_len: u64,
}

impl GraphHeader {
    /// Header for a graph of the given shape at the current version
    #[must_use]
    pub fn new(dim: u32, count: u64, stride: u32, entry_count: u32) -> Self {
        let mut header = Self {
            magic: *MAGIC,
            version: VERSION,
            dim,
            count,
            stride,
            entry_count,
            body_len: 0,
        };
        header.body_len = header.expected_body_len().unwrap_or(u64::MAX);
        header
    }

    /// Body length implied by the shape fields, `None` on overflow
    #[must_use]
    pub fn expected_body_len(&self) -> Option<u64> {
        let entries = u64::from(self.entry_count).checked_mul(4)?;
        let adjacency = self.count.checked_mul(u64::from(self.stride))?.checked_mul(4)?;
        let vectors = self.count.checked_mul(u64::from(self.dim))?.checked_mul(4)?;
        entries.checked_add(adjacency)?.checked_add(vectors)
    }

    /// Validates the header for correctness and compatibility
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.magic == *MAGIC
            && self.version > 0
            && self.version <= VERSION
            && self.dim > 0
            && self.dim <= MAX_DIMENSIONS
            && self.expected_body_len() == Some(self.body_len)
    }

    /// Encode into the fixed little-endian layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.magic);
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..16].copy_from_slice(&self.dim.to_le_bytes());
        out[16..24].copy_from_slice(&self.count.to_le_bytes());
        out[24..28].copy_from_slice(&self.stride.to_le_bytes());
        out[28..32].copy_from_slice(&self.entry_count.to_le_bytes());
        out[32..40].copy_from_slice(&self.body_len.to_le_bytes());
        out
    }

    /// Decode and validate a header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::Deserialization`] if `bytes` is shorter than
    /// [`HEADER_SIZE`], the magic is wrong, the version is unknown or the
    /// shape fields are inconsistent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.get(..HEADER_SIZE) else {
            return Err(NangError::corrupt(format!(
                "blob of {} bytes is shorter than the {HEADER_SIZE}-byte header",
                bytes.len()
            )));
        };

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&raw[0..8]);
        let header = Self {
            magic,
            version: read_u32(raw, 8),
            dim: read_u32(raw, 12),
            count: read_u64(raw, 16),
            stride: read_u32(raw, 24),
            entry_count: read_u32(raw, 28),
            body_len: read_u64(raw, 32),
        };

        if header.magic != *MAGIC {
            return Err(NangError::corrupt("not a NANG graph blob (bad magic)"));
        }
        if header.version == 0 || header.version > VERSION {
            return Err(NangError::corrupt(format!(
                "unsupported blob version {} (this build reads 1..={VERSION})",
                header.version
            )));
        }
        if !header.is_valid() {
            return Err(NangError::corrupt(format!(
                "inconsistent graph header: dim {}, count {}, stride {}, entries {}, body {}",
                header.dim, header.count, header.stride, header.entry_count, header.body_len
            )));
        }
        Ok(header)
    }
}

fn read_u32(raw: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&raw[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(raw: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[at..at + 8]);
    u64::from_le_bytes(buf)
}
