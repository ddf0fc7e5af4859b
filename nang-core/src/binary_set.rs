//! Named blob container with size-bounded slicing.
//!
//! # Slicing
//!
//! Hosts often cap the size of a single stored object. [`BinarySet::disassemble`]
//! replaces every blob larger than the cap with numbered slices named
//! `{name}_{i}` and records how to put them back in a JSON blob named
//! [`SLICE_META`]:
//!
//! ```json
//! {"meta":[{"name":"NANG","slice_num":3,"total_len":10485800}]}
//! ```
//!
//! [`BinarySet::assemble`] reverses this in place, and
//! [`BinarySet::reassemble_blob`] rebuilds a single blob without touching the
//! set.

use crate::error::{NangError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Name of the serialized graph blob
pub const INDEX_BLOB_NAME: &str = "NANG";

/// Name under which a host may attach the raw vectors; ignored on load
pub const RAW_DATA_BLOB: &str = "RAW_DATA";

/// Name of the slice metadata blob
pub const SLICE_META: &str = "SLICE_META";

/// One named byte array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    name: String,
    data: Vec<u8>,
}

impl Binary {
    /// Blob name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blob contents
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Blob length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the blob is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SliceInfo {
    name: String,
    slice_num: usize,
    total_len: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SliceMeta {
    meta: Vec<SliceInfo>,
}

/// Ordered collection of named blobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySet {
    blobs: Vec<Binary>,
}

impl BinarySet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob, replacing any existing blob with the same name
    pub fn append(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.blobs.iter_mut().find(|b| b.name == name) {
            Some(existing) => existing.data = data,
            None => self.blobs.push(Binary { name, data }),
        }
    }

    /// Remove and return the blob called `name`
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let pos = self.blobs.iter().position(|b| b.name == name)?;
        Some(self.blobs.remove(pos).data)
    }

    /// Contents of the blob called `name`
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&[u8]> {
        self.blobs.iter().find(|b| b.name == name).map(|b| b.data.as_slice())
    }

    /// Whether a blob called `name` exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.blobs.iter().any(|b| b.name == name)
    }

    /// Blobs in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Binary> {
        self.blobs.iter()
    }

    /// Number of blobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the set holds no blobs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Sum of all blob lengths
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.blobs.iter().map(Binary::len).sum()
    }

    /// Split every blob larger than `slice_size` bytes into slices.
    ///
    /// Blobs that already fit are carried over unchanged. A [`SLICE_META`]
    /// blob is added only when something was sliced.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `slice_size` is zero, if the set is
    /// already sliced, or if a slice name would collide with an existing blob.
    pub fn disassemble(&self, slice_size: usize) -> Result<Self> {
        if slice_size == 0 {
            return Err(NangError::config("slice size must be > 0"));
        }
        if self.contains(SLICE_META) {
            return Err(NangError::config("binary set is already sliced"));
        }

        let mut out = Self::new();
        let mut meta = SliceMeta::default();
        for blob in &self.blobs {
            if blob.data.len() <= slice_size {
                out.append(blob.name.clone(), blob.data.clone());
                continue;
            }
            let mut slice_num = 0;
            for (i, chunk) in blob.data.chunks(slice_size).enumerate() {
                let part_name = slice_name(&blob.name, i);
                if self.contains(&part_name) || out.contains(&part_name) {
                    return Err(NangError::config(format!(
                        "slice `{part_name}` collides with an existing blob"
                    )));
                }
                out.append(part_name, chunk.to_vec());
                slice_num += 1;
            }
            meta.meta.push(SliceInfo {
                name: blob.name.clone(),
                slice_num,
                total_len: blob.data.len() as u64,
            });
        }

        if !meta.meta.is_empty() {
            let json = serde_json::to_vec(&meta)
                .map_err(|e| NangError::config(format!("cannot encode slice metadata: {e}")))?;
            out.append(SLICE_META, json);
        }
        Ok(out)
    }

    /// Merge sliced blobs back in place and drop [`SLICE_META`].
    ///
    /// A set without slice metadata is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::Deserialization`] if the metadata is malformed, a
    /// slice is missing, or the slices do not add up to the recorded length.
    pub fn assemble(&mut self) -> Result<()> {
        let Some(meta) = self.slice_meta()? else {
            return Ok(());
        };

        // Stitch everything before touching the set so a bad entry leaves it intact
        let wholes = meta
            .meta
            .iter()
            .map(|info| self.concat_slices(info))
            .collect::<Result<Vec<_>>>()?;

        for (info, whole) in meta.meta.iter().zip(wholes) {
            for i in 0..info.slice_num {
                self.remove(&slice_name(&info.name, i));
            }
            self.append(info.name.clone(), whole);
        }
        self.remove(SLICE_META);
        Ok(())
    }

    /// Contents of blob `name`, stitched from its slices if it was sliced.
    ///
    /// # Errors
    ///
    /// Returns [`NangError::Deserialization`] if the blob is neither present
    /// nor described by valid slice metadata.
    pub fn reassemble_blob(&self, name: &str) -> Result<Cow<'_, [u8]>> {
        if let Some(data) = self.get_by_name(name) {
            return Ok(Cow::Borrowed(data));
        }
        let info = self
            .slice_meta()?
            .and_then(|meta| meta.meta.into_iter().find(|info| info.name == name))
            .ok_or_else(|| NangError::corrupt(format!("binary set has no blob named `{name}`")))?;
        self.concat_slices(&info).map(Cow::Owned)
    }

    fn slice_meta(&self) -> Result<Option<SliceMeta>> {
        self.get_by_name(SLICE_META)
            .map(|raw| {
                serde_json::from_slice(raw)
                    .map_err(|e| NangError::corrupt(format!("malformed slice metadata: {e}")))
            })
            .transpose()
    }

    fn concat_slices(&self, info: &SliceInfo) -> Result<Vec<u8>> {
        if info.slice_num == 0 && info.total_len != 0 {
            return Err(NangError::corrupt(format!(
                "blob `{}` records {} bytes in zero slices",
                info.name, info.total_len
            )));
        }

        // Size from the slices actually present; `total_len` is untrusted
        let mut parts = Vec::with_capacity(info.slice_num.min(self.blobs.len()));
        for i in 0..info.slice_num {
            let part_name = slice_name(&info.name, i);
            let part = self.get_by_name(&part_name).ok_or_else(|| {
                NangError::corrupt(format!(
                    "slice `{part_name}` missing ({} expected)",
                    info.slice_num
                ))
            })?;
            parts.push(part);
        }
        let present: usize = parts.iter().map(|p| p.len()).sum();
        if present as u64 != info.total_len {
            return Err(NangError::corrupt(format!(
                "slices of `{}` hold {present} bytes, metadata says {}",
                info.name, info.total_len
            )));
        }

        Ok(parts.concat())
    }
}

impl<'a> IntoIterator for &'a BinarySet {
    type Item = &'a Binary;
    type IntoIter = std::slice::Iter<'a, Binary>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn slice_name(name: &str, index: usize) -> String {
    format!("{name}_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_append_replaces_same_name() {
        let mut set = BinarySet::new();
        set.append("a", vec![1]);
        set.append("b", vec![2, 3]);
        set.append("a", vec![4, 5, 6]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get_by_name("a"), Some(&[4, 5, 6][..]));
        assert_eq!(set.total_size(), 5);
        assert_eq!(set.iter().map(Binary::name).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_disassemble_names_and_bounds() {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, payload(25));
        set.append("small", payload(3));

        let sliced = set.disassemble(10).unwrap();
        assert!(!sliced.contains(INDEX_BLOB_NAME));
        assert!(sliced.contains("small"));
        assert!(sliced.contains(SLICE_META));
        for i in 0..3 {
            let part = sliced.get_by_name(&format!("NANG_{i}")).unwrap();
            assert!(part.len() <= 10);
        }
        assert!(!sliced.contains("NANG_3"));

        let meta: serde_json::Value =
            serde_json::from_slice(sliced.get_by_name(SLICE_META).unwrap()).unwrap();
        assert_eq!(meta["meta"][0]["name"], "NANG");
        assert_eq!(meta["meta"][0]["slice_num"], 3);
        assert_eq!(meta["meta"][0]["total_len"], 25);
    }

    #[test]
    fn test_assemble_restores_original() {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, payload(1000));

        for slice_size in [1, 7, 999, 1000, 4096] {
            let mut sliced = set.disassemble(slice_size).unwrap();
            sliced.assemble().unwrap();
            assert_eq!(sliced, set, "slice size {slice_size}");
        }
    }

    #[test]
    fn test_reassemble_blob_without_mutation() {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, payload(100));
        let sliced = set.disassemble(33).unwrap();

        let whole = sliced.reassemble_blob(INDEX_BLOB_NAME).unwrap();
        assert!(matches!(whole, Cow::Owned(_)));
        assert_eq!(whole.as_ref(), payload(100).as_slice());

        let direct = set.reassemble_blob(INDEX_BLOB_NAME).unwrap();
        assert!(matches!(direct, Cow::Borrowed(_)));
    }

    #[test]
    fn test_zero_slice_size_rejected() {
        let set = BinarySet::new();
        assert_eq!(set.disassemble(0).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_missing_slice_detected() {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, payload(30));
        let mut sliced = set.disassemble(10).unwrap();
        sliced.remove("NANG_1");

        assert_eq!(sliced.reassemble_blob(INDEX_BLOB_NAME).unwrap_err().kind(), ErrorKind::Deserialization);
        assert_eq!(sliced.assemble().unwrap_err().kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn test_bad_metadata_detected() {
        let mut set = BinarySet::new();
        set.append("NANG_0", vec![1, 2]);
        set.append(SLICE_META, b"{not json".to_vec());
        assert_eq!(set.reassemble_blob(INDEX_BLOB_NAME).unwrap_err().kind(), ErrorKind::Deserialization);

        let mut set = BinarySet::new();
        set.append("NANG_0", vec![1, 2]);
        set.append(
            SLICE_META,
            br#"{"meta":[{"name":"NANG","slice_num":1,"total_len":5}]}"#.to_vec(),
        );
        assert_eq!(set.reassemble_blob(INDEX_BLOB_NAME).unwrap_err().kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn test_oversized_total_len_is_error_not_panic() {
        let mut set = BinarySet::new();
        set.append("NANG_0", vec![1, 2, 3]);
        set.append(
            SLICE_META,
            format!(r#"{{"meta":[{{"name":"NANG","slice_num":1,"total_len":{}}}]}}"#, u64::MAX)
                .into_bytes(),
        );
        assert_eq!(set.reassemble_blob(INDEX_BLOB_NAME).unwrap_err().kind(), ErrorKind::Deserialization);
        assert_eq!(set.assemble().unwrap_err().kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn test_zero_slices_with_length_rejected() {
        let mut set = BinarySet::new();
        set.append(
            SLICE_META,
            br#"{"meta":[{"name":"NANG","slice_num":0,"total_len":10}]}"#.to_vec(),
        );
        assert_eq!(set.reassemble_blob(INDEX_BLOB_NAME).unwrap_err().kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn test_failed_assemble_leaves_set_untouched() {
        let mut set = BinarySet::new();
        set.append("A", payload(20));
        set.append("B", payload(20));
        let mut sliced = set.disassemble(8).unwrap();
        sliced.remove("B_2");
        let before = sliced.clone();

        assert_eq!(sliced.assemble().unwrap_err().kind(), ErrorKind::Deserialization);
        assert_eq!(sliced, before);
    }

    #[test]
    fn test_disassemble_rejects_sliced_input() {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, payload(30));
        let sliced = set.disassemble(10).unwrap();
        assert_eq!(sliced.disassemble(5).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_disassemble_rejects_name_collision() {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, payload(30));
        set.append("NANG_1", payload(2));
        assert_eq!(set.disassemble(10).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_missing_blob_is_deserialization_error() {
        let set = BinarySet::new();
        let err = set.reassemble_blob(INDEX_BLOB_NAME).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
        assert!(err.to_string().contains("NANG"));
    }
}
