//! Blob codec and slicing through the public serialize/load surface.

mod common;

use common::{built_index, random_vectors};
use nang_core::{
    BinarySet, ErrorKind, HEADER_SIZE, INDEX_BLOB_NAME, NangIndex, RAW_DATA_BLOB, SLICE_META,
    SearchParameters, SerializeOptions, VERSION,
};

const DIM: usize = 8;

fn fixture() -> (Vec<f32>, NangIndex) {
    let data = random_vectors(700, DIM, 31);
    let index = built_index(&data, DIM);
    (data, index)
}

fn whole_blob(index: &NangIndex) -> Vec<u8> {
    let set = index.serialize(&SerializeOptions::default()).unwrap();
    set.get_by_name(INDEX_BLOB_NAME).unwrap().to_vec()
}

#[test]
fn test_round_trip_preserves_answers() -> anyhow::Result<()> {
    let (data, index) = fixture();
    let queries = random_vectors(20, DIM, 32);
    let params = SearchParameters::new(40, 10);

    let set = index.serialize(&SerializeOptions::default())?;
    assert_eq!(set.len(), 1);

    let restored = NangIndex::new();
    restored.load(&set)?;
    assert_eq!(restored.count()?, index.count()?);
    assert_eq!(restored.dim()?, index.dim()?);
    assert_eq!(restored.query(&queries, &params, None)?, index.query(&queries, &params, None)?);
    assert_eq!(restored.query(&data[..DIM], &params, None)?, index.query(&data[..DIM], &params, None)?);
    Ok(())
}

#[test]
fn test_serialize_is_repeatable() {
    let (_, index) = fixture();
    assert_eq!(whole_blob(&index), whole_blob(&index));
}

#[test]
fn test_slices_reassemble_byte_identical() -> anyhow::Result<()> {
    let (_, index) = fixture();
    let whole = whole_blob(&index);

    for slice_size in [1000, 4096, 10_000, whole.len() - 1, whole.len(), whole.len() * 2] {
        let sliced = index.serialize(&SerializeOptions::sliced(slice_size))?;
        assert!(sliced.iter().all(|b| b.name() == SLICE_META || b.len() <= slice_size));

        let rebuilt = sliced.reassemble_blob(INDEX_BLOB_NAME)?;
        assert_eq!(rebuilt.as_ref(), whole.as_slice(), "slice size {slice_size}");

        let mut assembled = sliced.clone();
        assembled.assemble()?;
        assert_eq!(assembled.get_by_name(INDEX_BLOB_NAME), Some(whole.as_slice()));
    }
    Ok(())
}

#[test]
fn test_load_from_slices() -> anyhow::Result<()> {
    let (data, index) = fixture();
    let sliced = index.serialize(&SerializeOptions::sliced(2048))?;
    assert!(sliced.contains(SLICE_META));
    assert!(!sliced.contains(INDEX_BLOB_NAME));

    let restored = NangIndex::new();
    restored.load(&sliced)?;
    let params = SearchParameters::new(30, 5);
    assert_eq!(restored.query(&data[..4 * DIM], &params, None)?, index.query(&data[..4 * DIM], &params, None)?);
    Ok(())
}

#[test]
fn test_zero_slice_size_rejected() {
    let (_, index) = fixture();
    let err = index.serialize(&SerializeOptions::sliced(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_raw_data_blob_ignored() -> anyhow::Result<()> {
    let (data, index) = fixture();
    let mut set = index.serialize(&SerializeOptions::default())?;
    let raw: Vec<u8> = data.iter().flat_map(|x| x.to_le_bytes()).collect();
    set.append(RAW_DATA_BLOB, raw);

    let restored = NangIndex::new();
    restored.load(&set)?;
    assert_eq!(restored.count()?, 700);
    Ok(())
}

#[test]
fn test_missing_index_blob() {
    let mut set = BinarySet::new();
    set.append(RAW_DATA_BLOB, vec![0; 64]);
    let err = NangIndex::new().load(&set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Deserialization);
}

#[test]
fn test_missing_slice() {
    let (_, index) = fixture();
    let mut sliced = index.serialize(&SerializeOptions::sliced(4096)).unwrap();
    sliced.remove(&format!("{INDEX_BLOB_NAME}_1"));

    let restored = NangIndex::new();
    assert_eq!(restored.load(&sliced).unwrap_err().kind(), ErrorKind::Deserialization);
    assert!(!restored.is_ready());
}

#[test]
fn test_corrupt_blobs_rejected() {
    let (_, index) = fixture();
    let whole = whole_blob(&index);

    let mut cases: Vec<(&str, Vec<u8>)> = Vec::new();

    let mut bad_magic = whole.clone();
    bad_magic[0] ^= 0xFF;
    cases.push(("magic", bad_magic));

    let mut future = whole.clone();
    future[8..12].copy_from_slice(&(VERSION + 1).to_le_bytes());
    cases.push(("version", future));

    cases.push(("truncated", whole[..whole.len() - 3].to_vec()));
    cases.push(("header only", whole[..HEADER_SIZE].to_vec()));
    cases.push(("empty", Vec::new()));

    let mut padded = whole.clone();
    padded.extend_from_slice(&[0; 4]);
    cases.push(("trailing", padded));

    for (what, bytes) in cases {
        let mut set = BinarySet::new();
        set.append(INDEX_BLOB_NAME, bytes);
        let err = index.load(&set).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization, "{what}");
    }

    // Every rejected load left the original graph in place
    assert_eq!(whole_blob(&index), whole);
}
