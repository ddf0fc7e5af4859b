//! C bindings for the NANG vector index
//!
//! This crate wraps `nang-core` in a C ABI for hosts that drive the index
//! from C or C++. All functions are panic-safe and report failures through
//! a return code plus thread-local error state.
//!
//! # Safety Guarantees
//!
//! - No panic may cross the FFI boundary (enforced by `ffi_guard`)
//! - Strict UTF-8 validation for all string inputs
//! - Null pointer checks on all pointer arguments
//! - ABI stability via `#[repr(C)]` and `extern "C"`
//!
//! # Error Handling
//!
//! Functions returning `int` return `NANG_OK` (0) or one of the `NANG_ERR_*`
//! codes. Functions returning a pointer return NULL on failure; functions
//! returning a count return -1. In every case the code and message are also
//! kept per thread:
//! - `nang_last_error_code()`
//! - `nang_last_error_message()`
//!
//! # Thread Safety
//!
//! An index handle may be shared freely between threads. Queries run
//! concurrently with each other and with `nang_build_all`/`nang_load`, which
//! swap in the new graph atomically. Binary set handles are not thread-safe.

use libc::{c_char, c_float, c_int, size_t};
use nang_core::{
    BinarySet, BuildParameters, ErrorKind, ExclusionBitset, NangError, SearchParameters,
    SerializeOptions, VectorSet,
};
use std::cell::{Cell, RefCell};
use std::ffi::{CStr, CString};
use std::ptr;
use std::slice;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Success
pub const NANG_OK: c_int = 0;
/// Index used before `nang_build_all` or `nang_load`
pub const NANG_ERR_UNINITIALIZED: c_int = 1;
/// Operation not supported by this index type
pub const NANG_ERR_UNSUPPORTED: c_int = 2;
/// Missing or invalid parameter, including NULL arguments
pub const NANG_ERR_CONFIGURATION: c_int = 3;
/// Corrupt, truncated or incomplete binary set
pub const NANG_ERR_DESERIALIZATION: c_int = 4;
/// Zero rows or zero dimensions
pub const NANG_ERR_DEGENERATE_INPUT: c_int = 5;
/// Vector data does not match the index dimension
pub const NANG_ERR_DIMENSION_MISMATCH: c_int = 6;
/// Filesystem failure
pub const NANG_ERR_IO: c_int = 7;
/// Panic caught at the boundary or other internal failure
pub const NANG_ERR_INTERNAL: c_int = 99;

/// Environment variable holding the `nang_init_logging` filter directives
const LOG_ENV: &str = "NANG_LOG";

/// Internal state holder (not exposed to C)
struct NangIndexState {
    inner: nang_core::NangIndex,
}

/// Internal binary set state: the set plus NUL-terminated copies of its
/// blob names, kept in the same order as the blobs
struct NangBinarySetState {
    inner: BinarySet,
    names: Vec<CString>,
}

impl NangBinarySetState {
    fn new(inner: BinarySet) -> Self {
        let mut state = Self { inner, names: Vec::new() };
        state.refresh_names();
        state
    }

    fn refresh_names(&mut self) {
        self.names = self
            .inner
            .iter()
            .map(|blob| CString::new(blob.name().replace('\0', "\\0")).unwrap_or_default())
            .collect();
    }
}

/// Opaque handle to a NANG index (C-compatible)
///
/// C code only sees pointers to this type; the real data lives in
/// `NangIndexState`.
#[repr(C)]
pub struct NangIndex {
    _private: [u8; 0],
}

/// Opaque handle to a set of named blobs produced by `nang_serialize`
#[repr(C)]
pub struct NangBinarySet {
    _private: [u8; 0],
}

/// Build parameters as passed from C.
///
/// Every field is required. `seed` is used only when `has_seed` is true;
/// otherwise the library default seed applies.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NangBuildParams {
    /// Neighbors kept per node after each refinement round
    pub k: u32,
    /// Candidate pool size per node during refinement
    pub l: u32,
    /// Refinement rounds
    pub iter: u32,
    /// Neighbors sampled per node per round
    pub s: u32,
    /// Hard bound on final out-degree
    pub r: u32,
    /// Edges kept per node by diversity pruning
    pub range: u32,
    /// Candidate pool examined by diversity pruning
    pub pl: u32,
    /// Diversity threshold
    pub b: c_float,
    /// Reverse-edge merge factor
    pub m: c_float,
    /// Refinement RNG seed
    pub seed: u64,
    /// Whether `seed` overrides the default
    pub has_seed: bool,
}

impl From<&NangBuildParams> for BuildParameters {
    fn from(p: &NangBuildParams) -> Self {
        let params = BuildParameters::new(p.k, p.l, p.iter, p.s, p.r, p.range, p.pl, p.b, p.m);
        if p.has_seed { params.with_seed(p.seed) } else { params }
    }
}

thread_local! {
    /// Last error message for this thread
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };

    /// Last error code for this thread, `NANG_OK` after a successful call
    static LAST_ERROR_CODE: Cell<c_int> = const { Cell::new(NANG_OK) };
}

/// Map an error kind onto its stable C code
fn error_code(kind: ErrorKind) -> c_int {
    match kind {
        ErrorKind::UninitializedIndex => NANG_ERR_UNINITIALIZED,
        ErrorKind::UnsupportedOperation => NANG_ERR_UNSUPPORTED,
        ErrorKind::Configuration => NANG_ERR_CONFIGURATION,
        ErrorKind::Deserialization => NANG_ERR_DESERIALIZATION,
        ErrorKind::DegenerateInput => NANG_ERR_DEGENERATE_INPUT,
        ErrorKind::DimensionMismatch => NANG_ERR_DIMENSION_MISMATCH,
        ErrorKind::Io => NANG_ERR_IO,
    }
}

/// Set the last error code and message for the current thread
///
/// Interior NULs in the message are escaped rather than allowed to fail the
/// conversion.
fn set_last_error(code: c_int, err: impl std::fmt::Display) {
    LAST_ERROR.with(|cell| {
        let safe_msg = err.to_string().replace('\0', "\\0");
        *cell.borrow_mut() = Some(CString::new(safe_msg).unwrap_or_default());
    });
    LAST_ERROR_CODE.with(|cell| cell.set(code));
}

/// Record a core error and return its code
fn record(err: &NangError) -> c_int {
    let code = error_code(err.kind());
    set_last_error(code, err);
    code
}

/// Record an invalid argument and return its code
fn invalid_argument(msg: &str) -> c_int {
    set_last_error(NANG_ERR_CONFIGURATION, msg);
    NANG_ERR_CONFIGURATION
}

/// Clear the last error for the current thread
fn clear_last_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
    LAST_ERROR_CODE.with(|cell| cell.set(NANG_OK));
}

/// Convert a core result into a return code, recording any error
fn status(result: nang_core::Result<()>) -> c_int {
    match result {
        Ok(()) => {
            clear_last_error();
            NANG_OK
        }
        Err(e) => record(&e),
    }
}

/// Panic barrier that catches all panics at the FFI boundary
///
/// No Rust panic may unwind into C. A caught panic is reported with
/// `NANG_ERR_INTERNAL` and the call returns its failure sentinel.
///
/// `AssertUnwindSafe` is permitted here because the operation is abandoned
/// on panic and no state shared across the boundary is left half-written:
/// the index only ever swaps in fully built graphs.
fn ffi_guard<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(e) => {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                format!("Panic: {s}")
            } else if let Some(s) = e.downcast_ref::<String>() {
                format!("Panic: {s}")
            } else {
                "Unknown panic".to_string()
            };
            warn!(panic = %msg, "panic caught at FFI boundary");
            set_last_error(NANG_ERR_INTERNAL, msg);
            None
        }
    }
}

/// Borrow the index behind a handle
///
/// # Safety
///
/// `ptr` must be NULL or a live pointer from `nang_index_new()`.
unsafe fn index_ref<'a>(ptr: *const NangIndex) -> Option<&'a nang_core::NangIndex> {
    // SAFETY: Caller guarantees ptr is NULL or valid
    unsafe { ptr.cast::<NangIndexState>().as_ref() }.map(|s| &s.inner)
}

/// Borrow the binary set behind a handle
///
/// # Safety
///
/// `ptr` must be NULL or a live binary set pointer from this library.
unsafe fn set_ref<'a>(ptr: *const NangBinarySet) -> Option<&'a NangBinarySetState> {
    // SAFETY: Caller guarantees ptr is NULL or valid
    unsafe { ptr.cast::<NangBinarySetState>().as_ref() }
}

/// Read a NUL-terminated UTF-8 string argument
///
/// # Safety
///
/// `s` must be NULL or a valid NUL-terminated string.
unsafe fn utf8_arg<'a>(s: *const c_char, what: &str) -> Result<&'a str, c_int> {
    if s.is_null() {
        return Err(invalid_argument(&format!("{what} cannot be NULL")));
    }
    // SAFETY: Caller guarantees s is a valid C string
    let c_str = unsafe { CStr::from_ptr(s) };
    // Strict: never to_string_lossy()
    c_str.to_str().map_err(|_| invalid_argument(&format!("{what} must be valid UTF-8")))
}

/// Borrow `rows * dim` floats, rejecting overflow and NULL data
///
/// # Safety
///
/// `data` must point to `rows * dim` valid floats when that product is
/// non-zero.
unsafe fn float_rows<'a>(data: *const c_float, rows: size_t, dim: size_t) -> Result<&'a [f32], c_int> {
    let Some(len) = rows.checked_mul(dim) else {
        return Err(invalid_argument("rows * dim overflows"));
    };
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(invalid_argument("Null data pointer"));
    }
    // SAFETY: Caller guarantees data points to rows * dim floats
    Ok(unsafe { slice::from_raw_parts(data, len) })
}

//
// === LIFECYCLE MANAGEMENT ===
//

/// Create an empty index
///
/// The index must be built with `nang_build_all()` or loaded with
/// `nang_load()` before it can answer queries.
///
/// # Returns
///
/// - Non-NULL pointer on success
/// - NULL on failure (check `nang_last_error_message()`)
///
/// # Example (C)
///
/// ```c
/// NangIndex* index = nang_index_new();
/// NangBuildParams params = {200, 220, 12, 25, 200, 40, 50, 1.0f, 1.0f, 0, false};
/// if (nang_build_all(index, data, rows, 128, &params) != NANG_OK) {
///     fprintf(stderr, "Error: %s\n", nang_last_error_message());
/// }
/// ```
#[unsafe(no_mangle)]
pub extern "C" fn nang_index_new() -> *mut NangIndex {
    ffi_guard(|| {
        clear_last_error();
        let state = Box::new(NangIndexState { inner: nang_core::NangIndex::new() });
        Box::into_raw(state).cast::<NangIndex>()
    })
    .unwrap_or(ptr::null_mut())
}

/// Free an index and release its graph
///
/// Queries still running on other threads keep their own reference to the
/// graph; the handle itself must not be used by anyone after this call.
///
/// # Safety
///
/// - `ptr` must be NULL or a valid pointer from `nang_index_new()`
/// - After this call, `ptr` is invalid and must not be used
/// - Safe to call with NULL (no-op)
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_index_free(ptr: *mut NangIndex) {
    if !ptr.is_null() {
        ffi_guard(|| {
            // SAFETY: Caller guarantees ptr came from nang_index_new
            let _ = unsafe { Box::from_raw(ptr.cast::<NangIndexState>()) };
        });
    }
}

//
// === BUILD ===
//

/// Build the graph over `rows` vectors of `dim` floats each
///
/// Row `i` of `data` gets id `i`. On failure the previously built or loaded
/// graph (if any) stays in place.
///
/// # Returns
///
/// - `NANG_OK` on success
/// - `NANG_ERR_CONFIGURATION` for NULL arguments or invalid parameters
/// - `NANG_ERR_DEGENERATE_INPUT` for zero rows or zero dimensions
///
/// # Safety
///
/// - `ptr` must be a valid index pointer
/// - `data` must point to `rows * dim` valid floats
/// - `params` must point to a valid `NangBuildParams`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_build_all(
    ptr: *mut NangIndex,
    data: *const c_float,
    rows: size_t,
    dim: size_t,
    params: *const NangBuildParams,
) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        let Some(index) = (unsafe { index_ref(ptr) }) else {
            return invalid_argument("Null index pointer");
        };
        // SAFETY: Caller guarantees params is NULL or valid
        let Some(params) = (unsafe { params.as_ref() }) else {
            return invalid_argument("Null params pointer");
        };
        // SAFETY: Caller guarantees data holds rows * dim floats
        let data = match unsafe { float_rows(data, rows, dim) } {
            Ok(data) => data,
            Err(code) => return code,
        };

        let vectors = match VectorSet::new(data, dim) {
            Ok(v) => v,
            Err(e) => return record(&e),
        };
        status(index.build_all(vectors, &BuildParameters::from(params)))
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

/// Training is not supported by NANG
///
/// Only the index handle is checked; the data and parameters are ignored.
///
/// # Returns
///
/// `NANG_ERR_UNSUPPORTED` for any non-NULL index
///
/// # Safety
///
/// - `ptr` must be NULL or a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_train(
    ptr: *mut NangIndex,
    _data: *const c_float,
    _rows: size_t,
    _dim: size_t,
    _params: *const NangBuildParams,
) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        if unsafe { index_ref(ptr) }.is_none() {
            return invalid_argument("Null index pointer");
        }
        record(&NangError::UnsupportedOperation("NANG does not need training; call nang_build_all".into()))
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

/// Incremental insertion is not supported by NANG
///
/// # Returns
///
/// `NANG_ERR_UNSUPPORTED` for any non-NULL index
///
/// # Safety
///
/// - `ptr` must be NULL or a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_add_without_ids(
    ptr: *mut NangIndex,
    _data: *const c_float,
    _rows: size_t,
    _dim: size_t,
    _params: *const NangBuildParams,
) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        if unsafe { index_ref(ptr) }.is_none() {
            return invalid_argument("Null index pointer");
        }
        record(&NangError::UnsupportedOperation("NANG is build-once; rebuild with nang_build_all".into()))
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

//
// === QUERY ===
//

/// Answer `nq` queries of `dim` floats each
///
/// # Arguments
///
/// - `data`: `nq * dim` query floats, row-major
/// - `l_search`: Frontier size; raised to `topk` when smaller
/// - `topk`: Results per query (must be > 0)
/// - `bitset`: Optional exclusion bitset (LSB-first, NULL for none)
/// - `bitset_len_bits`: Number of ids the bitset covers
/// - `out_ids`, `out_dists`: Buffers of `nq * topk` elements each
///
/// # Output Format
///
/// Row `q` occupies `out_ids[q * topk .. (q + 1) * topk]`, ascending by
/// squared L2 distance. Rows with fewer than `topk` reachable results are
/// padded with id -1 and distance `FLT_MAX`.
///
/// # Returns
///
/// - `NANG_OK` on success
/// - `NANG_ERR_UNINITIALIZED` before a build or load
/// - `NANG_ERR_DIMENSION_MISMATCH` if `dim` differs from the index
/// - `NANG_ERR_CONFIGURATION` for invalid `l_search`/`topk` or NULL buffers
///
/// # Thread Safety
///
/// **MULTI-READER**: any number of threads may query the same index, also
/// while another thread rebuilds or reloads it.
///
/// # Safety
///
/// - `ptr` must be a valid index pointer
/// - `data` must point to `nq * dim` valid floats
/// - `bitset` must be NULL or point to `ceil(bitset_len_bits / 8)` bytes
/// - `out_ids` and `out_dists` must each have space for `nq * topk` values
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn nang_query(
    ptr: *const NangIndex,
    data: *const c_float,
    nq: size_t,
    dim: size_t,
    l_search: i64,
    topk: i64,
    bitset: *const u8,
    bitset_len_bits: size_t,
    out_ids: *mut i64,
    out_dists: *mut c_float,
) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        let Some(index) = (unsafe { index_ref(ptr) }) else {
            return invalid_argument("Null index pointer");
        };
        if out_ids.is_null() || out_dists.is_null() {
            return invalid_argument("Null output buffer pointers");
        }

        // SAFETY: Caller guarantees data holds nq * dim floats
        let queries = match unsafe { float_rows(data, nq, dim) } {
            Ok(q) => q,
            Err(code) => return code,
        };

        let exclusion = if bitset.is_null() {
            None
        } else {
            // SAFETY: Caller guarantees bitset covers bitset_len_bits bits
            let bytes = unsafe { slice::from_raw_parts(bitset, bitset_len_bits.div_ceil(8)) };
            match ExclusionBitset::from_bytes(bytes, bitset_len_bits) {
                Ok(b) => Some(b),
                Err(e) => return record(&e),
            }
        };

        // Dimension check and search share one graph snapshot
        let params = SearchParameters::new(l_search, topk);
        let results = match index.query_with_dim(queries, dim, &params, exclusion.as_ref()) {
            Ok(r) => r,
            Err(e) => return record(&e),
        };
        if results.is_empty() {
            clear_last_error();
            return NANG_OK;
        }

        // topk > 0 once the query succeeded
        let Some(capacity) = usize::try_from(topk).ok().and_then(|k| nq.checked_mul(k)) else {
            return invalid_argument("nq * topk overflows");
        };
        // SAFETY: Caller guarantees both buffers hold nq * topk elements
        let (ids, dists) = unsafe {
            (slice::from_raw_parts_mut(out_ids, capacity), slice::from_raw_parts_mut(out_dists, capacity))
        };
        let hits = results.iter().flat_map(|row| row.as_slice());
        for ((id, dist), hit) in ids.iter_mut().zip(dists.iter_mut()).zip(hits) {
            *id = hit.id;
            *dist = hit.distance;
        }

        clear_last_error();
        NANG_OK
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

//
// === SERIALIZATION ===
//

/// Serialize the current graph into a new binary set
///
/// # Arguments
///
/// - `slice_size_bytes`: Split the index blob into slices of at most this
///   many bytes; 0 keeps a single blob
///
/// # Returns
///
/// - Non-NULL binary set on success; free with `nang_binary_set_free()`
/// - NULL on failure (check `nang_last_error_code()`)
///
/// # Safety
///
/// - `ptr` must be a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_serialize(
    ptr: *const NangIndex,
    slice_size_bytes: size_t,
) -> *mut NangBinarySet {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        let Some(index) = (unsafe { index_ref(ptr) }) else {
            invalid_argument("Null index pointer");
            return ptr::null_mut();
        };

        let options = if slice_size_bytes == 0 {
            SerializeOptions::default()
        } else {
            SerializeOptions::sliced(slice_size_bytes)
        };
        match index.serialize(&options) {
            Ok(set) => {
                clear_last_error();
                Box::into_raw(Box::new(NangBinarySetState::new(set))).cast::<NangBinarySet>()
            }
            Err(e) => {
                record(&e);
                ptr::null_mut()
            }
        }
    })
    .unwrap_or(ptr::null_mut())
}

/// Replace the current graph with one decoded from `set`
///
/// Sliced sets are reassembled first. On failure the previous graph (if
/// any) stays in place.
///
/// # Returns
///
/// - `NANG_OK` on success
/// - `NANG_ERR_DESERIALIZATION` for a missing, incomplete or corrupt blob
///
/// # Safety
///
/// - `ptr` must be a valid index pointer
/// - `set` must be a valid binary set pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_load(ptr: *mut NangIndex, set: *const NangBinarySet) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        let Some(index) = (unsafe { index_ref(ptr) }) else {
            return invalid_argument("Null index pointer");
        };
        // SAFETY: Caller guarantees set is NULL or valid
        let Some(set) = (unsafe { set_ref(set) }) else {
            return invalid_argument("Null binary set pointer");
        };
        status(index.load(&set.inner))
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

//
// === BINARY SETS ===
//

/// Create an empty binary set, e.g. to fill with blobs read by the host
#[unsafe(no_mangle)]
pub extern "C" fn nang_binary_set_new() -> *mut NangBinarySet {
    ffi_guard(|| {
        clear_last_error();
        Box::into_raw(Box::new(NangBinarySetState::new(BinarySet::new()))).cast::<NangBinarySet>()
    })
    .unwrap_or(ptr::null_mut())
}

/// Copy `len` bytes into the set under `name`, replacing a blob of the same
/// name
///
/// # Safety
///
/// - `set` must be a valid binary set pointer with no concurrent users
/// - `name` must be a NUL-terminated UTF-8 string
/// - `data` must point to `len` bytes (may be NULL when `len` is 0)
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_append(
    set: *mut NangBinarySet,
    name: *const c_char,
    data: *const u8,
    len: size_t,
) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees set is NULL or valid and unshared
        let Some(state) = (unsafe { set.cast::<NangBinarySetState>().as_mut() }) else {
            return invalid_argument("Null binary set pointer");
        };
        // SAFETY: Caller guarantees name is NULL or a valid C string
        let name = match unsafe { utf8_arg(name, "Blob name") } {
            Ok(n) => n,
            Err(code) => return code,
        };
        if name.is_empty() {
            return invalid_argument("Blob name cannot be empty");
        }
        let bytes = if len == 0 {
            Vec::new()
        } else if data.is_null() {
            return invalid_argument("Null data pointer");
        } else {
            // SAFETY: Caller guarantees data points to len bytes
            unsafe { slice::from_raw_parts(data, len) }.to_vec()
        };

        state.inner.append(name, bytes);
        state.refresh_names();
        clear_last_error();
        NANG_OK
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

/// Number of blobs in the set, or 0 if `set` is NULL
///
/// # Safety
///
/// - `set` must be NULL or a valid binary set pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_len(set: *const NangBinarySet) -> size_t {
    ffi_guard(|| {
        // SAFETY: Caller guarantees set is NULL or valid
        unsafe { set_ref(set) }.map_or(0, |s| s.inner.len())
    })
    .unwrap_or(0)
}

/// Name of blob `i`, or NULL if out of range
///
/// The pointer stays valid until the set is modified or freed. **Do NOT**
/// free it.
///
/// # Safety
///
/// - `set` must be NULL or a valid binary set pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_name(set: *const NangBinarySet, i: size_t) -> *const c_char {
    ffi_guard(|| {
        // SAFETY: Caller guarantees set is NULL or valid
        unsafe { set_ref(set) }
            .and_then(|s| s.names.get(i))
            .map_or(ptr::null(), |name| name.as_ptr())
    })
    .unwrap_or(ptr::null())
}

/// Bytes of blob `i`; its length is written to `out_len`
///
/// Returns NULL (and writes 0) if `i` is out of range. The pointer stays
/// valid until the set is modified or freed.
///
/// # Safety
///
/// - `set` must be NULL or a valid binary set pointer
/// - `out_len` must be NULL or point to writable storage
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_data(
    set: *const NangBinarySet,
    i: size_t,
    out_len: *mut size_t,
) -> *const u8 {
    ffi_guard(|| {
        // SAFETY: Caller guarantees set is NULL or valid
        let blob = unsafe { set_ref(set) }.and_then(|s| s.inner.iter().nth(i));
        let (data, len) = blob.map_or((ptr::null(), 0), |b| (b.data().as_ptr(), b.len()));
        // SAFETY: Caller guarantees out_len is NULL or writable
        if let Some(out) = unsafe { out_len.as_mut() } {
            *out = len;
        }
        data
    })
    .unwrap_or(ptr::null())
}

/// Write every blob of the set into directory `path`
///
/// # Safety
///
/// - `set` must be a valid binary set pointer
/// - `path` must be a NUL-terminated UTF-8 string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_write_dir(
    set: *const NangBinarySet,
    path: *const c_char,
) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees set is NULL or valid
        let Some(state) = (unsafe { set_ref(set) }) else {
            return invalid_argument("Null binary set pointer");
        };
        // SAFETY: Caller guarantees path is NULL or a valid C string
        let path = match unsafe { utf8_arg(path, "Path") } {
            Ok(p) => p,
            Err(code) => return code,
        };
        status(state.inner.write_to_dir(path))
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

/// Read a binary set previously written with `nang_binary_set_write_dir()`
///
/// # Returns
///
/// - Non-NULL binary set on success
/// - NULL on failure (check `nang_last_error_code()`)
///
/// # Safety
///
/// - `path` must be a NUL-terminated UTF-8 string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_read_dir(path: *const c_char) -> *mut NangBinarySet {
    ffi_guard(|| {
        // SAFETY: Caller guarantees path is NULL or a valid C string
        let Ok(path) = (unsafe { utf8_arg(path, "Path") }) else {
            return ptr::null_mut();
        };
        match BinarySet::read_from_dir(path) {
            Ok(set) => {
                clear_last_error();
                Box::into_raw(Box::new(NangBinarySetState::new(set))).cast::<NangBinarySet>()
            }
            Err(e) => {
                record(&e);
                ptr::null_mut()
            }
        }
    })
    .unwrap_or(ptr::null_mut())
}

/// Free a binary set
///
/// # Safety
///
/// - `set` must be NULL or a valid binary set pointer
/// - After this call, `set` and every name/data pointer obtained from it
///   are invalid
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_binary_set_free(set: *mut NangBinarySet) {
    if !set.is_null() {
        ffi_guard(|| {
            // SAFETY: Caller guarantees set came from this library
            let _ = unsafe { Box::from_raw(set.cast::<NangBinarySetState>()) };
        });
    }
}

//
// === INTROSPECTION ===
//

/// Number of indexed vectors, or -1 on error (e.g. before a build)
///
/// # Safety
///
/// - `ptr` must be NULL or a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_count(ptr: *const NangIndex) -> i64 {
    // SAFETY: Caller guarantees ptr is NULL or valid
    unsafe { introspect(ptr, nang_core::NangIndex::count) }
}

/// Vector dimension, or -1 on error
///
/// # Safety
///
/// - `ptr` must be NULL or a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_dim(ptr: *const NangIndex) -> i64 {
    // SAFETY: Caller guarantees ptr is NULL or valid
    unsafe { introspect(ptr, nang_core::NangIndex::dim) }
}

/// Approximate memory held by the graph in bytes, or -1 on error
///
/// # Safety
///
/// - `ptr` must be NULL or a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_size_estimate(ptr: *const NangIndex) -> i64 {
    // SAFETY: Caller guarantees ptr is NULL or valid
    unsafe { introspect(ptr, nang_core::NangIndex::size_estimate) }
}

/// 1 once the index has been built or loaded, 0 otherwise or if `ptr` is
/// NULL
///
/// # Safety
///
/// - `ptr` must be NULL or a valid index pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nang_is_ready(ptr: *const NangIndex) -> c_int {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        let ready = unsafe { index_ref(ptr) }.is_some_and(nang_core::NangIndex::is_ready);
        c_int::from(ready)
    })
    .unwrap_or(0)
}

/// Shared body of the size-returning accessors
///
/// # Safety
///
/// `ptr` must be NULL or a valid index pointer.
unsafe fn introspect(
    ptr: *const NangIndex,
    get: fn(&nang_core::NangIndex) -> nang_core::Result<usize>,
) -> i64 {
    ffi_guard(|| {
        // SAFETY: Caller guarantees ptr is NULL or valid
        let Some(index) = (unsafe { index_ref(ptr) }) else {
            invalid_argument("Null index pointer");
            return -1;
        };
        match get(index) {
            Ok(value) => {
                clear_last_error();
                i64::try_from(value).unwrap_or(i64::MAX)
            }
            Err(e) => {
                record(&e);
                -1
            }
        }
    })
    .unwrap_or(-1)
}

//
// === ERROR HANDLING ===
//

/// Get the last error message for the current thread
///
/// # Returns
///
/// - Pointer to NUL-terminated error string
/// - NULL if the last call succeeded
///
/// # Lifetime
///
/// The returned pointer is valid until the next FFI call on this thread.
/// **Do NOT** free the returned pointer.
#[unsafe(no_mangle)]
pub extern "C" fn nang_last_error_message() -> *const c_char {
    LAST_ERROR.with(|cell| cell.borrow().as_ref().map_or(ptr::null(), |s| s.as_ptr()))
}

/// Get the last error code for the current thread (`NANG_OK` after a
/// successful call)
#[unsafe(no_mangle)]
pub extern "C" fn nang_last_error_code() -> c_int {
    LAST_ERROR_CODE.with(Cell::get)
}

//
// === LOGGING ===
//

/// Install a process-wide log subscriber writing to stderr
///
/// The filter comes from the `NANG_LOG` environment variable using
/// `tracing-subscriber` directive syntax (e.g. `nang_core=debug`) and
/// defaults to `info`.
///
/// # Returns
///
/// - `NANG_OK` if the subscriber was installed
/// - `NANG_ERR_INTERNAL` if the process already has a global subscriber
#[unsafe(no_mangle)]
pub extern "C" fn nang_init_logging() -> c_int {
    ffi_guard(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        match tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
        {
            Ok(()) => {
                info!(version = env!("CARGO_PKG_VERSION"), "nang logging initialized");
                clear_last_error();
                NANG_OK
            }
            Err(e) => {
                set_last_error(NANG_ERR_INTERNAL, format!("logging already initialized: {e}"));
                NANG_ERR_INTERNAL
            }
        }
    })
    .unwrap_or(NANG_ERR_INTERNAL)
}

//
// === VERSIONING ===
//

/// Get the library version
///
/// The returned pointer is valid for the lifetime of the program.
/// **Do NOT** free the returned pointer.
#[unsafe(no_mangle)]
pub extern "C" fn nang_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

    VERSION.as_ptr().cast::<c_char>()
}

//
// === TESTS ===
//
