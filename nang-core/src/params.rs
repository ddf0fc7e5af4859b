//! Build, search and serialize parameters.
//!
//! Build parameters arrive from a host configuration, so every field is
//! optional at this layer. [`BuildParameters::validate`] turns them into a
//! [`BuildConfig`] with every value present, sane and clamped to the row
//! count.

use crate::error::{NangError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Seed used for the refinement RNG when none is configured
pub const DEFAULT_SEED: u64 = 0x4e41_4e47;

/// Raw build parameters as supplied by the caller.
///
/// All fields except `seed` are required; a missing one fails the build with
/// a configuration error naming it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Neighbors kept per node after each refinement round
    #[serde(rename = "K", alias = "k", default)]
    pub k: Option<u32>,

    /// Candidate pool size per node during refinement
    #[serde(rename = "L", alias = "l", default)]
    pub l: Option<u32>,

    /// Refinement rounds
    #[serde(default)]
    pub iter: Option<u32>,

    /// Neighbors sampled per node per round for the local join
    #[serde(rename = "S", alias = "s", default)]
    pub s: Option<u32>,

    /// Hard bound on final out-degree
    #[serde(rename = "R", alias = "r", default)]
    pub r: Option<u32>,

    /// Edges kept per node by diversity pruning
    #[serde(rename = "RANGE", alias = "range", default)]
    pub range: Option<u32>,

    /// Candidate pool examined by diversity pruning
    #[serde(rename = "PL", alias = "pl", default)]
    pub pl: Option<u32>,

    /// Diversity threshold; 1.0 is the relative-neighborhood rule
    #[serde(rename = "B", alias = "b", default)]
    pub b: Option<f32>,

    /// Reverse-edge merge factor relative to `RANGE`
    #[serde(rename = "M", alias = "m", default)]
    pub m: Option<f32>,

    /// Refinement RNG seed, defaults to [`DEFAULT_SEED`]
    #[serde(default)]
    pub seed: Option<u64>,
}

impl BuildParameters {
    /// Fully populated parameters
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        k: u32,
        l: u32,
        iter: u32,
        s: u32,
        r: u32,
        range: u32,
        pl: u32,
        b: f32,
        m: f32,
    ) -> Self {
        Self {
            k: Some(k),
            l: Some(l),
            iter: Some(iter),
            s: Some(s),
            r: Some(r),
            range: Some(range),
            pl: Some(pl),
            b: Some(b),
            m: Some(m),
            seed: None,
        }
    }

    /// Override the refinement seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse parameters from a JSON object such as
    /// `{"K": 200, "L": 220, "iter": 12, ...}`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is malformed. Missing keys
    /// are not an error here; they surface from [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| NangError::config(format!("invalid build parameters: {e}")))
    }

    /// Resolve into a [`BuildConfig`] for `rows` vectors.
    ///
    /// # Clamping
    ///
    /// `K`, `L`, `S`, `R`, `RANGE` and `PL` larger than `rows - 1` are
    /// clamped to `rows - 1`, then `L >= K`, `RANGE <= R` and `PL >= RANGE`
    /// are enforced. Each adjustment is logged; none fails the build.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a required field is missing, an
    /// integer bound other than `iter` is zero, or `B`/`M` is not a finite
    /// positive number.
    pub fn validate(&self, rows: usize) -> Result<BuildConfig> {
        let k = required(self.k, "K")?;
        let l = required(self.l, "L")?;
        let iter = required(self.iter, "iter")?;
        let s = required(self.s, "S")?;
        let r = required(self.r, "R")?;
        let range = required(self.range, "RANGE")?;
        let pl = required(self.pl, "PL")?;
        let b = required(self.b, "B")?;
        let m = required(self.m, "M")?;

        for (name, value) in [("K", k), ("L", l), ("S", s), ("R", r), ("RANGE", range), ("PL", pl)]
        {
            if value == 0 {
                return Err(NangError::config(format!("build parameter `{name}` must be > 0")));
            }
        }
        for (name, value) in [("B", b), ("M", m)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(NangError::config(format!(
                    "build parameter `{name}` must be a positive number, got {value}"
                )));
            }
        }

        let ceiling = rows.saturating_sub(1);
        let k = clamp_to(k, ceiling, "K");
        let l = clamp_to(l, ceiling, "L").max(k);
        let s = clamp_to(s, ceiling, "S");
        let r = clamp_to(r, ceiling, "R");
        let range = clamp_to(range, ceiling, "RANGE").min(r);
        let pl = clamp_to(pl, ceiling, "PL").max(range);

        Ok(BuildConfig {
            k,
            l,
            iter: iter as usize,
            s,
            r,
            range,
            pl,
            b,
            m,
            seed: self.seed.unwrap_or(DEFAULT_SEED),
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| NangError::config(format!("missing required build parameter `{name}`")))
}

fn clamp_to(value: u32, ceiling: usize, name: &str) -> usize {
    let value = value as usize;
    if value > ceiling {
        warn!(parameter = name, requested = value, clamped = ceiling, "build parameter exceeds rows - 1");
        ceiling
    } else {
        value
    }
}

/// Validated build configuration, every bound already clamped to the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildConfig {
    /// Neighbors kept per node after refinement
    pub k: usize,
    /// Refinement pool size (`>= k`)
    pub l: usize,
    /// Maximum refinement rounds
    pub iter: usize,
    /// Local-join sample size
    pub s: usize,
    /// Final out-degree bound
    pub r: usize,
    /// Diversity-pruned forward edges (`<= r`)
    pub range: usize,
    /// Pruning candidate pool (`>= range`)
    pub pl: usize,
    /// Diversity threshold
    pub b: f32,
    /// Reverse-edge merge factor
    pub m: f32,
    /// Refinement RNG seed
    pub seed: u64,
}

impl BuildConfig {
    /// Degree a node may reach while reverse edges are merged in.
    ///
    /// `ceil(M * RANGE)`, never below `RANGE` and never above `R`.
    #[must_use]
    pub fn merge_cap(&self) -> usize {
        let scaled = (self.m * self.range as f32).ceil() as usize;
        scaled.max(self.range).min(self.r)
    }
}

/// Per-query search parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameters {
    /// Frontier size; values below `topk` are raised to `topk`
    #[serde(rename = "search_L", alias = "l_search")]
    pub l_search: i64,

    /// Results per query
    #[serde(rename = "k", alias = "topk")]
    pub topk: i64,
}

impl SearchParameters {
    /// Create search parameters
    #[must_use]
    pub const fn new(l_search: i64, topk: i64) -> Self {
        Self { l_search, topk }
    }

    /// Check the parameters and return `(ef, topk)` as sizes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `topk <= 0` or `l_search < 1`.
    pub fn resolve(&self) -> Result<(usize, usize)> {
        if self.topk <= 0 {
            return Err(NangError::config(format!("topk must be > 0, got {}", self.topk)));
        }
        if self.l_search < 1 {
            return Err(NangError::config(format!(
                "search_L must be >= 1, got {}",
                self.l_search
            )));
        }
        let topk = usize::try_from(self.topk)
            .map_err(|_| NangError::config(format!("topk {} too large", self.topk)))?;
        let l_search = usize::try_from(self.l_search)
            .map_err(|_| NangError::config(format!("search_L {} too large", self.l_search)))?;
        Ok((l_search.max(topk), topk))
    }
}

/// Options for [`crate::NangIndex::serialize`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializeOptions {
    /// Maximum size of one slice in bytes; `None` keeps a single blob
    pub slice_size: Option<usize>,
}

impl SerializeOptions {
    /// Slice blobs larger than `bytes`
    #[must_use]
    pub const fn sliced(bytes: usize) -> Self {
        Self { slice_size: Some(bytes) }
    }

    /// Slice size expressed in megabytes, as host configs usually carry it
    #[must_use]
    pub const fn from_megabytes(megabytes: usize) -> Self {
        Self::sliced(megabytes * 1024 * 1024)
    }
}
