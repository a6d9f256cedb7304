// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Type Definitions

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3, Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{check_axis, PostError, Result};
use crate::time::{is_strictly_increasing, Stride};

/// Suffix of stella's netCDF output next to each input file.
pub const ARCHIVE_SUFFIX: &str = ".out.nc";

/// Extension of the reduced-distribution cache files.
pub const CACHE_EXTENSION: &str = "distribution3D";

/// Extension of stella input files.
pub const INPUT_EXTENSION: &str = "in";

// ─── SimulationInput ────────────────────────────────────────────────────────

/// One stella run, identified by its input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationInput {
    pub input_file: PathBuf,
    pub archive_file: PathBuf,
    pub cache_file: PathBuf,
}

impl SimulationInput {
    /// Derive the archive (`<stem><archive_suffix>`) and cache
    /// (`<stem>.dt<dt>.distribution3D`) paths that sit next to `input_file`.
    pub fn new(input_file: &Path, archive_suffix: &str, stride: Stride) -> Self {
        let stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            input_file: input_file.to_path_buf(),
            archive_file: input_file.with_file_name(format!("{stem}{archive_suffix}")),
            cache_file: input_file
                .with_file_name(format!("{stem}.dt{stride}.{CACHE_EXTENSION}")),
        }
    }

    /// `<parent>/<file>` of the cache, used in status lines.
    pub fn cache_label(&self) -> String {
        short_label(&self.cache_file)
    }
}

pub(crate) fn short_label(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().and_then(Path::file_name) {
        Some(parent) => format!("{}/{}", parent.to_string_lossy(), file),
        None => file,
    }
}

// ─── Velocity Distribution ──────────────────────────────────────────────────

/// Distribution data read from one output archive, already subsampled.
#[derive(Debug, Clone)]
pub struct VelocityDistributionSlice {
    /// g(t, species, mu, vpa)
    pub g_vs_tsmuvpa: Array4<f64>,
    /// g(t, species, vpa, z)
    pub g_vs_tsvpaz: Array4<f64>,
    pub time: Array1<f64>,
}

// ─── GeometryWeights ────────────────────────────────────────────────────────

/// Velocity-space and field-line integration weights of one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryWeights {
    /// mu integration weights, indexed [z, mu]
    pub mu_weights: Array2<f64>,
    /// vpa integration weights, indexed [vpa]
    pub vpa_weights: Array1<f64>,
    /// dl/B along the field line, indexed [z]
    pub dl_over_b: Array1<f64>,
}

impl GeometryWeights {
    pub fn nz(&self) -> usize {
        self.dl_over_b.len()
    }

    pub fn nmu(&self) -> usize {
        self.mu_weights.ncols()
    }

    pub fn nvpa(&self) -> usize {
        self.vpa_weights.len()
    }
}

// ─── ReducedDistribution3D ──────────────────────────────────────────────────

/// The cached product: three marginals of g sharing one time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedDistribution3D {
    pub time: Array1<f64>,
    /// g(t, species, z)
    pub g_vs_tsz: Array3<f64>,
    /// g(t, species, mu)
    pub g_vs_tsmu: Array3<f64>,
    /// g(t, species, vpa)
    pub g_vs_tsvpa: Array3<f64>,
}

impl ReducedDistribution3D {
    pub fn new(
        time: Array1<f64>,
        g_vs_tsz: Array3<f64>,
        g_vs_tsmu: Array3<f64>,
        g_vs_tsvpa: Array3<f64>,
    ) -> Result<Self> {
        let data = Self {
            time,
            g_vs_tsz,
            g_vs_tsmu,
            g_vs_tsvpa,
        };
        data.validate()?;
        Ok(data)
    }

    /// All arrays share the leading time length and the species axis, and
    /// time is strictly increasing.
    pub fn validate(&self) -> Result<()> {
        let nt = self.time.len();
        check_axis("time", nt, self.g_vs_tsz.len_of(Axis(0)))?;
        check_axis("time", nt, self.g_vs_tsmu.len_of(Axis(0)))?;
        check_axis("time", nt, self.g_vs_tsvpa.len_of(Axis(0)))?;

        let ns = self.species();
        check_axis("species", ns, self.g_vs_tsmu.len_of(Axis(1)))?;
        check_axis("species", ns, self.g_vs_tsvpa.len_of(Axis(1)))?;

        if !is_strictly_increasing(self.time.view()) {
            return Err(PostError::CorruptFormat(
                "time axis is not strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.time.len().checked_sub(1).map(|i| self.time[i])
    }

    pub fn species(&self) -> usize {
        self.g_vs_tsz.len_of(Axis(1))
    }

    pub fn nz(&self) -> usize {
        self.g_vs_tsz.len_of(Axis(2))
    }

    pub fn nmu(&self) -> usize {
        self.g_vs_tsmu.len_of(Axis(2))
    }

    pub fn nvpa(&self) -> usize {
        self.g_vs_tsvpa.len_of(Axis(2))
    }
}

// ─── CacheStatus ────────────────────────────────────────────────────────────

/// State of a cache file relative to its source archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// No usable cache file.
    Missing,
    /// Cache is at least as new as the archive.
    Current,
    /// Archive is newer and holds time points past the cached ones.
    StaleAppendable,
    /// Archive is newer but adds no time points at this stride.
    StaleNoNewData,
}

// ─── ProcessStatus ──────────────────────────────────────────────────────────

/// What the batch driver did with one simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProcessStatus {
    Saved,
    Updated,
    AlreadyExists,
    UpToDate,
    /// Dry run: the action that would have been taken.
    Planned(CacheStatus),
    SkippedLinear,
    SkippedMissingVariables,
    Failed(String),
}

impl ProcessStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The cache file was written during this run.
    pub fn wrote_cache(&self) -> bool {
        matches!(self, Self::Saved | Self::Updated)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Updated => "updated",
            Self::AlreadyExists => "already exists",
            Self::UpToDate => "up to date",
            Self::Planned(_) => "planned",
            Self::SkippedLinear => "skipped (linear)",
            Self::SkippedMissingVariables => "skipped (no gvmus/gzvs)",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned(state) => write!(f, "planned ({state:?})"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}
