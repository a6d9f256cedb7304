// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Batch Driver

//! Walks a folder of stella runs and brings every distribution cache up to
//! date.
//!
//! Per nonlinear simulation the driver:
//! 1. skips runs without `gvmus`/`gzvs` when no cache exists yet,
//! 2. classifies the cache ([`staleness::classify`]),
//! 3. computes and writes a fresh cache, computes and appends, touches the
//!    cache, or leaves it alone.
//!
//! Failures are recorded per simulation; one bad run never stops the batch.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{
    missing_variables, ArchiveOpener, OutputArchive, REQUIRED_DIAGNOSTICS, VAR_G_VS_TSMUVPA,
    VAR_G_VS_TSVPAZ, VAR_VEC_TIME,
};
use crate::cache;
use crate::config::DriverConfig;
use crate::discovery::{discover_simulations, FileEnumerator};
use crate::error::{check_axis, PostError, Result};
use crate::geometry::GeometrySource;
use crate::input::{InputMetadata, InputMetadataReader};
use crate::reducer;
use crate::staleness;
use crate::time::{indices_at_fixed_step, round_time, Stride};
use crate::types::{
    CacheStatus, ProcessStatus, ReducedDistribution3D, SimulationInput,
    VelocityDistributionSlice,
};
use ndarray::Axis;

// ─── Collaborators ──────────────────────────────────────────────────────────

/// External services the driver depends on.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub inputs: &'a dyn InputMetadataReader,
    pub archives: &'a dyn ArchiveOpener,
    pub geometry: &'a dyn GeometrySource,
    pub files: &'a dyn FileEnumerator,
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub input_file: PathBuf,
    pub cache_file: PathBuf,
    pub status: ProcessStatus,
    /// Time points in the cache after this run, when it was written.
    pub time_points: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub saved: usize,
    pub updated: usize,
    pub already_exists: usize,
    pub up_to_date: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub folder: PathBuf,
    pub stride: String,
    pub outcomes: Vec<SimulationOutcome>,
}

impl BatchReport {
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for outcome in &self.outcomes {
            match outcome.status {
                ProcessStatus::Saved => counts.saved += 1,
                ProcessStatus::Updated => counts.updated += 1,
                ProcessStatus::AlreadyExists => counts.already_exists += 1,
                ProcessStatus::UpToDate => counts.up_to_date += 1,
                ProcessStatus::Planned(_) => counts.planned += 1,
                ProcessStatus::SkippedLinear | ProcessStatus::SkippedMissingVariables => {
                    counts.skipped += 1
                }
                ProcessStatus::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_failure())
    }

    pub fn status_of(&self, input_file: &Path) -> Option<&ProcessStatus> {
        self.outcomes
            .iter()
            .find(|o| o.input_file == input_file)
            .map(|o| &o.status)
    }
}

// ─── Reading ────────────────────────────────────────────────────────────────

/// Read g and the time axis from an archive, keeping one point per `stride`.
pub fn read_velocity_slice(
    archive: &mut dyn OutputArchive,
    stride: Stride,
) -> Result<VelocityDistributionSlice> {
    let missing = missing_variables(archive, &[VAR_G_VS_TSMUVPA, VAR_G_VS_TSVPAZ, VAR_VEC_TIME])?;
    if !missing.is_empty() {
        return Err(PostError::PreconditionNotMet {
            path: archive.path().to_path_buf(),
            missing,
        });
    }
    let g_vs_tsmuvpa = archive.read_4d(VAR_G_VS_TSMUVPA)?;
    let g_vs_tsvpaz = archive.read_4d(VAR_G_VS_TSVPAZ)?;
    let time = archive.read_1d(VAR_VEC_TIME)?;
    check_axis("time", time.len(), g_vs_tsmuvpa.len_of(Axis(0)))?;
    check_axis("time", time.len(), g_vs_tsvpaz.len_of(Axis(0)))?;

    let indices = indices_at_fixed_step(time.view(), stride);
    Ok(VelocityDistributionSlice {
        g_vs_tsmuvpa: g_vs_tsmuvpa.select(Axis(0), &indices),
        g_vs_tsvpaz: g_vs_tsvpaz.select(Axis(0), &indices),
        time: time.select(Axis(0), &indices).mapv(round_time),
    })
}

// ─── Driver ─────────────────────────────────────────────────────────────────

pub struct DistributionDriver<'a> {
    config: DriverConfig,
    collaborators: Collaborators<'a>,
}

impl<'a> DistributionDriver<'a> {
    pub fn new(config: DriverConfig, collaborators: Collaborators<'a>) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Process every eligible simulation below `folder`.
    ///
    /// Only a failed directory scan is returned as an error; per-simulation
    /// problems end up as [`ProcessStatus::Failed`] in the report.
    pub fn run(&self, folder: &Path) -> Result<BatchReport> {
        let stride = self.config.stride;
        let simulations = discover_simulations(
            self.collaborators.files,
            folder,
            &self.config.input_extension,
            &self.config.archive_suffix,
            stride,
        )?;

        let mut report = BatchReport {
            folder: folder.to_path_buf(),
            stride: stride.to_string(),
            outcomes: Vec::with_capacity(simulations.len()),
        };
        let total = simulations.len();
        if total == 0 {
            debug!(folder = %folder.display(), "no simulations with output found");
            return Ok(report);
        }

        for (i, sim) in simulations.iter().enumerate() {
            let progress = if total > 1 {
                format!("({}/{})  ", i + 1, total)
            } else {
                String::new()
            };

            let (status, time_points) = match self.process(sim, &progress) {
                Ok(processed) => processed,
                Err(e) => {
                    warn!("{progress}Skipping {}: {e}", sim.input_file.display());
                    (ProcessStatus::Failed(e.to_string()), None)
                }
            };
            report.outcomes.push(SimulationOutcome {
                input_file: sim.input_file.clone(),
                cache_file: sim.cache_file.clone(),
                status,
                time_points,
            });
        }
        Ok(report)
    }

    /// Bring one cache up to date. The count is the number of time points
    /// written, when the cache was written.
    fn process(
        &self,
        sim: &SimulationInput,
        progress: &str,
    ) -> Result<(ProcessStatus, Option<usize>)> {
        let metadata = self.collaborators.inputs.read(&sim.input_file)?;
        if !metadata.nonlinear {
            debug!(input = %sim.input_file.display(), "linear simulation, skipping");
            return Ok((ProcessStatus::SkippedLinear, None));
        }

        if !sim.cache_file.is_file() {
            let mut archive = self.collaborators.archives.open(&sim.archive_file)?;
            let missing = missing_variables(archive.as_mut(), &REQUIRED_DIAGNOSTICS)?;
            if !missing.is_empty() {
                debug!(input = %sim.input_file.display(), ?missing, "distribution not written");
                return Ok((ProcessStatus::SkippedMissingVariables, None));
            }
        }

        let state = staleness::classify(
            &sim.archive_file,
            &sim.cache_file,
            self.config.stride,
            self.collaborators.archives,
        )?;
        debug!(cache = %sim.cache_file.display(), ?state, "classified");

        if self.config.dry_run {
            info!("{progress}Would process {} ({state:?})", sim.cache_label());
            return Ok((ProcessStatus::Planned(state), None));
        }

        match state {
            CacheStatus::Current => {
                info!("{progress}The 3D distribution file already exists: {}", sim.cache_label());
                Ok((ProcessStatus::AlreadyExists, None))
            }
            CacheStatus::StaleNoNewData => {
                cache::touch(&sim.cache_file)?;
                info!("{progress}The 3D distribution file is up to date: {}", sim.cache_label());
                Ok((ProcessStatus::UpToDate, None))
            }
            CacheStatus::Missing => {
                let data = self.compute(sim, &metadata)?;
                self.save(sim, &data, progress)
            }
            CacheStatus::StaleAppendable => {
                let fresh = self.compute(sim, &metadata)?;
                let merged = cache::read_all(&sim.cache_file)
                    .and_then(|existing| cache::append(&existing, &fresh));
                let merged = match merged {
                    Ok(merged) => merged,
                    Err(e) if e.is_recoverable_cache_error() => {
                        warn!(
                            cache = %sim.cache_file.display(),
                            error = %e,
                            "unusable cache, rebuilding"
                        );
                        return self.save(sim, &fresh, progress);
                    }
                    Err(e) => return Err(e),
                };
                cache::write_all(&sim.cache_file, &merged)?;
                info!("{progress}   ---> The 3D distribution file is updated as {}", sim.cache_label());
                Ok((ProcessStatus::Updated, Some(merged.len())))
            }
        }
    }

    fn save(
        &self,
        sim: &SimulationInput,
        data: &ReducedDistribution3D,
        progress: &str,
    ) -> Result<(ProcessStatus, Option<usize>)> {
        cache::write_all(&sim.cache_file, data)?;
        info!("{progress}   ---> The 3D distribution file is saved as {}", sim.cache_label());
        Ok((ProcessStatus::Saved, Some(data.len())))
    }

    /// Reduce the whole (subsampled) archive of `sim`.
    pub fn compute(
        &self,
        sim: &SimulationInput,
        metadata: &InputMetadata,
    ) -> Result<ReducedDistribution3D> {
        let weights = self.collaborators.geometry.weights(sim, metadata)?;
        let slice = {
            let mut archive = self.collaborators.archives.open(&sim.archive_file)?;
            read_velocity_slice(archive.as_mut(), self.config.stride)?
        };
        let marginals = reducer::reduce(slice.g_vs_tsmuvpa.view(), slice.g_vs_tsvpaz.view(), &weights)?;
        ReducedDistribution3D::new(
            slice.time,
            marginals.g_vs_tsz,
            marginals.g_vs_tsmu,
            marginals.g_vs_tsvpa,
        )
    }
}
