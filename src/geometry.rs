// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Geometry Weights

use tracing::debug;

use crate::archive::ArchiveOpener;
use crate::error::{check_axis, Result};
use crate::input::InputMetadata;
use crate::types::{GeometryWeights, SimulationInput};

pub const VAR_MU_WEIGHTS: &str = "mu_weights";
pub const VAR_VPA_WEIGHTS: &str = "vpa_weights";
pub const VAR_DL_OVER_B: &str = "dl_over_B";

/// Supplies the integration weights for one simulation.
pub trait GeometrySource {
    fn weights(&self, simulation: &SimulationInput, metadata: &InputMetadata)
        -> Result<GeometryWeights>;
}

/// Reads `mu_weights[z,mu]`, `vpa_weights[vpa]` and `dl_over_B[z]` from the
/// simulation's own output archive.
pub struct ArchiveGeometry<'a> {
    archives: &'a dyn ArchiveOpener,
}

impl<'a> ArchiveGeometry<'a> {
    pub fn new(archives: &'a dyn ArchiveOpener) -> Self {
        Self { archives }
    }
}

impl GeometrySource for ArchiveGeometry<'_> {
    fn weights(
        &self,
        simulation: &SimulationInput,
        metadata: &InputMetadata,
    ) -> Result<GeometryWeights> {
        debug!(
            archive = %simulation.archive_file.display(),
            vmec = metadata.vmec_filename.as_deref().unwrap_or("-"),
            "reading geometry weights"
        );
        let mut archive = self.archives.open(&simulation.archive_file)?;
        let weights = GeometryWeights {
            mu_weights: archive.read_2d(VAR_MU_WEIGHTS)?,
            vpa_weights: archive.read_1d(VAR_VPA_WEIGHTS)?,
            dl_over_b: archive.read_1d(VAR_DL_OVER_B)?,
        };
        check_axis("z", weights.nz(), weights.mu_weights.nrows())?;
        Ok(weights)
    }
}
