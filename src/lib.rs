// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite

pub mod types;
pub mod error;
pub mod time;
pub mod config;

// Data access
pub mod archive;
pub mod input;
pub mod geometry;
pub mod discovery;
pub mod cache;

// Processing
pub mod reducer;
pub mod staleness;
pub mod driver;

pub use types::*;
pub use error::{PostError, Result};
pub use time::Stride;
pub use config::DriverConfig;
pub use archive::{opener_for, ArchiveFormat, ArchiveOpener, NpzArchiveOpener, OutputArchive};
pub use input::{InputMetadata, InputMetadataReader, NamelistReader};
pub use geometry::{ArchiveGeometry, GeometrySource};
pub use discovery::{FileEnumerator, WalkdirEnumerator};
pub use driver::{BatchReport, Collaborators, DistributionDriver, SimulationOutcome};

use tracing_subscriber::EnvFilter;

// ─── Logging ────────────────────────────────────────────────────────────────

const DEFAULT_LOG_FILTER: &str = "info,stella_post=info";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects debug output for
/// this crate. Calling this twice is harmless.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,stella_post=debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
