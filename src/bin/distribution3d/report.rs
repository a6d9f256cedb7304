// Run report for the distribution3d tool
// Structured output written next to the console table with --report

use serde::Serialize;
use stella_post::driver::{BatchReport, SimulationOutcome, StatusCounts};

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub counts: StatusCounts,
}

impl Summary {
    pub fn from_batch(batch: &BatchReport) -> Self {
        let counts = batch.counts();
        Self {
            total: batch.outcomes.len(),
            written: counts.saved + counts.updated,
            unchanged: counts.already_exists + counts.up_to_date + counts.planned,
            skipped: counts.skipped,
            failed: counts.failed,
            counts,
        }
    }
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub timestamp: String,
    pub version: &'static str,
    pub folder: String,
    pub stride: &'a str,
    pub archive_format: String,
    pub dry_run: bool,
    pub elapsed_ms: u128,
    pub summary: Summary,
    pub simulations: &'a [SimulationOutcome],
}
