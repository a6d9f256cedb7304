// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Input Discovery

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{PostError, Result};
use crate::time::Stride;
use crate::types::SimulationInput;

/// Lists files below a folder.
pub trait FileEnumerator {
    /// Files under `folder` (recursively) whose extension is `extension`,
    /// in a stable order.
    fn files(&self, folder: &Path, extension: &str) -> Result<Vec<PathBuf>>;
}

/// Recursive directory walk that skips hidden files and folders.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkdirEnumerator;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with('.'))
}

impl FileEnumerator for WalkdirEnumerator {
    fn files(&self, folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
        if !folder.is_dir() {
            return Err(PostError::NotFound(folder.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(folder)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(folder).to_path_buf();
                PostError::io(&path, e.into())
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == extension)
            {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Input files under `folder` that have an output archive next to them.
pub fn discover_simulations(
    enumerator: &dyn FileEnumerator,
    folder: &Path,
    input_extension: &str,
    archive_suffix: &str,
    stride: Stride,
) -> Result<Vec<SimulationInput>> {
    let mut inputs = enumerator.files(folder, input_extension)?;
    inputs.dedup();

    let simulations: Vec<SimulationInput> = inputs
        .iter()
        .map(|input| SimulationInput::new(input, archive_suffix, stride))
        .filter(|sim| {
            let present = sim.archive_file.is_file();
            if !present {
                debug!(input = %sim.input_file.display(), "no output archive, skipping");
            }
            present
        })
        .collect();
    Ok(simulations)
}
