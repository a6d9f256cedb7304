// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Staleness Detection

use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::archive::{ArchiveOpener, OutputArchive, VAR_VEC_TIME};
use crate::cache;
use crate::error::{PostError, Result};
use crate::time::{indices_at_fixed_step, is_after, round_time, Stride};
use crate::types::CacheStatus;

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| PostError::io(path, e))
}

/// Last time point the archive offers at `stride`, rounded.
pub fn source_last_time(archive: &mut dyn OutputArchive, stride: Stride) -> Result<Option<f64>> {
    let time = archive.read_1d(VAR_VEC_TIME)?;
    let indices = indices_at_fixed_step(time.view(), stride);
    Ok(indices.last().map(|&i| round_time(time[i])))
}

/// Classify the cache at `cache_path` against the archive at `source`.
///
/// A cache that exists but cannot be read is reported as
/// [`CacheStatus::Missing`] so the caller rebuilds it.
pub fn classify(
    source: &Path,
    cache_path: &Path,
    stride: Stride,
    archives: &dyn ArchiveOpener,
) -> Result<CacheStatus> {
    if !cache_path.is_file() {
        return Ok(CacheStatus::Missing);
    }
    if modified(source)? <= modified(cache_path)? {
        return Ok(CacheStatus::Current);
    }

    let cached_last = match cache::last_time(cache_path) {
        Ok(t) => t,
        Err(e) if e.is_recoverable_cache_error() => {
            warn!(cache = %cache_path.display(), error = %e, "unreadable cache, rebuilding");
            return Ok(CacheStatus::Missing);
        }
        Err(e) => return Err(e),
    };

    let source_last = {
        let mut archive = archives.open(source)?;
        source_last_time(archive.as_mut(), stride)?
    };
    debug!(?source_last, ?cached_last, "comparing last time points");

    let status = match (source_last, cached_last) {
        (Some(src), Some(cached)) if is_after(src, cached) => CacheStatus::StaleAppendable,
        (Some(_), None) => CacheStatus::StaleAppendable,
        _ => CacheStatus::StaleNoNewData,
    };
    Ok(status)
}
