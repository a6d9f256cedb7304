// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Distribution Cache

//! Persistent store for [`ReducedDistribution3D`].
//!
//! One container per (simulation, stride) holds four datasets: `vec_time`,
//! `g_vs_tsz`, `g_vs_tsmu` and `g_vs_tsvpa`, all aligned on the leading time
//! axis. The time axis is the only record of how much has been cached; files
//! only ever grow at the end.
//!
//! With the `netcdf4` feature the container is an HDF5 file, the layout
//! stellapy's plotting tools read. Without it (no libhdf5 available) the
//! container is a NumPy `.npz` archive with the same dataset names.
//!
//! Writes go to a temporary file in the target directory which is then
//! renamed over the cache, so readers never see a half-written file.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use ndarray::{concatenate, s, Axis};
use tracing::debug;

use crate::error::{check_axis, PostError, Result};
use crate::time::is_after;
use crate::types::ReducedDistribution3D;

pub const VAR_TIME: &str = "vec_time";
pub const VAR_G_VS_TSZ: &str = "g_vs_tsz";
pub const VAR_G_VS_TSMU: &str = "g_vs_tsmu";
pub const VAR_G_VS_TSVPA: &str = "g_vs_tsvpa";

fn corrupt(path: &Path, reason: impl std::fmt::Display) -> PostError {
    PostError::CorruptFormat(format!("{}: {reason}", path.display()))
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> PostError {
    PostError::io(path, io::Error::other(err.to_string()))
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

#[cfg(not(feature = "netcdf4"))]
mod container {
    use std::fs::File;

    use ndarray::{Array, Array1, Dimension, OwnedRepr};
    use ndarray_npy::{NpzReader, NpzWriter};

    use super::*;

    fn open(path: &Path) -> Result<NpzReader<File>> {
        if !path.is_file() {
            return Err(PostError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| PostError::io(path, e))?;
        NpzReader::new(file).map_err(|e| corrupt(path, e))
    }

    fn read_array<D: Dimension>(
        npz: &mut NpzReader<File>,
        path: &Path,
        key: &str,
    ) -> Result<Array<f64, D>> {
        npz.by_name::<OwnedRepr<f64>, D>(&format!("{key}.npy"))
            .or_else(|_| npz.by_name::<OwnedRepr<f64>, D>(key))
            .map_err(|e| corrupt(path, format!("array '{key}': {e}")))
    }

    pub(super) fn read_time(path: &Path) -> Result<Array1<f64>> {
        read_array(&mut open(path)?, path, VAR_TIME)
    }

    pub(super) fn read_arrays(path: &Path) -> Result<ReducedDistribution3D> {
        let mut npz = open(path)?;
        Ok(ReducedDistribution3D {
            time: read_array(&mut npz, path, VAR_TIME)?,
            g_vs_tsz: read_array(&mut npz, path, VAR_G_VS_TSZ)?,
            g_vs_tsmu: read_array(&mut npz, path, VAR_G_VS_TSMU)?,
            g_vs_tsvpa: read_array(&mut npz, path, VAR_G_VS_TSVPA)?,
        })
    }

    /// Write `data` to `target` as is; callers validate first.
    pub(super) fn write_arrays(target: &Path, data: &ReducedDistribution3D) -> Result<()> {
        let file = File::create(target).map_err(|e| PostError::io(target, e))?;
        let mut npz = NpzWriter::new(file);
        npz.add_array(VAR_TIME, &data.time).map_err(|e| write_error(target, e))?;
        npz.add_array(VAR_G_VS_TSZ, &data.g_vs_tsz).map_err(|e| write_error(target, e))?;
        npz.add_array(VAR_G_VS_TSMU, &data.g_vs_tsmu).map_err(|e| write_error(target, e))?;
        npz.add_array(VAR_G_VS_TSVPA, &data.g_vs_tsvpa).map_err(|e| write_error(target, e))?;
        let file = npz.finish().map_err(|e| write_error(target, e))?;
        file.sync_all().map_err(|e| PostError::io(target, e))
    }
}

#[cfg(feature = "netcdf4")]
mod container {
    use ndarray::{Array, Array1, Dimension};

    use super::*;

    fn open(path: &Path) -> Result<hdf5::File> {
        if !path.is_file() {
            return Err(PostError::NotFound(path.to_path_buf()));
        }
        hdf5::File::open(path).map_err(|e| corrupt(path, e))
    }

    fn read_dataset<D: Dimension>(
        file: &hdf5::File,
        path: &Path,
        key: &str,
    ) -> Result<Array<f64, D>> {
        file.dataset(key)
            .and_then(|ds| ds.read::<f64, D>())
            .map_err(|e| corrupt(path, format!("dataset '{key}': {e}")))
    }

    fn write_dataset<D: Dimension>(
        file: &hdf5::File,
        target: &Path,
        key: &str,
        array: &Array<f64, D>,
    ) -> Result<()> {
        file.new_dataset::<f64>()
            .shape(array.shape().to_vec())
            .create(key)
            .and_then(|ds| ds.write(array))
            .map_err(|e| write_error(target, format!("dataset '{key}': {e}")))
    }

    pub(super) fn read_time(path: &Path) -> Result<Array1<f64>> {
        read_dataset(&open(path)?, path, VAR_TIME)
    }

    pub(super) fn read_arrays(path: &Path) -> Result<ReducedDistribution3D> {
        let file = open(path)?;
        Ok(ReducedDistribution3D {
            time: read_dataset(&file, path, VAR_TIME)?,
            g_vs_tsz: read_dataset(&file, path, VAR_G_VS_TSZ)?,
            g_vs_tsmu: read_dataset(&file, path, VAR_G_VS_TSMU)?,
            g_vs_tsvpa: read_dataset(&file, path, VAR_G_VS_TSVPA)?,
        })
    }

    /// Write `data` to `target` as is; callers validate first.
    pub(super) fn write_arrays(target: &Path, data: &ReducedDistribution3D) -> Result<()> {
        let file = hdf5::File::create(target).map_err(|e| write_error(target, e))?;
        write_dataset(&file, target, VAR_TIME, &data.time)?;
        write_dataset(&file, target, VAR_G_VS_TSZ, &data.g_vs_tsz)?;
        write_dataset(&file, target, VAR_G_VS_TSMU, &data.g_vs_tsmu)?;
        write_dataset(&file, target, VAR_G_VS_TSVPA, &data.g_vs_tsvpa)?;
        file.flush().map_err(|e| write_error(target, e))?;
        file.close().map_err(|e| write_error(target, e))?;
        let synced = std::fs::File::open(target).and_then(|f| f.sync_all());
        synced.map_err(|e| PostError::io(target, e))
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Load a cache file.
///
/// Fails with `NotFound` when the file is absent and with `CorruptFormat`
/// when a dataset is missing, has the wrong rank, or the datasets disagree
/// on their time or species extent.
pub fn read_all(path: &Path) -> Result<ReducedDistribution3D> {
    let data = container::read_arrays(path)?;
    data.validate().map_err(|e| corrupt(path, e))?;
    Ok(data)
}

/// Last cached time point, reading only the time axis.
pub fn last_time(path: &Path) -> Result<Option<f64>> {
    let time = container::read_time(path)?;
    Ok(time.len().checked_sub(1).map(|i| time[i]))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Create or replace the cache file with `data`.
pub fn write_all(path: &Path, data: &ReducedDistribution3D) -> Result<()> {
    data.validate()?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".distribution3D.")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| PostError::io(dir, e))?;

    container::write_arrays(tmp.path(), data)?;
    tmp.persist(path).map_err(|e| PostError::io(path, e.error))?;

    debug!(path = %path.display(), time_points = data.len(), "cache written");
    Ok(())
}

/// Advance the cache's modification time without touching its content.
pub fn touch(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PostError::NotFound(path.to_path_buf()),
            _ => PostError::io(path, e),
        })?;
    file.set_modified(SystemTime::now())
        .map_err(|e| PostError::io(path, e))
}

// ---------------------------------------------------------------------------
// Appending
// ---------------------------------------------------------------------------

/// Extend `existing` with the part of `fresh` that lies after its last time.
///
/// `fresh` is a full recomputation covering the cached range and more. The
/// cut-over is the first fresh time strictly after the last cached one;
/// everything from there on is appended along the time axis. When nothing
/// in `fresh` is newer, `existing` is returned unchanged.
pub fn append(
    existing: &ReducedDistribution3D,
    fresh: &ReducedDistribution3D,
) -> Result<ReducedDistribution3D> {
    check_axis("species", existing.species(), fresh.species())?;
    check_axis("z", existing.nz(), fresh.nz())?;
    check_axis("mu", existing.nmu(), fresh.nmu())?;
    check_axis("vpa", existing.nvpa(), fresh.nvpa())?;

    let cutover = match existing.last_time() {
        Some(last) => fresh
            .time
            .iter()
            .position(|&t| is_after(t, last))
            .unwrap_or(fresh.len()),
        None => 0,
    };
    if cutover == fresh.len() {
        return Ok(existing.clone());
    }

    let time = concatenate(Axis(0), &[existing.time.view(), fresh.time.slice(s![cutover..])])?;
    let g_vs_tsz = concatenate(
        Axis(0),
        &[existing.g_vs_tsz.view(), fresh.g_vs_tsz.slice(s![cutover.., .., ..])],
    )?;
    let g_vs_tsmu = concatenate(
        Axis(0),
        &[existing.g_vs_tsmu.view(), fresh.g_vs_tsmu.slice(s![cutover.., .., ..])],
    )?;
    let g_vs_tsvpa = concatenate(
        Axis(0),
        &[existing.g_vs_tsvpa.view(), fresh.g_vs_tsvpa.slice(s![cutover.., .., ..])],
    )?;

    ReducedDistribution3D::new(time, g_vs_tsz, g_vs_tsmu, g_vs_tsvpa).map_err(|e| match e {
        PostError::CorruptFormat(reason) => {
            PostError::CorruptFormat(format!("appended data: {reason}"))
        }
        other => other,
    })
}
