// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Output Archives

//! Named-variable access to a simulation's output archive.
//!
//! The driver only needs a handful of float arrays by name, so archives are
//! modelled as a small trait. Two backends exist:
//!
//! - [`NpzArchive`]: NumPy `.npz` containers (always available).
//! - `Netcdf4Archive`: stella's netCDF4 `*.out.nc` files through libhdf5,
//!   behind the `netcdf4` feature.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::{Array1, Array2, Array4, ArrayD, Dimension, IxDyn, OwnedRepr};
use ndarray_npy::NpzReader;
use serde::{Deserialize, Serialize};

use crate::error::{PostError, Result};

pub const VAR_G_VS_TSMUVPA: &str = "g_vs_tsmuvpa";
pub const VAR_G_VS_TSVPAZ: &str = "g_vs_tsvpaz";
pub const VAR_VEC_TIME: &str = "vec_time";
pub const VAR_GVMUS: &str = "gvmus";
pub const VAR_GZVS: &str = "gzvs";

/// Diagnostics stella only writes when distribution output is switched on.
pub const REQUIRED_DIAGNOSTICS: [&str; 2] = [VAR_GVMUS, VAR_GZVS];

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An open output archive. Dropping it releases the underlying file.
pub trait OutputArchive {
    fn path(&self) -> &Path;

    fn variable_names(&mut self) -> Result<Vec<String>>;

    fn read_dyn(&mut self, name: &str) -> Result<ArrayD<f64>>;

    fn has_variable(&mut self, name: &str) -> Result<bool> {
        Ok(self.variable_names()?.iter().any(|n| n == name))
    }

    fn read_1d(&mut self, name: &str) -> Result<Array1<f64>> {
        let path = self.path().to_path_buf();
        into_rank(self.read_dyn(name)?, &path, name)
    }

    fn read_2d(&mut self, name: &str) -> Result<Array2<f64>> {
        let path = self.path().to_path_buf();
        into_rank(self.read_dyn(name)?, &path, name)
    }

    fn read_4d(&mut self, name: &str) -> Result<Array4<f64>> {
        let path = self.path().to_path_buf();
        into_rank(self.read_dyn(name)?, &path, name)
    }
}

/// Opens archives by path.
pub trait ArchiveOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn OutputArchive>>;
}

fn into_rank<D: Dimension>(array: ArrayD<f64>, path: &Path, name: &str) -> Result<ndarray::Array<f64, D>> {
    let ndim = array.ndim();
    array.into_dimensionality::<D>().map_err(|_| {
        PostError::archive(
            path,
            format!(
                "variable '{name}' has rank {ndim}, expected {}",
                D::NDIM.unwrap_or(0)
            ),
        )
    })
}

/// Names from `names` that the archive does not contain.
pub fn missing_variables(archive: &mut dyn OutputArchive, names: &[&str]) -> Result<Vec<String>> {
    let present = archive.variable_names()?;
    Ok(names
        .iter()
        .filter(|name| !present.iter().any(|p| p == *name))
        .map(|name| name.to_string())
        .collect())
}

// ---------------------------------------------------------------------------
// Format selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Npz,
    Netcdf4,
}

impl Default for ArchiveFormat {
    fn default() -> Self {
        if cfg!(feature = "netcdf4") {
            Self::Netcdf4
        } else {
            Self::Npz
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npz => f.write_str("npz"),
            Self::Netcdf4 => f.write_str("netcdf4"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = PostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "npz" => Ok(Self::Npz),
            "netcdf4" | "netcdf" | "nc" => Ok(Self::Netcdf4),
            other => Err(PostError::Config(format!("unknown archive format '{other}'"))),
        }
    }
}

/// Build the opener for `format`.
pub fn opener_for(format: ArchiveFormat) -> Result<Box<dyn ArchiveOpener>> {
    match format {
        ArchiveFormat::Npz => Ok(Box::new(NpzArchiveOpener)),
        #[cfg(feature = "netcdf4")]
        ArchiveFormat::Netcdf4 => Ok(Box::new(netcdf4::Netcdf4ArchiveOpener)),
        #[cfg(not(feature = "netcdf4"))]
        ArchiveFormat::Netcdf4 => Err(PostError::Config(
            "netcdf4 archives need the `netcdf4` feature".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// NPZ backend
// ---------------------------------------------------------------------------

pub struct NpzArchive {
    path: PathBuf,
    reader: NpzReader<File>,
}

impl NpzArchive {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PostError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| PostError::io(path, e))?;
        let reader = NpzReader::new(file).map_err(|e| PostError::archive(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
        })
    }
}

impl OutputArchive for NpzArchive {
    fn path(&self) -> &Path {
        &self.path
    }

    fn variable_names(&mut self) -> Result<Vec<String>> {
        let names = self
            .reader
            .names()
            .map_err(|e| PostError::archive(&self.path, e))?;
        Ok(names
            .into_iter()
            .map(|n| n.strip_suffix(".npy").map(str::to_string).unwrap_or(n))
            .collect())
    }

    fn read_dyn(&mut self, name: &str) -> Result<ArrayD<f64>> {
        let reader = &mut self.reader;
        reader
            .by_name::<OwnedRepr<f64>, IxDyn>(&format!("{name}.npy"))
            .or_else(|_| reader.by_name::<OwnedRepr<f64>, IxDyn>(name))
            .map_err(|e| PostError::archive(&self.path, format!("variable '{name}': {e}")))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NpzArchiveOpener;

impl ArchiveOpener for NpzArchiveOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn OutputArchive>> {
        Ok(Box::new(NpzArchive::open(path)?))
    }
}

// ---------------------------------------------------------------------------
// netCDF4 backend
// ---------------------------------------------------------------------------

#[cfg(feature = "netcdf4")]
pub mod netcdf4 {
    //! netCDF4 files are HDF5 files; variables are root-level datasets.

    use super::*;

    /// stella's own names for variables the reducer asks for.
    const ALIASES: [(&str, &str); 3] = [
        (VAR_G_VS_TSMUVPA, VAR_GVMUS),
        (VAR_G_VS_TSVPAZ, VAR_GZVS),
        (VAR_VEC_TIME, "t"),
    ];

    pub struct Netcdf4Archive {
        path: PathBuf,
        file: hdf5::File,
    }

    impl Netcdf4Archive {
        pub fn open(path: &Path) -> Result<Self> {
            if !path.is_file() {
                return Err(PostError::NotFound(path.to_path_buf()));
            }
            let file = hdf5::File::open(path).map_err(|e| PostError::archive(path, e))?;
            Ok(Self {
                path: path.to_path_buf(),
                file,
            })
        }

        fn resolve(&self, name: &str) -> Result<String> {
            let members = self
                .file
                .member_names()
                .map_err(|e| PostError::archive(&self.path, e))?;
            if members.iter().any(|m| m == name) {
                return Ok(name.to_string());
            }
            ALIASES
                .iter()
                .find(|(wanted, alias)| *wanted == name && members.iter().any(|m| m == alias))
                .map(|(_, alias)| alias.to_string())
                .ok_or_else(|| PostError::archive(&self.path, format!("no variable '{name}'")))
        }
    }

    impl OutputArchive for Netcdf4Archive {
        fn path(&self) -> &Path {
            &self.path
        }

        /// Member names, plus the reducer's name for every aliased member.
        fn variable_names(&mut self) -> Result<Vec<String>> {
            let mut names = self
                .file
                .member_names()
                .map_err(|e| PostError::archive(&self.path, e))?;
            for (wanted, alias) in ALIASES {
                if names.iter().any(|n| n == alias) && !names.iter().any(|n| n == wanted) {
                    names.push(wanted.to_string());
                }
            }
            Ok(names)
        }

        fn read_dyn(&mut self, name: &str) -> Result<ArrayD<f64>> {
            let resolved = self.resolve(name)?;
            let dataset = self
                .file
                .dataset(&resolved)
                .map_err(|e| PostError::archive(&self.path, e))?;
            dataset
                .read_dyn::<f64>()
                .map_err(|e| PostError::archive(&self.path, format!("variable '{name}': {e}")))
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct Netcdf4ArchiveOpener;

    impl ArchiveOpener for Netcdf4ArchiveOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn OutputArchive>> {
            Ok(Box::new(Netcdf4Archive::open(path)?))
        }
    }

}
