// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Error Types

use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while reducing and caching stella distribution data.
///
/// Every variant except [`PostError::Io`] on a directory scan is recoverable
/// at the batch level: the driver records it against one simulation and
/// moves on to the next.
#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("required variables missing from {path}: {missing:?}")]
    PreconditionNotMet { path: PathBuf, missing: Vec<String> },

    #[error("shape mismatch on {axis} axis: expected {expected}, got {actual}")]
    ShapeMismatch {
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("corrupt format: {0}")]
    CorruptFormat(String),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("malformed input file {path}: {reason}")]
    InputFormat { path: PathBuf, reason: String },

    #[error("invalid time stride {0}: must be positive and finite")]
    InvalidStride(f64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("array layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, PostError>;

impl PostError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn archive(path: &Path, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Whether a cache read failed in a way that should trigger a recompute
    /// rather than abort the simulation.
    pub fn is_recoverable_cache_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::CorruptFormat(_))
    }
}

pub(crate) fn check_axis(axis: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(PostError::ShapeMismatch {
            axis,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_axis_reports_offending_axis() {
        assert!(check_axis("z", 4, 4).is_ok());
        let err = check_axis("mu", 3, 5).expect_err("test: sizes differ");
        assert!(
            matches!(err, PostError::ShapeMismatch { axis: "mu", expected: 3, actual: 5 }),
            "unexpected error: {err}"
        );
        assert_eq!(err.to_string(), "shape mismatch on mu axis: expected 3, got 5");
    }

    #[test]
    fn cache_errors_are_recoverable() {
        assert!(PostError::NotFound(PathBuf::from("a")).is_recoverable_cache_error());
        assert!(PostError::CorruptFormat("bad".into()).is_recoverable_cache_error());
        assert!(!PostError::InvalidStride(0.0).is_recoverable_cache_error());
        let io_err = PostError::io(Path::new("x"), io::Error::other("disk full"));
        assert!(!io_err.is_recoverable_cache_error());
    }
}
