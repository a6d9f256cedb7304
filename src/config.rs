// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Driver Configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveFormat;
use crate::error::{PostError, Result};
use crate::time::Stride;
use crate::types::{ARCHIVE_SUFFIX, INPUT_EXTENSION};

/// Settings for one batch run.
///
/// Loadable from JSON; every field is optional there and falls back to
/// [`DriverConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Time between cached points (`dt`).
    pub stride: Stride,
    /// Suffix of the output archive next to each input file.
    pub archive_suffix: String,
    /// Extension of the input files to look for.
    pub input_extension: String,
    pub archive_format: ArchiveFormat,
    /// Classify only; never write or touch cache files.
    pub dry_run: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stride: Stride::default(),
            archive_suffix: ARCHIVE_SUFFIX.to_string(),
            input_extension: INPUT_EXTENSION.to_string(),
            archive_format: ArchiveFormat::default(),
            dry_run: false,
        }
    }
}

impl DriverConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PostError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PostError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_suffix.is_empty() {
            return Err(PostError::Config("archive_suffix must not be empty".into()));
        }
        if self.input_extension.is_empty() || self.input_extension.starts_with('.') {
            return Err(PostError::Config(format!(
                "input_extension '{}' must be a bare extension such as 'in'",
                self.input_extension
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stella_layout() {
        let config = DriverConfig::default();
        assert_eq!(config.stride.to_string(), "10");
        assert_eq!(config.archive_suffix, ".out.nc");
        assert_eq!(config.input_extension, "in");
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.json");
        std::fs::write(&path, r#"{ "stride": 2.5, "archive_format": "npz" }"#).unwrap();

        let config = DriverConfig::from_json_file(&path).unwrap();
        assert_eq!(config.stride.value(), 2.5);
        assert_eq!(config.archive_format, ArchiveFormat::Npz);
        assert_eq!(config.archive_suffix, ".out.nc");
    }

    #[test]
    fn invalid_stride_in_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.json");
        std::fs::write(&path, r#"{ "stride": -1 }"#).unwrap();
        let err = DriverConfig::from_json_file(&path).expect_err("test: negative stride");
        assert!(matches!(err, PostError::Config(_)));
    }

    #[test]
    fn dotted_extension_is_rejected() {
        let config = DriverConfig {
            input_extension: ".in".into(),
            ..DriverConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
