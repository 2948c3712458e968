//! Surface output settings, identical on every rank.

use crate::io::csv::DEFAULT_PRECISION;
use crate::output_error::OutputError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const EXTENSION: &str = ".csv";

/// Largest accepted mantissa precision.
pub const MAX_PRECISION: usize = 30;

/// Where and how the coordinator writes the surface CSV file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurfaceOutputConfig {
    /// Output directory, created if missing.
    pub directory: PathBuf,
    /// File base name; `.csv` is appended.
    pub filename: String,
    /// Zone index of multi-zone runs, appended as `_<zone>`.
    pub zone: Option<u16>,
    /// Time iteration of unsteady runs, appended as `_<iter:05>`.
    pub iteration: Option<u64>,
    /// Fractional digits of every written value.
    pub precision: usize,
    /// Rank that gathers and writes.
    pub coordinator: usize,
    /// Write to `<path>.part` and rename on success.
    pub atomic: bool,
}

impl Default for SurfaceOutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            filename: "surface_flow".to_string(),
            zone: None,
            iteration: None,
            precision: DEFAULT_PRECISION,
            coordinator: 0,
            atomic: true,
        }
    }
}

impl SurfaceOutputConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_zone(mut self, zone: u16) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_iteration(mut self, iteration: u64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_coordinator(mut self, coordinator: usize) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// `<directory>/<filename>[_<zone>][_<iteration:05>].csv`
    pub fn path(&self) -> PathBuf {
        let base = self
            .filename
            .strip_suffix(EXTENSION)
            .unwrap_or(&self.filename);
        let mut name = base.to_string();
        if let Some(zone) = self.zone {
            name.push_str(&format!("_{zone}"));
        }
        if let Some(iter) = self.iteration {
            name.push_str(&format!("_{iter:05}"));
        }
        name.push_str(EXTENSION);
        self.directory.join(name)
    }

    pub fn validate(&self) -> Result<(), OutputError> {
        let base = self
            .filename
            .strip_suffix(EXTENSION)
            .unwrap_or(&self.filename);
        if base.is_empty() {
            return Err(OutputError::Config("filename is empty".into()));
        }
        if base.contains(['/', '\\']) {
            return Err(OutputError::Config(format!(
                "filename {base:?} must not contain path separators"
            )));
        }
        if self.precision > MAX_PRECISION {
            return Err(OutputError::Config(format!(
                "precision {} outside 0..={MAX_PRECISION}",
                self.precision
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, OutputError> {
        let cfg: Self =
            serde_json::from_str(text).map_err(|e| OutputError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OutputError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| OutputError::io(path, e))?;
        Self::from_json_str(&text)
    }
}
