//! OutputError: unified error type for the surface gather/write pipeline.
//!
//! Every variant belongs to one pipeline [`Stage`], so a failed run can report
//! whether packing, the size exchange, the gather or the file write broke.

use crate::algs::communicator::CommError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Copying local records into the point-major send layout.
    Pack,
    /// Max-reduction and gather of local point counts.
    SizeExchange,
    /// Fixed-stride gather of ids and values to the coordinator.
    Gather,
    /// Coordinator-only serialization to disk.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pack => "pack",
            Stage::SizeExchange => "size exchange",
            Stage::Gather => "gather",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Unified error type for surface output operations.
#[derive(Debug, Error)]
pub enum OutputError {
    /// A field catalog must name at least one field.
    #[error("[pack] field catalog is empty")]
    EmptyCatalog,
    /// A local record does not carry one value per catalog field.
    #[error("[pack] record {index} (global id {global_id}) has {found} values, catalog has {expected}")]
    InvalidRecord {
        index: usize,
        global_id: u64,
        expected: usize,
        found: usize,
    },
    /// Column-major input with the wrong number of fields.
    #[error("[pack] got {found} field columns, catalog has {expected}")]
    ColumnCount { expected: usize, found: usize },
    /// Column-major input whose shape disagrees with the catalog or id list.
    #[error("[pack] column {field} has {found} entries, expected {expected}")]
    ColumnMismatch {
        field: usize,
        expected: usize,
        found: usize,
    },
    /// Another rank reported a local failure during the size exchange.
    #[error("[{stage}] a peer rank failed before the collective phase")]
    PeerFailed { stage: Stage },
    /// Ranks disagree on the number of catalog fields.
    #[error("[size exchange] ranks disagree on field count (min {min}, max {max})")]
    CatalogMismatch { min: u64, max: u64 },
    /// Coordinator rank outside `0..size`.
    #[error("coordinator rank {coordinator} out of range for {size} ranks")]
    InvalidCoordinator { coordinator: usize, size: usize },
    /// Collective communication failed.
    #[error("[{stage}] collective communication failed: {source}")]
    Collective {
        stage: Stage,
        #[source]
        source: CommError,
    },
    /// Buffer allocation failed.
    #[error("[{stage}] failed to allocate {elements} elements")]
    Allocation { stage: Stage, elements: usize },
    /// Buffer extent does not fit the address space.
    #[error("[{stage}] buffer size overflows ({what})")]
    BufferTooLarge { stage: Stage, what: &'static str },
    /// Filesystem failure on the coordinator.
    #[error("[write] I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Invalid output configuration.
    #[error("invalid output configuration: {0}")]
    Config(String),
    /// Malformed surface CSV on re-read.
    #[error("surface CSV parse error at line {line}: {reason}")]
    CsvParse { line: usize, reason: String },
}

impl OutputError {
    /// Stage this error belongs to, if it belongs to a pipeline stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OutputError::EmptyCatalog
            | OutputError::InvalidRecord { .. }
            | OutputError::ColumnCount { .. }
            | OutputError::ColumnMismatch { .. } => Some(Stage::Pack),
            OutputError::CatalogMismatch { .. } => Some(Stage::SizeExchange),
            OutputError::PeerFailed { stage }
            | OutputError::Collective { stage, .. }
            | OutputError::Allocation { stage, .. }
            | OutputError::BufferTooLarge { stage, .. } => Some(*stage),
            OutputError::Io { .. } => Some(Stage::Write),
            OutputError::InvalidCoordinator { .. }
            | OutputError::Config(_)
            | OutputError::CsvParse { .. } => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage() {
        let err = OutputError::Collective {
            stage: Stage::Gather,
            source: CommError::new(3, "peer aborted"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("[gather]"), "{msg}");
        assert!(msg.contains("rank 3"), "{msg}");
        assert_eq!(err.stage(), Some(Stage::Gather));
    }

    #[test]
    fn io_errors_are_write_stage() {
        let err = OutputError::io(
            "/nonexistent/out.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.stage(), Some(Stage::Write));
        assert!(err.to_string().contains("/nonexistent/out.csv"));
    }
}
