//! # surface-gather
//!
//! Distributed collection and single-writer serialization of surface field
//! data for parallel CFD solvers. Each rank owns a partition of the surface
//! points; one coordinating rank gathers every partition and writes a single
//! CSV file.
//!
//! ## Pipeline
//! 1. **Pack** local `(global id, values)` records into a point-major buffer
//!    ([`data::local_buffer`]).
//! 2. **Size exchange**: max-reduce the local point counts so every rank pads
//!    to the same stride, then gather the counts to the coordinator
//!    ([`algs::size_exchange`]).
//! 3. **Gather** the padded id and value buffers with one fixed-stride
//!    collective each ([`algs::gather`]).
//! 4. **Write**: the coordinator walks the padded buffers rank by rank,
//!    skipping padding, and emits one CSV line per real point ([`io::csv`]).
//!
//! All buffers are owned values scoped to their stage; the output file is
//! written under a guard that removes it unless the write completes
//! ([`io::partial_file`]).
//!
//! ## Backends
//! [`algs::communicator::NoComm`] for serial runs,
//! [`algs::communicator::ThreadComm`] for several ranks inside one process,
//! and `MpiComm` behind the `mpi-support` feature.
//!
//! ```no_run
//! use surface_gather::prelude::*;
//!
//! let catalog = FieldCatalog::new(["Pressure", "Cp"]).unwrap();
//! let records = vec![LocalPointRecord::new(17, [101325.0, -0.42])];
//! let config = SurfaceOutputConfig::new("output");
//! write_surface_csv(&NoComm, &catalog, &records, &config).unwrap();
//! ```

pub mod algs;
pub mod config;
pub mod data;
pub mod io;
pub mod output_error;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::gather::{CommContext, Gathered, GatheredField, Role};
    pub use crate::config::SurfaceOutputConfig;
    pub use crate::data::field_catalog::FieldCatalog;
    pub use crate::data::local_buffer::{LocalFieldBuffer, LocalPointRecord};
    pub use crate::io::csv::CsvSurfaceWriter;
    pub use crate::io::{SurfaceWriteOutcome, read_surface_csv, write_surface_csv};
    pub use crate::output_error::{OutputError, Stage};
}
