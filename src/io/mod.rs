//! Surface CSV serialization, re-parsing and the end-to-end write pipeline.

pub mod csv;
pub mod csv_reader;
pub mod partial_file;
pub mod surface;

pub use csv_reader::{SurfaceCsv, parse_surface_csv, read_surface_csv};
pub use surface::{SurfaceWriteOutcome, write_surface_csv, write_surface_csv_columns};
