//! Field catalog, per-rank point buffers and padded receive storage.

pub mod field_catalog;
pub mod local_buffer;
pub mod padded;
