//! End-to-end surface CSV output: pack, size exchange, gather, write.
//!
//! Collective: every rank calls [`write_surface_csv`] with the same catalog
//! and configuration. The collectives run in a fixed order (size reduction,
//! size gather, id gather, value gather) on every rank. Only the coordinator
//! touches the filesystem, and it does so after all collectives have
//! completed, so a write failure never leaves peers waiting.

use crate::algs::communicator::Communicator;
use crate::algs::gather::{CommContext, Gathered, gather_to_coordinator};
use crate::algs::size_exchange::{Contribution, exchange_partition_sizes};
use crate::config::SurfaceOutputConfig;
use crate::data::field_catalog::FieldCatalog;
use crate::data::local_buffer::{LocalFieldBuffer, LocalPointRecord};
use crate::io::csv::CsvSurfaceWriter;
use crate::io::partial_file::PartialFile;
use crate::output_error::OutputError;
use std::path::PathBuf;

/// What a rank did in a successful surface write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceWriteOutcome {
    /// Coordinator: the file at `path` holds `rows` data lines.
    Written { path: PathBuf, rows: usize },
    /// Participant: `rows` local points were sent to the coordinator.
    Contributed { rows: usize },
}

/// Gather `records` from every rank and write them as one CSV file.
pub fn write_surface_csv<C: Communicator>(
    comm: &C,
    catalog: &FieldCatalog,
    records: &[LocalPointRecord],
    config: &SurfaceOutputConfig,
) -> Result<SurfaceWriteOutcome, OutputError> {
    config.validate()?;
    let ctx = CommContext::new(comm, config.coordinator)?;
    let packed = LocalFieldBuffer::from_records(catalog, records);
    write_packed(&ctx, catalog, packed, config)
}

/// As [`write_surface_csv`], for field-major columns (`columns[field][point]`).
pub fn write_surface_csv_columns<C: Communicator>(
    comm: &C,
    catalog: &FieldCatalog,
    ids: &[u64],
    columns: &[Vec<f64>],
    config: &SurfaceOutputConfig,
) -> Result<SurfaceWriteOutcome, OutputError> {
    config.validate()?;
    let ctx = CommContext::new(comm, config.coordinator)?;
    let packed = LocalFieldBuffer::from_columns(catalog, ids, columns);
    write_packed(&ctx, catalog, packed, config)
}

/// Errors that leave peers inside a collective take the whole run down.
fn fatal<C: Communicator>(ctx: &CommContext<'_, C>, err: OutputError) -> OutputError {
    if matches!(
        err,
        OutputError::Collective { .. }
            | OutputError::Allocation { .. }
            | OutputError::BufferTooLarge { .. }
    ) {
        log::error!("rank {}: {err}", ctx.rank());
        ctx.comm().abort();
    }
    err
}

fn write_packed<C: Communicator>(
    ctx: &CommContext<'_, C>,
    catalog: &FieldCatalog,
    packed: Result<LocalFieldBuffer, OutputError>,
    config: &SurfaceOutputConfig,
) -> Result<SurfaceWriteOutcome, OutputError> {
    let contribution = match &packed {
        Ok(buf) => Contribution::Ready(buf),
        Err(_) => Contribution::Failed {
            width: catalog.len(),
        },
    };
    let sizes = exchange_partition_sizes(ctx, contribution);
    // a local packing error outranks the PeerFailed it caused
    let local = packed?;
    let sizes = sizes.map_err(|e| fatal(ctx, e))?;

    let gathered = gather_to_coordinator(ctx, &local, &sizes).map_err(|e| fatal(ctx, e))?;
    drop(local);

    let field = match gathered {
        Gathered::Participant => {
            return Ok(SurfaceWriteOutcome::Contributed {
                rows: sizes.local(),
            });
        }
        Gathered::Coordinator(field) => field,
    };

    let mut file = PartialFile::create(config.path(), config.atomic)?;
    let rows = CsvSurfaceWriter::new(config.precision)
        .write_gathered(&mut file, catalog, &field)
        .map_err(|e| OutputError::io(file.write_path(), e))?;
    drop(field);
    let path = file.commit()?;

    log::info!(
        "rank {}: wrote {} surface points from {} ranks to {}",
        ctx.rank(),
        rows,
        ctx.size(),
        path.display()
    );
    Ok(SurfaceWriteOutcome::Written { path, rows })
}
