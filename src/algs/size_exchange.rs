//! Stage 1 of the surface gather: agree on partition sizes.
//!
//! One element-wise max reduction gives every rank the padded stride
//! (`max_local`), and at the same time tells all ranks whether any peer failed
//! to pack its data or disagrees on the field count. Only after that verdict
//! is shared do the per-rank counts travel to the coordinator, so a rank that
//! bails out never leaves its peers blocked in a later gather.

use crate::algs::communicator::{CommError, Communicator};
use crate::algs::gather::{CommContext, Role, TAG_SIZE_GATHER, TAG_SIZE_REDUCE};
use crate::algs::wire::WireCount;
use crate::data::local_buffer::LocalFieldBuffer;
use crate::output_error::{OutputError, Stage};
use bytemuck::Zeroable;

/// What a rank brings to the size exchange.
#[derive(Clone, Copy, Debug)]
pub enum Contribution<'a> {
    /// Packed local data.
    Ready(&'a LocalFieldBuffer),
    /// Local packing failed; the rank still joins so peers are released.
    Failed { width: usize },
}

impl Contribution<'_> {
    fn count(&self) -> usize {
        match self {
            Contribution::Ready(buf) => buf.local_count(),
            Contribution::Failed { .. } => 0,
        }
    }

    fn width(&self) -> usize {
        match self {
            Contribution::Ready(buf) => buf.width(),
            Contribution::Failed { width } => *width,
        }
    }
}

/// Sizes agreed during the exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionSizes {
    local: usize,
    max_local: usize,
    per_rank: Option<Vec<usize>>,
}

impl PartitionSizes {
    /// This rank's real point count.
    pub fn local(&self) -> usize {
        self.local
    }

    /// Maximum local count over all ranks; the gather stride.
    pub fn max_local(&self) -> usize {
        self.max_local
    }

    /// Every rank's local count, in rank order. Coordinator only.
    pub fn per_rank(&self) -> Option<&[usize]> {
        self.per_rank.as_deref()
    }
}

fn to_usize(v: u64, what: &'static str) -> Result<usize, OutputError> {
    usize::try_from(v).map_err(|_| OutputError::BufferTooLarge {
        stage: Stage::SizeExchange,
        what,
    })
}

fn collective_err(source: CommError) -> OutputError {
    OutputError::Collective {
        stage: Stage::SizeExchange,
        source,
    }
}

/// Reduce the maximum local count, then gather all counts to the coordinator.
///
/// Collective. Returns [`OutputError::PeerFailed`] on every rank if any rank
/// contributed [`Contribution::Failed`], and [`OutputError::CatalogMismatch`]
/// on every rank if field counts differ.
pub fn exchange_partition_sizes<C: Communicator>(
    ctx: &CommContext<'_, C>,
    contribution: Contribution<'_>,
) -> Result<PartitionSizes, OutputError> {
    let local = contribution.count();
    let width = contribution.width() as u64;
    let failed = matches!(contribution, Contribution::Failed { .. });

    // [status, count, width, !width]: max of the last entry yields min width
    let mut reduced = [u64::from(failed), local as u64, width, u64::MAX - width];
    ctx.comm()
        .all_reduce_max_into(TAG_SIZE_REDUCE, &mut reduced)
        .map_err(collective_err)?;

    if reduced[0] != 0 {
        if !failed {
            log::warn!("rank {}: peer failed before size exchange", ctx.rank());
        }
        return Err(OutputError::PeerFailed {
            stage: Stage::SizeExchange,
        });
    }
    let (min_width, max_width) = (u64::MAX - reduced[3], reduced[2]);
    if min_width != max_width {
        return Err(OutputError::CatalogMismatch {
            min: min_width,
            max: max_width,
        });
    }
    let max_local = to_usize(reduced[1], "max local count")?;

    let send = [WireCount::new(local as u64)];
    let mut recv = match ctx.role() {
        Role::Coordinator => vec![WireCount::zeroed(); ctx.size()],
        Role::Participant => Vec::new(),
    };
    ctx.comm()
        .gather_into(TAG_SIZE_GATHER, ctx.coordinator(), &send, &mut recv)
        .map_err(collective_err)?;

    let per_rank = match ctx.role() {
        Role::Coordinator => {
            let mut counts = Vec::with_capacity(recv.len());
            for (rank, c) in recv.iter().enumerate() {
                let c = to_usize(c.get(), "per-rank count")?;
                if c > max_local {
                    return Err(collective_err(CommError::new(
                        rank,
                        format!("count {c} exceeds reduced maximum {max_local}"),
                    )));
                }
                counts.push(c);
            }
            Some(counts)
        }
        Role::Participant => None,
    };

    log::debug!(
        "rank {}: local {} / max {} surface points",
        ctx.rank(),
        local,
        max_local
    );

    Ok(PartitionSizes {
        local,
        max_local,
        per_rank,
    })
}
