//! Fixed-stride gather of surface ids and values to the coordinating rank.
//!
//! Every rank pads its send buffers to `max_local` rows so that both gathers
//! use one stride; only the coordinator allocates receive storage, which it
//! then owns inside [`Gathered::Coordinator`].

use crate::algs::communicator::{CommError, CommTag, Communicator};
use crate::algs::size_exchange::PartitionSizes;
use crate::algs::wire::{WireId, WireScalar};
use crate::data::local_buffer::{LocalFieldBuffer, try_alloc};
use crate::data::padded::PaddedBuffer;
use crate::output_error::{OutputError, Stage};
use bytemuck::Zeroable;

/// Base tag of the surface output collectives.
pub const SURFACE_TAG: CommTag = CommTag::new(0x5500);
pub(crate) const TAG_SIZE_REDUCE: CommTag = SURFACE_TAG; // uses 2 slots
pub(crate) const TAG_SIZE_GATHER: CommTag = SURFACE_TAG.offset(2);
pub(crate) const TAG_ID_GATHER: CommTag = SURFACE_TAG.offset(3);
pub(crate) const TAG_VALUE_GATHER: CommTag = SURFACE_TAG.offset(4);
pub(crate) const TAG_GATHER_DONE: CommTag = SURFACE_TAG.offset(5); // uses 2 slots

/// What this rank does in a gather.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Receives every rank's data and writes the output.
    Coordinator,
    /// Contributes its local data and owns no receive storage.
    Participant,
}

/// A communicator plus the rank designated to collect and write.
#[derive(Debug)]
pub struct CommContext<'a, C> {
    comm: &'a C,
    coordinator: usize,
}

impl<'a, C: Communicator> CommContext<'a, C> {
    /// Fails identically on every rank if `coordinator` is not a valid rank.
    pub fn new(comm: &'a C, coordinator: usize) -> Result<Self, OutputError> {
        let size = comm.size();
        if coordinator >= size {
            return Err(OutputError::InvalidCoordinator { coordinator, size });
        }
        Ok(Self { comm, coordinator })
    }

    pub fn comm(&self) -> &'a C {
        self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of participating ranks.
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn coordinator(&self) -> usize {
        self.coordinator
    }

    pub fn role(&self) -> Role {
        if self.comm.rank() == self.coordinator {
            Role::Coordinator
        } else {
            Role::Participant
        }
    }
}

/// Surface data of all ranks, held by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub struct GatheredField {
    ids: PaddedBuffer<WireId>,
    values: PaddedBuffer<WireScalar>,
}

impl GatheredField {
    /// Assemble from already-gathered padded storage.
    ///
    /// `ids` holds `counts.len() * stride` entries and `values` that times
    /// `width`; only the first `counts[r]` rows of each rank are read.
    ///
    /// # Panics
    /// If either length disagrees with `counts`, `stride` and `width`, or a
    /// count exceeds `stride`.
    pub fn from_padded(
        ids: Vec<WireId>,
        values: Vec<WireScalar>,
        counts: Vec<usize>,
        stride: usize,
        width: usize,
    ) -> Self {
        Self {
            ids: PaddedBuffer::new(ids, counts.clone(), stride, 1),
            values: PaddedBuffer::new(values, counts, stride, width),
        }
    }

    /// Values per point.
    pub fn width(&self) -> usize {
        self.values.width()
    }

    /// Padded rows per rank (the global maximum local count).
    pub fn stride(&self) -> usize {
        self.ids.stride()
    }

    pub fn ranks(&self) -> usize {
        self.ids.ranks()
    }

    /// Real points contributed by `rank`.
    pub fn count(&self, rank: usize) -> usize {
        self.ids.count(rank)
    }

    /// Real points over all ranks.
    pub fn total_rows(&self) -> usize {
        self.ids.total_rows()
    }

    /// `(global id, values)` of every real point, rank by rank in send order.
    pub fn rows(&self) -> impl Iterator<Item = (u64, &[WireScalar])> + '_ {
        self.ids
            .rows()
            .zip(self.values.rows())
            .map(|(id, vals)| (id[0].get(), vals))
    }

    /// Point `index` of `rank`, `None` for padding.
    pub fn point(&self, rank: usize, index: usize) -> Option<(u64, Vec<f64>)> {
        let id = self.ids.row(rank, index)?[0].get();
        let vals = self.values.row(rank, index)?;
        Some((id, vals.iter().map(WireScalar::get).collect()))
    }
}

/// Result of the gather, by role.
#[derive(Clone, Debug, PartialEq)]
pub enum Gathered {
    Coordinator(GatheredField),
    Participant,
}

impl Gathered {
    pub fn into_field(self) -> Option<GatheredField> {
        match self {
            Gathered::Coordinator(field) => Some(field),
            Gathered::Participant => None,
        }
    }
}

fn extent(a: usize, b: usize, what: &'static str) -> Result<usize, OutputError> {
    a.checked_mul(b).ok_or(OutputError::BufferTooLarge {
        stage: Stage::Gather,
        what,
    })
}

fn collective_err(source: CommError) -> OutputError {
    OutputError::Collective {
        stage: Stage::Gather,
        source,
    }
}

/// Move every rank's padded ids and values to the coordinator.
///
/// Collective: all ranks must call this with the [`PartitionSizes`] they got
/// from the same size exchange. Ids are gathered first, then values.
///
/// A rank that fails here (allocation, overflow, transport) aborts the run
/// and returns its own error. The others meet in a closing barrier, which an
/// aborted run never completes, so they return [`OutputError::PeerFailed`]
/// instead of reporting a contribution nobody wrote.
pub fn gather_to_coordinator<C: Communicator>(
    ctx: &CommContext<'_, C>,
    local: &LocalFieldBuffer,
    sizes: &PartitionSizes,
) -> Result<Gathered, OutputError> {
    let received = match transfer(ctx, local, sizes.max_local()) {
        Ok(received) => received,
        Err(err) => {
            log::error!("rank {}: gather failed: {err}", ctx.rank());
            ctx.comm().abort();
            return Err(err);
        }
    };

    if let Err(source) = ctx.comm().barrier(TAG_GATHER_DONE) {
        log::warn!("rank {}: peer failed during gather ({source})", ctx.rank());
        return Err(OutputError::PeerFailed {
            stage: Stage::Gather,
        });
    }

    match (received, sizes.per_rank()) {
        (Some((ids, values)), Some(counts)) => Ok(Gathered::Coordinator(GatheredField::from_padded(
            ids,
            values,
            counts.to_vec(),
            sizes.max_local(),
            local.width(),
        ))),
        _ => Ok(Gathered::Participant),
    }
}

/// Both gathers; the coordinator gets its padded receive buffers back.
fn transfer<C: Communicator>(
    ctx: &CommContext<'_, C>,
    local: &LocalFieldBuffer,
    stride: usize,
) -> Result<Option<(Vec<WireId>, Vec<WireScalar>)>, OutputError> {
    let width = local.width();

    // send side: every rank, same stride
    let send_ids = local.padded_ids(stride)?;
    let send_values = local.padded_values(stride)?;

    // receive side: coordinator only
    let (mut recv_ids, mut recv_values) = match ctx.role() {
        Role::Coordinator => {
            let n_ids = extent(ctx.size(), stride, "id receive buffer")?;
            let n_values = extent(n_ids, width, "value receive buffer")?;
            let mut ids = try_alloc::<WireId>(n_ids, Stage::Gather)?;
            ids.resize(n_ids, WireId::zeroed());
            let mut values = try_alloc::<WireScalar>(n_values, Stage::Gather)?;
            values.resize(n_values, WireScalar::zeroed());
            (ids, values)
        }
        Role::Participant => (Vec::new(), Vec::new()),
    };

    log::debug!(
        "rank {}: gathering {} of {} padded rows ({} fields) to rank {}",
        ctx.rank(),
        local.local_count(),
        stride,
        width,
        ctx.coordinator()
    );

    let comm = ctx.comm();
    let root = ctx.coordinator();
    comm.gather_into(TAG_ID_GATHER, root, &send_ids, &mut recv_ids)
        .map_err(collective_err)?;
    comm.gather_into(TAG_VALUE_GATHER, root, &send_values, &mut recv_values)
        .map_err(collective_err)?;

    Ok(match ctx.role() {
        Role::Coordinator => Some((recv_ids, recv_values)),
        Role::Participant => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};
    use crate::algs::size_exchange::{Contribution, exchange_partition_sizes};
    use crate::data::field_catalog::FieldCatalog;
    use crate::data::local_buffer::LocalPointRecord;

    fn field(ids: Vec<u64>, vals: Vec<f64>, counts: Vec<usize>, stride: usize, width: usize) -> GatheredField {
        GatheredField::from_padded(
            ids.into_iter().map(WireId::of).collect(),
            vals.into_iter().map(WireScalar::of).collect(),
            counts,
            stride,
            width,
        )
    }

    #[test]
    fn context_rejects_out_of_range_coordinator() {
        let err = CommContext::new(&NoComm, 1).unwrap_err();
        assert!(matches!(err, OutputError::InvalidCoordinator { coordinator: 1, size: 1 }));
    }

    #[test]
    fn receive_extent_overflow_is_reported() {
        let err = extent(usize::MAX, 2, "id receive buffer").unwrap_err();
        assert!(matches!(
            err,
            OutputError::BufferTooLarge { stage: Stage::Gather, what: "id receive buffer" }
        ));
    }

    #[test]
    fn rows_skip_padding() {
        // counts [0, 2, 1], stride 2; padding rows carry sentinel 777
        let f = field(
            vec![777, 777, 5, 7, 3, 777],
            vec![-1.0, -1.0, 1.5, 2.5, 9.0, -1.0],
            vec![0, 2, 1],
            2,
            1,
        );
        let rows: Vec<(u64, f64)> = f.rows().map(|(id, v)| (id, v[0].get())).collect();
        assert_eq!(rows, vec![(5, 1.5), (7, 2.5), (3, 9.0)]);
        assert_eq!(f.point(0, 0), None);
        assert_eq!(f.point(2, 0), Some((3, vec![9.0])));
    }

    #[test]
    fn serial_gather_is_identity() {
        let catalog = FieldCatalog::new(["a", "b"]).unwrap();
        let recs = [LocalPointRecord::new(11, [1.0, 2.0])];
        let local = LocalFieldBuffer::from_records(&catalog, &recs).unwrap();
        let ctx = CommContext::new(&NoComm, 0).unwrap();
        let sizes = exchange_partition_sizes(&ctx, Contribution::Ready(&local)).unwrap();
        let g = gather_to_coordinator(&ctx, &local, &sizes).unwrap();
        let f = g.into_field().unwrap();
        assert_eq!(f.point(0, 0), Some((11, vec![1.0, 2.0])));
    }

    #[test]
    fn only_coordinator_holds_data() {
        let catalog = FieldCatalog::new(["P"]).unwrap();
        let out = ThreadComm::run(3, |comm| {
            let n = [0usize, 4, 2][comm.rank()];
            let recs: Vec<_> = (0..n)
                .map(|i| LocalPointRecord::new((comm.rank() * 100 + i) as u64, [i as f64]))
                .collect();
            let local = LocalFieldBuffer::from_records(&catalog, &recs).unwrap();
            let ctx = CommContext::new(&comm, 2).unwrap();
            let sizes = exchange_partition_sizes(&ctx, Contribution::Ready(&local)).unwrap();
            gather_to_coordinator(&ctx, &local, &sizes).unwrap()
        });
        assert_eq!(out[0], Gathered::Participant);
        assert_eq!(out[1], Gathered::Participant);
        let f = out[2].clone().into_field().unwrap();
        assert_eq!(f.stride(), 4);
        assert_eq!((f.count(0), f.count(1), f.count(2)), (0, 4, 2));
        assert_eq!(f.total_rows(), 6);
        let ids: Vec<u64> = f.rows().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![100, 101, 102, 103, 200, 201]);
    }
}
