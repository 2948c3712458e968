//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**; the collectives the surface
//! pipeline needs (`gather_into`, `all_reduce_max_into`, `broadcast_into`) are
//! provided on top of them and may be overridden by backends with native
//! collectives.
//!
//! Every collective blocks until all ranks have entered it. There is no
//! timeout: a rank that never joins stalls its peers, unless the backend can
//! observe the failure (see [`Communicator::abort`]).

use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut, expect_exact_len};
use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Typed message tag; each collective stage owns one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Tag `k` slots after this one, wrapping at `u16::MAX`.
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// A failed or mismatched message exchange with `peer`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rank {peer}: {reason}")]
pub struct CommError {
    pub peer: usize,
    pub reason: String,
}

impl CommError {
    pub fn new(peer: usize, reason: impl Into<String>) -> Self {
        Self {
            peer,
            reason: reason.into(),
        }
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Rank-aware message passing plus the collectives built from it.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Tear down the whole run after a fatal local error. No-op by default.
    fn abort(&self) {}

    /// Gather equal-length `send` slices into `recv` on `root`, rank `r`'s
    /// slice landing at `recv[r * send.len()..]`.
    ///
    /// `recv` must hold `size() * send.len()` elements on `root`; it is
    /// ignored elsewhere. Every rank must pass the same `send.len()`.
    fn gather_into<T: Pod>(
        &self,
        tag: CommTag,
        root: usize,
        send: &[T],
        recv: &mut [T],
    ) -> Result<(), CommError> {
        let size = self.size();
        if self.rank() != root {
            let _ = self.isend(root, tag.as_u16(), cast_slice(send)).wait();
            return Ok(());
        }

        let seg = send.len();
        if recv.len() != seg * size {
            return Err(CommError::new(
                root,
                format!(
                    "receive buffer holds {} elements, gather needs {}",
                    recv.len(),
                    seg * size
                ),
            ));
        }
        recv[root * seg..(root + 1) * seg].copy_from_slice(send);

        // 1) post all receives
        let nbytes = std::mem::size_of_val(send);
        let pending: Vec<(usize, Self::RecvHandle)> = (0..size)
            .filter(|&peer| peer != root)
            .map(|peer| (peer, self.irecv(peer, tag.as_u16(), nbytes)))
            .collect();

        // 2) wait for every receive, keeping the first error but draining the rest
        let mut maybe_err = None;
        for (peer, handle) in pending {
            match handle.wait() {
                Some(data) => match expect_exact_len(data.len(), nbytes) {
                    Ok(()) if maybe_err.is_none() => {
                        cast_slice_mut(&mut recv[peer * seg..(peer + 1) * seg])
                            .copy_from_slice(&data);
                    }
                    Ok(()) => {}
                    Err(reason) => {
                        maybe_err.get_or_insert(CommError::new(peer, reason));
                    }
                },
                None => {
                    maybe_err.get_or_insert(CommError::new(peer, "receive did not complete"));
                }
            }
        }
        maybe_err.map_or(Ok(()), Err)
    }

    /// Copy `buf` from `root` into `buf` on every other rank.
    fn broadcast_into<T: Pod>(&self, tag: CommTag, root: usize, buf: &mut [T]) -> Result<(), CommError> {
        if self.rank() == root {
            let sends: Vec<Self::SendHandle> = (0..self.size())
                .filter(|&peer| peer != root)
                .map(|peer| self.isend(peer, tag.as_u16(), cast_slice(buf)))
                .collect();
            for send in sends {
                let _ = send.wait();
            }
            return Ok(());
        }
        let nbytes = std::mem::size_of_val(buf);
        let data = self
            .irecv(root, tag.as_u16(), nbytes)
            .wait()
            .ok_or_else(|| CommError::new(root, "broadcast receive did not complete"))?;
        expect_exact_len(data.len(), nbytes).map_err(|reason| CommError::new(root, reason))?;
        cast_slice_mut(buf).copy_from_slice(&data);
        Ok(())
    }

    /// Element-wise maximum of `values` across all ranks, written back on every rank.
    ///
    /// Uses `tag` and `tag.offset(1)`.
    fn all_reduce_max_into(&self, tag: CommTag, values: &mut [u64]) -> Result<(), CommError> {
        const HUB: usize = 0;
        let width = values.len();
        let send: Vec<WireCount> = values.iter().map(|&v| WireCount::new(v)).collect();
        let mut all = if self.rank() == HUB {
            vec![WireCount::zeroed(); width * self.size()]
        } else {
            Vec::new()
        };
        self.gather_into(tag, HUB, &send, &mut all)?;

        let mut reduced: Vec<WireCount> = send;
        if self.rank() == HUB {
            for row in all.chunks_exact(width.max(1)) {
                for (acc, w) in reduced.iter_mut().zip(row) {
                    if w.get() > acc.get() {
                        *acc = *w;
                    }
                }
            }
        }
        self.broadcast_into(tag.offset(1), HUB, &mut reduced)?;
        for (v, w) in values.iter_mut().zip(&reduced) {
            *v = w.get();
        }
        Ok(())
    }

    /// Returns once every rank has entered. Uses `tag` and `tag.offset(1)`.
    fn barrier(&self, tag: CommTag) -> Result<(), CommError> {
        self.all_reduce_max_into(tag, &mut [0])
    }
}

/// Compile-time single-rank comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}
}

// --- ThreadComm: intra-process, one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    aborted: AtomicBool,
}

/// Ranks as threads of one process, sharing an in-memory mailbox.
///
/// Messages between one (src, dst, tag) triple are delivered in send order.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

pub struct ThreadRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
}

impl Wait for ThreadRecv {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            let msg = self
                .mailbox
                .slots
                .get_mut(&self.key)
                .and_then(|mut queue| queue.pop_front());
            if let Some(bytes) = msg {
                return Some(bytes.to_vec());
            }
            if self.mailbox.aborted.load(Ordering::Acquire) {
                return None;
            }
            std::thread::yield_now();
        }
    }
}

impl ThreadComm {
    /// One communicator per rank of a fresh `size`-rank universe.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Run `f` once per rank on scoped threads; results are returned in rank order.
    ///
    /// A rank that panics aborts the universe so its peers stop waiting, and
    /// the panic is re-raised here.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let comms = Self::universe(size);
        std::thread::scope(|scope| {
            let f = &f;
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let _guard = AbortOnUnwind(comm.clone());
                        f(comm)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    pub fn is_aborted(&self) -> bool {
        self.mailbox.aborted.load(Ordering::Acquire)
    }
}

struct AbortOnUnwind(ThreadComm);

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.mailbox
            .slots
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _len: usize) -> ThreadRecv {
        ThreadRecv {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
        }
    }

    /// Mark the whole universe as failed; pending and future receives return `None`.
    fn abort(&self) {
        log::warn!("rank {} aborting thread universe", self.rank);
        self.mailbox.aborted.store(true, Ordering::Release);
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommError, CommTag, Communicator, Wait};
    use crate::algs::wire::{cast_slice, cast_slice_mut};
    use bytemuck::Pod;
    use mpi::collective::{CommunicatorCollectives, Root, SystemOperation};
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as MpiCommunicator, SimpleCommunicator};

    /// MPI counts are C `int`; larger messages are refused instead of truncated.
    fn check_count(peer: usize, bytes: usize) -> Result<(), CommError> {
        if bytes > i32::MAX as usize {
            Err(CommError::new(
                peer,
                format!("{bytes} bytes exceed the 32-bit MPI message count"),
            ))
        } else {
            Ok(())
        }
    }

    pub struct MpiComm {
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
        // dropped last: finalizes MPI
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, CommError> {
            let universe = mpi::initialize()
                .ok_or_else(|| CommError::new(0, "MPI already initialized"))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    /// Blocking receive performed at post time.
    pub struct MpiRecv(Option<Vec<u8>>);

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _len: usize) -> MpiRecv {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            MpiRecv(Some(data))
        }

        fn gather_into<T: Pod>(
            &self,
            _tag: CommTag,
            root: usize,
            send: &[T],
            recv: &mut [T],
        ) -> Result<(), CommError> {
            let send_bytes = cast_slice(send);
            check_count(self.rank, send_bytes.len())?;
            let root_process = self.world.process_at_rank(root as i32);
            if self.rank == root {
                if recv.len() != send.len() * self.size {
                    return Err(CommError::new(root, "receive buffer has the wrong length"));
                }
                root_process.gather_into_root(send_bytes, cast_slice_mut(recv));
            } else {
                root_process.gather_into(send_bytes);
            }
            Ok(())
        }

        fn all_reduce_max_into(&self, _tag: CommTag, values: &mut [u64]) -> Result<(), CommError> {
            let send = values.to_vec();
            self.world
                .all_reduce_into(&send[..], values, SystemOperation::max());
            Ok(())
        }

        fn barrier(&self, _tag: CommTag) -> Result<(), CommError> {
            CommunicatorCollectives::barrier(&self.world);
            Ok(())
        }

        fn abort(&self) {
            log::error!("rank {} calling MPI_Abort", self.rank);
            MpiCommunicator::abort(&self.world, 1)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
