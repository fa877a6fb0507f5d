//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Receive handles are waitable; callers must `.wait()` every handle they
//! post before trusting any buffer, and the exchange layer drains every
//! handle even on error.
//!
//! The communicator is an explicit object: build it once and pass it by
//! reference into every phase. There is no process-wide controller.

use crate::mesh_error::MeshError;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Arc;

/// Tag reserved for the default `allgather` implementation.
pub const ALLGATHER_TAG: u16 = u16::MAX;

/// Typed message tag. Each phase owns a base tag and derives the
/// header/payload pair from it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    pub const fn base(self) -> u16 {
        self.0
    }
    /// Tag `n` slots above this one.
    pub const fn offset(self, n: u16) -> CommTag {
        CommTag(self.0.wrapping_add(n))
    }
}

/// Non-blocking point-to-point interface plus a fixed-width all-gather.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Start sending `buf` to `peer`.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `buf.len()` bytes from `peer`; the data is returned
    /// by `wait()` on the handle.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// This rank.
    fn rank(&self) -> usize;
    /// Number of ranks.
    fn size(&self) -> usize;

    /// Gather `send` (same length on every rank) from all ranks into `recv`,
    /// rank-major.
    fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
        let n = send.len();
        let (me, size) = (self.rank(), self.size());
        if recv.len() != n * size {
            return Err(MeshError::BufferSizeMismatch {
                neighbor: me,
                expected: n * size,
                got: recv.len(),
            });
        }
        recv[me * n..(me + 1) * n].copy_from_slice(send);
        let mut pending = Vec::with_capacity(size.saturating_sub(1));
        let mut recvs = Vec::with_capacity(size.saturating_sub(1));
        for peer in (0..size).filter(|&p| p != me) {
            let mut tmp = vec![0u8; n];
            recvs.push((peer, self.irecv(peer, ALLGATHER_TAG, &mut tmp)));
        }
        for peer in (0..size).filter(|&p| p != me) {
            pending.push(self.isend(peer, ALLGATHER_TAG, send));
        }
        let mut maybe_err = None;
        for (peer, h) in recvs {
            match h.wait() {
                Some(data) if data.len() == n => {
                    recv[peer * n..(peer + 1) * n].copy_from_slice(&data);
                }
                Some(data) => {
                    maybe_err.get_or_insert(MeshError::BufferSizeMismatch {
                        neighbor: peer,
                        expected: n,
                        got: data.len(),
                    });
                }
                None => {
                    maybe_err.get_or_insert(MeshError::CommError {
                        neighbor: peer,
                        source: "allgather receive returned no data".into(),
                    });
                }
            }
        }
        for s in pending {
            let _ = s.wait();
        }
        maybe_err.map_or(Ok(()), Err)
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

/// Single-rank communicator: no peers, collectives are copies.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
        if recv.len() != send.len() {
            return Err(MeshError::BufferSizeMismatch {
                neighbor: 0,
                expected: send.len(),
                got: recv.len(),
            });
        }
        recv.copy_from_slice(send);
        Ok(())
    }
}

// --- RayonComm: intra-process ranks on threads ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// Shared mailbox: FIFO queue per `(src, dst, tag)`.
#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
}

static GLOBAL_MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(Mailbox::default()));

/// Receive handle for [`RayonComm`]; `wait` polls the mailbox.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut spins = 0u32;
        loop {
            let popped = self
                .mailbox
                .queues
                .get_mut(&self.key)
                .and_then(|mut q| q.pop_front());
            if let Some(bytes) = popped {
                self.mailbox.queues.remove_if(&self.key, |_, q| q.is_empty());
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            spins += 1;
            if spins < 1_000 {
                std::thread::yield_now();
            } else {
                std::thread::sleep(std::time::Duration::from_micros(50));
            }
        }
    }
}

/// Ranks simulated as threads of one process.
///
/// `RayonComm::new` shares one process-global mailbox (tests using it should
/// run serially); `RayonComm::world` builds an isolated group.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl RayonComm {
    /// Rank `rank` of `size` on the process-global mailbox.
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: GLOBAL_MAILBOX.clone(),
        }
    }

    /// `size` communicators sharing a private mailbox, indexed by rank.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: mailbox.clone(),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .queues
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator as Comm, Wait};
    use crate::mesh_error::MeshError;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI world communicator. Owns the MPI environment; dropping it
    /// finalizes MPI.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshError> {
            let universe = mpi::initialize()
                .ok_or_else(|| MeshError::TransportInit("MPI already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Pending MPI receive; completes and hands back its buffer on `wait`.
    pub struct MpiRecvHandle {
        finish: Box<dyn FnOnce() -> Vec<u8>>,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            Some((self.finish)())
        }
    }

    impl Comm for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            // receives are always posted first, so a standard send cannot
            // form a cycle
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            let storage: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = storage;
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, storage, tag as i32);
            MpiRecvHandle {
                finish: Box::new(move || {
                    req.wait();
                    // SAFETY: `ptr` came from `Box::leak` above and the only
                    // borrow of it was held by `req`, which has completed.
                    let data = unsafe { Box::from_raw(ptr) };
                    data.into_vec()
                }),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
            if recv.len() != send.len() * self.size {
                return Err(MeshError::BufferSizeMismatch {
                    neighbor: self.rank,
                    expected: send.len() * self.size,
                    got: recv.len(),
                });
            }
            self.world.all_gather_into(send, recv);
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
