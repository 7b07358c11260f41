//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Sends are non-blocking and return a
//! [`Wait`] handle that must be drained before the operation returns.
//! Receives are matched by tag from any source, which lets a protocol that
//! knows *how many* messages it expects (but not in which order they arrive)
//! consume them without per-peer buffers.

use crate::dof_error::DofError;
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

/// Message tag. Protocols derive per-phase tags from a base with [`CommTag::offset`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Message-passing interface used by the parallel numbering policies.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Post a send of `buf` to `peer`; the payload is copied before returning.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;

    /// Block until a message with `tag` arrives from any rank; returns `(source, payload)`.
    fn probe_recv(&self, tag: CommTag) -> Result<(usize, Vec<u8>), DofError>;

    /// Every rank contributes `send`; `recv` receives all contributions in rank order.
    /// All ranks must pass slices of the same length.
    fn allgather(&self, send: &[u8], recv: &mut [u8]);

    fn barrier(&self);
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

/// Serial communicator: one rank, no peers.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}

    fn probe_recv(&self, tag: CommTag) -> Result<(usize, Vec<u8>), DofError> {
        Err(DofError::CommError {
            neighbor: 0,
            reason: format!("serial communicator has no peer to receive tag {:#x} from", tag.0),
        })
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        recv[..send.len()].copy_from_slice(send);
    }

    fn barrier(&self) {}
}

// --- ThreadComm: ranks as threads of one process ---

struct World {
    size: usize,
    /// `(destination, tag)` → FIFO of `(source, payload)`.
    mailbox: Mutex<HashMap<(usize, u16), VecDeque<(usize, Bytes)>>>,
    arrived: Condvar,
    barrier: Barrier,
    gather: Mutex<Vec<Vec<u8>>>,
    timeout: Duration,
}

/// In-process communicator; each rank is driven by its own thread.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    world: Arc<World>,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.world.size)
            .finish()
    }
}

impl ThreadComm {
    /// Communicators for ranks `0..size` sharing one mailbox.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        Self::world_with_timeout(size, Duration::from_secs(60))
    }

    /// Like [`world`](Self::world); a receive waiting longer than `timeout` fails.
    pub fn world_with_timeout(size: usize, timeout: Duration) -> Vec<ThreadComm> {
        let world = Arc::new(World {
            size,
            mailbox: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
            barrier: Barrier::new(size),
            gather: Mutex::new(vec![Vec::new(); size]),
            timeout,
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                world: Arc::clone(&world),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
        let mut mailbox = self.world.mailbox.lock();
        mailbox
            .entry((peer, tag.0))
            .or_default()
            .push_back((self.rank, Bytes::copy_from_slice(buf)));
        self.world.arrived.notify_all();
    }

    fn probe_recv(&self, tag: CommTag) -> Result<(usize, Vec<u8>), DofError> {
        let deadline = Instant::now() + self.world.timeout;
        let mut mailbox = self.world.mailbox.lock();
        loop {
            if let Some((src, payload)) = mailbox
                .get_mut(&(self.rank, tag.0))
                .and_then(VecDeque::pop_front)
            {
                return Ok((src, payload.to_vec()));
            }
            if self
                .world
                .arrived
                .wait_until(&mut mailbox, deadline)
                .timed_out()
            {
                return Err(DofError::CommError {
                    neighbor: self.rank,
                    reason: format!("timed out waiting for tag {:#x}", tag.0),
                });
            }
        }
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        self.world.gather.lock()[self.rank] = send.to_vec();
        self.world.barrier.wait();
        {
            let slots = self.world.gather.lock();
            let n = send.len();
            for (r, s) in slots.iter().enumerate() {
                let len = n.min(s.len());
                recv[r * n..r * n + len].copy_from_slice(&s[..len]);
            }
        }
        self.world.barrier.wait();
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }
}

/// Gather one `u64` from every rank.
pub fn allgather_u64<C: Communicator>(comm: &C, value: u64) -> Vec<u64> {
    let mut recv = vec![0u8; 8 * comm.size()];
    comm.allgather(&value.to_le_bytes(), &mut recv);
    recv.chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            u64::from_le_bytes(b)
        })
        .collect()
}

/// Gather a byte string of arbitrary length from every rank.
pub fn allgather_varlen<C: Communicator>(comm: &C, bytes: &[u8]) -> Vec<Vec<u8>> {
    let sizes = allgather_u64(comm, bytes.len() as u64);
    let width = sizes.iter().copied().max().unwrap_or(0) as usize;
    let mut padded = bytes.to_vec();
    padded.resize(width, 0);
    let mut recv = vec![0u8; width * comm.size()];
    comm.allgather(&padded, &mut recv);
    sizes
        .iter()
        .enumerate()
        .map(|(r, &n)| recv[r * width..r * width + n as usize].to_vec())
        .collect()
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    // SAFETY: the numbering drivers call into the communicator from a single
    // thread per process; MPI is initialized with the default threading level.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, DofError> {
            let universe = mpi::initialize().ok_or(DofError::CommError {
                neighbor: 0,
                reason: "MPI is already initialized".into(),
            })?;
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

    pub struct MpiSendHandle {
        finish: Box<dyn FnOnce()>,
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            (self.finish)();
            None
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> MpiSendHandle {
            let owned: Box<[u8]> = buf.into();
            // SAFETY: `owned` moves into the handle next to the request and is
            // dropped only after the request has completed.
            let data: &'static [u8] =
                unsafe { std::slice::from_raw_parts(owned.as_ptr(), owned.len()) };
            let req = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                data,
                i32::from(tag.as_u16()),
            );
            MpiSendHandle {
                finish: Box::new(move || {
                    let _ = req.wait();
                    drop(owned);
                }),
            }
        }

        fn probe_recv(&self, tag: CommTag) -> Result<(usize, Vec<u8>), DofError> {
            let (msg, status) = self
                .world
                .any_process()
                .matched_probe_with_tag(i32::from(tag.as_u16()));
            let (data, _) = msg.matched_receive_vec::<u8>();
            Ok((status.source_rank() as usize, data))
        }

        fn allgather(&self, send: &[u8], recv: &mut [u8]) {
            self.world.all_gather_into(send, recv);
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_any_source() {
        let comms = ThreadComm::world(3);
        let tag = CommTag::new(7);
        comms[0].isend(2, tag, &[1, 2]);
        comms[1].isend(2, tag, &[3]);
        let mut got = vec![
            comms[2].probe_recv(tag).unwrap(),
            comms[2].probe_recv(tag).unwrap(),
        ];
        got.sort();
        assert_eq!(got, vec![(0, vec![1, 2]), (1, vec![3])]);
    }

    #[test]
    fn tags_do_not_mix() {
        let comms = ThreadComm::world_with_timeout(2, Duration::from_millis(50));
        comms[0].isend(1, CommTag::new(1), &[9]);
        assert!(comms[1].probe_recv(CommTag::new(2)).is_err());
        assert_eq!(comms[1].probe_recv(CommTag::new(1)).unwrap(), (0, vec![9]));
    }

    #[test]
    fn no_comm_gathers_itself() {
        assert_eq!(allgather_u64(&NoComm, 42), vec![42]);
        assert_eq!(allgather_varlen(&NoComm, b"abc"), vec![b"abc".to_vec()]);
        assert!(NoComm.probe_recv(CommTag::new(0)).is_err());
    }

    #[test]
    fn varlen_gather_across_threads() {
        let comms = ThreadComm::world(3);
        let out: Vec<Vec<Vec<u8>>> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .into_iter()
                .map(|c| s.spawn(move || allgather_varlen(&c, &vec![c.rank() as u8; c.rank()])))
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for gathered in out {
            assert_eq!(gathered, vec![vec![], vec![1], vec![2, 2]]);
        }
    }
}
