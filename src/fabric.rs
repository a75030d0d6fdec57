//! Collective broadcast fabric and the root-to-root peer link.
//!
//! The dispatch layer talks to the process group through two small traits:
//! [`Collective`] replicates bytes known on one rank to every rank of a
//! group, and [`PeerLink`] carries the serialized transfer envelope from
//! the compute root to the I/O root in split-role mode.
//!
//! [`LocalGroup`] is the in-process implementation: each rank owns a
//! receive queue that every other rank can send to. Collectives are issued
//! in the same fixed order on every rank, so each endpoint numbers them
//! with a local sequence counter; a message that arrives ahead of its turn
//! is stashed until the matching collective runs. A length disagreement
//! between sender and receiver is a framing error, surfaced before any
//! payload byte is interpreted.

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Error type for fabric operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// A peer endpoint is gone.
    Disconnected,
    /// Broadcast framing mismatch: sender and receiver disagree on length.
    SizeMismatch { expected: usize, got: usize },
    /// Root rank outside the group.
    InvalidRoot { root: usize, size: usize },
    /// A received message could not be decoded.
    Malformed(String),
    /// Reconstructed from a reconciled status observed on another rank.
    Remote,
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::Disconnected => write!(f, "peer disconnected"),
            CommError::SizeMismatch { expected, got } => {
                write!(f, "broadcast size mismatch: expected {}, got {}", expected, got)
            }
            CommError::InvalidRoot { root, size } => {
                write!(f, "root rank {} outside group of {}", root, size)
            }
            CommError::Malformed(msg) => write!(f, "malformed message: {}", msg),
            CommError::Remote => write!(f, "messaging failure on a remote rank"),
        }
    }
}

impl std::error::Error for CommError {}

/// Result type for fabric operations.
pub type CommResult<T> = std::result::Result<T, CommError>;

/// One rank's handle on a communicator group.
///
/// Every method is collective: all ranks of the group must call it, in the
/// same order, or the group deadlocks. The calling thread blocks until the
/// operation completes on this rank.
pub trait Collective: Send {
    /// This rank's index within the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Replicate `buf` from `root` to every rank. On the root the buffer is
    /// the source and is left untouched; on every other rank it is
    /// overwritten. All ranks must pass the same length.
    fn broadcast(&mut self, root: usize, buf: &mut [u8]) -> CommResult<()>;

    /// Broadcast a single `u64`.
    fn broadcast_u64(&mut self, root: usize, value: &mut u64) -> CommResult<()> {
        let mut buf = value.to_le_bytes();
        self.broadcast(root, &mut buf)?;
        *value = u64::from_le_bytes(buf);
        Ok(())
    }

    /// Broadcast a pair of `i32`s (the reconciled status encoding).
    fn broadcast_i32_pair(&mut self, root: usize, value: &mut (i32, i32)) -> CommResult<()> {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&value.0.to_le_bytes());
        buf[4..].copy_from_slice(&value.1.to_le_bytes());
        self.broadcast(root, &mut buf)?;
        value.0 = i32::from_le_bytes(buf[..4].try_into().expect("4 bytes"));
        value.1 = i32::from_le_bytes(buf[4..].try_into().expect("4 bytes"));
        Ok(())
    }

    /// Broadcast a variable-length byte vector: length first, then payload,
    /// in the documented metadata-before-payload order.
    fn broadcast_vec(&mut self, root: usize, value: &mut Vec<u8>) -> CommResult<()> {
        let mut len = value.len() as u64;
        self.broadcast_u64(root, &mut len)?;
        if self.rank() != root {
            value.resize(len as usize, 0);
        }
        if len > 0 {
            self.broadcast(root, value)?;
        }
        Ok(())
    }
}

/// Point-to-point link between the compute root and the I/O root.
pub trait PeerLink: Send {
    /// Deliver one message to the peer.
    fn send(&mut self, bytes: &[u8]) -> CommResult<()>;

    /// Receive one message from the peer, blocking until it arrives.
    fn recv(&mut self) -> CommResult<Vec<u8>>;
}

struct GroupMsg {
    seq: u64,
    bytes: Vec<u8>,
}

/// In-process communicator group endpoint.
///
/// Built by [`local_fabric`]; one endpoint per rank, usually driven by one
/// thread per rank.
pub struct LocalGroup {
    rank: usize,
    txs: Vec<Option<Sender<GroupMsg>>>,
    rx: Receiver<GroupMsg>,
    seq: u64,
    stash: HashMap<u64, Vec<u8>>,
}

impl LocalGroup {
    fn recv_seq(&mut self, seq: u64) -> CommResult<Vec<u8>> {
        if let Some(bytes) = self.stash.remove(&seq) {
            return Ok(bytes);
        }
        loop {
            let msg = self.rx.recv().map_err(|_| CommError::Disconnected)?;
            if msg.seq == seq {
                return Ok(msg.bytes);
            }
            self.stash.insert(msg.seq, msg.bytes);
        }
    }
}

impl Collective for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.txs.len()
    }

    fn broadcast(&mut self, root: usize, buf: &mut [u8]) -> CommResult<()> {
        if root >= self.size() {
            return Err(CommError::InvalidRoot {
                root,
                size: self.size(),
            });
        }
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        if self.rank == root {
            for tx in self.txs.iter().flatten() {
                tx.send(GroupMsg {
                    seq,
                    bytes: buf.to_vec(),
                })
                .map_err(|_| CommError::Disconnected)?;
            }
        } else {
            let bytes = self.recv_seq(seq)?;
            if bytes.len() != buf.len() {
                return Err(CommError::SizeMismatch {
                    expected: buf.len(),
                    got: bytes.len(),
                });
            }
            buf.copy_from_slice(&bytes);
        }
        Ok(())
    }
}

/// Create an in-process communicator group of `n` ranks.
///
/// Returns one endpoint per rank; endpoint `i` is rank `i`.
///
/// # Panics
/// Panics if `n` is 0.
pub fn local_fabric(n: usize) -> Vec<LocalGroup> {
    assert!(n > 0, "group must have at least one rank");

    let mut receivers = Vec::with_capacity(n);
    let mut all_senders: Vec<Vec<Option<Sender<GroupMsg>>>> =
        (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

    for i in 0..n {
        let (tx, rx) = channel();
        receivers.push(rx);
        for (j, senders) in all_senders.iter_mut().enumerate() {
            if i != j {
                senders[i] = Some(tx.clone());
            }
        }
    }

    receivers
        .into_iter()
        .enumerate()
        .zip(all_senders)
        .map(|((rank, rx), txs)| LocalGroup {
            rank,
            txs,
            rx,
            seq: 0,
            stash: HashMap::new(),
        })
        .collect()
}

/// In-process peer link endpoint.
pub struct LocalLink {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl PeerLink for LocalLink {
    fn send(&mut self, bytes: &[u8]) -> CommResult<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| CommError::Disconnected)
    }

    fn recv(&mut self) -> CommResult<Vec<u8>> {
        self.rx.recv().map_err(|_| CommError::Disconnected)
    }
}

/// Create a connected pair of in-process peer links.
pub fn local_link_pair() -> (LocalLink, LocalLink) {
    let (atx, brx) = channel();
    let (btx, arx) = channel();
    (LocalLink { tx: atx, rx: arx }, LocalLink { tx: btx, rx: brx })
}

/// Fabric implementations over real MPI communicators.
#[cfg(feature = "mpi")]
pub mod mpi_fabric {
    use super::{Collective, CommError, CommResult, PeerLink};
    use mpi::collective::Root;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::Communicator;

    /// [`Collective`] over an MPI communicator.
    pub struct MpiGroup<C: Communicator + Send> {
        comm: C,
    }

    impl<C: Communicator + Send> MpiGroup<C> {
        pub fn new(comm: C) -> Self {
            Self { comm }
        }
    }

    impl<C: Communicator + Send> Collective for MpiGroup<C> {
        fn rank(&self) -> usize {
            self.comm.rank() as usize
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }

        fn broadcast(&mut self, root: usize, buf: &mut [u8]) -> CommResult<()> {
            if root >= self.size() {
                return Err(CommError::InvalidRoot {
                    root,
                    size: self.size(),
                });
            }
            self.comm.process_at_rank(root as i32).broadcast_into(buf);
            Ok(())
        }
    }

    /// [`PeerLink`] over tagged MPI point-to-point messages.
    pub struct MpiLink<C: Communicator + Send> {
        comm: C,
        peer: i32,
        tag: i32,
    }

    impl<C: Communicator + Send> MpiLink<C> {
        pub fn new(comm: C, peer: i32, tag: i32) -> Self {
            Self { comm, peer, tag }
        }
    }

    impl<C: Communicator + Send> PeerLink for MpiLink<C> {
        fn send(&mut self, bytes: &[u8]) -> CommResult<()> {
            self.comm
                .process_at_rank(self.peer)
                .send_with_tag(bytes, self.tag);
            Ok(())
        }

        fn recv(&mut self) -> CommResult<Vec<u8>> {
            let (data, _status) = self
                .comm
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Ok(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_broadcast_threaded() {
        let groups = local_fabric(4);
        let mut handles = Vec::new();
        for mut group in groups {
            handles.push(thread::spawn(move || {
                let mut buf = if group.rank() == 1 {
                    vec![7u8, 8, 9]
                } else {
                    vec![0u8; 3]
                };
                group.broadcast(1, &mut buf).unwrap();
                buf
            }));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![7, 8, 9]);
        }
    }

    #[test]
    fn test_broadcast_sequencing_reorders() {
        let mut groups = local_fabric(2);

        // Deliver the second collective's message first.
        let tx = groups[0].txs[1].as_ref().unwrap();
        tx.send(GroupMsg {
            seq: 1,
            bytes: vec![2, 2],
        })
        .unwrap();
        tx.send(GroupMsg {
            seq: 0,
            bytes: vec![1, 1],
        })
        .unwrap();

        let rank1 = &mut groups[1];
        let mut buf = [0u8; 2];
        rank1.broadcast(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 1]);
        rank1.broadcast(0, &mut buf).unwrap();
        assert_eq!(buf, [2, 2]);
    }

    #[test]
    fn test_broadcast_size_mismatch_is_framing_error() {
        let mut groups = local_fabric(2);
        let tx = groups[0].txs[1].as_ref().unwrap();
        tx.send(GroupMsg {
            seq: 0,
            bytes: vec![0; 8],
        })
        .unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(
            groups[1].broadcast(0, &mut buf),
            Err(CommError::SizeMismatch { expected: 4, got: 8 })
        ));
    }

    #[test]
    fn test_broadcast_invalid_root() {
        let mut groups = local_fabric(2);
        let mut buf = [0u8; 1];
        assert!(matches!(
            groups[0].broadcast(5, &mut buf),
            Err(CommError::InvalidRoot { root: 5, size: 2 })
        ));
    }

    #[test]
    fn test_broadcast_vec_resizes_receiver() {
        let groups = local_fabric(2);
        let mut handles = Vec::new();
        for mut group in groups {
            handles.push(thread::spawn(move || {
                let mut value = if group.rank() == 0 {
                    vec![5u8; 10]
                } else {
                    Vec::new()
                };
                group.broadcast_vec(0, &mut value).unwrap();
                value
            }));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![5u8; 10]);
        }
    }

    #[test]
    fn test_link_pair_roundtrip() {
        let (mut a, mut b) = local_link_pair();
        a.send(&[1, 2, 3]).unwrap();
        assert_eq!(b.recv().unwrap(), vec![1, 2, 3]);
        b.send(&[4]).unwrap();
        assert_eq!(a.recv().unwrap(), vec![4]);
    }

    #[test]
    fn test_link_disconnected() {
        let (mut a, b) = local_link_pair();
        drop(b);
        assert!(matches!(a.recv(), Err(CommError::Disconnected)));
    }
}
