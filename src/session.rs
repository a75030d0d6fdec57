//! Session: the fixed role partition of the process group.
//!
//! A session is created once, at program start, from communicator handles
//! the surrounding system already built. It is never re-partitioned: the
//! role flags, the root ranks and the synchronous/asynchronous mode are
//! immutable for the session's lifetime.

use bitflags::bitflags;

use crate::fabric::{Collective, CommResult, PeerLink};

bitflags! {
    /// Per-rank role assignment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Role: u8 {
        /// Issues I/O calls and resolves metadata.
        const COMPUTE = 1 << 0;
        /// Performs backend storage calls.
        const IO = 1 << 1;
        /// The single I/O rank that physically invokes a backend lacking
        /// multi-rank writes. Always implies `IO`.
        const IO_MASTER = 1 << 2;
    }
}

/// One rank's handle on the session.
///
/// `C` is the collective group implementation, `L` the peer link used by
/// the async dispatch channel. The union group spans every rank; the
/// compute and I/O sub-groups are present only on ranks that belong to
/// them, and the link only on the two roots.
pub struct Session<C: Collective, L: PeerLink> {
    union: C,
    compute: Option<C>,
    io: Option<C>,
    role: Role,
    async_mode: bool,
    /// Union rank of the compute root (source of resolved metadata).
    comp_root: usize,
    /// Union rank of the I/O root (source of payloads and statuses).
    io_root: usize,
    /// Envelope link; `Some` on the compute root and the I/O root only.
    link: Option<L>,
}

impl<C: Collective, L: PeerLink> Session<C, L> {
    /// Assemble a session from pre-built communicator handles.
    ///
    /// # Panics
    /// Panics if `IO_MASTER` is claimed without `IO`, or if a rank claims
    /// `IO` without an I/O sub-group handle.
    pub fn new(
        union: C,
        compute: Option<C>,
        io: Option<C>,
        role: Role,
        async_mode: bool,
        comp_root: usize,
        io_root: usize,
        link: Option<L>,
    ) -> Self {
        assert!(
            !role.contains(Role::IO_MASTER) || role.contains(Role::IO),
            "IO_MASTER requires IO"
        );
        assert!(
            !role.contains(Role::IO) || io.is_some(),
            "IO role requires an I/O sub-group handle"
        );
        // The I/O root re-broadcasts envelopes within the I/O group; it
        // must be rank 0 of that group.
        if let Some(io_group) = &io {
            if union.rank() == io_root {
                assert_eq!(io_group.rank(), 0, "I/O root must be I/O group rank 0");
            }
        }
        Self {
            union,
            compute,
            io,
            role,
            async_mode,
            comp_root,
            io_root,
            link,
        }
    }

    /// This rank's index in the union group.
    pub fn rank(&self) -> usize {
        self.union.rank()
    }

    /// Number of ranks in the union group.
    pub fn size(&self) -> usize {
        self.union.size()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_compute(&self) -> bool {
        self.role.contains(Role::COMPUTE)
    }

    pub fn is_io(&self) -> bool {
        self.role.contains(Role::IO)
    }

    pub fn is_io_master(&self) -> bool {
        self.role.contains(Role::IO_MASTER)
    }

    /// Whether the session runs compute and I/O as disjoint halves.
    pub fn async_mode(&self) -> bool {
        self.async_mode
    }

    /// Whether this rank resolves metadata locally: every rank in
    /// synchronous mode, compute ranks only in asynchronous mode.
    pub fn resolves_locally(&self) -> bool {
        !self.async_mode || !self.is_io()
    }

    pub fn comp_root(&self) -> usize {
        self.comp_root
    }

    pub fn io_root(&self) -> usize {
        self.io_root
    }

    pub fn is_comp_root(&self) -> bool {
        self.rank() == self.comp_root
    }

    pub fn is_io_root(&self) -> bool {
        self.rank() == self.io_root
    }

    /// The union group, for whole-group broadcasts.
    pub fn union_mut(&mut self) -> &mut C {
        &mut self.union
    }

    /// The compute sub-group, present on compute ranks.
    pub fn compute_group_mut(&mut self) -> Option<&mut C> {
        self.compute.as_mut()
    }

    /// The I/O sub-group, present on I/O ranks.
    pub fn io_group_mut(&mut self) -> Option<&mut C> {
        self.io.as_mut()
    }

    /// Ship envelope bytes to the peer root. Valid on the two roots only.
    pub fn link_send(&mut self, bytes: &[u8]) -> CommResult<()> {
        match &mut self.link {
            Some(link) => link.send(bytes),
            None => Err(crate::fabric::CommError::Disconnected),
        }
    }

    /// Receive envelope bytes from the peer root. Valid on the two roots
    /// only.
    pub fn link_recv(&mut self) -> CommResult<Vec<u8>> {
        match &mut self.link {
            Some(link) => link.recv(),
            None => Err(crate::fabric::CommError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::{local_fabric, LocalLink};

    fn solo() -> Vec<crate::fabric::LocalGroup> {
        local_fabric(1)
    }

    #[test]
    fn test_roles() {
        let union = solo().pop().unwrap();
        let io = solo().pop().unwrap();
        let compute = solo().pop().unwrap();
        let s: Session<_, LocalLink> = Session::new(
            union,
            Some(compute),
            Some(io),
            Role::COMPUTE | Role::IO | Role::IO_MASTER,
            false,
            0,
            0,
            None,
        );
        assert!(s.is_compute());
        assert!(s.is_io());
        assert!(s.is_io_master());
        assert!(s.resolves_locally());
    }

    #[test]
    fn test_async_io_rank_does_not_resolve() {
        let union = solo().pop().unwrap();
        let io = solo().pop().unwrap();
        let s: Session<_, LocalLink> =
            Session::new(union, None, Some(io), Role::IO, true, 0, 0, None);
        assert!(!s.resolves_locally());
    }

    #[test]
    fn test_sync_io_rank_resolves() {
        let union = solo().pop().unwrap();
        let io = solo().pop().unwrap();
        let compute = solo().pop().unwrap();
        let s: Session<_, LocalLink> = Session::new(
            union,
            Some(compute),
            Some(io),
            Role::COMPUTE | Role::IO,
            false,
            0,
            0,
            None,
        );
        assert!(s.resolves_locally());
    }

    #[test]
    #[should_panic(expected = "IO_MASTER requires IO")]
    fn test_master_without_io_rejected() {
        let union = solo().pop().unwrap();
        let _: Session<_, LocalLink> =
            Session::new(union, None, None, Role::IO_MASTER, false, 0, 0, None);
    }
}
