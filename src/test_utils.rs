//! Test support: an in-memory catalog and a thread-per-rank harness.
//!
//! Production sessions are assembled from communicator handles the
//! surrounding system owns. For tests, [`build_sessions`] partitions an
//! in-process fabric into the same shapes — a synchronous group with an
//! I/O subset, or disjoint compute and I/O halves — and [`spawn`] drives
//! one OS thread per rank.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{BackendKind, MemDataset};
use crate::catalog::{AttInfo, Catalog, CatalogError, CatalogResult, VarId};
use crate::fabric::{local_fabric, local_link_pair, LocalGroup, LocalLink};
use crate::file::FileHandle;
use crate::session::{Role, Session};
use crate::types::ElemType;

/// Session type used throughout the tests.
pub type LocalSession = Session<LocalGroup, LocalLink>;

/// In-memory [`Catalog`].
///
/// Attribute metadata is predeclared with [`MemCatalog::with_att`]; in the
/// real system the catalog is maintained by the metadata layer as
/// attributes are written, which is outside this core.
#[derive(Debug, Clone, Default)]
pub struct MemCatalog {
    vars: HashMap<VarId, (ElemType, Vec<u64>)>,
    atts: HashMap<(Option<VarId>, String), AttInfo>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, var: VarId, ty: ElemType, dims: &[u64]) -> Self {
        self.vars.insert(var, (ty, dims.to_vec()));
        self
    }

    pub fn with_att(
        mut self,
        var: Option<VarId>,
        name: &str,
        ty: ElemType,
        len: u64,
    ) -> Self {
        self.atts.insert((var, name.to_string()), AttInfo { ty, len });
        self
    }

    /// A dataset with every cataloged variable declared.
    pub fn make_dataset(&self, kind: BackendKind) -> MemDataset {
        let mut ds = MemDataset::new(kind);
        for (&var, (ty, dims)) in &self.vars {
            ds.define_var(var, *ty, dims);
        }
        ds
    }
}

impl Catalog for MemCatalog {
    fn var_type(&self, var: VarId) -> CatalogResult<ElemType> {
        self.vars
            .get(&var)
            .map(|(ty, _)| *ty)
            .ok_or(CatalogError::NoSuchVar(var))
    }

    fn var_ndims(&self, var: VarId) -> CatalogResult<usize> {
        self.vars
            .get(&var)
            .map(|(_, dims)| dims.len())
            .ok_or(CatalogError::NoSuchVar(var))
    }

    fn var_dim_lens(&self, var: VarId) -> CatalogResult<Vec<u64>> {
        self.vars
            .get(&var)
            .map(|(_, dims)| dims.clone())
            .ok_or(CatalogError::NoSuchVar(var))
    }

    fn type_width(&self, ty: ElemType) -> CatalogResult<usize> {
        if ty.is_file_type() {
            Ok(ty.mem_width())
        } else {
            Err(CatalogError::UnknownType(ty))
        }
    }

    fn att(&self, var: Option<VarId>, name: &str) -> CatalogResult<AttInfo> {
        self.atts
            .get(&(var, name.to_string()))
            .copied()
            .ok_or_else(|| CatalogError::NoSuchAtt(name.to_string()))
    }
}

/// Shape of a test session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSpec {
    /// Ranks that issue calls and resolve metadata.
    pub n_compute: usize,
    /// Ranks that perform backend I/O. In synchronous mode these are the
    /// last `n_io` of the compute ranks; in asynchronous mode they are a
    /// disjoint group appended after the compute ranks.
    pub n_io: usize,
    pub async_mode: bool,
}

impl SessionSpec {
    /// Synchronous-collective: `n` ranks, the last `n_io` also doing I/O.
    pub fn sync(n: usize, n_io: usize) -> Self {
        assert!(n_io > 0 && n_io <= n);
        Self {
            n_compute: n,
            n_io,
            async_mode: false,
        }
    }

    /// Asynchronous-split: disjoint compute and I/O halves.
    pub fn split(n_compute: usize, n_io: usize) -> Self {
        assert!(n_compute > 0 && n_io > 0);
        Self {
            n_compute,
            n_io,
            async_mode: true,
        }
    }

    pub fn total(&self) -> usize {
        if self.async_mode {
            self.n_compute + self.n_io
        } else {
            self.n_compute
        }
    }
}

/// Partition an in-process fabric into one session handle per rank.
pub fn build_sessions(spec: &SessionSpec) -> Vec<LocalSession> {
    let total = spec.total();
    let io_start = if spec.async_mode {
        spec.n_compute
    } else {
        spec.n_compute - spec.n_io
    };

    let unions = local_fabric(total);
    let mut computes = if spec.async_mode {
        local_fabric(spec.n_compute)
    } else {
        local_fabric(total)
    }
    .into_iter();
    let mut io_groups = local_fabric(spec.n_io).into_iter();
    let (comp_link, io_link) = local_link_pair();
    let mut comp_link = Some(comp_link);
    let mut io_link = Some(io_link);

    unions
        .into_iter()
        .enumerate()
        .map(|(rank, union)| {
            let mut role = Role::empty();
            let compute_member = !spec.async_mode || rank < spec.n_compute;
            let io_member = rank >= io_start;
            if compute_member {
                role |= Role::COMPUTE;
            }
            if io_member {
                role |= Role::IO;
                if rank == io_start {
                    role |= Role::IO_MASTER;
                }
            }
            let compute = if compute_member {
                computes.next()
            } else {
                None
            };
            let io = if io_member { io_groups.next() } else { None };
            let link = if spec.async_mode && rank == 0 {
                comp_link.take()
            } else if spec.async_mode && rank == io_start {
                io_link.take()
            } else {
                None
            };
            Session::new(union, compute, io, role, spec.async_mode, 0, io_start, link)
        })
        .collect()
}

/// Run one closure per rank, each on its own thread, and collect the
/// per-rank results in rank order.
///
/// `make_file` builds each rank's file handle (I/O ranks get a dataset,
/// the rest none); `body` is the SPMD program.
pub fn spawn<R, MF, F>(spec: SessionSpec, make_file: MF, body: F) -> Vec<R>
where
    MF: Fn(usize, Role) -> FileHandle + Sync,
    F: Fn(usize, &mut LocalSession, &mut FileHandle) -> R + Sync,
    R: Send,
{
    let sessions = build_sessions(&spec);
    std::thread::scope(|s| {
        let make_file = &make_file;
        let body = &body;
        let handles: Vec<_> = sessions
            .into_iter()
            .enumerate()
            .map(|(rank, mut session)| {
                s.spawn(move || {
                    let mut file = make_file(rank, session.role());
                    body(rank, &mut session, &mut file)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// File-handle factory for a catalog/backend pair: I/O ranks get a fresh
/// dataset with the catalog's variables declared, other ranks none.
pub fn file_factory(
    catalog: Arc<MemCatalog>,
    kind: BackendKind,
) -> impl Fn(usize, Role) -> FileHandle + Sync {
    move |_rank, role| {
        let dataset = if role.contains(Role::IO) {
            Some(Box::new(catalog.make_dataset(kind)) as Box<dyn crate::backend::Dataset>)
        } else {
            None
        };
        FileHandle::new(kind, dataset, catalog.clone())
    }
}
