//! # collio - Collective dispatch for type-generic array I/O
//!
//! This crate is the dispatch core of a parallel array-storage stack: a
//! fixed group of cooperating processes reads and writes multidimensional
//! variables and attributes of a shared structured file, while the core
//! hides (a) which element type the caller used versus the type stored on
//! disk, (b) whether file I/O runs on every rank or on a dedicated I/O
//! sub-group, and (c) which backend storage library encodes the bytes.
//!
//! ## Model
//!
//! Every public operation is collective: all ranks of the session's union
//! group call it with the same arguments and reach the same
//! synchronization points in the same order. In synchronous mode each
//! rank resolves metadata redundantly and the I/O subset touches the
//! backend; in split-role mode only compute ranks resolve, and one
//! serialized envelope per call carries the transfer to the I/O half.
//! Whatever the outcome, every rank observes it identically - statuses
//! and read payloads are replicated from the I/O root before the call
//! returns.
//!
//! ## Usage
//!
//! ```ignore
//! use collio::{dispatch, BackendKind, FileHandle, Session};
//!
//! // Session and file handles come from the surrounding system; the
//! // same code runs unchanged on every rank.
//! let mut written = [0f64; 10];
//! dispatch::put_array_as(&mut session, &mut file, var, Some(&[0]), Some(&[10]), None, &data)?;
//! dispatch::get_array_as(&mut session, &mut file, var, Some(&[0]), Some(&[10]), None, &mut written)?;
//! ```
//!
//! ## Architecture
//!
//! - [`types`]: element types and typed/byte buffer views
//! - [`geometry`]: start/count/stride handling
//! - [`catalog`]: read-only metadata catalog interface
//! - [`resolve`]: per-call parameter resolution
//! - [`fabric`]: collective broadcast + peer link abstractions, with an
//!   in-process implementation (`mpi` feature: MPI-backed adapters)
//! - [`envelope`]: dispatch-channel wire format
//! - [`session`]: role partition and group handles
//! - [`backend`]: dataset trait, dispatch table, in-memory backend
//! - [`request`]: nonblocking request tracking
//! - [`file`]: per-file dispatch context
//! - [`dispatch`]: role router and the public operation family
//! - [`test_utils`]: in-memory catalog and thread-per-rank harness

pub mod backend;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod fabric;
pub mod file;
pub mod geometry;
pub mod request;
pub mod resolve;
pub mod session;
pub mod test_utils;
pub mod types;

// Re-export main types
pub use backend::{BackendCaps, BackendError, BackendKind, Dataset, MemDataset, RequestHandle};
pub use catalog::{AttInfo, Catalog, CatalogError, VarId, MAX_NAME};
pub use config::TrackerConfig;
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use fabric::{Collective, CommError, LocalGroup, LocalLink, PeerLink};
pub use file::FileHandle;
pub use geometry::{Geometry, Region};
pub use request::VarTracker;
pub use session::{Role, Session};
pub use types::{ElemType, Element};
