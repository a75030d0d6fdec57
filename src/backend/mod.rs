//! Backend storage invocation.
//!
//! A backend is the pluggable library that encodes bytes for one
//! file-format family. This module defines the [`Dataset`] trait a backend
//! implements for one open file, and the dispatch table that maps
//! (backend kind × element type) to the typed operation record used to
//! drive it. The table is built once per process; a missing entry means
//! the combination is unsupported and yields the same error on every rank.
//!
//! Backends without native multi-rank writes are driven only by the rank
//! the role router flags as master; the other I/O ranks produce the
//! placeholder (null-request) result so request-list indices stay aligned.

pub mod memory;

pub use memory::MemDataset;

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use bitflags::bitflags;

use crate::catalog::VarId;
use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::types::{cast_slice, cast_slice_mut, ElemType, Element};

/// Native-style error codes the built-in backend reports. A real backend
/// wraps its own library's codes instead.
pub mod codes {
    /// Buffer length or alignment does not match the element type.
    pub const BAD_BUFFER: i32 = -50;
    /// No such variable in the dataset.
    pub const NO_SUCH_VAR: i32 = -51;
    /// Region exceeds the variable's declared dimensions.
    pub const OUT_OF_RANGE: i32 = -52;
    /// Text data cannot convert to or from a numeric type.
    pub const TYPE_MISMATCH: i32 = -53;
    /// No such attribute in the dataset.
    pub const NO_SUCH_ATT: i32 = -54;
    /// The dataset does not implement this entry point.
    pub const NOT_SUPPORTED: i32 = -55;
    /// Region rank does not match the variable.
    pub const BAD_GEOMETRY: i32 = -56;
}

/// Error reported by a backend storage library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// The backend's native error code.
    pub code: i32,
    /// Local detail; does not cross rank boundaries.
    pub detail: String,
}

impl BackendError {
    pub fn new(code: i32, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// An error reconstructed from a reconciled status on a rank that did
    /// not observe the original failure.
    pub fn reconciled(code: i32) -> Self {
        Self::new(code, "reconciled from I/O root")
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.detail)
    }
}

impl std::error::Error for BackendError {}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Handle for one outstanding nonblocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHandle(pub u64);

impl RequestHandle {
    /// Sentinel appended by ranks that did not perform the physical write.
    pub const NULL: RequestHandle = RequestHandle(u64::MAX);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

bitflags! {
    /// What a backend kind can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BackendCaps: u32 {
        /// Every I/O rank may call into the backend; without this flag
        /// only the master rank does.
        const MULTI_RANK = 1 << 0;
        /// Puts are nonblocking and return a request handle.
        const NONBLOCKING_PUT = 1 << 1;
    }
}

/// Backend storage family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackendKind {
    /// Master-only writes, nonblocking puts, classic type set.
    Deferred = 1,
    /// Master-only blocking writes, full type set.
    Serial = 2,
    /// Multi-rank blocking writes, full type set.
    Parallel = 3,
}

const CLASSIC_TYPES: &[ElemType] = &[
    ElemType::Byte,
    ElemType::Char,
    ElemType::Short,
    ElemType::Int,
    ElemType::NativeLong,
    ElemType::Float,
    ElemType::Double,
];

const FULL_TYPES: &[ElemType] = &[
    ElemType::Byte,
    ElemType::Char,
    ElemType::Short,
    ElemType::Int,
    ElemType::NativeLong,
    ElemType::Float,
    ElemType::Double,
    ElemType::UByte,
    ElemType::UShort,
    ElemType::UInt,
    ElemType::Int64,
    ElemType::UInt64,
];

impl BackendKind {
    /// Stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code.
    pub fn from_code(code: u8) -> Option<BackendKind> {
        match code {
            1 => Some(BackendKind::Deferred),
            2 => Some(BackendKind::Serial),
            3 => Some(BackendKind::Parallel),
            _ => None,
        }
    }

    pub fn caps(self) -> BackendCaps {
        match self {
            BackendKind::Deferred => BackendCaps::NONBLOCKING_PUT,
            BackendKind::Serial => BackendCaps::empty(),
            BackendKind::Parallel => BackendCaps::MULTI_RANK,
        }
    }

    /// Element types this kind has dispatch entries for.
    pub fn supported_types(self) -> &'static [ElemType] {
        match self {
            BackendKind::Deferred => CLASSIC_TYPES,
            BackendKind::Serial | BackendKind::Parallel => FULL_TYPES,
        }
    }
}

/// One open file's backend handle.
///
/// Entry points are byte-level and tagged with the element type of the
/// caller's buffer; the backend owns the conversion to and from the file
/// type. The dispatch table's typed records validate the byte view before
/// any of these are reached.
pub trait Dataset: Send {
    fn put_att_raw(
        &mut self,
        var: Option<VarId>,
        name: &str,
        file_ty: ElemType,
        mem_ty: ElemType,
        data: &[u8],
    ) -> BackendResult<()>;

    fn get_att_raw(
        &mut self,
        var: Option<VarId>,
        name: &str,
        mem_ty: ElemType,
        out: &mut [u8],
    ) -> BackendResult<()>;

    fn put_region_raw(
        &mut self,
        var: VarId,
        region: &Region,
        mem_ty: ElemType,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Nonblocking put variant. Only reached for kinds with
    /// [`BackendCaps::NONBLOCKING_PUT`].
    fn bput_region_raw(
        &mut self,
        _var: VarId,
        _region: &Region,
        _mem_ty: ElemType,
        _data: &[u8],
    ) -> BackendResult<RequestHandle> {
        Err(BackendError::new(
            codes::NOT_SUPPORTED,
            "nonblocking put not implemented",
        ))
    }

    fn get_region_raw(
        &mut self,
        var: VarId,
        region: &Region,
        mem_ty: ElemType,
        out: &mut [u8],
    ) -> BackendResult<()>;

    /// Best-effort flush of accumulated write buffers. Advisory.
    fn flush(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// Typed operation record: one concrete storage call per operation kind,
/// for one element type.
#[derive(Clone, Copy)]
pub struct ElemOps {
    pub elem: ElemType,
    pub put_att:
        fn(&mut dyn Dataset, Option<VarId>, &str, ElemType, &[u8]) -> BackendResult<()>,
    pub get_att: fn(&mut dyn Dataset, Option<VarId>, &str, &mut [u8]) -> BackendResult<()>,
    pub put_region: fn(&mut dyn Dataset, VarId, &Region, &[u8]) -> BackendResult<()>,
    pub bput_region: fn(&mut dyn Dataset, VarId, &Region, &[u8]) -> BackendResult<RequestHandle>,
    pub get_region: fn(&mut dyn Dataset, VarId, &Region, &mut [u8]) -> BackendResult<()>,
}

fn bad_view(elem: ElemType) -> BackendError {
    BackendError::new(
        codes::BAD_BUFFER,
        format!("buffer is not a whole aligned {:?} slice", elem),
    )
}

fn put_att_typed<T: Element>(
    ds: &mut dyn Dataset,
    var: Option<VarId>,
    name: &str,
    file_ty: ElemType,
    data: &[u8],
) -> BackendResult<()> {
    if cast_slice::<T>(data).is_none() {
        return Err(bad_view(T::ELEM));
    }
    ds.put_att_raw(var, name, file_ty, T::ELEM, data)
}

fn get_att_typed<T: Element>(
    ds: &mut dyn Dataset,
    var: Option<VarId>,
    name: &str,
    out: &mut [u8],
) -> BackendResult<()> {
    if cast_slice_mut::<T>(out).is_none() {
        return Err(bad_view(T::ELEM));
    }
    ds.get_att_raw(var, name, T::ELEM, out)
}

fn put_region_typed<T: Element>(
    ds: &mut dyn Dataset,
    var: VarId,
    region: &Region,
    data: &[u8],
) -> BackendResult<()> {
    if cast_slice::<T>(data).is_none() {
        return Err(bad_view(T::ELEM));
    }
    ds.put_region_raw(var, region, T::ELEM, data)
}

fn bput_region_typed<T: Element>(
    ds: &mut dyn Dataset,
    var: VarId,
    region: &Region,
    data: &[u8],
) -> BackendResult<RequestHandle> {
    if cast_slice::<T>(data).is_none() {
        return Err(bad_view(T::ELEM));
    }
    ds.bput_region_raw(var, region, T::ELEM, data)
}

fn get_region_typed<T: Element>(
    ds: &mut dyn Dataset,
    var: VarId,
    region: &Region,
    out: &mut [u8],
) -> BackendResult<()> {
    if cast_slice_mut::<T>(out).is_none() {
        return Err(bad_view(T::ELEM));
    }
    ds.get_region_raw(var, region, T::ELEM, out)
}

// Text and the native-long pseudo-type have no Element impl (their Rust
// types collide with UByte/Int64), so their records validate by width and
// tag the raw call explicitly.

fn whole_width(data_len: usize, elem: ElemType) -> bool {
    data_len % elem.mem_width() == 0
}

impl ElemOps {
    fn of<T: Element>() -> ElemOps {
        ElemOps {
            elem: T::ELEM,
            put_att: put_att_typed::<T>,
            get_att: get_att_typed::<T>,
            put_region: put_region_typed::<T>,
            bput_region: bput_region_typed::<T>,
            get_region: get_region_typed::<T>,
        }
    }

    fn text() -> ElemOps {
        ElemOps {
            elem: ElemType::Char,
            put_att: |ds, var, name, file_ty, data| {
                ds.put_att_raw(var, name, file_ty, ElemType::Char, data)
            },
            get_att: |ds, var, name, out| ds.get_att_raw(var, name, ElemType::Char, out),
            put_region: |ds, var, region, data| {
                ds.put_region_raw(var, region, ElemType::Char, data)
            },
            bput_region: |ds, var, region, data| {
                ds.bput_region_raw(var, region, ElemType::Char, data)
            },
            get_region: |ds, var, region, out| {
                ds.get_region_raw(var, region, ElemType::Char, out)
            },
        }
    }

    fn native_long() -> ElemOps {
        ElemOps {
            elem: ElemType::NativeLong,
            put_att: |ds, var, name, file_ty, data| {
                if !whole_width(data.len(), ElemType::NativeLong) {
                    return Err(bad_view(ElemType::NativeLong));
                }
                ds.put_att_raw(var, name, file_ty, ElemType::NativeLong, data)
            },
            get_att: |ds, var, name, out| {
                if !whole_width(out.len(), ElemType::NativeLong) {
                    return Err(bad_view(ElemType::NativeLong));
                }
                ds.get_att_raw(var, name, ElemType::NativeLong, out)
            },
            put_region: |ds, var, region, data| {
                if !whole_width(data.len(), ElemType::NativeLong) {
                    return Err(bad_view(ElemType::NativeLong));
                }
                ds.put_region_raw(var, region, ElemType::NativeLong, data)
            },
            bput_region: |ds, var, region, data| {
                if !whole_width(data.len(), ElemType::NativeLong) {
                    return Err(bad_view(ElemType::NativeLong));
                }
                ds.bput_region_raw(var, region, ElemType::NativeLong, data)
            },
            get_region: |ds, var, region, out| {
                if !whole_width(out.len(), ElemType::NativeLong) {
                    return Err(bad_view(ElemType::NativeLong));
                }
                ds.get_region_raw(var, region, ElemType::NativeLong, out)
            },
        }
    }

    fn for_elem(elem: ElemType) -> ElemOps {
        match elem {
            ElemType::Byte => ElemOps::of::<i8>(),
            ElemType::Char => ElemOps::text(),
            ElemType::Short => ElemOps::of::<i16>(),
            ElemType::Int => ElemOps::of::<i32>(),
            ElemType::Float => ElemOps::of::<f32>(),
            ElemType::Double => ElemOps::of::<f64>(),
            ElemType::UByte => ElemOps::of::<u8>(),
            ElemType::UShort => ElemOps::of::<u16>(),
            ElemType::UInt => ElemOps::of::<u32>(),
            ElemType::Int64 => ElemOps::of::<i64>(),
            ElemType::UInt64 => ElemOps::of::<u64>(),
            ElemType::NativeLong => ElemOps::native_long(),
        }
    }
}

/// The (backend kind × element type) dispatch table.
pub struct DispatchTable {
    entries: HashMap<(BackendKind, ElemType), ElemOps>,
}

impl DispatchTable {
    fn build() -> Self {
        let mut entries = HashMap::new();
        for kind in [
            BackendKind::Deferred,
            BackendKind::Serial,
            BackendKind::Parallel,
        ] {
            for &elem in kind.supported_types() {
                entries.insert((kind, elem), ElemOps::for_elem(elem));
            }
        }
        Self { entries }
    }

    pub fn get(&self, kind: BackendKind, elem: ElemType) -> Option<&ElemOps> {
        self.entries.get(&(kind, elem))
    }
}

static TABLE: OnceLock<DispatchTable> = OnceLock::new();

/// Look up the typed operation record for a (kind, element type) pair.
///
/// An absent entry is the hard `UnsupportedType` error; no fallback to
/// another backend is attempted.
pub fn lookup(kind: BackendKind, elem: ElemType) -> Result<&'static ElemOps> {
    TABLE
        .get_or_init(DispatchTable::build)
        .get(kind, elem)
        .ok_or(Error::UnsupportedType { kind, elem })
}
