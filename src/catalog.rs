//! Metadata catalog interface.
//!
//! The catalog — variable dimensionality, dimension lengths, declared types,
//! named-type byte widths, attribute metadata — is owned by the surrounding
//! system. This core only reads it, and only on ranks that hold callsite
//! context (every rank in synchronous mode, compute ranks in split-role
//! mode).

use std::fmt;

use crate::types::ElemType;

/// Identifies a variable within one file.
pub type VarId = u32;

/// Maximum accepted attribute name length in bytes.
pub const MAX_NAME: usize = 256;

/// Metadata for one named attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttInfo {
    /// Declared type of the attribute in the file.
    pub ty: ElemType,
    /// Number of elements in the attribute array.
    pub len: u64,
}

/// Read-only view of the variable/dimension/type metadata for one file.
pub trait Catalog: Send + Sync {
    /// Declared file type of a variable.
    fn var_type(&self, var: VarId) -> CatalogResult<ElemType>;

    /// Number of dimensions of a variable (0 for scalars).
    fn var_ndims(&self, var: VarId) -> CatalogResult<usize>;

    /// Declared length of each of a variable's dimensions.
    fn var_dim_lens(&self, var: VarId) -> CatalogResult<Vec<u64>>;

    /// Byte width of one element of a named file type.
    fn type_width(&self, ty: ElemType) -> CatalogResult<usize>;

    /// Type and length of a named attribute. `var` of `None` addresses the
    /// file-global attribute set.
    fn att(&self, var: Option<VarId>, name: &str) -> CatalogResult<AttInfo>;
}

/// Error type for catalog lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No variable with this id.
    NoSuchVar(VarId),
    /// No attribute with this name on the addressed variable.
    NoSuchAtt(String),
    /// The type has no catalog entry (e.g. a memory-only pseudo-type).
    UnknownType(ElemType),
    /// Reconstructed from a reconciled status; the detail stayed on the
    /// rank that observed the original failure.
    Remote,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NoSuchVar(id) => write!(f, "no variable with id {}", id),
            CatalogError::NoSuchAtt(name) => write!(f, "no attribute named {:?}", name),
            CatalogError::UnknownType(ty) => write!(f, "type {:?} has no catalog entry", ty),
            CatalogError::Remote => write!(f, "metadata failure on a remote rank"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Result type for catalog lookups.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
