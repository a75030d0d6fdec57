//! Error types for collio.
//!
//! Every error class carries a stable wire code so that an outcome observed
//! by one rank (usually the I/O root) can be reconciled across the whole
//! group through the broadcast fabric: the observing rank encodes
//! `(class, detail)` as two `i32`s, every other rank decodes the same pair
//! and reconstructs an error of the identical class.

use std::fmt;

use crate::backend::{BackendError, BackendKind};
use crate::catalog::CatalogError;
use crate::fabric::CommError;
use crate::types::ElemType;

/// Error type for collio operations.
#[derive(Debug)]
pub enum Error {
    /// A caller-contract violation detected from purely local arguments.
    InvalidArg(&'static str),
    /// Attribute name exceeds the maximum allowed length.
    NameTooLong { len: usize, max: usize },
    /// The selected backend has no entry for this element type.
    UnsupportedType { kind: BackendKind, elem: ElemType },
    /// The backend storage library reported a failure.
    Backend(BackendError),
    /// Request-list or placeholder growth failed.
    OutOfMemory,
    /// Broadcast or dispatch-channel failure.
    Messaging(CommError),
    /// Metadata catalog lookup failed during parameter resolution.
    Metadata(CatalogError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArg(what) => write!(f, "invalid argument: {}", what),
            Error::NameTooLong { len, max } => {
                write!(f, "attribute name too long: {} bytes, max {}", len, max)
            }
            Error::UnsupportedType { kind, elem } => {
                write!(f, "element type {:?} not supported by backend {:?}", elem, kind)
            }
            Error::Backend(e) => write!(f, "backend failure: {}", e),
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::Messaging(e) => write!(f, "messaging failure: {}", e),
            Error::Metadata(e) => write!(f, "metadata lookup failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Backend(e) => Some(e),
            Error::Messaging(e) => Some(e),
            Error::Metadata(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for Error {
    fn from(e: BackendError) -> Self {
        Error::Backend(e)
    }
}

impl From<CommError> for Error {
    fn from(e: CommError) -> Self {
        Error::Messaging(e)
    }
}

impl From<CatalogError> for Error {
    fn from(e: CatalogError) -> Self {
        Error::Metadata(e)
    }
}

/// Result type for collio operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Wire status class codes. `STATUS_OK` is zero; every error class is a
/// distinct negative value.
pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_ARG: i32 = -1;
pub const STATUS_UNSUPPORTED_TYPE: i32 = -2;
pub const STATUS_BACKEND: i32 = -3;
pub const STATUS_NOMEM: i32 = -4;
pub const STATUS_MESSAGING: i32 = -5;
pub const STATUS_METADATA: i32 = -6;

impl Error {
    /// Encode this error as a `(class, detail)` pair for status
    /// reconciliation. `detail` is the backend's native code for
    /// `Backend`, and a packed `(kind, elem)` pair for `UnsupportedType`.
    pub fn to_wire(&self) -> (i32, i32) {
        match self {
            Error::InvalidArg(_) | Error::NameTooLong { .. } => (STATUS_INVALID_ARG, 0),
            Error::UnsupportedType { kind, elem } => (
                STATUS_UNSUPPORTED_TYPE,
                ((kind.code() as i32) << 8) | elem.code() as i32,
            ),
            Error::Backend(e) => (STATUS_BACKEND, e.code),
            Error::OutOfMemory => (STATUS_NOMEM, 0),
            Error::Messaging(_) => (STATUS_MESSAGING, 0),
            Error::Metadata(_) => (STATUS_METADATA, 0),
        }
    }

    /// Reconstruct an error from a reconciled `(class, detail)` pair.
    ///
    /// Returns `None` for `STATUS_OK`. The reconstructed error carries the
    /// class and any detail that survived the wire, not the local message
    /// the observing rank saw.
    pub fn from_wire(class: i32, detail: i32) -> Option<Error> {
        match class {
            STATUS_OK => None,
            STATUS_INVALID_ARG => Some(Error::InvalidArg("reconciled from remote rank")),
            STATUS_UNSUPPORTED_TYPE => {
                let kind = BackendKind::from_code((detail >> 8) as u8)
                    .unwrap_or(BackendKind::Serial);
                let elem = ElemType::from_code((detail & 0xff) as u8)
                    .unwrap_or(ElemType::Byte);
                Some(Error::UnsupportedType { kind, elem })
            }
            STATUS_BACKEND => Some(Error::Backend(BackendError::reconciled(detail))),
            STATUS_NOMEM => Some(Error::OutOfMemory),
            STATUS_MESSAGING => Some(Error::Messaging(CommError::Remote)),
            STATUS_METADATA => Some(Error::Metadata(CatalogError::Remote)),
            _ => Some(Error::Messaging(CommError::Malformed(format!(
                "unknown status class {}",
                class
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip_classes() {
        let cases = [
            Error::InvalidArg("x"),
            Error::UnsupportedType {
                kind: BackendKind::Deferred,
                elem: ElemType::UInt64,
            },
            Error::Backend(BackendError::new(-51, "bounds")),
            Error::OutOfMemory,
            Error::Messaging(CommError::Disconnected),
            Error::Metadata(CatalogError::NoSuchVar(7)),
        ];
        for err in cases {
            let (class, detail) = err.to_wire();
            let back = Error::from_wire(class, detail).expect("error class");
            assert_eq!(back.to_wire().0, class);
        }
    }

    #[test]
    fn test_wire_ok_is_none() {
        assert!(Error::from_wire(STATUS_OK, 0).is_none());
    }

    #[test]
    fn test_unsupported_type_detail_survives() {
        let err = Error::UnsupportedType {
            kind: BackendKind::Deferred,
            elem: ElemType::UInt64,
        };
        let (class, detail) = err.to_wire();
        match Error::from_wire(class, detail) {
            Some(Error::UnsupportedType { kind, elem }) => {
                assert_eq!(kind, BackendKind::Deferred);
                assert_eq!(elem, ElemType::UInt64);
            }
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_backend_native_code_survives() {
        let err = Error::Backend(BackendError::new(-77, "local detail"));
        let (class, detail) = err.to_wire();
        match Error::from_wire(class, detail) {
            Some(Error::Backend(e)) => assert_eq!(e.code, -77),
            other => panic!("expected Backend, got {:?}", other),
        }
    }
}
