//! Parameter resolution.
//!
//! Computes the per-call quantities the rest of the pipeline consumes:
//! element types, per-element byte widths, dimensionality and element
//! count. Resolution runs only on ranks that hold callsite context; the
//! resolved values reach every other rank through the envelope and the
//! derived-value broadcasts, bit-identical.

use std::os::raw::c_long;

use crate::catalog::{Catalog, VarId};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::types::ElemType;

/// Resolved quantities for one array transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTransfer {
    /// Element type of the caller's buffer.
    pub mem_ty: ElemType,
    /// Byte width of one buffer element.
    pub mem_width: usize,
    /// Variable dimensionality (0 for scalars).
    pub ndims: usize,
    /// Elements the transfer touches (1 for scalars).
    pub num_elem: u64,
}

/// Resolved quantities for one attribute read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAttGet {
    pub att_ty: ElemType,
    pub att_len: u64,
    pub att_width: usize,
    pub mem_ty: ElemType,
    pub mem_width: usize,
}

/// Byte width of a memory-side element type.
///
/// The native-long pseudo-type has a fixed platform width and no catalog
/// entry; every other type is looked up.
pub fn mem_type_width(catalog: &dyn Catalog, ty: ElemType) -> Result<usize> {
    if ty == ElemType::NativeLong {
        Ok(std::mem::size_of::<c_long>())
    } else {
        Ok(catalog.type_width(ty)?)
    }
}

/// Resolve an array transfer. A `None` memory type means "the variable's
/// declared file type". Geometry is validated here so a bad call aborts
/// before any message is sent.
pub fn resolve_array(
    catalog: &dyn Catalog,
    var: VarId,
    mem_ty: Option<ElemType>,
    geom: &Geometry,
) -> Result<ResolvedTransfer> {
    let file_ty = catalog.var_type(var)?;
    let mem_ty = mem_ty.unwrap_or(file_ty);
    let mem_width = mem_type_width(catalog, mem_ty)?;
    let ndims = catalog.var_ndims(var)?;
    let num_elem = geom.resolve(ndims)?.element_count();
    Ok(ResolvedTransfer {
        mem_ty,
        mem_width,
        ndims,
        num_elem,
    })
}

/// Resolve the byte widths for an attribute write.
pub fn resolve_att_put(
    catalog: &dyn Catalog,
    file_ty: ElemType,
    mem_ty: ElemType,
) -> Result<(usize, usize)> {
    if !file_ty.is_file_type() {
        return Err(Error::InvalidArg(
            "attribute file type has no on-disk representation",
        ));
    }
    let file_width = catalog.type_width(file_ty)?;
    let mem_width = mem_type_width(catalog, mem_ty)?;
    Ok((file_width, mem_width))
}

/// Resolve an attribute read: the attribute's declared type and length
/// plus the byte widths of both sides.
pub fn resolve_att_get(
    catalog: &dyn Catalog,
    var: Option<VarId>,
    name: &str,
    mem_ty: ElemType,
) -> Result<ResolvedAttGet> {
    let info = catalog.att(var, name)?;
    let att_width = catalog.type_width(info.ty)?;
    let mem_width = mem_type_width(catalog, mem_ty)?;
    Ok(ResolvedAttGet {
        att_ty: info.ty,
        att_len: info.len,
        att_width,
        mem_ty,
        mem_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemCatalog;

    fn catalog() -> MemCatalog {
        MemCatalog::new()
            .with_var(0, ElemType::Double, &[10])
            .with_var(1, ElemType::Int, &[])
            .with_att(Some(0), "units", ElemType::Char, 6)
    }

    #[test]
    fn test_resolve_array_defaults_to_file_type() {
        let cat = catalog();
        let geom = Geometry::from_parts(Some(&[0]), Some(&[10]), None);
        let t = resolve_array(&cat, 0, None, &geom).unwrap();
        assert_eq!(t.mem_ty, ElemType::Double);
        assert_eq!(t.mem_width, 8);
        assert_eq!(t.ndims, 1);
        assert_eq!(t.num_elem, 10);
    }

    #[test]
    fn test_resolve_scalar_is_one_element() {
        let cat = catalog();
        let t = resolve_array(&cat, 1, Some(ElemType::Double), &Geometry::default()).unwrap();
        assert_eq!(t.ndims, 0);
        assert_eq!(t.num_elem, 1);
    }

    #[test]
    fn test_native_long_width_skips_catalog() {
        let cat = catalog();
        // The catalog has no entry for the pseudo-type, yet resolution
        // succeeds with the platform width.
        let w = mem_type_width(&cat, ElemType::NativeLong).unwrap();
        assert_eq!(w, std::mem::size_of::<std::os::raw::c_long>());
    }

    #[test]
    fn test_unknown_var_is_metadata_error() {
        let cat = catalog();
        let geom = Geometry::from_parts(Some(&[0]), Some(&[1]), None);
        assert!(matches!(
            resolve_array(&cat, 99, None, &geom),
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn test_missing_geometry_is_invalid_arg() {
        let cat = catalog();
        assert!(matches!(
            resolve_array(&cat, 0, None, &Geometry::default()),
            Err(Error::InvalidArg(_))
        ));
    }

    #[test]
    fn test_att_put_rejects_memory_only_file_type() {
        let cat = catalog();
        assert!(matches!(
            resolve_att_put(&cat, ElemType::NativeLong, ElemType::Int),
            Err(Error::InvalidArg(_))
        ));
        let (fw, mw) = resolve_att_put(&cat, ElemType::Double, ElemType::Int).unwrap();
        assert_eq!((fw, mw), (8, 4));
    }

    #[test]
    fn test_att_get_resolution() {
        let cat = catalog();
        let r = resolve_att_get(&cat, Some(0), "units", ElemType::Char).unwrap();
        assert_eq!(r.att_ty, ElemType::Char);
        assert_eq!(r.att_len, 6);
        assert_eq!(r.att_width, 1);
        assert_eq!(r.mem_width, 1);
    }
}
