//! In-memory reference backend.
//!
//! Stores each variable as file-typed bytes and converts to and from the
//! caller's memory type on access, which is the contract every real
//! backend honors. Nonblocking puts are applied eagerly; the returned
//! handles track outstanding-request accounting until [`Dataset::flush`]
//! completes them.

use std::collections::HashMap;
use std::os::raw::c_long;

use slab::Slab;

use super::{codes, BackendError, BackendKind, BackendResult, Dataset, RequestHandle};
use crate::catalog::VarId;
use crate::geometry::Region;
use crate::types::ElemType;

#[derive(Clone, Copy)]
enum NumVal {
    I64(i64),
    U64(u64),
    F64(f64),
}

fn read_val(bytes: &[u8], ty: ElemType, idx: usize) -> NumVal {
    let w = ty.mem_width();
    let off = idx * w;
    let raw = &bytes[off..off + w];
    match ty {
        ElemType::Byte => NumVal::I64(i8::from_ne_bytes(raw.try_into().expect("1 byte")) as i64),
        ElemType::Char | ElemType::UByte => NumVal::U64(raw[0] as u64),
        ElemType::Short => {
            NumVal::I64(i16::from_ne_bytes(raw.try_into().expect("2 bytes")) as i64)
        }
        ElemType::UShort => {
            NumVal::U64(u16::from_ne_bytes(raw.try_into().expect("2 bytes")) as u64)
        }
        ElemType::Int => NumVal::I64(i32::from_ne_bytes(raw.try_into().expect("4 bytes")) as i64),
        ElemType::UInt => NumVal::U64(u32::from_ne_bytes(raw.try_into().expect("4 bytes")) as u64),
        ElemType::Float => {
            NumVal::F64(f32::from_ne_bytes(raw.try_into().expect("4 bytes")) as f64)
        }
        ElemType::Double => NumVal::F64(f64::from_ne_bytes(raw.try_into().expect("8 bytes"))),
        ElemType::Int64 => NumVal::I64(i64::from_ne_bytes(raw.try_into().expect("8 bytes"))),
        ElemType::UInt64 => NumVal::U64(u64::from_ne_bytes(raw.try_into().expect("8 bytes"))),
        ElemType::NativeLong => {
            NumVal::I64(c_long::from_ne_bytes(raw.try_into().expect("long")) as i64)
        }
    }
}

macro_rules! write_as {
    ($bytes:expr, $off:expr, $v:expr, $ty:ty) => {{
        let x: $ty = match $v {
            NumVal::I64(i) => i as $ty,
            NumVal::U64(u) => u as $ty,
            NumVal::F64(f) => f as $ty,
        };
        let raw = x.to_ne_bytes();
        $bytes[$off..$off + raw.len()].copy_from_slice(&raw);
    }};
}

fn write_val(bytes: &mut [u8], ty: ElemType, idx: usize, v: NumVal) {
    let off = idx * ty.mem_width();
    match ty {
        ElemType::Byte => write_as!(bytes, off, v, i8),
        ElemType::Char | ElemType::UByte => write_as!(bytes, off, v, u8),
        ElemType::Short => write_as!(bytes, off, v, i16),
        ElemType::UShort => write_as!(bytes, off, v, u16),
        ElemType::Int => write_as!(bytes, off, v, i32),
        ElemType::UInt => write_as!(bytes, off, v, u32),
        ElemType::Float => write_as!(bytes, off, v, f32),
        ElemType::Double => write_as!(bytes, off, v, f64),
        ElemType::Int64 => write_as!(bytes, off, v, i64),
        ElemType::UInt64 => write_as!(bytes, off, v, u64),
        ElemType::NativeLong => write_as!(bytes, off, v, c_long),
    }
}

/// Convert `n` elements between element types. Text converts only to
/// itself.
fn convert(
    src: &[u8],
    src_ty: ElemType,
    dst: &mut [u8],
    dst_ty: ElemType,
    n: usize,
) -> BackendResult<()> {
    debug_assert_eq!(src.len(), n * src_ty.mem_width());
    debug_assert_eq!(dst.len(), n * dst_ty.mem_width());
    if src_ty == dst_ty {
        dst.copy_from_slice(src);
        return Ok(());
    }
    if src_ty == ElemType::Char || dst_ty == ElemType::Char {
        return Err(BackendError::new(
            codes::TYPE_MISMATCH,
            "text data does not convert to numeric types",
        ));
    }
    for i in 0..n {
        write_val(dst, dst_ty, i, read_val(src, src_ty, i));
    }
    Ok(())
}

struct VarStore {
    file_ty: ElemType,
    dims: Vec<u64>,
    bytes: Vec<u8>,
}

struct AttStore {
    file_ty: ElemType,
    len: u64,
    bytes: Vec<u8>,
}

struct PendingWrite {
    #[allow(dead_code)]
    bytes: usize,
}

/// In-memory [`Dataset`].
pub struct MemDataset {
    kind: BackendKind,
    vars: HashMap<VarId, VarStore>,
    atts: HashMap<(Option<VarId>, String), AttStore>,
    pending: Slab<PendingWrite>,
    flushes: u64,
}

impl MemDataset {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            vars: HashMap::new(),
            atts: HashMap::new(),
            pending: Slab::new(),
            flushes: 0,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Declare a variable's file type and dimensions, zero-filled.
    ///
    /// # Panics
    /// Panics if the type is memory-only or the variable already exists.
    pub fn define_var(&mut self, var: VarId, file_ty: ElemType, dims: &[u64]) {
        assert!(file_ty.is_file_type(), "memory-only type in file");
        let total: u64 = dims.iter().product();
        let store = VarStore {
            file_ty,
            dims: dims.to_vec(),
            bytes: vec![0; total as usize * file_ty.mem_width()],
        };
        let prev = self.vars.insert(var, store);
        assert!(prev.is_none(), "variable {} already defined", var);
    }

    /// Outstanding nonblocking requests not yet completed by a flush.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Number of flushes performed.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn var(&self, var: VarId) -> BackendResult<&VarStore> {
        self.vars
            .get(&var)
            .ok_or_else(|| BackendError::new(codes::NO_SUCH_VAR, format!("variable {}", var)))
    }

    /// File offsets (in elements) of each region element, in row-major
    /// transfer order.
    fn region_offsets(dims: &[u64], region: &Region) -> BackendResult<Vec<usize>> {
        let dims_eff: &[u64] = if dims.is_empty() { &[1] } else { dims };
        if region.ndims() != dims_eff.len() {
            return Err(BackendError::new(
                codes::BAD_GEOMETRY,
                format!(
                    "region rank {} does not match variable rank {}",
                    region.ndims(),
                    dims_eff.len()
                ),
            ));
        }
        let ndims = dims_eff.len();
        for d in 0..ndims {
            if region.count[d] == 0 {
                return Ok(Vec::new());
            }
            let last = region.start[d] + (region.count[d] - 1) * region.stride[d];
            if last >= dims_eff[d] {
                return Err(BackendError::new(
                    codes::OUT_OF_RANGE,
                    format!(
                        "dimension {}: index {} outside declared length {}",
                        d, last, dims_eff[d]
                    ),
                ));
            }
        }

        let mut strides = vec![1u64; ndims];
        for d in (0..ndims.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * dims_eff[d + 1];
        }

        let n = region.element_count() as usize;
        let mut offsets = Vec::with_capacity(n);
        let mut idx = vec![0u64; ndims];
        for _ in 0..n {
            let mut off = 0u64;
            for d in 0..ndims {
                off += (region.start[d] + idx[d] * region.stride[d]) * strides[d];
            }
            offsets.push(off as usize);
            for d in (0..ndims).rev() {
                idx[d] += 1;
                if idx[d] < region.count[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Ok(offsets)
    }
}

impl Dataset for MemDataset {
    fn put_att_raw(
        &mut self,
        var: Option<VarId>,
        name: &str,
        file_ty: ElemType,
        mem_ty: ElemType,
        data: &[u8],
    ) -> BackendResult<()> {
        if !file_ty.is_file_type() {
            return Err(BackendError::new(
                codes::TYPE_MISMATCH,
                "memory-only type has no file representation",
            ));
        }
        if let Some(id) = var {
            self.var(id)?;
        }
        let mw = mem_ty.mem_width();
        if data.len() % mw != 0 {
            return Err(BackendError::new(codes::BAD_BUFFER, "ragged attribute data"));
        }
        let n = data.len() / mw;
        let mut bytes = vec![0u8; n * file_ty.mem_width()];
        convert(data, mem_ty, &mut bytes, file_ty, n)?;
        self.atts.insert(
            (var, name.to_string()),
            AttStore {
                file_ty,
                len: n as u64,
                bytes,
            },
        );
        Ok(())
    }

    fn get_att_raw(
        &mut self,
        var: Option<VarId>,
        name: &str,
        mem_ty: ElemType,
        out: &mut [u8],
    ) -> BackendResult<()> {
        let att = self
            .atts
            .get(&(var, name.to_string()))
            .ok_or_else(|| BackendError::new(codes::NO_SUCH_ATT, name.to_string()))?;
        let n = att.len as usize;
        if out.len() != n * mem_ty.mem_width() {
            return Err(BackendError::new(
                codes::BAD_BUFFER,
                "attribute buffer length mismatch",
            ));
        }
        convert(&att.bytes, att.file_ty, out, mem_ty, n)
    }

    fn put_region_raw(
        &mut self,
        var: VarId,
        region: &Region,
        mem_ty: ElemType,
        data: &[u8],
    ) -> BackendResult<()> {
        let store = self.var(var)?;
        let file_ty = store.file_ty;
        let fw = file_ty.mem_width();
        let offsets = Self::region_offsets(&store.dims, region)?;
        let n = offsets.len();
        if data.len() != n * mem_ty.mem_width() {
            return Err(BackendError::new(
                codes::BAD_BUFFER,
                "region data length mismatch",
            ));
        }
        let mut converted = vec![0u8; n * fw];
        convert(data, mem_ty, &mut converted, file_ty, n)?;
        let store = self.vars.get_mut(&var).expect("var checked above");
        for (k, off) in offsets.into_iter().enumerate() {
            store.bytes[off * fw..(off + 1) * fw].copy_from_slice(&converted[k * fw..(k + 1) * fw]);
        }
        Ok(())
    }

    fn bput_region_raw(
        &mut self,
        var: VarId,
        region: &Region,
        mem_ty: ElemType,
        data: &[u8],
    ) -> BackendResult<RequestHandle> {
        self.put_region_raw(var, region, mem_ty, data)?;
        let key = self.pending.insert(PendingWrite { bytes: data.len() });
        Ok(RequestHandle(key as u64))
    }

    fn get_region_raw(
        &mut self,
        var: VarId,
        region: &Region,
        mem_ty: ElemType,
        out: &mut [u8],
    ) -> BackendResult<()> {
        let store = self.var(var)?;
        let file_ty = store.file_ty;
        let fw = file_ty.mem_width();
        let offsets = Self::region_offsets(&store.dims, region)?;
        let n = offsets.len();
        if out.len() != n * mem_ty.mem_width() {
            return Err(BackendError::new(
                codes::BAD_BUFFER,
                "region buffer length mismatch",
            ));
        }
        let mut gathered = vec![0u8; n * fw];
        for (k, off) in offsets.into_iter().enumerate() {
            gathered[k * fw..(k + 1) * fw].copy_from_slice(&store.bytes[off * fw..(off + 1) * fw]);
        }
        convert(&gathered, file_ty, out, mem_ty, n)
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.pending.clear();
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{as_bytes, as_bytes_mut};

    fn region(start: &[u64], count: &[u64], stride: &[u64]) -> Region {
        Region {
            start: start.to_vec(),
            count: count.to_vec(),
            stride: stride.to_vec(),
        }
    }

    #[test]
    fn test_strided_write_read() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(0, ElemType::Int, &[4, 6]);

        // Write a 2x3 block at (1, 0) with stride 2 along the second dim.
        let data: [i32; 6] = [1, 2, 3, 4, 5, 6];
        ds.put_region_raw(
            0,
            &region(&[1, 0], &[2, 3], &[1, 2]),
            ElemType::Int,
            as_bytes(&data),
        )
        .unwrap();

        let mut row = [0i32; 6];
        ds.get_region_raw(
            0,
            &region(&[1, 0], &[1, 6], &[1, 1]),
            ElemType::Int,
            as_bytes_mut(&mut row),
        )
        .unwrap();
        assert_eq!(row, [1, 0, 2, 0, 3, 0]);

        let mut back = [0i32; 6];
        ds.get_region_raw(
            0,
            &region(&[1, 0], &[2, 3], &[1, 2]),
            ElemType::Int,
            as_bytes_mut(&mut back),
        )
        .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_type_conversion_through_file_type() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(0, ElemType::Float, &[3]);

        let data: [f64; 3] = [1.5, -2.25, 1.0e30];
        ds.put_region_raw(
            0,
            &region(&[0], &[3], &[1]),
            ElemType::Double,
            as_bytes(&data),
        )
        .unwrap();

        let mut back = [0f64; 3];
        ds.get_region_raw(
            0,
            &region(&[0], &[3], &[1]),
            ElemType::Double,
            as_bytes_mut(&mut back),
        )
        .unwrap();
        // Values round-trip through f32 storage.
        for (got, want) in back.iter().zip(data.iter()) {
            assert_eq!(*got, *want as f32 as f64);
        }
    }

    #[test]
    fn test_scalar_region() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(0, ElemType::Double, &[]);

        let v = [42.5f64];
        ds.put_region_raw(0, &region(&[0], &[1], &[1]), ElemType::Double, as_bytes(&v))
            .unwrap();
        let mut back = [0f64];
        ds.get_region_raw(
            0,
            &region(&[0], &[1], &[1]),
            ElemType::Double,
            as_bytes_mut(&mut back),
        )
        .unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(0, ElemType::Int, &[4]);
        let data = [0i32; 2];
        // start 2, count 2, stride 2 touches index 4.
        let err = ds
            .put_region_raw(
                0,
                &region(&[2], &[2], &[2]),
                ElemType::Int,
                as_bytes(&data),
            )
            .unwrap_err();
        assert_eq!(err.code, codes::OUT_OF_RANGE);
    }

    #[test]
    fn test_zero_count_region_is_empty() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(0, ElemType::Int, &[4]);
        ds.put_region_raw(0, &region(&[0], &[0], &[1]), ElemType::Int, &[])
            .unwrap();
    }

    #[test]
    fn test_attribute_conversion_roundtrip() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(3, ElemType::Int, &[1]);

        let written: [i32; 2] = [7, -9];
        ds.put_att_raw(
            Some(3),
            "valid_range",
            ElemType::Double,
            ElemType::Int,
            as_bytes(&written),
        )
        .unwrap();

        let mut back = [0f64; 2];
        ds.get_att_raw(
            Some(3),
            "valid_range",
            ElemType::Double,
            as_bytes_mut(&mut back),
        )
        .unwrap();
        assert_eq!(back, [7.0, -9.0]);
    }

    #[test]
    fn test_global_text_attribute() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.put_att_raw(None, "history", ElemType::Char, ElemType::Char, b"created")
            .unwrap();
        let mut back = [0u8; 7];
        ds.get_att_raw(None, "history", ElemType::Char, &mut back)
            .unwrap();
        assert_eq!(&back, b"created");
    }

    #[test]
    fn test_text_to_numeric_rejected() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.put_att_raw(None, "label", ElemType::Char, ElemType::Char, b"abc")
            .unwrap();
        let mut out = [0i32; 3];
        let err = ds
            .get_att_raw(None, "label", ElemType::Int, as_bytes_mut(&mut out))
            .unwrap_err();
        assert_eq!(err.code, codes::TYPE_MISMATCH);
    }

    #[test]
    fn test_missing_attribute() {
        let mut ds = MemDataset::new(BackendKind::Serial);
        let mut out = [0u8; 4];
        let err = ds
            .get_att_raw(None, "nope", ElemType::Int, &mut out)
            .unwrap_err();
        assert_eq!(err.code, codes::NO_SUCH_ATT);
    }

    #[test]
    fn test_nonblocking_put_tracks_until_flush() {
        let mut ds = MemDataset::new(BackendKind::Deferred);
        ds.define_var(0, ElemType::Int, &[4]);
        let data = [1i32, 2, 3, 4];
        let h = ds
            .bput_region_raw(
                0,
                &region(&[0], &[4], &[1]),
                ElemType::Int,
                as_bytes(&data),
            )
            .unwrap();
        assert!(!h.is_null());
        assert_eq!(ds.pending_requests(), 1);

        ds.flush().unwrap();
        assert_eq!(ds.pending_requests(), 0);
        assert_eq!(ds.flush_count(), 1);

        // The write itself landed.
        let mut back = [0i32; 4];
        ds.get_region_raw(
            0,
            &region(&[0], &[4], &[1]),
            ElemType::Int,
            as_bytes_mut(&mut back),
        )
        .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_native_long_region() {
        use std::os::raw::c_long;

        let mut ds = MemDataset::new(BackendKind::Serial);
        ds.define_var(0, ElemType::Int, &[2]);
        let data: [c_long; 2] = [1000, -7];
        // View the longs as raw bytes with the explicit pseudo-type tag.
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(&data))
        };
        ds.put_region_raw(0, &region(&[0], &[2], &[1]), ElemType::NativeLong, bytes)
            .unwrap();

        let mut back = [0i32; 2];
        ds.get_region_raw(
            0,
            &region(&[0], &[2], &[1]),
            ElemType::Int,
            as_bytes_mut(&mut back),
        )
        .unwrap();
        assert_eq!(back, [1000, -7]);
    }
}
