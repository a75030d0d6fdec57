//! Wire format for the async dispatch channel.
//!
//! In split-role mode the compute root serializes one transfer per call
//! into an [`Envelope`] and ships it to the I/O root, which re-broadcasts
//! the bytes within the I/O group before any backend work. The envelope is
//! a tagged union: each operation is its own variant, and each optional
//! geometry array is encoded as a presence tag with a canonical absent
//! representation (tag byte 0, no payload) — absence is a fact on the
//! wire, never a zero-filled placeholder.
//!
//! Layout: `magic (u32) | version (u8) | opcode (u8) | fields…`, all
//! little-endian. A magic/version/opcode mismatch is a framing error
//! detected before any payload byte is interpreted.

use crate::catalog::VarId;
use crate::fabric::{CommError, CommResult};
use crate::geometry::Geometry;
use crate::types::ElemType;

/// Magic number identifying a dispatch envelope.
pub const ENVELOPE_MAGIC: u32 = 0xC011_0D15;

/// Wire format version.
pub const ENVELOPE_VERSION: u8 = 1;

const OP_PUT_ATTRIBUTE: u8 = 1;
const OP_GET_ATTRIBUTE: u8 = 2;
const OP_PUT_ARRAY: u8 = 3;
const OP_GET_ARRAY: u8 = 4;
const OP_ABORT: u8 = 5;

/// One serialized transfer request, or an operation-wide abort.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    PutAttribute {
        var: Option<VarId>,
        name: String,
        file_ty: ElemType,
        mem_ty: ElemType,
        len: u64,
        file_width: u32,
        mem_width: u32,
        payload: Vec<u8>,
    },
    GetAttribute {
        var: Option<VarId>,
        name: String,
        mem_ty: ElemType,
        att_ty: ElemType,
        att_len: u64,
        att_width: u32,
        mem_width: u32,
    },
    PutArray {
        var: VarId,
        ndims: u16,
        geom: Geometry,
        mem_ty: ElemType,
        num_elem: u64,
        mem_width: u32,
        payload: Vec<u8>,
    },
    GetArray {
        var: VarId,
        ndims: u16,
        geom: Geometry,
        mem_ty: ElemType,
        num_elem: u64,
        mem_width: u32,
    },
    /// The compute side failed before dispatch; the I/O group converges on
    /// the same reconciled `(class, detail)` outcome instead of blocking.
    Abort { class: i32, detail: i32 },
}

impl Envelope {
    /// Serialize into a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u32(ENVELOPE_MAGIC);
        w.u8(ENVELOPE_VERSION);
        match self {
            Envelope::PutAttribute {
                var,
                name,
                file_ty,
                mem_ty,
                len,
                file_width,
                mem_width,
                payload,
            } => {
                w.u8(OP_PUT_ATTRIBUTE);
                w.opt_var(*var);
                w.name(name);
                w.u8(file_ty.code());
                w.u8(mem_ty.code());
                w.u64(*len);
                w.u32(*file_width);
                w.u32(*mem_width);
                w.payload(payload);
            }
            Envelope::GetAttribute {
                var,
                name,
                mem_ty,
                att_ty,
                att_len,
                att_width,
                mem_width,
            } => {
                w.u8(OP_GET_ATTRIBUTE);
                w.opt_var(*var);
                w.name(name);
                w.u8(mem_ty.code());
                w.u8(att_ty.code());
                w.u64(*att_len);
                w.u32(*att_width);
                w.u32(*mem_width);
            }
            Envelope::PutArray {
                var,
                ndims,
                geom,
                mem_ty,
                num_elem,
                mem_width,
                payload,
            } => {
                w.u8(OP_PUT_ARRAY);
                w.u32(*var);
                w.u16(*ndims);
                w.geometry(geom);
                w.u8(mem_ty.code());
                w.u64(*num_elem);
                w.u32(*mem_width);
                w.payload(payload);
            }
            Envelope::GetArray {
                var,
                ndims,
                geom,
                mem_ty,
                num_elem,
                mem_width,
            } => {
                w.u8(OP_GET_ARRAY);
                w.u32(*var);
                w.u16(*ndims);
                w.geometry(geom);
                w.u8(mem_ty.code());
                w.u64(*num_elem);
                w.u32(*mem_width);
            }
            Envelope::Abort { class, detail } => {
                w.u8(OP_ABORT);
                w.i32(*class);
                w.i32(*detail);
            }
        }
        w.into_bytes()
    }

    /// Deserialize from received bytes.
    pub fn decode(bytes: &[u8]) -> CommResult<Envelope> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != ENVELOPE_MAGIC {
            return Err(CommError::Malformed(format!(
                "bad envelope magic {:#010x}",
                magic
            )));
        }
        let version = r.u8()?;
        if version != ENVELOPE_VERSION {
            return Err(CommError::Malformed(format!(
                "unsupported envelope version {}",
                version
            )));
        }
        let env = match r.u8()? {
            OP_PUT_ATTRIBUTE => Envelope::PutAttribute {
                var: r.opt_var()?,
                name: r.name()?,
                file_ty: r.elem_type()?,
                mem_ty: r.elem_type()?,
                len: r.u64()?,
                file_width: r.u32()?,
                mem_width: r.u32()?,
                payload: r.payload()?,
            },
            OP_GET_ATTRIBUTE => Envelope::GetAttribute {
                var: r.opt_var()?,
                name: r.name()?,
                mem_ty: r.elem_type()?,
                att_ty: r.elem_type()?,
                att_len: r.u64()?,
                att_width: r.u32()?,
                mem_width: r.u32()?,
            },
            OP_PUT_ARRAY => Envelope::PutArray {
                var: r.u32()?,
                ndims: r.u16()?,
                geom: r.geometry()?,
                mem_ty: r.elem_type()?,
                num_elem: r.u64()?,
                mem_width: r.u32()?,
                payload: r.payload()?,
            },
            OP_GET_ARRAY => Envelope::GetArray {
                var: r.u32()?,
                ndims: r.u16()?,
                geom: r.geometry()?,
                mem_ty: r.elem_type()?,
                num_elem: r.u64()?,
                mem_width: r.u32()?,
            },
            OP_ABORT => Envelope::Abort {
                class: r.i32()?,
                detail: r.i32()?,
            },
            op => return Err(CommError::Malformed(format!("unknown opcode {}", op))),
        };
        r.finish()?;
        Ok(env)
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn opt_var(&mut self, var: Option<VarId>) {
        match var {
            Some(id) => {
                self.u8(1);
                self.u32(id);
            }
            None => self.u8(0),
        }
    }

    fn name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        self.u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
    }

    fn opt_u64s(&mut self, values: &Option<Vec<u64>>) {
        match values {
            Some(vs) => {
                self.u8(1);
                self.u16(vs.len() as u16);
                for v in vs {
                    self.u64(*v);
                }
            }
            None => self.u8(0),
        }
    }

    fn geometry(&mut self, geom: &Geometry) {
        self.opt_u64s(&geom.start);
        self.opt_u64s(&geom.count);
        self.opt_u64s(&geom.stride);
    }

    fn payload(&mut self, payload: &[u8]) {
        self.u32(payload.len() as u32);
        self.buf.extend_from_slice(payload);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CommResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| CommError::Malformed("truncated envelope".into()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CommResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> CommResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }

    fn u32(&mut self) -> CommResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn i32(&mut self) -> CommResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> CommResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn opt_var(&mut self) -> CommResult<Option<VarId>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.u32()?)),
            tag => Err(CommError::Malformed(format!("bad option tag {}", tag))),
        }
    }

    fn name(&mut self) -> CommResult<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CommError::Malformed("attribute name is not UTF-8".into()))
    }

    fn elem_type(&mut self) -> CommResult<ElemType> {
        let code = self.u8()?;
        ElemType::from_code(code)
            .ok_or_else(|| CommError::Malformed(format!("bad element type code {}", code)))
    }

    fn opt_u64s(&mut self) -> CommResult<Option<Vec<u64>>> {
        match self.u8()? {
            0 => Ok(None),
            1 => {
                let len = self.u16()? as usize;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.u64()?);
                }
                Ok(Some(values))
            }
            tag => Err(CommError::Malformed(format!("bad option tag {}", tag))),
        }
    }

    fn geometry(&mut self) -> CommResult<Geometry> {
        Ok(Geometry {
            start: self.opt_u64s()?,
            count: self.opt_u64s()?,
            stride: self.opt_u64s()?,
        })
    }

    fn payload(&mut self) -> CommResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self) -> CommResult<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(CommError::Malformed(format!(
                "{} trailing bytes after envelope",
                self.buf.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_array_roundtrip() {
        let env = Envelope::PutArray {
            var: 3,
            ndims: 2,
            geom: Geometry {
                start: Some(vec![0, 4]),
                count: Some(vec![2, 8]),
                stride: None,
            },
            mem_ty: ElemType::Double,
            num_elem: 16,
            mem_width: 8,
            payload: vec![0xAB; 128],
        };
        let bytes = env.encode();
        assert_eq!(Envelope::decode(&bytes).unwrap(), env);
    }

    #[test]
    fn test_absent_geometry_is_one_tag_byte() {
        let absent = Envelope::GetArray {
            var: 0,
            ndims: 0,
            geom: Geometry::default(),
            mem_ty: ElemType::Int,
            num_elem: 1,
            mem_width: 4,
        };
        let present = Envelope::GetArray {
            var: 0,
            ndims: 0,
            geom: Geometry {
                start: Some(vec![0]),
                count: Some(vec![1]),
                stride: Some(vec![1]),
            },
            mem_ty: ElemType::Int,
            num_elem: 1,
            mem_width: 4,
        };
        // Absent arrays carry no placeholder values, only the tag.
        assert_eq!(
            present.encode().len() - absent.encode().len(),
            3 * (2 + 8)
        );
        assert_eq!(Envelope::decode(&absent.encode()).unwrap(), absent);
    }

    #[test]
    fn test_attribute_roundtrips() {
        let put = Envelope::PutAttribute {
            var: None,
            name: "history".into(),
            file_ty: ElemType::Char,
            mem_ty: ElemType::Char,
            len: 5,
            file_width: 1,
            mem_width: 1,
            payload: b"hello".to_vec(),
        };
        assert_eq!(Envelope::decode(&put.encode()).unwrap(), put);

        let get = Envelope::GetAttribute {
            var: Some(9),
            name: "units".into(),
            mem_ty: ElemType::Double,
            att_ty: ElemType::Float,
            att_len: 3,
            att_width: 4,
            mem_width: 8,
        };
        assert_eq!(Envelope::decode(&get.encode()).unwrap(), get);
    }

    #[test]
    fn test_abort_roundtrip() {
        let env = Envelope::Abort {
            class: -6,
            detail: 0,
        };
        assert_eq!(Envelope::decode(&env.encode()).unwrap(), env);
    }

    #[test]
    fn test_bad_magic_rejected_before_payload() {
        let env = Envelope::Abort {
            class: -1,
            detail: 0,
        };
        let mut bytes = env.encode();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            Envelope::decode(&bytes),
            Err(CommError::Malformed(_))
        ));
    }

    #[test]
    fn test_truncation_rejected() {
        let env = Envelope::PutArray {
            var: 1,
            ndims: 1,
            geom: Geometry {
                start: Some(vec![0]),
                count: Some(vec![4]),
                stride: None,
            },
            mem_ty: ElemType::Int,
            num_elem: 4,
            mem_width: 4,
            payload: vec![0; 16],
        };
        let bytes = env.encode();
        assert!(matches!(
            Envelope::decode(&bytes[..bytes.len() - 1]),
            Err(CommError::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Envelope::Abort {
            class: -1,
            detail: 0,
        }
        .encode();
        bytes.push(0);
        assert!(matches!(
            Envelope::decode(&bytes),
            Err(CommError::Malformed(_))
        ));
    }
}
