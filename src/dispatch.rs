//! Role routing and the public operation family.
//!
//! Every operation here is collective over the session's union group: all
//! ranks call it with the same arguments, reach the same synchronization
//! points in the same order, and observe the same outcome. The routing
//! per call is:
//!
//! 1. local contract checks, from caller arguments alone;
//! 2. parameter resolution on ranks with callsite context;
//! 3. in split-role mode, envelope dispatch compute-root → I/O-root, then
//!    envelope re-broadcast within the I/O group, then derived-value
//!    broadcasts from the compute root over the union group;
//! 4. backend invocation on I/O ranks, through the dispatch table, with
//!    the master-only rule for backends lacking multi-rank writes;
//! 5. status reconciliation from the I/O root, then (for reads) the
//!    payload broadcast — metadata always precedes payload.
//!
//! A resolution failure in split-role mode is converted by the compute
//! root into an abort envelope so the I/O group converges on the same
//! error instead of blocking in step 3.

use std::borrow::Cow;

use tracing::{debug, trace, warn};

use crate::backend::{self, BackendCaps, RequestHandle};
use crate::catalog::{VarId, MAX_NAME};
use crate::envelope::Envelope;
use crate::error::{Error, Result, STATUS_OK};
use crate::fabric::{Collective, CommError, PeerLink};
use crate::file::FileHandle;
use crate::geometry::Geometry;
use crate::resolve::{self, ResolvedAttGet, ResolvedTransfer};
use crate::session::Session;
use crate::types::{as_bytes, as_bytes_mut, ElemType, Element};

/// Local argument checks shared by the array operations.
fn check_array_args(
    start: Option<&[u64]>,
    count: Option<&[u64]>,
    stride: Option<&[u64]>,
) -> Result<()> {
    if let (Some(s), Some(c)) = (start, count) {
        if s.len() != c.len() {
            return Err(Error::InvalidArg("start and count rank differ"));
        }
    }
    if let (Some(st), Some(c)) = (stride, count) {
        if st.len() != c.len() {
            return Err(Error::InvalidArg("stride and count rank differ"));
        }
    }
    Ok(())
}

fn check_att_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArg("empty attribute name"));
    }
    if name.len() > MAX_NAME {
        return Err(Error::NameTooLong {
            len: name.len(),
            max: MAX_NAME,
        });
    }
    Ok(())
}

/// Convert a failure that happened before dispatch into a group-wide
/// abort. The compute root ships an abort envelope so the I/O ranks,
/// which are blocked waiting for this call's envelope, converge on the
/// same error; every other rank already holds it locally.
fn abort_dispatch<C: Collective, L: PeerLink>(ios: &mut Session<C, L>, err: Error) -> Error {
    if ios.async_mode() && ios.is_comp_root() {
        let (class, detail) = err.to_wire();
        let env = Envelope::Abort { class, detail };
        if let Err(e) = ios.link_send(&env.encode()) {
            warn!(error = %e, "abort envelope delivery failed");
        }
    }
    err
}

/// Compute side of the dispatch channel: only the compute root sends.
fn send_envelope<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    env: &Envelope,
) -> Result<()> {
    if ios.is_comp_root() {
        ios.link_send(&env.encode())?;
    }
    Ok(())
}

/// I/O side of the dispatch channel: the I/O root receives, then the
/// envelope bytes are re-broadcast within the I/O group so every I/O rank
/// decodes the same transfer before any backend work.
fn recv_envelope<C: Collective, L: PeerLink>(ios: &mut Session<C, L>) -> Result<Envelope> {
    let mut bytes = if ios.is_io_root() {
        ios.link_recv()?
    } else {
        Vec::new()
    };
    let group = ios
        .io_group_mut()
        .expect("envelope reception runs on I/O ranks only");
    group.broadcast_vec(0, &mut bytes)?;
    Ok(Envelope::decode(&bytes)?)
}

/// Reconcile the operation status from the I/O root: every rank adopts
/// the root's outcome, even ranks that never touched the backend.
fn reconcile<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    local: Option<Error>,
) -> Result<()> {
    let mut wire = match &local {
        Some(e) => e.to_wire(),
        None => (STATUS_OK, 0),
    };
    let root = ios.io_root();
    ios.union_mut().broadcast_i32_pair(root, &mut wire)?;
    match Error::from_wire(wire.0, wire.1) {
        None => Ok(()),
        Some(e) => {
            // Prefer the local detail when this rank saw the failure
            // itself.
            match local {
                Some(mine) if mine.to_wire() == wire => Err(mine),
                _ => Err(e),
            }
        }
    }
}

/// Broadcast the derived values from the compute root over the union
/// group. Runs only in split-role mode; I/O ranks adopt the root's
/// values (trust-the-root).
fn broadcast_derived<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    xfer: &mut ResolvedTransfer,
) -> Result<()> {
    let root = ios.comp_root();
    let mut num_elem = xfer.num_elem;
    let mut mem_width = xfer.mem_width as u64;
    let mut ty_code = xfer.mem_ty.code() as u64;
    ios.union_mut().broadcast_u64(root, &mut num_elem)?;
    ios.union_mut().broadcast_u64(root, &mut mem_width)?;
    ios.union_mut().broadcast_u64(root, &mut ty_code)?;
    xfer.num_elem = num_elem;
    xfer.mem_width = mem_width as usize;
    xfer.mem_ty = ElemType::from_code(ty_code as u8).ok_or_else(|| {
        Error::Messaging(CommError::Malformed(format!(
            "bad element type code {} in derived broadcast",
            ty_code
        )))
    })?;
    Ok(())
}

/// Write a strided region of an array variable.
///
/// Collective over the union group. `mem_ty` of `None` means the data is
/// already in the variable's declared file type. A put whose `count`
/// product is zero performs no backend write and registers no request;
/// the collective exchanges still run so every rank stays in step.
pub fn put_array<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    start: Option<&[u64]>,
    count: Option<&[u64]>,
    stride: Option<&[u64]>,
    mem_ty: Option<ElemType>,
    data: &[u8],
) -> Result<()> {
    trace!(var, ?mem_ty, len = data.len(), "put_array");
    check_array_args(start, count, stride)?;
    let mut geom = Geometry::from_parts(start, count, stride);

    let mut xfer: Option<ResolvedTransfer> = None;
    let mut payload: Cow<'_, [u8]> = Cow::Borrowed(data);

    if ios.resolves_locally() {
        match resolve_array_checked(file, var, mem_ty, &geom, data.len()) {
            Ok(t) => xfer = Some(t),
            Err(e) => return Err(abort_dispatch(ios, e)),
        }
    }

    if ios.async_mode() {
        if ios.is_compute() {
            let t = xfer.as_ref().expect("compute ranks resolve locally");
            let env = Envelope::PutArray {
                var,
                ndims: t.ndims as u16,
                geom: geom.clone(),
                mem_ty: t.mem_ty,
                num_elem: t.num_elem,
                mem_width: t.mem_width as u32,
                payload: data.to_vec(),
            };
            send_envelope(ios, &env)?;
        } else {
            match recv_envelope(ios)? {
                Envelope::Abort { class, detail } => {
                    return Err(remote_abort(class, detail));
                }
                Envelope::PutArray {
                    var: env_var,
                    ndims,
                    geom: env_geom,
                    mem_ty: env_mem,
                    num_elem,
                    mem_width,
                    payload: env_payload,
                } => {
                    if env_var != var {
                        return Err(Error::Messaging(CommError::Malformed(
                            "envelope addresses a different variable".into(),
                        )));
                    }
                    geom = env_geom;
                    payload = Cow::Owned(env_payload);
                    xfer = Some(ResolvedTransfer {
                        mem_ty: env_mem,
                        mem_width: mem_width as usize,
                        ndims: ndims as usize,
                        num_elem,
                    });
                }
                _ => {
                    return Err(Error::Messaging(CommError::Malformed(
                        "unexpected envelope for put_array".into(),
                    )))
                }
            }
        }
        let t = xfer.as_mut().expect("resolved or adopted by now");
        broadcast_derived(ios, t)?;
    }

    let mut local_err: Option<Error> = None;
    if ios.is_io() {
        let t = xfer.as_ref().expect("I/O ranks resolve or adopt");
        local_err = put_array_backend(ios, file, var, t, &geom, &payload).err();
        debug!(var, ok = local_err.is_none(), "put_array backend phase done");
    }

    reconcile(ios, local_err)
}

fn resolve_array_checked(
    file: &FileHandle,
    var: VarId,
    mem_ty: Option<ElemType>,
    geom: &Geometry,
    data_len: usize,
) -> Result<ResolvedTransfer> {
    let t = resolve::resolve_array(file.catalog(), var, mem_ty, geom)?;
    let expected = (t.num_elem as usize)
        .checked_mul(t.mem_width)
        .ok_or(Error::InvalidArg("transfer size overflows"))?;
    if data_len != expected {
        return Err(Error::InvalidArg("buffer length does not match geometry"));
    }
    Ok(t)
}

fn put_array_backend<C: Collective, L: PeerLink>(
    ios: &Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    xfer: &ResolvedTransfer,
    geom: &Geometry,
    payload: &[u8],
) -> Result<()> {
    let ops = backend::lookup(file.kind(), xfer.mem_ty)?;
    let region = geom.resolve(xfer.ndims)?;
    if xfer.num_elem == 0 {
        trace!(var, "zero-extent put, backend untouched");
        return Ok(());
    }
    let caps = file.kind().caps();
    let this_rank_calls = caps.contains(BackendCaps::MULTI_RANK) || ios.is_io_master();

    if caps.contains(BackendCaps::NONBLOCKING_PUT) {
        let mut handle = RequestHandle::NULL;
        let mut backend_err = None;
        if this_rank_calls {
            let ds = file.dataset_mut().expect("I/O rank holds the dataset");
            match (ops.bput_region)(ds, var, &region, payload) {
                Ok(h) => handle = h,
                Err(e) => backend_err = Some(Error::Backend(e)),
            }
        }
        // Every I/O rank appends — the writer its real handle, everyone
        // else the null sentinel — so indices stay aligned.
        let bytes = if handle.is_null() { 0 } else { payload.len() };
        file.track_request(var, handle, bytes)?;
        if let Some(e) = backend_err {
            return Err(e);
        }
    } else if this_rank_calls {
        let ds = file.dataset_mut().expect("I/O rank holds the dataset");
        (ops.put_region)(ds, var, &region, payload).map_err(Error::Backend)?;
    }
    Ok(())
}

/// Read a strided region of an array variable.
///
/// Collective over the union group. After a successful read every rank's
/// `out` buffer holds identical bytes, replicated from the I/O root.
pub fn get_array<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    start: Option<&[u64]>,
    count: Option<&[u64]>,
    stride: Option<&[u64]>,
    mem_ty: Option<ElemType>,
    out: &mut [u8],
) -> Result<()> {
    trace!(var, ?mem_ty, len = out.len(), "get_array");
    check_array_args(start, count, stride)?;
    let mut geom = Geometry::from_parts(start, count, stride);

    let mut xfer: Option<ResolvedTransfer> = None;

    if ios.resolves_locally() {
        match resolve_array_checked(file, var, mem_ty, &geom, out.len()) {
            Ok(t) => xfer = Some(t),
            Err(e) => return Err(abort_dispatch(ios, e)),
        }
    }

    if ios.async_mode() {
        if ios.is_compute() {
            let t = xfer.as_ref().expect("compute ranks resolve locally");
            let env = Envelope::GetArray {
                var,
                ndims: t.ndims as u16,
                geom: geom.clone(),
                mem_ty: t.mem_ty,
                num_elem: t.num_elem,
                mem_width: t.mem_width as u32,
            };
            send_envelope(ios, &env)?;
        } else {
            match recv_envelope(ios)? {
                Envelope::Abort { class, detail } => {
                    return Err(remote_abort(class, detail));
                }
                Envelope::GetArray {
                    var: env_var,
                    ndims,
                    geom: env_geom,
                    mem_ty: env_mem,
                    num_elem,
                    mem_width,
                } => {
                    if env_var != var {
                        return Err(Error::Messaging(CommError::Malformed(
                            "envelope addresses a different variable".into(),
                        )));
                    }
                    let t = ResolvedTransfer {
                        mem_ty: env_mem,
                        mem_width: mem_width as usize,
                        ndims: ndims as usize,
                        num_elem,
                    };
                    if out.len() != t.num_elem as usize * t.mem_width {
                        return Err(Error::InvalidArg(
                            "buffer length does not match dispatched geometry",
                        ));
                    }
                    geom = env_geom;
                    xfer = Some(t);
                }
                _ => {
                    return Err(Error::Messaging(CommError::Malformed(
                        "unexpected envelope for get_array".into(),
                    )))
                }
            }
        }
        let t = xfer.as_mut().expect("resolved or adopted by now");
        broadcast_derived(ios, t)?;
    }

    let mut local_err: Option<Error> = None;
    if ios.is_io() {
        let t = xfer.as_ref().expect("I/O ranks resolve or adopt");
        local_err = get_array_backend(ios, file, var, t, &geom, out).err();
        debug!(var, ok = local_err.is_none(), "get_array backend phase done");
    }

    reconcile(ios, local_err)?;

    // Payload travels last, from the I/O root to every rank.
    let root = ios.io_root();
    ios.union_mut().broadcast(root, out)?;
    trace!(var, "get_array payload broadcast complete");
    Ok(())
}

fn get_array_backend<C: Collective, L: PeerLink>(
    ios: &Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    xfer: &ResolvedTransfer,
    geom: &Geometry,
    out: &mut [u8],
) -> Result<()> {
    let ops = backend::lookup(file.kind(), xfer.mem_ty)?;
    let region = geom.resolve(xfer.ndims)?;
    let caps = file.kind().caps();
    // Ranks that skip the physical read keep their caller-provided bytes
    // as the placeholder; the payload broadcast overwrites them.
    if caps.contains(BackendCaps::MULTI_RANK) || ios.is_io_master() {
        let ds = file.dataset_mut().expect("I/O rank holds the dataset");
        (ops.get_region)(ds, var, &region, out).map_err(Error::Backend)?;
    }
    Ok(())
}

fn remote_abort(class: i32, detail: i32) -> Error {
    Error::from_wire(class, detail).unwrap_or_else(|| {
        Error::Messaging(CommError::Malformed(
            "abort envelope carried a success status".into(),
        ))
    })
}

/// Write an attribute, converting from the memory type to the declared
/// file type. `len` is the element count of the attribute array.
pub fn put_attribute<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: Option<VarId>,
    name: &str,
    file_ty: ElemType,
    len: u64,
    mem_ty: ElemType,
    data: &[u8],
) -> Result<()> {
    trace!(?var, name, ?file_ty, ?mem_ty, len, "put_attribute");
    check_att_name(name)?;

    let mut name_buf: Cow<'_, str> = Cow::Borrowed(name);
    let mut payload: Cow<'_, [u8]> = Cow::Borrowed(data);
    let mut widths: Option<(usize, usize)> = None;
    let mut att_file_ty = file_ty;
    let mut att_mem_ty = mem_ty;

    if ios.resolves_locally() {
        match resolve::resolve_att_put(file.catalog(), file_ty, mem_ty).and_then(|(fw, mw)| {
            if data.len() != len as usize * mw {
                Err(Error::InvalidArg("attribute data length mismatch"))
            } else {
                Ok((fw, mw))
            }
        }) {
            Ok(w) => widths = Some(w),
            Err(e) => return Err(abort_dispatch(ios, e)),
        }
    }

    if ios.async_mode() {
        if ios.is_compute() {
            let (fw, mw) = widths.expect("compute ranks resolve locally");
            let env = Envelope::PutAttribute {
                var,
                name: name.to_string(),
                file_ty,
                mem_ty,
                len,
                file_width: fw as u32,
                mem_width: mw as u32,
                payload: data.to_vec(),
            };
            send_envelope(ios, &env)?;
        } else {
            match recv_envelope(ios)? {
                Envelope::Abort { class, detail } => {
                    return Err(remote_abort(class, detail));
                }
                Envelope::PutAttribute {
                    var: env_var,
                    name: env_name,
                    file_ty: env_file_ty,
                    mem_ty: env_mem_ty,
                    file_width,
                    mem_width,
                    payload: env_payload,
                    ..
                } => {
                    if env_var != var {
                        return Err(Error::Messaging(CommError::Malformed(
                            "envelope addresses a different variable".into(),
                        )));
                    }
                    name_buf = Cow::Owned(env_name);
                    payload = Cow::Owned(env_payload);
                    att_file_ty = env_file_ty;
                    att_mem_ty = env_mem_ty;
                    widths = Some((file_width as usize, mem_width as usize));
                }
                _ => {
                    return Err(Error::Messaging(CommError::Malformed(
                        "unexpected envelope for put_attribute".into(),
                    )))
                }
            }
        }
        // Widths are only known on the compute side; replicate them in
        // the fixed order so both halves stay framed.
        let (fw, mw) = widths.expect("resolved or adopted by now");
        let root = ios.comp_root();
        let mut fw64 = fw as u64;
        let mut mw64 = mw as u64;
        ios.union_mut().broadcast_u64(root, &mut fw64)?;
        ios.union_mut().broadcast_u64(root, &mut mw64)?;
    }

    let mut local_err: Option<Error> = None;
    if ios.is_io() {
        local_err = (|| -> Result<()> {
            let ops = backend::lookup(file.kind(), att_mem_ty)?;
            let caps = file.kind().caps();
            if caps.contains(BackendCaps::MULTI_RANK) || ios.is_io_master() {
                let ds = file.dataset_mut().expect("I/O rank holds the dataset");
                (ops.put_att)(ds, var, &name_buf, att_file_ty, &payload)
                    .map_err(Error::Backend)?;
            }
            Ok(())
        })()
        .err();
        debug!(?var, name = %name_buf, ok = local_err.is_none(), "put_attribute backend phase done");
    }

    reconcile(ios, local_err)
}

/// Read an attribute, converting from its declared file type to the
/// requested memory type. After success every rank's `out` buffer holds
/// identical bytes.
pub fn get_attribute<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: Option<VarId>,
    name: &str,
    mem_ty: ElemType,
    out: &mut [u8],
) -> Result<()> {
    trace!(?var, name, ?mem_ty, "get_attribute");
    check_att_name(name)?;

    let mut name_buf: Cow<'_, str> = Cow::Borrowed(name);
    let mut resolved: Option<ResolvedAttGet> = None;

    if ios.resolves_locally() {
        match resolve::resolve_att_get(file.catalog(), var, name, mem_ty).and_then(|r| {
            if out.len() != r.att_len as usize * r.mem_width {
                Err(Error::InvalidArg("attribute buffer length mismatch"))
            } else {
                Ok(r)
            }
        }) {
            Ok(r) => resolved = Some(r),
            Err(e) => return Err(abort_dispatch(ios, e)),
        }
    }

    if ios.async_mode() {
        if ios.is_compute() {
            let r = resolved.as_ref().expect("compute ranks resolve locally");
            let env = Envelope::GetAttribute {
                var,
                name: name.to_string(),
                mem_ty: r.mem_ty,
                att_ty: r.att_ty,
                att_len: r.att_len,
                att_width: r.att_width as u32,
                mem_width: r.mem_width as u32,
            };
            send_envelope(ios, &env)?;
        } else {
            match recv_envelope(ios)? {
                Envelope::Abort { class, detail } => {
                    return Err(remote_abort(class, detail));
                }
                Envelope::GetAttribute {
                    var: env_var,
                    name: env_name,
                    mem_ty: env_mem_ty,
                    att_ty,
                    att_len,
                    att_width,
                    mem_width,
                } => {
                    if env_var != var {
                        return Err(Error::Messaging(CommError::Malformed(
                            "envelope addresses a different variable".into(),
                        )));
                    }
                    let r = ResolvedAttGet {
                        att_ty,
                        att_len,
                        att_width: att_width as usize,
                        mem_ty: env_mem_ty,
                        mem_width: mem_width as usize,
                    };
                    if out.len() != r.att_len as usize * r.mem_width {
                        return Err(Error::InvalidArg(
                            "buffer length does not match dispatched attribute",
                        ));
                    }
                    name_buf = Cow::Owned(env_name);
                    resolved = Some(r);
                }
                _ => {
                    return Err(Error::Messaging(CommError::Malformed(
                        "unexpected envelope for get_attribute".into(),
                    )))
                }
            }
        }
        // Replicate the values only the compute side fetched: length
        // before widths, metadata before payload.
        let r = resolved.as_mut().expect("resolved or adopted by now");
        let root = ios.comp_root();
        let mut att_len = r.att_len;
        let mut att_width = r.att_width as u64;
        let mut mem_width = r.mem_width as u64;
        ios.union_mut().broadcast_u64(root, &mut att_len)?;
        ios.union_mut().broadcast_u64(root, &mut att_width)?;
        ios.union_mut().broadcast_u64(root, &mut mem_width)?;
        r.att_len = att_len;
        r.att_width = att_width as usize;
        r.mem_width = mem_width as usize;
    }

    let mut local_err: Option<Error> = None;
    if ios.is_io() {
        let r = resolved.as_ref().expect("I/O ranks resolve or adopt");
        local_err = (|| -> Result<()> {
            let ops = backend::lookup(file.kind(), r.mem_ty)?;
            let caps = file.kind().caps();
            if caps.contains(BackendCaps::MULTI_RANK) || ios.is_io_master() {
                let ds = file.dataset_mut().expect("I/O rank holds the dataset");
                (ops.get_att)(ds, var, &name_buf, out).map_err(Error::Backend)?;
            }
            Ok(())
        })()
        .err();
        debug!(?var, name = %name_buf, ok = local_err.is_none(), "get_attribute backend phase done");
    }

    reconcile(ios, local_err)?;

    let root = ios.io_root();
    ios.union_mut().broadcast(root, out)?;
    trace!(?var, name = %name_buf, "get_attribute payload broadcast complete");
    Ok(())
}

/// Write a single element at a multidimensional index: the strided
/// accessor with a unit count in every dimension.
pub fn put_element<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    index: &[u64],
    mem_ty: Option<ElemType>,
    data: &[u8],
) -> Result<()> {
    if ios.resolves_locally() {
        let ndims = match file.catalog().var_ndims(var) {
            Ok(n) => n,
            Err(e) => return Err(abort_dispatch(ios, e.into())),
        };
        if index.len() != ndims {
            return Err(abort_dispatch(
                ios,
                Error::InvalidArg("index rank does not match variable"),
            ));
        }
        if ndims == 0 {
            return put_array(ios, file, var, None, None, None, mem_ty, data);
        }
        let count = vec![1u64; ndims];
        put_array(ios, file, var, Some(index), Some(&count), None, mem_ty, data)
    } else {
        // Split-role I/O ranks take everything from the envelope.
        put_array(ios, file, var, None, None, None, mem_ty, data)
    }
}

/// Read a single element at a multidimensional index.
pub fn get_element<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    index: &[u64],
    mem_ty: Option<ElemType>,
    out: &mut [u8],
) -> Result<()> {
    if ios.resolves_locally() {
        let ndims = match file.catalog().var_ndims(var) {
            Ok(n) => n,
            Err(e) => return Err(abort_dispatch(ios, e.into())),
        };
        if index.len() != ndims {
            return Err(abort_dispatch(
                ios,
                Error::InvalidArg("index rank does not match variable"),
            ));
        }
        if ndims == 0 {
            return get_array(ios, file, var, None, None, None, mem_ty, out);
        }
        let count = vec![1u64; ndims];
        get_array(ios, file, var, Some(index), Some(&count), None, mem_ty, out)
    } else {
        get_array(ios, file, var, None, None, None, mem_ty, out)
    }
}

/// Write an entire variable: zero start, declared dimension lengths as
/// the count, unit stride.
pub fn put_whole<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    mem_ty: Option<ElemType>,
    data: &[u8],
) -> Result<()> {
    if ios.resolves_locally() {
        let dims = match file.catalog().var_dim_lens(var) {
            Ok(d) => d,
            Err(e) => return Err(abort_dispatch(ios, e.into())),
        };
        if dims.is_empty() {
            return put_array(ios, file, var, None, None, None, mem_ty, data);
        }
        let start = vec![0u64; dims.len()];
        put_array(ios, file, var, Some(&start), Some(&dims), None, mem_ty, data)
    } else {
        put_array(ios, file, var, None, None, None, mem_ty, data)
    }
}

/// Read an entire variable.
pub fn get_whole<C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    mem_ty: Option<ElemType>,
    out: &mut [u8],
) -> Result<()> {
    if ios.resolves_locally() {
        let dims = match file.catalog().var_dim_lens(var) {
            Ok(d) => d,
            Err(e) => return Err(abort_dispatch(ios, e.into())),
        };
        if dims.is_empty() {
            return get_array(ios, file, var, None, None, None, mem_ty, out);
        }
        let start = vec![0u64; dims.len()];
        get_array(ios, file, var, Some(&start), Some(&dims), None, mem_ty, out)
    } else {
        get_array(ios, file, var, None, None, None, mem_ty, out)
    }
}

/// Typed wrapper over [`put_array`].
pub fn put_array_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    start: Option<&[u64]>,
    count: Option<&[u64]>,
    stride: Option<&[u64]>,
    data: &[T],
) -> Result<()> {
    put_array(ios, file, var, start, count, stride, Some(T::ELEM), as_bytes(data))
}

/// Typed wrapper over [`get_array`].
pub fn get_array_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    start: Option<&[u64]>,
    count: Option<&[u64]>,
    stride: Option<&[u64]>,
    out: &mut [T],
) -> Result<()> {
    get_array(ios, file, var, start, count, stride, Some(T::ELEM), as_bytes_mut(out))
}

/// Typed wrapper over [`put_element`].
pub fn put_element_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    index: &[u64],
    value: &T,
) -> Result<()> {
    put_element(ios, file, var, index, Some(T::ELEM), as_bytes(std::slice::from_ref(value)))
}

/// Typed wrapper over [`get_element`].
pub fn get_element_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    index: &[u64],
    out: &mut T,
) -> Result<()> {
    get_element(ios, file, var, index, Some(T::ELEM), as_bytes_mut(std::slice::from_mut(out)))
}

/// Typed wrapper over [`put_whole`].
pub fn put_whole_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    data: &[T],
) -> Result<()> {
    put_whole(ios, file, var, Some(T::ELEM), as_bytes(data))
}

/// Typed wrapper over [`get_whole`].
pub fn get_whole_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: VarId,
    out: &mut [T],
) -> Result<()> {
    get_whole(ios, file, var, Some(T::ELEM), as_bytes_mut(out))
}

/// Typed wrapper over [`put_attribute`]; the element count is the slice
/// length.
pub fn put_attribute_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: Option<VarId>,
    name: &str,
    file_ty: ElemType,
    data: &[T],
) -> Result<()> {
    put_attribute(
        ios,
        file,
        var,
        name,
        file_ty,
        data.len() as u64,
        T::ELEM,
        as_bytes(data),
    )
}

/// Typed wrapper over [`get_attribute`].
pub fn get_attribute_as<T: Element, C: Collective, L: PeerLink>(
    ios: &mut Session<C, L>,
    file: &mut FileHandle,
    var: Option<VarId>,
    name: &str,
    out: &mut [T],
) -> Result<()> {
    get_attribute(ios, file, var, name, T::ELEM, as_bytes_mut(out))
}
