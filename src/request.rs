//! Nonblocking request tracking.
//!
//! Backends with nonblocking puts hand back one request handle per write.
//! Handles are kept per variable in an append-only list whose backing
//! storage grows in fixed-size chunks ([`crate::config::TrackerConfig`])
//! and never shrinks mid-session; an external sync or close resets it.
//! Ranks that did not perform the physical write append
//! [`RequestHandle::NULL`] so list indices agree on every I/O rank.

use crate::backend::RequestHandle;
use crate::error::{Error, Result};

/// Outstanding request handles for one variable.
#[derive(Debug, Default)]
pub struct VarTracker {
    requests: Vec<RequestHandle>,
    issued: u64,
}

impl VarTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one handle, growing the backing storage by a whole chunk
    /// when the current chunk is full.
    pub fn append(&mut self, handle: RequestHandle, chunk: usize) -> Result<()> {
        debug_assert!(chunk > 0, "chunk must be positive");
        if self.requests.len() % chunk == 0 {
            self.requests
                .try_reserve_exact(chunk)
                .map_err(|_| Error::OutOfMemory)?;
        }
        self.requests.push(handle);
        self.issued += 1;
        Ok(())
    }

    /// Outstanding handles, null sentinels included.
    pub fn requests(&self) -> &[RequestHandle] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Total requests issued over the session, across resets.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Drop the outstanding handles after an external sync or close.
    pub fn reset(&mut self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_grows_by_whole_chunks() {
        let mut tracker = VarTracker::new();
        for i in 0..5 {
            tracker.append(RequestHandle(i), 4).unwrap();
        }
        assert_eq!(tracker.len(), 5);
        // One chunk at 0, a second at 4; no per-push reallocation in
        // between.
        let cap = tracker.requests.capacity();
        assert!(cap >= 8);
        for i in 5..8 {
            tracker.append(RequestHandle(i), 4).unwrap();
        }
        assert_eq!(tracker.requests.capacity(), cap);
    }

    #[test]
    fn test_null_sentinels_keep_indices_aligned() {
        let mut writer = VarTracker::new();
        let mut other = VarTracker::new();
        for i in 0..3 {
            writer.append(RequestHandle(i), 16).unwrap();
            other.append(RequestHandle::NULL, 16).unwrap();
        }
        assert_eq!(writer.len(), other.len());
        assert!(other.requests().iter().all(|h| h.is_null()));
        assert!(writer.requests().iter().all(|h| !h.is_null()));
    }

    #[test]
    fn test_reset_keeps_issued_count() {
        let mut tracker = VarTracker::new();
        tracker.append(RequestHandle(0), 4).unwrap();
        tracker.append(RequestHandle(1), 4).unwrap();
        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.issued(), 2);
    }
}
