//! Configuration types for collio.

/// Tunables for the nonblocking request tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Request-list backing storage grows by this many entries at a time.
    pub chunk: usize,
    /// Accumulated pending-write bytes that trigger a best-effort flush of
    /// the backend's write buffers. Flush failure is advisory.
    pub flush_watermark: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            chunk: 16,
            flush_watermark: 8 << 20, // 8 MiB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.chunk, 16);
        assert_eq!(cfg.flush_watermark, 8 << 20);
    }
}
