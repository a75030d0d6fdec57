//! Array transfer geometry: the start/count/stride triple.
//!
//! Callers may omit any of the three arrays. Absence is meaningful and is
//! preserved end to end — including across the async dispatch wire — until
//! the backend needs concrete arrays, at which point [`Geometry::resolve`]
//! produces the canonical [`Region`].

use crate::error::{Error, Result};

/// Optional caller-supplied geometry, exactly as passed at the call site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geometry {
    /// Per-dimension first index. `None` means all zeros.
    pub start: Option<Vec<u64>>,
    /// Per-dimension element count. Required for non-scalar variables.
    pub count: Option<Vec<u64>>,
    /// Per-dimension stride. `None` means all ones.
    pub stride: Option<Vec<u64>>,
}

impl Geometry {
    /// Bundle borrowed call-site arrays into an owned geometry.
    pub fn from_parts(
        start: Option<&[u64]>,
        count: Option<&[u64]>,
        stride: Option<&[u64]>,
    ) -> Self {
        Self {
            start: start.map(|s| s.to_vec()),
            count: count.map(|c| c.to_vec()),
            stride: stride.map(|s| s.to_vec()),
        }
    }

    /// Product of the explicit count array, if one was given.
    ///
    /// Computable from caller arguments alone, before any metadata lookup;
    /// the zero-extent early return relies on this.
    pub fn explicit_count_product(&self) -> Option<u64> {
        self.count.as_ref().map(|c| c.iter().product())
    }

    /// Resolve against the variable's dimensionality.
    ///
    /// Zero-dimension variables become one synthetic dimension of length 1,
    /// whether the caller omitted geometry or passed explicit length-1
    /// arrays. For `ndims > 0`, start and count are required and must have
    /// `ndims` entries; a missing stride defaults to ones.
    pub fn resolve(&self, ndims: usize) -> Result<Region> {
        if ndims == 0 {
            if let Some(c) = &self.count {
                if c.len() > 1 || (c.len() == 1 && c[0] != 1) {
                    return Err(Error::InvalidArg("scalar variable with non-unit count"));
                }
            }
            return Ok(Region {
                start: vec![0],
                count: vec![1],
                stride: vec![1],
            });
        }

        let start = self
            .start
            .as_ref()
            .ok_or(Error::InvalidArg("start required for non-scalar variable"))?;
        let count = self
            .count
            .as_ref()
            .ok_or(Error::InvalidArg("count required for non-scalar variable"))?;
        if start.len() != ndims || count.len() != ndims {
            return Err(Error::InvalidArg("geometry rank does not match variable"));
        }
        let stride = match &self.stride {
            Some(s) => {
                if s.len() != ndims {
                    return Err(Error::InvalidArg("stride rank does not match variable"));
                }
                if s.iter().any(|&v| v == 0) {
                    return Err(Error::InvalidArg("stride entries must be at least 1"));
                }
                s.clone()
            }
            None => vec![1; ndims],
        };

        Ok(Region {
            start: start.clone(),
            count: count.clone(),
            stride,
        })
    }
}

/// Fully resolved geometry handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: Vec<u64>,
    pub count: Vec<u64>,
    pub stride: Vec<u64>,
}

impl Region {
    pub fn ndims(&self) -> usize {
        self.count.len()
    }

    /// Total number of elements the region touches.
    pub fn element_count(&self) -> u64 {
        self.count.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_synthetic_dimension() {
        let omitted = Geometry::default().resolve(0).unwrap();
        let explicit = Geometry::from_parts(Some(&[0]), Some(&[1]), Some(&[1]))
            .resolve(0)
            .unwrap();
        assert_eq!(omitted, explicit);
        assert_eq!(omitted.count, vec![1]);
        assert_eq!(omitted.element_count(), 1);
    }

    #[test]
    fn test_missing_start_count_rejected() {
        let geom = Geometry::default();
        assert!(matches!(geom.resolve(2), Err(Error::InvalidArg(_))));
    }

    #[test]
    fn test_default_stride_is_ones() {
        let geom = Geometry::from_parts(Some(&[0, 2]), Some(&[3, 4]), None);
        let region = geom.resolve(2).unwrap();
        assert_eq!(region.stride, vec![1, 1]);
        assert_eq!(region.element_count(), 12);
    }

    #[test]
    fn test_zero_stride_rejected() {
        let geom = Geometry::from_parts(Some(&[0]), Some(&[3]), Some(&[0]));
        assert!(matches!(geom.resolve(1), Err(Error::InvalidArg(_))));
    }

    #[test]
    fn test_rank_mismatch_rejected() {
        let geom = Geometry::from_parts(Some(&[0]), Some(&[3, 4]), None);
        assert!(matches!(geom.resolve(2), Err(Error::InvalidArg(_))));
    }

    #[test]
    fn test_explicit_count_product() {
        let geom = Geometry::from_parts(None, Some(&[2, 0, 5]), None);
        assert_eq!(geom.explicit_count_product(), Some(0));
        assert_eq!(Geometry::default().explicit_count_product(), None);
    }
}
