//! Segment planning
//!
//! A segment is a contiguous sample range `[start, start + len)`. A
//! [`SegmentPlan`] splits `[0, total)` into consecutive segments of a fixed
//! size, the last one truncated to the remainder.

use crate::error::{MixError, Result};

/// Contiguous sample-index range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub len: usize,
}

impl Segment {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last sample index, saturating at `usize::MAX`
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    /// True if the whole segment lies inside `[0, total)`
    pub fn fits_within(&self, total: usize) -> bool {
        self.start <= total && self.len <= total - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Iterator over the segments covering `[0, total)`
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    total: usize,
    segment_size: usize,
    next_start: usize,
}

impl SegmentPlan {
    /// Plan segments of `segment_size` samples over `total` samples
    ///
    /// Fails with `Config` if `segment_size` is zero.
    pub fn new(total: usize, segment_size: usize) -> Result<Self> {
        if segment_size == 0 {
            return Err(MixError::Config("segment size must be at least 1".to_string()));
        }
        Ok(Self {
            total,
            segment_size,
            next_start: 0,
        })
    }

    /// Total number of segments, `ceil(total / segment_size)`
    pub fn segment_count(&self) -> usize {
        self.total.div_ceil(self.segment_size)
    }
}

impl Iterator for SegmentPlan {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.next_start >= self.total {
            return None;
        }
        let len = self.segment_size.min(self.total - self.next_start);
        let segment = Segment::new(self.next_start, len);
        self.next_start += len;
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.next_start).div_ceil(self.segment_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SegmentPlan {}
