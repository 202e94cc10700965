//! Long-audio segmentation and overlap-add merging.

use crate::constants::MERGE_EPS;

/// One analysis window over the input: `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpan {
    pub start: usize,
    pub len: usize,
}

impl SegmentSpan {
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Split `total` samples into overlapping segments.
///
/// Buffers no longer than `segment_len` are one segment. Longer buffers get
/// `ceil(total / hop)` segments starting every `hop` samples, each clipped at the
/// buffer end.
#[must_use]
pub fn plan_segments(total: usize, segment_len: usize, hop: usize) -> Vec<SegmentSpan> {
    debug_assert!(segment_len > 0 && hop > 0);
    if total <= segment_len {
        return vec![SegmentSpan {
            start: 0,
            len: total,
        }];
    }
    (0..total.div_ceil(hop))
        .map(|i| {
            let start = i * hop;
            SegmentSpan {
                start,
                len: segment_len.min(total - start),
            }
        })
        .collect()
}

/// Summed amplitude and coverage count over the full output length.
#[derive(Debug, Clone)]
pub struct OverlapAccumulator {
    sum: Vec<f32>,
    count: Vec<f32>,
}

impl OverlapAccumulator {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            sum: vec![0.0f32; len],
            count: vec![0.0f32; len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sum.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    /// Add `samples` at `start`; anything past the end is dropped.
    pub fn add(&mut self, start: usize, samples: &[f32]) {
        let end = (start + samples.len()).min(self.sum.len());
        if start >= end {
            return;
        }
        let n = end - start;
        for (acc, &v) in self.sum[start..end].iter_mut().zip(&samples[..n]) {
            *acc += v;
        }
        for c in &mut self.count[start..end] {
            *c += 1.0;
        }
    }

    /// `sum / (count + eps)` per sample.
    #[must_use]
    pub fn finish(self) -> Vec<f32> {
        self.sum
            .into_iter()
            .zip(self.count)
            .map(|(s, c)| s / (c + MERGE_EPS))
            .collect()
    }
}
