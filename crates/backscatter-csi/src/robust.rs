//! Sliding-window robust statistics.
//!
//! The median and Median Absolute Deviation (MAD) are recomputed over the
//! last `capacity` samples on every update. A handful of outliers in the
//! window barely move either statistic, which keeps the normalization of
//! a bursty measure stable.

use std::collections::VecDeque;

/// Median and MAD of a window snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustStats {
    pub median: f64,
    /// `median(|x - median|) + epsilon`, never zero for a positive epsilon
    pub mad: f64,
}

/// Bounded FIFO of real samples with median/MAD queries
#[derive(Debug, Clone)]
pub struct RobustWindow {
    capacity: usize,
    buffer: VecDeque<f64>,
}

impl RobustWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, x: f64) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(x);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.buffer.iter()
    }

    /// Median and guarded MAD of the current window, `None` while empty
    pub fn stats(&self, epsilon: f64) -> Option<RobustStats> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut values: Vec<f64> = self.buffer.iter().copied().collect();
        let median = median_in_place(&mut values);

        for v in values.iter_mut() {
            *v = (*v - median).abs();
        }
        let mad = median_in_place(&mut values) + epsilon;

        Some(RobustStats { median, mad })
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Median of a slice; the mean of the two middle values for even lengths.
///
/// Reorders `data`. Returns NaN for an empty slice.
pub fn median_in_place(data: &mut [f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }

    data.sort_by(|a, b| a.total_cmp(b));

    let mid = data.len() / 2;
    if data.len() % 2 == 0 {
        (data[mid - 1] + data[mid]) / 2.0
    } else {
        data[mid]
    }
}

/// Median of a slice without touching the input
pub fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    median_in_place(&mut sorted)
}
