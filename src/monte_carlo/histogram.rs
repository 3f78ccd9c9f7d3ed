//! Fixed-width rate histograms

use crate::grid;
use crate::pdf::DiscretePdf;
use crate::{Result, SlipRateError};

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    lo: f64,
    hi: f64,
    width: f64,
    counts: Vec<u64>,
    overflow: u64,
}

impl Histogram {
    /// Bins of width `width` covering `[lo, hi]`; the last bin is clipped to `hi`.
    pub fn new(lo: f64, hi: f64, width: f64) -> Result<Self> {
        if !(hi > lo && width > 0.0 && width.is_finite()) {
            return Err(SlipRateError::InvalidConfig(format!(
                "histogram needs lo < hi and a positive bin width, got [{lo}, {hi}] / {width}"
            )));
        }
        let bins = ((hi - lo) / width - 1e-9).ceil().max(1.0) as usize;
        if bins > grid::MAX_GRID_POINTS {
            return Err(SlipRateError::GridTooLarge {
                points: bins,
                limit: grid::MAX_GRID_POINTS,
            });
        }
        Ok(Self {
            lo,
            hi,
            width,
            counts: vec![0; bins],
            overflow: 0,
        })
    }

    /// Empty histogram with the same binning.
    pub fn empty_like(&self) -> Self {
        Self {
            counts: vec![0; self.counts.len()],
            overflow: 0,
            ..*self
        }
    }

    pub fn record(&mut self, x: f64) {
        if !(x >= self.lo && x <= self.hi) {
            self.overflow += 1;
            return;
        }
        let bin = (((x - self.lo) / self.width) as usize).min(self.counts.len() - 1);
        self.counts[bin] += 1;
    }

    /// Add the counts of a histogram with identical binning.
    pub fn merge(&mut self, other: &Histogram) {
        for (c, o) in self.counts.iter_mut().zip(&other.counts) {
            *c += o;
        }
        self.overflow += other.overflow;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Samples that fell outside `[lo, hi]`.
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Bin centres, clipped to `hi` for a partial last bin.
    pub fn centres(&self) -> Vec<f64> {
        let last = self.counts.len() - 1;
        (0..self.counts.len())
            .map(|k| {
                let left = self.lo + k as f64 * self.width;
                let right = if k == last { self.hi } else { left + self.width };
                grid::fix_precision(0.5 * (left + right))
            })
            .collect()
    }

    /// Normalised density sampled at bin centres.
    pub fn to_pdf(&self) -> Result<DiscretePdf> {
        let densities = self.counts.iter().map(|&c| c as f64).collect();
        DiscretePdf::new(self.centres(), densities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_overflow() {
        let mut h = Histogram::new(0.0, 1.0, 0.25).unwrap();
        for x in [0.0, 0.1, 0.3, 0.99, 1.0, 1.01, -0.01, f64::NAN] {
            h.record(x);
        }
        assert_eq!(h.counts(), &[2, 1, 0, 2]);
        assert_eq!(h.overflow(), 3);
        assert_eq!(h.centres(), vec![0.125, 0.375, 0.625, 0.875]);
    }

    #[test]
    fn test_merge_sums_counts() {
        let mut a = Histogram::new(0.0, 1.0, 0.5).unwrap();
        let mut b = a.empty_like();
        a.record(0.2);
        b.record(0.7);
        b.record(2.0);
        a.merge(&b);
        assert_eq!(a.counts(), &[1, 1]);
        assert_eq!(a.overflow(), 1);
        assert_eq!(a.total(), 2);
    }

    #[test]
    fn test_to_pdf_is_normalized() {
        let mut h = Histogram::new(0.0, 10.0, 1.0).unwrap();
        for x in [4.5, 5.5, 5.2, 6.1] {
            h.record(x);
        }
        let pdf = h.to_pdf().unwrap();
        assert!((pdf.area() - 1.0).abs() < 1e-12);
        assert_eq!(pdf.interpolate(10.5), 0.0);
        assert!(h.empty_like().to_pdf().is_err());
    }
}
