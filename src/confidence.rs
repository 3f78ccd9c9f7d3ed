//! Confidence intervals from discrete PDFs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pdf::DiscretePdf;
use crate::{Result, SlipRateError};

/// One-sigma probability mass of a normal distribution.
pub const ONE_SIGMA: f64 = 0.682_689_492_137_086;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceMetric {
    /// Highest posterior density
    #[default]
    Hpd,
    #[serde(alias = "iqr", alias = "equal_tailed")]
    EqualTailed,
}

impl ConfidenceMetric {
    pub fn interval(self, pdf: &DiscretePdf, confidence: f64) -> Result<ConfidenceInterval> {
        match self {
            ConfidenceMetric::Hpd => hpd(pdf, confidence),
            ConfidenceMetric::EqualTailed => equal_tailed(pdf, confidence),
        }
    }
}

/// One or more disjoint value ranges enclosing `confidence` of the mass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceInterval {
    pub confidence: f64,
    /// Ordered, non-overlapping `(lo, hi)` ranges
    pub ranges: Vec<(f64, f64)>,
}

impl ConfidenceInterval {
    pub fn total_width(&self) -> f64 {
        self.ranges.iter().map(|(lo, hi)| hi - lo).sum()
    }

    pub fn contains(&self, x: f64) -> bool {
        self.ranges.iter().any(|&(lo, hi)| x >= lo && x <= hi)
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (lo, hi)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{lo:.3} - {hi:.3}")?;
        }
        Ok(())
    }
}

fn check(confidence: f64) -> Result<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(SlipRateError::ConfidenceOutOfRange(confidence));
    }
    Ok(())
}

/// Interval leaving `(1 - confidence) / 2` of the mass in each tail.
pub fn equal_tailed(pdf: &DiscretePdf, confidence: f64) -> Result<ConfidenceInterval> {
    check(confidence)?;
    let tail = 0.5 * (1.0 - confidence);
    Ok(ConfidenceInterval {
        confidence,
        ranges: vec![(pdf.pit(tail), pdf.pit(1.0 - tail))],
    })
}

/// Linearly interpolated percentile of sorted samples, `q` in `[0, 1]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = (i + 1).min(sorted.len() - 1);
    sorted[i] + (pos - i as f64) * (sorted[j] - sorted[i])
}

/// Equal-tailed range of raw samples, read off their empirical percentiles.
pub fn sample_range(samples: &[f64], confidence: f64) -> Result<ConfidenceInterval> {
    check(confidence)?;
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
    if sorted.is_empty() {
        return Err(SlipRateError::InvalidDistribution(
            "no finite samples to take percentiles from".to_string(),
        ));
    }
    sorted.sort_by(f64::total_cmp);
    let tail = 0.5 * (1.0 - confidence);
    Ok(ConfidenceInterval {
        confidence,
        ranges: vec![(percentile(&sorted, tail), percentile(&sorted, 1.0 - tail))],
    })
}

/// Offset into a segment, from the end with density `d0`, that holds `m` of
/// its mass under the linearly interpolated density.
fn offset_for_mass(d0: f64, d1: f64, h: f64, m: f64) -> f64 {
    let a = (d1 - d0) / (2.0 * h);
    let denom = d0 + (d0 * d0 + 4.0 * a * m).max(0.0).sqrt();
    if denom <= 0.0 {
        return 0.0;
    }
    (2.0 * m / denom).clamp(0.0, h)
}

/// Highest-density region enclosing `confidence`, as contiguous ranges.
/// Multimodal PDFs yield several ranges.
///
/// Segments between support points are taken in order of decreasing mean
/// density until their mass reaches `confidence`. The surplus is then cut
/// from the open end of the last segment taken, so the ranges enclose
/// `confidence` of the interpolated density.
pub fn hpd(pdf: &DiscretePdf, confidence: f64) -> Result<ConfidenceInterval> {
    check(confidence)?;
    let x = pdf.values();
    let d = pdf.densities();
    let segments = x.len() - 1;
    let mass: Vec<f64> = (0..segments)
        .map(|i| 0.5 * (x[i + 1] - x[i]) * (d[i] + d[i + 1]))
        .collect();

    let mut order: Vec<usize> = (0..segments).collect();
    order.sort_by(|&i, &j| (d[j] + d[j + 1]).total_cmp(&(d[i] + d[i + 1])));

    let mut selected = vec![false; segments];
    let mut acc = 0.0;
    let mut last = order[0];
    for i in order {
        selected[i] = true;
        acc += mass[i];
        last = i;
        if acc >= confidence {
            break;
        }
    }

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < segments {
        if !selected[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < segments && selected[i] {
            i += 1;
        }
        ranges.push((x[start], x[i]));
    }

    // Enclosed mass stays at or above `confidence` after rounding
    let surplus = (acc - confidence).max(0.0) * (1.0 - 1e-9);
    if surplus > 0.0 {
        let (x0, x1, d0, d1) = (x[last], x[last + 1], d[last], d[last + 1]);
        let left_open = last == 0 || !selected[last - 1];
        let right_open = last + 1 == segments || !selected[last + 1];
        if left_open && (!right_open || d0 <= d1) {
            let t = offset_for_mass(d0, d1, x1 - x0, surplus);
            if let Some(r) = ranges.iter_mut().find(|r| r.0 == x0) {
                r.0 = x0 + t;
            }
        } else if right_open {
            let t = offset_for_mass(d1, d0, x1 - x0, surplus);
            if let Some(r) = ranges.iter_mut().find(|r| r.1 == x1) {
                r.1 = x1 - t;
            }
        }
    }

    Ok(ConfidenceInterval { confidence, ranges })
}
