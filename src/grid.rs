//! Value arrays and quadrature
//!
//! Binary operators never work on raw operand supports. They first agree on
//! an evaluation grid built here: either a regular lattice with a shared step
//! (convolutions) or the union of both supports (distance metrics).

use crate::{Result, SlipRateError};

/// Decimal places kept when generating grid values.
pub const PRECISION_DECIMALS: i32 = 10;

/// Upper bound on the number of points of any generated grid.
pub const MAX_GRID_POINTS: usize = 4_000_000;

/// Round away floating-point noise below the library precision.
pub fn fix_precision(x: f64) -> f64 {
    let scale = 10f64.powi(PRECISION_DECIMALS);
    let scaled = x * scale;
    // Beyond 2^52 the value carries no sub-precision noise to remove
    if scaled.abs() >= 4.5e15 {
        return x;
    }
    scaled.round() / scale
}

fn check_step(step: f64) -> Result<()> {
    if !(step.is_finite() && step > 0.0) {
        return Err(SlipRateError::InvalidConfig(format!(
            "grid step must be positive and finite, got {step}"
        )));
    }
    Ok(())
}

/// Point count of a grid spanning `intervals` steps, checked before any cast.
fn point_count(intervals: f64) -> Result<usize> {
    let points = intervals + 1.0;
    if !(points <= MAX_GRID_POINTS as f64) {
        return Err(SlipRateError::GridTooLarge {
            points: if points.is_finite() { points as usize } else { usize::MAX },
            limit: MAX_GRID_POINTS,
        });
    }
    Ok(points as usize)
}

/// Regular grid starting at `start` with spacing `step` that reaches at least `stop`.
pub fn regular(start: f64, stop: f64, step: f64) -> Result<Vec<f64>> {
    check_step(step)?;
    if !(start.is_finite() && stop.is_finite()) || stop < start {
        return Err(SlipRateError::InvalidConfig(format!(
            "grid bounds must be finite and ordered, got [{start}, {stop}]"
        )));
    }

    let span = (stop - start) / step;
    let n = point_count((span - 1e-9).ceil().max(0.0))?;

    Ok((0..n).map(|i| fix_precision(start + i as f64 * step)).collect())
}

/// Representative spacing of a support: the median of consecutive differences.
pub fn native_step(values: &[f64]) -> f64 {
    let mut diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    if diffs.is_empty() {
        return 0.0;
    }
    diffs.sort_by(f64::total_cmp);
    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 0 {
        0.5 * (diffs[mid - 1] + diffs[mid])
    } else {
        diffs[mid]
    };
    fix_precision(median)
}

/// Accept a native step only if it survives rounding to the grid precision.
pub fn resolvable_step(step: f64) -> Result<f64> {
    if step > 0.0 && step.is_finite() {
        return Ok(step);
    }
    Err(SlipRateError::InvalidDistribution(format!(
        "support spacing is finer than the grid precision of 1e-{PRECISION_DECIMALS}"
    )))
}

/// Points of the lattice `origin + k * step` that cover `[min, max]`.
///
/// Returns the index of the first point together with the point values.
pub fn lattice(min: f64, max: f64, origin: f64, step: f64) -> Result<(i64, Vec<f64>)> {
    check_step(step)?;
    let lo = ((min - origin) / step + 1e-9).floor();
    let hi = ((max - origin) / step - 1e-9).ceil().max(lo + 1.0);
    point_count(hi - lo)?;
    let first = lo as i64;
    let last = hi as i64;

    let values = (first..=last)
        .map(|k| fix_precision(origin + k as f64 * step))
        .collect();
    Ok((first, values))
}

/// Sorted union of two increasing supports, near-duplicates removed.
pub fn union(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut merged: Vec<f64> = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = if j >= b.len() || (i < a.len() && a[i] <= b[j]) {
            i += 1;
            a[i - 1]
        } else {
            j += 1;
            b[j - 1]
        };
        match merged.last() {
            Some(&last) if next - last <= 1e-12 * last.abs().max(1.0) => {}
            _ => merged.push(next),
        }
    }
    merged
}

/// Piecewise-linear interpolation of `(xs, ys)` at `x`, with constants outside.
pub fn interp(x: f64, xs: &[f64], ys: &[f64], left: f64, right: f64) -> f64 {
    let n = xs.len();
    if n == 0 || x < xs[0] {
        return left;
    }
    if x > xs[n - 1] {
        return right;
    }
    let idx = xs.partition_point(|&v| v < x);
    if idx == 0 {
        return ys[0];
    }
    if idx >= n {
        return ys[n - 1];
    }
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let (y0, y1) = (ys[idx - 1], ys[idx]);
    if x1 == x0 {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Trapezoidal integral of `y` over `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| 0.5 * (xw[1] - xw[0]) * (yw[0] + yw[1]))
        .sum()
}

/// Running trapezoidal integral, starting at zero.
pub fn cumulative_trapezoid(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    let mut acc = 0.0;
    out.push(acc);
    for (xw, yw) in x.windows(2).zip(y.windows(2)) {
        acc += 0.5 * (xw[1] - xw[0]) * (yw[0] + yw[1]);
        out.push(acc);
    }
    out
}

/// Per-point quadrature weights such that `sum(w * y)` equals `trapezoid(x, y)`.
pub fn trapezoid_weights(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut w = vec![0.0; n];
    for i in 0..n.saturating_sub(1) {
        let half = 0.5 * (x[i + 1] - x[i]);
        w[i] += half;
        w[i + 1] += half;
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_covers_stop() {
        let x = regular(0.0, 1.0, 0.1).unwrap();
        assert_eq!(x.len(), 11);
        assert_eq!(x[10], 1.0);
        assert_eq!(x[3], 0.3);

        let x = regular(0.0, 1.05, 0.1).unwrap();
        assert_eq!(x.len(), 12);
        assert!(*x.last().unwrap() >= 1.05);
    }

    #[test]
    fn test_regular_rejects_bad_step() {
        assert!(regular(0.0, 1.0, 0.0).is_err());
        assert!(regular(0.0, 1.0, f64::NAN).is_err());
        assert!(matches!(
            regular(0.0, 1.0, 1e-9),
            Err(SlipRateError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_huge_grids_fail_without_overflow() {
        assert!(matches!(
            regular(0.0, 1.0, 1e-300),
            Err(SlipRateError::GridTooLarge { .. })
        ));
        assert!(matches!(
            lattice(0.0, 1e10, 0.0, 1e-10),
            Err(SlipRateError::GridTooLarge { .. })
        ));
        assert!(matches!(
            lattice(-1e300, 1e300, 0.0, 1e-300),
            Err(SlipRateError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_sub_precision_spacing_is_rejected() {
        let step = native_step(&[0.0, 2e-11, 4e-11, 6e-11]);
        assert_eq!(step, 0.0);
        assert!(matches!(
            resolvable_step(step),
            Err(SlipRateError::InvalidDistribution(_))
        ));
        assert_eq!(resolvable_step(0.01).unwrap(), 0.01);
    }

    #[test]
    fn test_lattice_alignment() {
        let (first, x) = lattice(0.25, 0.75, 0.0, 0.1).unwrap();
        assert_eq!(first, 2);
        assert_eq!(x.first().copied(), Some(0.2));
        assert_eq!(x.last().copied(), Some(0.8));
    }

    #[test]
    fn test_union_dedups() {
        let u = union(&[0.0, 1.0, 2.0], &[0.5, 1.0, 3.0]);
        assert_eq!(u, vec![0.0, 0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_trapezoid_helpers_agree() {
        let x = [0.0, 0.5, 1.5, 2.0];
        let y = [1.0, 2.0, 0.5, 0.0];
        let direct = trapezoid(&x, &y);
        let weighted: f64 = trapezoid_weights(&x).iter().zip(&y).map(|(w, v)| w * v).sum();
        let cumulative = cumulative_trapezoid(&x, &y);
        assert!((direct - weighted).abs() < 1e-12);
        assert!((direct - cumulative[3]).abs() < 1e-12);
    }

    #[test]
    fn test_interp_bounds() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 2.0, 0.0];
        assert_eq!(interp(-1.0, &xs, &ys, 0.0, 0.0), 0.0);
        assert_eq!(interp(0.5, &xs, &ys, 0.0, 0.0), 1.0);
        assert_eq!(interp(1.0, &xs, &ys, 0.0, 0.0), 2.0);
        assert_eq!(interp(3.0, &xs, &ys, 0.0, 1.0), 1.0);
    }
}
