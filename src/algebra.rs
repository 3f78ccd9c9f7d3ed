//! Operators on discrete PDFs
//!
//! Sums, differences, products and quotients of independent random variables
//! are all evaluated as convolution-style integrals. Before any integral, both
//! operands are sampled on a shared evaluation grid:
//!
//! * convolutions use the lattice `origin + k * step` with the finer of the
//!   two native steps, so that sums and differences land on one regular grid
//!   (differences hit zero exactly, which keeps ordering truncation clean);
//! * distance metrics use the union of both supports, on which every
//!   interpolated density and CDF is piecewise linear.

use tracing::{debug, warn};

use crate::grid;
use crate::pdf::DiscretePdf;
use crate::units::{self, Quantity};
use crate::{Result, SlipRateError};

/// Number of intervals of a product or quotient grid when no step is given.
pub const DEFAULT_RESULT_INTERVALS: usize = 1000;

/// Probability beyond `±max_quotient` above which clipping a quotient is logged.
pub const CLIPPED_QUOTIENT_WARNING: f64 = 1e-3;

/// Bound on `len(a) * len(b)` for a single convolution.
pub const MAX_CONVOLUTION_WORK: usize = 500_000_000;

/// Evaluation grid for a quotient PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotientOptions {
    /// Largest quotient magnitude considered
    pub max_quotient: f64,
    /// Quotient grid spacing; `None` spreads `DEFAULT_RESULT_INTERVALS` over the range
    pub step: Option<f64>,
}

impl Default for QuotientOptions {
    fn default() -> Self {
        Self {
            max_quotient: 100.0,
            step: None,
        }
    }
}

fn shared_step(a: &DiscretePdf, b: &DiscretePdf) -> Result<f64> {
    grid::resolvable_step(a.native_step().min(b.native_step()))
}

fn sample(pdf: &DiscretePdf, xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|&x| pdf.interpolate(x)).collect()
}

fn check_work(na: usize, nb: usize) -> Result<()> {
    let work = na.saturating_mul(nb);
    if work > MAX_CONVOLUTION_WORK {
        return Err(SlipRateError::GridTooLarge {
            points: work,
            limit: MAX_CONVOLUTION_WORK,
        });
    }
    Ok(())
}

/// Full discrete convolution.
pub(crate) fn convolve(x: &[f64], h: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; x.len() + h.len() - 1];
    for (i, &xi) in x.iter().enumerate() {
        if xi == 0.0 {
            continue;
        }
        for (yk, &hj) in y[i..].iter_mut().zip(h) {
            *yk += xi * hj;
        }
    }
    y
}

/// Regular grid over the combined extent of several PDFs, at the finest native step.
fn common_grid(pdfs: &[&DiscretePdf]) -> Result<Vec<f64>> {
    let min = pdfs.iter().map(|p| p.min()).fold(f64::INFINITY, f64::min);
    let max = pdfs.iter().map(|p| p.max()).fold(f64::NEG_INFINITY, f64::max);
    let step = pdfs.iter().map(|p| p.native_step()).fold(f64::INFINITY, f64::min);
    grid::regular(min, max, grid::resolvable_step(step)?)
}

fn fold_quantity(operation: &'static str, pdfs: &[&DiscretePdf]) -> Result<Quantity> {
    let mut quantity = pdfs[0].quantity();
    for pdf in &pdfs[1..] {
        quantity = units::same_quantity(operation, quantity, pdf.quantity())?;
    }
    Ok(quantity)
}

/// Aligned lattice samples of both operands: `(first index, densities)` each.
struct Lattice {
    origin: f64,
    step: f64,
    a_first: i64,
    a: Vec<f64>,
    b_first: i64,
    b: Vec<f64>,
}

impl Lattice {
    fn new(a: &DiscretePdf, b: &DiscretePdf) -> Result<Self> {
        let step = shared_step(a, b)?;
        let origin = a.min().min(b.min());
        let (a_first, xa) = grid::lattice(a.min(), a.max(), origin, step)?;
        let (b_first, xb) = grid::lattice(b.min(), b.max(), origin, step)?;
        check_work(xa.len(), xb.len())?;
        debug!(step, a_points = xa.len(), b_points = xb.len(), "shared lattice");
        Ok(Self {
            origin,
            step,
            a_first,
            a: sample(a, &xa),
            b_first,
            b: sample(b, &xb),
        })
    }

    fn point(&self, offset: f64, k: i64) -> f64 {
        grid::fix_precision(offset + k as f64 * self.step)
    }
}

/// PDF of `X + Y`: `f(z) = ∫ A(x) B(z - x) dx`.
pub fn add(a: &DiscretePdf, b: &DiscretePdf) -> Result<DiscretePdf> {
    let quantity = units::same_quantity("addition", a.quantity(), b.quantity())?;
    let lat = Lattice::new(a, b)?;
    let densities = convolve(&lat.a, &lat.b);
    let first = lat.a_first + lat.b_first;
    let values = (0..densities.len())
        .map(|k| lat.point(2.0 * lat.origin, first + k as i64))
        .collect();
    Ok(DiscretePdf::new(values, densities)?.with_quantity(quantity))
}

/// PDF of `X - Y`: `f(z) = ∫ A(x) B(x - z) dx`.
pub fn subtract(a: &DiscretePdf, b: &DiscretePdf) -> Result<DiscretePdf> {
    let quantity = units::same_quantity("subtraction", a.quantity(), b.quantity())?;
    let lat = Lattice::new(a, b)?;
    let reversed: Vec<f64> = lat.b.iter().rev().copied().collect();
    let densities = convolve(&lat.a, &reversed);
    let first = lat.a_first - lat.b_first - (lat.b.len() as i64 - 1);
    let values = (0..densities.len())
        .map(|k| lat.point(0.0, first + k as i64))
        .collect();
    Ok(DiscretePdf::new(values, densities)?.with_quantity(quantity))
}

/// PDF of `-X`.
pub fn negate(a: &DiscretePdf) -> DiscretePdf {
    a.negate()
}

fn result_grid(lo: f64, hi: f64, step: Option<f64>) -> Result<Vec<f64>> {
    if !(hi > lo) {
        return Err(SlipRateError::InvalidDistribution(format!(
            "result range [{lo}, {hi}] is empty"
        )));
    }
    let step = step.unwrap_or((hi - lo) / DEFAULT_RESULT_INTERVALS as f64);
    grid::regular(lo, hi, step)
}

/// Quotient range implied by the operand supports, clamped to `±limit`.
///
/// The flag is set when the clamp cut the range.
fn quotient_range(num: &DiscretePdf, den: &DiscretePdf, limit: f64) -> (f64, f64, bool) {
    let (n0, n1) = (num.min(), num.max());
    let (d0, d1) = (den.min(), den.max());

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for n in [n0, n1] {
        for d in [d0, d1] {
            if d != 0.0 {
                let q = n / d;
                lo = lo.min(q);
                hi = hi.max(q);
            }
        }
    }
    if d0 <= 0.0 && d1 >= 0.0 {
        // Denominator reaches zero: quotients are unbounded wherever signs allow
        if (n1 > 0.0 && d1 > 0.0) || (n0 < 0.0 && d0 < 0.0) {
            hi = f64::INFINITY;
        }
        if (n0 < 0.0 && d1 > 0.0) || (n1 > 0.0 && d0 < 0.0) {
            lo = f64::NEG_INFINITY;
        }
    }
    let clipped = lo < -limit || hi > limit;
    (lo.max(-limit), hi.min(limit), clipped)
}

/// Densities of `pdf` at non-decreasing `targets`, walking the support once.
fn sample_sorted(pdf: &DiscretePdf, targets: &[f64], out: &mut [f64]) {
    let xs = pdf.values();
    let ps = pdf.densities();
    let (min, max) = (pdf.min(), pdf.max());
    let mut idx = 1;
    for (t, o) in targets.iter().zip(out.iter_mut()) {
        if *t < min || *t > max {
            *o = 0.0;
            continue;
        }
        while idx < xs.len() - 1 && xs[idx] < *t {
            idx += 1;
        }
        let (x0, x1) = (xs[idx - 1], xs[idx]);
        *o = ps[idx - 1] + (ps[idx] - ps[idx - 1]) * (t - x0) / (x1 - x0);
    }
}

/// PDF of `X / Y` with default quotient options.
pub fn divide(numerator: &DiscretePdf, denominator: &DiscretePdf) -> Result<DiscretePdf> {
    divide_with(numerator, denominator, &QuotientOptions::default())
}

/// PDF of `X / Y` after Bird (2007): `f(r) = ∫ |y| B(y) A(r y) dy`.
///
/// This is the transformation-of-variables rule for the quotient of
/// independent variables; substituting `x = r y` gives the equivalent
/// `∫ A(x) B(x / r) |x| / r² dx`.
pub fn divide_with(
    numerator: &DiscretePdf,
    denominator: &DiscretePdf,
    options: &QuotientOptions,
) -> Result<DiscretePdf> {
    let quantity = units::quotient(numerator.quantity(), denominator.quantity())?;
    let (lo, hi, clipped) = quotient_range(numerator, denominator, options.max_quotient);
    let q = result_grid(lo, hi, options.step)?;
    check_work(q.len(), denominator.len())?;
    debug!(points = q.len(), lo, hi, "quotient grid");

    let y = denominator.values();
    let weights: Vec<f64> = grid::trapezoid_weights(y)
        .iter()
        .zip(y)
        .zip(denominator.densities())
        .map(|((w, yj), pj)| w * yj.abs() * pj)
        .collect();

    let n = y.len();
    let mut targets = vec![0.0; n];
    let mut sampled = vec![0.0; n];
    let densities: Vec<f64> = q
        .iter()
        .map(|&r| {
            // r * y is monotone in y; walk it in increasing order
            if r >= 0.0 {
                for (t, yj) in targets.iter_mut().zip(y) {
                    *t = r * yj;
                }
            } else {
                for (t, yj) in targets.iter_mut().zip(y.iter().rev()) {
                    *t = r * yj;
                }
            }
            sample_sorted(numerator, &targets, &mut sampled);
            if r >= 0.0 {
                sampled.iter().zip(&weights).map(|(s, w)| s * w).sum::<f64>()
            } else {
                sampled.iter().zip(weights.iter().rev()).map(|(s, w)| s * w).sum::<f64>()
            }
        })
        .collect();

    if clipped {
        // Operands are normalised, so the raw integral is the mass inside the range
        let retained = grid::trapezoid(&q, &densities);
        if !(retained > 1e-9) {
            return Err(SlipRateError::InvalidDistribution(format!(
                "quotient lies entirely beyond ±{}",
                options.max_quotient
            )));
        }
        let excluded = (1.0 - retained).max(0.0);
        if excluded > CLIPPED_QUOTIENT_WARNING {
            warn!(
                max_quotient = options.max_quotient,
                excluded,
                "quotient range clipped; probability beyond max_quotient is dropped"
            );
        }
    }

    Ok(DiscretePdf::new(q, densities)?.with_quantity(quantity))
}

/// PDF of `X * Y`: `f(z) = ∫ A(x) B(z / x) / |x| dx`.
///
/// `step` sets the product grid spacing; `None` spreads
/// `DEFAULT_RESULT_INTERVALS` over the product range.
pub fn multiply(a: &DiscretePdf, b: &DiscretePdf, step: Option<f64>) -> Result<DiscretePdf> {
    let quantity = units::product(a.quantity(), b.quantity())?;
    let corners = [a.min() * b.min(), a.min() * b.max(), a.max() * b.min(), a.max() * b.max()];
    let lo = corners.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = corners.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let z = result_grid(lo, hi, step)?;
    check_work(z.len(), a.len())?;

    let x = a.values();
    let weights: Vec<f64> = grid::trapezoid_weights(x)
        .iter()
        .zip(x)
        .zip(a.densities())
        .map(|((w, xj), pj)| if *xj == 0.0 { 0.0 } else { w * pj / xj.abs() })
        .collect();

    let densities: Vec<f64> = z
        .iter()
        .map(|&zk| {
            x.iter()
                .zip(&weights)
                .filter(|(_, w)| **w > 0.0)
                .map(|(xj, w)| w * b.interpolate(zk / xj))
                .sum::<f64>()
        })
        .collect();

    Ok(DiscretePdf::new(z, densities)?.with_quantity(quantity))
}

/// Joint density `A(x) B(y)` of two independent variables over the Cartesian
/// product of their supports.
#[derive(Debug, Clone, PartialEq)]
pub struct JointPdf {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Row-major: `density[i * y.len() + j]` is the density at `(x[i], y[j])`
    density: Vec<f64>,
    x_quantity: Quantity,
    y_quantity: Quantity,
}

impl JointPdf {
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn density(&self, i: usize, j: usize) -> f64 {
        self.density[i * self.y.len() + j]
    }

    /// Probability mass of the points satisfying `region(x, y)`.
    pub fn probability(&self, region: impl Fn(f64, f64) -> bool) -> f64 {
        let wx = grid::trapezoid_weights(&self.x);
        let wy = grid::trapezoid_weights(&self.y);
        let mut total = 0.0;
        for (i, &xi) in self.x.iter().enumerate() {
            for (j, &yj) in self.y.iter().enumerate() {
                if region(xi, yj) {
                    total += wx[i] * wy[j] * self.density(i, j);
                }
            }
        }
        total
    }

    pub fn marginal_x(&self) -> Result<DiscretePdf> {
        let wy = grid::trapezoid_weights(&self.y);
        let densities = (0..self.x.len())
            .map(|i| (0..self.y.len()).map(|j| wy[j] * self.density(i, j)).sum::<f64>())
            .collect();
        Ok(DiscretePdf::new(self.x.clone(), densities)?.with_quantity(self.x_quantity))
    }

    pub fn marginal_y(&self) -> Result<DiscretePdf> {
        let wx = grid::trapezoid_weights(&self.x);
        let densities = (0..self.y.len())
            .map(|j| (0..self.x.len()).map(|i| wx[i] * self.density(i, j)).sum::<f64>())
            .collect();
        Ok(DiscretePdf::new(self.y.clone(), densities)?.with_quantity(self.y_quantity))
    }
}

/// Joint PDF of two independent variables, kept two-dimensional.
pub fn combine(a: &DiscretePdf, b: &DiscretePdf) -> Result<JointPdf> {
    check_work(a.len(), b.len())?;
    let mut density = Vec::with_capacity(a.len() * b.len());
    for &pa in a.densities() {
        density.extend(b.densities().iter().map(|&pb| pa * pb));
    }
    Ok(JointPdf {
        x: a.values().to_vec(),
        y: b.values().to_vec(),
        density,
        x_quantity: a.quantity(),
        y_quantity: b.quantity(),
    })
}

/// Point-wise product of several estimates of one quantity, renormalised.
pub fn conflate(pdfs: &[&DiscretePdf]) -> Result<DiscretePdf> {
    if pdfs.is_empty() {
        return Err(SlipRateError::InvalidDistribution("nothing to conflate".to_string()));
    }
    let quantity = fold_quantity("conflation", pdfs)?;
    let x = common_grid(pdfs)?;
    let densities = x
        .iter()
        .map(|&xi| pdfs.iter().map(|p| p.interpolate(xi)).product::<f64>())
        .collect();
    Ok(DiscretePdf::new(x, densities)?.with_quantity(quantity))
}

/// Weighted mixture `Σ wᵢ PDFᵢ` of estimates of the same quantity.
///
/// `weights` defaults to equal weighting.
pub fn merge(pdfs: &[&DiscretePdf], weights: Option<&[f64]>) -> Result<DiscretePdf> {
    if pdfs.is_empty() {
        return Err(SlipRateError::InvalidDistribution("nothing to merge".to_string()));
    }
    let quantity = fold_quantity("merge", pdfs)?;
    let equal = vec![1.0; pdfs.len()];
    let weights = weights.unwrap_or(equal.as_slice());
    if weights.len() != pdfs.len() {
        return Err(SlipRateError::LengthMismatch {
            context: "merge weights",
            expected: pdfs.len(),
            got: weights.len(),
        });
    }
    if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) || weights.iter().sum::<f64>() <= 0.0 {
        return Err(SlipRateError::InvalidDistribution(
            "merge weights must be non-negative with a positive sum".to_string(),
        ));
    }

    let x = common_grid(pdfs)?;
    let densities = x
        .iter()
        .map(|&xi| pdfs.iter().zip(weights).map(|(p, w)| w * p.interpolate(xi)).sum::<f64>())
        .collect();
    Ok(DiscretePdf::new(x, densities)?.with_quantity(quantity))
}

/// Correlation integral `c(τ) = ∫ A(x) B(x + τ) dx` over all lags with overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossCorrelation {
    pub lags: Vec<f64>,
    pub values: Vec<f64>,
    norm: f64,
}

impl CrossCorrelation {
    /// Lag of maximum correlation.
    pub fn peak_lag(&self) -> f64 {
        let mut best = 0;
        for (k, v) in self.values.iter().enumerate() {
            if *v > self.values[best] {
                best = k;
            }
        }
        self.lags[best]
    }

    /// Values scaled by `sqrt(∫A² ∫B²)`, bounded by 1.
    pub fn normalized(&self) -> Vec<f64> {
        self.values.iter().map(|v| v / self.norm).collect()
    }
}

pub fn cross_correlate(a: &DiscretePdf, b: &DiscretePdf) -> Result<CrossCorrelation> {
    units::same_quantity("cross-correlation", a.quantity(), b.quantity())?;
    let lat = Lattice::new(a, b)?;
    let reversed: Vec<f64> = lat.a.iter().rev().copied().collect();
    let values: Vec<f64> = convolve(&reversed, &lat.b)
        .into_iter()
        .map(|c| c * lat.step)
        .collect();
    let first = lat.b_first - lat.a_first - (lat.a.len() as i64 - 1);
    let lags = (0..values.len())
        .map(|k| lat.point(0.0, first + k as i64))
        .collect();
    let energy = |p: &[f64]| p.iter().map(|v| v * v).sum::<f64>() * lat.step;
    let norm = (energy(&lat.a[..]) * energy(&lat.b[..])).sqrt();
    Ok(CrossCorrelation { lags, values, norm })
}

/// Zero-lag correlation `ΣAB / sqrt(ΣA² ΣB²)` on a common grid, without centring.
pub fn pearson_coefficient(a: &DiscretePdf, b: &DiscretePdf) -> Result<f64> {
    units::same_quantity("correlation", a.quantity(), b.quantity())?;
    let x = common_grid(&[a, b])?;
    let pa = sample(a, &x);
    let pb = sample(b, &x);
    let dot: f64 = pa.iter().zip(&pb).map(|(u, v)| u * v).sum();
    let na: f64 = pa.iter().map(|u| u * u).sum::<f64>().sqrt();
    let nb: f64 = pb.iter().map(|v| v * v).sum::<f64>().sqrt();
    Ok(dot / (na * nb))
}

/// Two-sample Kolmogorov-Smirnov distance: `max |F_A - F_B|`.
pub fn ks_statistic(a: &DiscretePdf, b: &DiscretePdf) -> Result<f64> {
    units::same_quantity("KS statistic", a.quantity(), b.quantity())?;
    // Both CDFs are linear between union knots, so the maximum sits on a knot
    let x = grid::union(a.values(), b.values());
    Ok(x.iter()
        .map(|&xi| (a.cdf_at(xi) - b.cdf_at(xi)).abs())
        .fold(0.0, f64::max))
}

/// Shared probability mass `∫ min(A, B) dx`, in `[0, 1]`.
pub fn overlap_index(a: &DiscretePdf, b: &DiscretePdf) -> Result<f64> {
    units::same_quantity("overlap index", a.quantity(), b.quantity())?;
    let knots = grid::union(a.values(), b.values());

    // Add crossing points so min(A, B) is linear on every segment
    let mut x = Vec::with_capacity(knots.len() * 2);
    for w in knots.windows(2) {
        x.push(w[0]);
        let d0 = a.interpolate(w[0]) - b.interpolate(w[0]);
        let d1 = a.interpolate(w[1]) - b.interpolate(w[1]);
        if d0 * d1 < 0.0 {
            x.push(w[0] + (w[1] - w[0]) * d0 / (d0 - d1));
        }
    }
    if let Some(&last) = knots.last() {
        x.push(last);
    }

    let m: Vec<f64> = x.iter().map(|&xi| a.interpolate(xi).min(b.interpolate(xi))).collect();
    Ok(grid::trapezoid(&x, &m).clamp(0.0, 1.0))
}

/// Probability that `B` exceeds `A`: `∫ A(x) (1 - F_B(x)) dx`.
pub fn gap_probability(a: &DiscretePdf, b: &DiscretePdf) -> Result<f64> {
    units::same_quantity("gap probability", a.quantity(), b.quantity())?;
    let x = grid::union(a.values(), b.values());
    let f = |xi: f64| a.interpolate(xi) * (1.0 - b.cdf_at(xi));
    // The integrand is quadratic between knots; Simpson's rule is exact there
    let p: f64 = x
        .windows(2)
        .map(|w| (w[1] - w[0]) / 6.0 * (f(w[0]) + 4.0 * f(0.5 * (w[0] + w[1])) + f(w[1])))
        .sum();
    Ok(p.clamp(0.0, 1.0))
}

/// Density of values lying above `A` and below `B`: `F_A(x) (1 - F_B(x))`.
pub fn between(a: &DiscretePdf, b: &DiscretePdf) -> Result<DiscretePdf> {
    let quantity = units::same_quantity("between", a.quantity(), b.quantity())?;
    let x = common_grid(&[a, b])?;
    let densities = x.iter().map(|&xi| a.cdf_at(xi) * (1.0 - b.cdf_at(xi))).collect();
    Ok(DiscretePdf::new(x, densities)?.with_quantity(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parametric::{boxcar, gaussian};
    use crate::units::{Unit, VariableType};

    fn age(mean: f64, sd: f64) -> DiscretePdf {
        gaussian(mean, sd, 0.02)
            .unwrap()
            .tagged(VariableType::Age, Some(Unit::KILOYEARS))
            .unwrap()
    }

    #[test]
    fn test_add_gaussians() {
        let sum = add(&age(7.0, 1.0), &age(10.0, 1.0)).unwrap();
        assert!((sum.mean() - 17.0).abs() < 1e-3);
        assert!((sum.variance() - 2.0).abs() < 1e-2);
        assert_eq!(sum.variable_type(), VariableType::Age);
        assert_eq!(sum.unit(), Some(Unit::KILOYEARS));
    }

    #[test]
    fn test_add_uniforms_is_triangle() {
        let u = boxcar(0.0, 1.0, 0.01).unwrap();
        let sum = add(&u, &u).unwrap();
        assert!((sum.mode() - 1.0).abs() < 0.02);
        assert!((sum.interpolate(0.5) - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_subtract_hits_zero_on_grid() {
        let diff = subtract(&age(10.0, 1.0), &age(7.0, 1.0)).unwrap();
        assert!((diff.mean() - 3.0).abs() < 1e-3);
        assert!((diff.variance() - 2.0).abs() < 1e-2);
        assert!(diff.values().iter().any(|&v| v == 0.0));
    }

    #[test]
    fn test_round_trip_keeps_mean() {
        let a = age(7.0, 1.0);
        let b = age(3.0, 0.5);
        let back = subtract(&add(&a, &b).unwrap(), &b).unwrap();
        assert!((back.mean() - a.mean()).abs() < 1e-3);
        // Independent noise accumulates rather than cancels
        assert!((back.variance() - (1.0 + 2.0 * 0.25)).abs() < 2e-2);
    }

    #[test]
    fn test_incompatible_operands() {
        let disp = gaussian(30.0, 1.0, 0.1)
            .unwrap()
            .tagged(VariableType::Displacement, Some(Unit::METERS))
            .unwrap();
        assert!(matches!(
            add(&age(7.0, 1.0), &disp),
            Err(SlipRateError::IncompatibleUnits { .. })
        ));
        assert!(overlap_index(&age(7.0, 1.0), &disp).is_err());
    }

    #[test]
    fn test_extreme_supports_fail_cleanly() {
        let sparse = DiscretePdf::new(vec![0.0, 1e-10, 2e-10, 1e10], vec![1.0; 4]).unwrap();
        let b = gaussian(0.0, 1.0, 0.1).unwrap();
        assert!(matches!(
            add(&sparse, &b),
            Err(SlipRateError::GridTooLarge { .. })
        ));

        let fine = DiscretePdf::new(vec![0.0, 2e-11, 4e-11, 6e-11], vec![1.0; 4]).unwrap();
        assert!(matches!(
            subtract(&fine, &b),
            Err(SlipRateError::InvalidDistribution(_))
        ));
        assert!(matches!(
            merge(&[&fine, &b], None),
            Err(SlipRateError::InvalidDistribution(_))
        ));
    }

    #[test]
    fn test_divide_displacement_by_age() {
        let disp = gaussian(30.0, 1.0, 0.02)
            .unwrap()
            .tagged(VariableType::Displacement, Some(Unit::METERS))
            .unwrap();
        let rate = divide(&disp, &age(10.0, 1.0)).unwrap();
        assert_eq!(rate.variable_type(), VariableType::SlipRate);
        assert_eq!(rate.unit().map(|u| u.to_string()), Some("m/ky".to_string()));
        assert!((rate.median() - 3.0).abs() < 0.05);
    }

    #[test]
    fn test_divide_by_constant_like_denominator() {
        let num = boxcar(2.0, 4.0, 0.01).unwrap();
        let den = gaussian(2.0, 0.01, 0.001).unwrap();
        let q = divide(&num, &den).unwrap();
        assert!((q.mean() - 1.5).abs() < 0.01);
    }

    #[test]
    fn test_quotient_beyond_limit_is_an_error() {
        let disp = gaussian(500.0, 5.0, 0.1)
            .unwrap()
            .tagged(VariableType::Displacement, Some(Unit::METERS))
            .unwrap();
        let age = gaussian(1.0, 0.05, 0.005)
            .unwrap()
            .tagged(VariableType::Age, Some(Unit::KILOYEARS))
            .unwrap();
        assert!(matches!(
            divide(&disp, &age),
            Err(SlipRateError::InvalidDistribution(_))
        ));
        let wide = QuotientOptions {
            max_quotient: 1000.0,
            step: Some(0.1),
        };
        let rate = divide_with(&disp, &age, &wide).unwrap();
        assert!((rate.median() - 500.0).abs() < 2.0);
    }

    #[test]
    fn test_multiply_inverts_divide() {
        let rate = gaussian(3.0, 0.2, 0.005)
            .unwrap()
            .tagged(VariableType::SlipRate, Some("m/ky".parse().unwrap()))
            .unwrap();
        let disp = multiply(&rate, &age(10.0, 0.5), None).unwrap();
        assert_eq!(disp.variable_type(), VariableType::Displacement);
        assert!((disp.mean() - 30.0).abs() < 0.1);
    }

    #[test]
    fn test_combine_region_probability_matches_gap() {
        let a = age(7.0, 1.0);
        let b = age(8.0, 1.0);
        let joint = combine(&a, &b).unwrap();
        let p_joint = joint.probability(|x, y| y > x);
        let p_gap = gap_probability(&a, &b).unwrap();
        assert!((p_joint - p_gap).abs() < 1e-2);
        let mx = joint.marginal_x().unwrap();
        assert!((mx.mean() - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_merge_weights() {
        let a = age(5.0, 0.5);
        let b = age(10.0, 0.5);
        let m = merge(&[&a, &b], Some(&[3.0, 1.0])).unwrap();
        assert!((m.mean() - 6.25).abs() < 1e-2);
        assert!((m.cdf_at(7.5) - 0.75).abs() < 1e-3);
        assert!(merge(&[&a, &b], Some(&[1.0])).is_err());
        assert!(merge(&[&a, &b], Some(&[0.0, 0.0])).is_err());
    }

    #[test]
    fn test_conflate_narrows() {
        let a = age(10.0, 1.0);
        let b = age(10.0, 1.0);
        let c = conflate(&[&a, &b]).unwrap();
        assert!((c.variance() - 0.5).abs() < 1e-2);
    }

    #[test]
    fn test_cross_correlation_peak_at_offset() {
        let a = age(7.0, 1.0);
        let b = age(10.0, 1.0);
        let xc = cross_correlate(&a, &b).unwrap();
        assert!((xc.peak_lag() - 3.0).abs() < 0.03);
        assert!(xc.normalized().iter().all(|v| *v <= 1.0 + 1e-9));
        let self_xc = cross_correlate(&a, &a).unwrap();
        let peak = self_xc.normalized().into_iter().fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ks_and_overlap() {
        let a = age(7.0, 1.0);
        assert!(ks_statistic(&a, &a).unwrap() < 1e-12);
        assert!((overlap_index(&a, &a).unwrap() - 1.0).abs() < 1e-9);

        let far = age(30.0, 1.0);
        assert!((ks_statistic(&a, &far).unwrap() - 1.0).abs() < 1e-9);
        assert!(overlap_index(&a, &far).unwrap() < 1e-9);
    }

    #[test]
    fn test_gap_probabilities_complement() {
        let a = age(7.0, 1.0);
        let b = age(10.0, 1.0);
        let ab = gap_probability(&a, &b).unwrap();
        let ba = gap_probability(&b, &a).unwrap();
        assert!((ab + ba - 1.0).abs() < 1e-3);
        // P(N(3, √2) > 0)
        assert!((ab - 0.983).abs() < 2e-3);
    }

    #[test]
    fn test_between_lies_between() {
        let b = between(&age(5.0, 0.5), &age(10.0, 0.5)).unwrap();
        assert!((b.mean() - 7.5).abs() < 0.05);
    }
}
