//! Discrete probability density functions
//!
//! A `DiscretePdf` is a piecewise-linear density over a strictly increasing
//! support. Density is zero outside the support, and the trapezoidal integral
//! over the support is 1. Instances are immutable: every transform returns a
//! new, renormalised PDF.

use std::fmt;

use crate::grid;
use crate::units::{Unit, VariableType};
use crate::{Result, SlipRateError};

/// Relative size of a negative density that is treated as rounding noise.
pub const NEGATIVE_DENSITY_TOLERANCE: f64 = 1e-12;

/// Maximum deviation of the integral from 1 for a valid PDF.
pub const AREA_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscretePdf {
    values: Vec<f64>,
    densities: Vec<f64>,
    cdf: Vec<f64>,
    name: Option<String>,
    variable_type: VariableType,
    unit: Option<Unit>,
}

/// Location and moment statistics of a PDF
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfSummary {
    pub mode: f64,
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl DiscretePdf {
    /// Build a PDF from value/density pairs, rescaling densities to unit area.
    ///
    /// # Errors
    /// * `LengthMismatch` if the two arrays differ in length
    /// * `DegenerateSupport` for fewer than two points
    /// * `InvalidDistribution` for non-increasing values, negative or
    ///   non-finite densities, or zero total probability
    pub fn new(values: Vec<f64>, mut densities: Vec<f64>) -> Result<Self> {
        if values.len() != densities.len() {
            return Err(SlipRateError::LengthMismatch {
                context: "pdf densities",
                expected: values.len(),
                got: densities.len(),
            });
        }
        if values.len() < 2 {
            return Err(SlipRateError::DegenerateSupport {
                points: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SlipRateError::InvalidDistribution(
                "support values must be finite".to_string(),
            ));
        }
        if values.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SlipRateError::InvalidDistribution(
                "support values must be strictly increasing".to_string(),
            ));
        }
        if densities.iter().any(|d| !d.is_finite()) {
            return Err(SlipRateError::InvalidDistribution(
                "densities must be finite".to_string(),
            ));
        }

        let peak = densities.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        for d in densities.iter_mut() {
            if *d < 0.0 {
                if -*d > NEGATIVE_DENSITY_TOLERANCE * peak {
                    return Err(SlipRateError::InvalidDistribution(format!(
                        "negative density {d}"
                    )));
                }
                *d = 0.0;
            }
        }

        let area = grid::trapezoid(&values, &densities);
        if !(area.is_finite() && area > 0.0) {
            return Err(SlipRateError::InvalidDistribution(
                "total probability is zero".to_string(),
            ));
        }
        for d in densities.iter_mut() {
            *d /= area;
        }

        let mut cdf = grid::cumulative_trapezoid(&values, &densities);
        let total = cdf[cdf.len() - 1];
        for c in cdf.iter_mut() {
            *c = (*c / total).min(1.0);
        }

        Ok(Self {
            values,
            densities,
            cdf,
            name: None,
            variable_type: VariableType::Other,
            unit: None,
        })
    }

    /// Attach a name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a variable type and unit, checking that they agree.
    pub fn tagged(mut self, variable_type: VariableType, unit: Option<Unit>) -> Result<Self> {
        if let Some(u) = unit {
            if !variable_type.admits(u) {
                return Err(SlipRateError::IncompatibleUnits {
                    operation: "tagging",
                    left: variable_type.to_string(),
                    right: u.to_string(),
                });
            }
        }
        self.variable_type = variable_type;
        self.unit = unit;
        Ok(self)
    }

    /// Copy name, variable type and unit from another PDF.
    pub(crate) fn with_metadata_of(mut self, other: &DiscretePdf) -> Self {
        self.name = other.name.clone();
        self.variable_type = other.variable_type;
        self.unit = other.unit;
        self
    }

    pub(crate) fn with_quantity(mut self, quantity: crate::units::Quantity) -> Self {
        self.variable_type = quantity.0;
        self.unit = quantity.1;
        self
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn densities(&self) -> &[f64] {
        &self.densities
    }

    /// Cumulative distribution sampled on the support, ending at exactly 1.
    pub fn cdf(&self) -> &[f64] {
        &self.cdf
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn variable_type(&self) -> VariableType {
        self.variable_type
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }

    pub(crate) fn quantity(&self) -> crate::units::Quantity {
        (self.variable_type, self.unit)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.values[0]
    }

    pub fn max(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Median spacing of the support.
    pub fn native_step(&self) -> f64 {
        grid::native_step(&self.values)
    }

    /// Trapezoidal integral of the densities.
    pub fn area(&self) -> f64 {
        grid::trapezoid(&self.values, &self.densities)
    }

    /// Density at `x`; zero outside the support.
    pub fn interpolate(&self, x: f64) -> f64 {
        grid::interp(x, &self.values, &self.densities, 0.0, 0.0)
    }

    /// P(X <= x).
    pub fn cdf_at(&self, x: f64) -> f64 {
        grid::interp(x, &self.values, &self.cdf, 0.0, 1.0)
    }

    /// P(x1 < X <= x2).
    pub fn probability_between(&self, x1: f64, x2: f64) -> f64 {
        (self.cdf_at(x2) - self.cdf_at(x1)).max(0.0)
    }

    /// Probability inverse transform: the value whose CDF equals `u`.
    pub fn pit(&self, u: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        let n = self.cdf.len();
        let idx = self.cdf.partition_point(|&c| c < u);
        if idx == 0 {
            return self.values[0];
        }
        if idx >= n {
            return self.values[n - 1];
        }
        let (c0, c1) = (self.cdf[idx - 1], self.cdf[idx]);
        let (x0, x1) = (self.values[idx - 1], self.values[idx]);
        if c1 <= c0 {
            return x1;
        }
        x0 + (x1 - x0) * (u - c0) / (c1 - c0)
    }

    /// Re-express the PDF over `support` by interpolation and renormalisation.
    pub fn resample(&self, support: &[f64]) -> Result<DiscretePdf> {
        let densities = support.iter().map(|&x| self.interpolate(x)).collect();
        Ok(DiscretePdf::new(support.to_vec(), densities)?.with_metadata_of(self))
    }

    /// Resample onto a regular grid from `min` to `max` with spacing `step`.
    ///
    /// Missing bounds default to the ends of the support and a missing step to
    /// its median spacing. Points beyond the support get zero density.
    pub fn regrid(&self, min: Option<f64>, max: Option<f64>, step: Option<f64>) -> Result<DiscretePdf> {
        let step = step.unwrap_or_else(|| self.native_step());
        let support = grid::regular(min.unwrap_or(self.min()), max.unwrap_or(self.max()), step)?;
        self.resample(&support)
    }

    /// Re-express a PDF of calendar years as an age before `reference`.
    ///
    /// The support is mirrored so that ages increase. An untagged unit is
    /// taken as years. With `limit_zero` set, ages younger than zero are cut
    /// off and the remainder renormalised.
    pub fn calendar_to_age(&self, reference: f64, limit_zero: bool) -> Result<DiscretePdf> {
        if !reference.is_finite() {
            return Err(SlipRateError::InvalidConfig(format!(
                "reference date must be finite, got {reference}"
            )));
        }
        let values: Vec<f64> = self.values.iter().rev().map(|year| reference - year).collect();
        let densities: Vec<f64> = self.densities.iter().rev().copied().collect();
        let mut age = DiscretePdf::new(values, densities)?
            .tagged(VariableType::Age, Some(self.unit.unwrap_or(Unit::YEARS)))?;
        if let Some(name) = &self.name {
            age = age.named(name.clone());
        }
        if limit_zero && age.min() < 0.0 {
            return age.truncate(0.0, age.max());
        }
        Ok(age)
    }

    /// Restrict the PDF to `[lo, hi]` and renormalise.
    ///
    /// The clipped boundaries become support points, so the density is exactly
    /// zero outside the requested range.
    pub fn truncate(&self, lo: f64, hi: f64) -> Result<DiscretePdf> {
        let lo = lo.max(self.min());
        let hi = hi.min(self.max());
        if !(hi > lo) {
            return Err(SlipRateError::InvalidDistribution(format!(
                "truncation range excludes the support [{}, {}]",
                self.min(),
                self.max()
            )));
        }

        let mut values = Vec::with_capacity(self.len() + 2);
        let mut densities = Vec::with_capacity(self.len() + 2);
        values.push(lo);
        densities.push(self.interpolate(lo));
        for (&x, &d) in self.values.iter().zip(&self.densities) {
            if x > lo && x < hi {
                values.push(x);
                densities.push(d);
            }
        }
        values.push(hi);
        densities.push(self.interpolate(hi));

        Ok(DiscretePdf::new(values, densities)?.with_metadata_of(self))
    }

    /// PDF of `-X`.
    pub fn negate(&self) -> DiscretePdf {
        let values: Vec<f64> = self.values.iter().rev().map(|v| -v).collect();
        let densities: Vec<f64> = self.densities.iter().rev().copied().collect();
        let cdf = grid::cumulative_trapezoid(&values, &densities);
        DiscretePdf {
            values,
            densities,
            cdf: cdf.into_iter().map(|c| c.min(1.0)).collect(),
            name: self.name.as_ref().map(|n| format!("(negative) {n}")),
            variable_type: self.variable_type,
            unit: self.unit,
        }
    }

    /// Express the PDF in another unit of the same dimension.
    pub fn convert_unit(&self, target: Unit) -> Result<DiscretePdf> {
        let Some(unit) = self.unit else {
            return Err(SlipRateError::IncompatibleUnits {
                operation: "unit conversion",
                left: "unspecified".to_string(),
                right: target.to_string(),
            });
        };
        let factor = unit.factor_to(target)?;
        if factor == 1.0 {
            return Ok(self.clone());
        }
        let values = self.values.iter().map(|v| v * factor).collect();
        let mut pdf = DiscretePdf::new(values, self.densities.clone())?.with_metadata_of(self);
        pdf.unit = Some(target);
        Ok(pdf)
    }

    fn expected(&self, f: impl Fn(f64) -> f64) -> f64 {
        let y: Vec<f64> = self
            .values
            .iter()
            .zip(&self.densities)
            .map(|(&x, &d)| f(x) * d)
            .collect();
        grid::trapezoid(&self.values, &y)
    }

    pub fn mean(&self) -> f64 {
        self.expected(|x| x)
    }

    pub fn variance(&self) -> f64 {
        let mu = self.mean();
        self.expected(|x| (x - mu).powi(2))
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn skewness(&self) -> f64 {
        let mu = self.mean();
        let var = self.variance();
        self.expected(|x| (x - mu).powi(3)) / var.powf(1.5)
    }

    pub fn kurtosis(&self) -> f64 {
        let mu = self.mean();
        let var = self.variance();
        self.expected(|x| (x - mu).powi(4)) / (var * var)
    }

    /// Value of peak density; ties are averaged.
    pub fn mode(&self) -> f64 {
        let peak = self.densities.iter().fold(0.0_f64, |acc, &d| acc.max(d));
        let (sum, count) = self
            .values
            .iter()
            .zip(&self.densities)
            .filter(|(_, &d)| d == peak)
            .fold((0.0, 0usize), |(s, c), (&x, _)| (s + x, c + 1));
        sum / count as f64
    }

    pub fn median(&self) -> f64 {
        self.pit(0.5)
    }

    pub fn summary(&self) -> PdfSummary {
        PdfSummary {
            mode: self.mode(),
            median: self.median(),
            mean: self.mean(),
            std_dev: self.std_dev(),
            variance: self.variance(),
            skewness: self.skewness(),
            kurtosis: self.kurtosis(),
        }
    }
}

impl fmt::Display for DiscretePdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PDF")?;
        if let Some(name) = &self.name {
            write!(f, ": {name}")?;
        }
        if self.variable_type != VariableType::Other {
            write!(f, " - {}", self.variable_type)?;
        }
        if let Some(unit) = self.unit {
            write!(f, " ({unit})")?;
        }
        Ok(())
    }
}

impl fmt::Display for PdfSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  mode: {:.3}", self.mode)?;
        writeln!(f, "median: {:.3}", self.median)?;
        writeln!(f, "  mean: {:.3}", self.mean)?;
        writeln!(f, "   std: {:.3}", self.std_dev)?;
        writeln!(f, "   var: {:.3}", self.variance)?;
        writeln!(f, "  skew: {:.3}", self.skewness)?;
        write!(f, "  kurt: {:.3}", self.kurtosis)
    }
}
