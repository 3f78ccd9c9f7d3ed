//! Parametric shapes sampled onto regular grids
//!
//! These build `DiscretePdf`s from given parameters; nothing here fits a
//! distribution to data.

use std::f64::consts::PI;

use crate::grid;
use crate::pdf::DiscretePdf;
use crate::{Result, SlipRateError};

/// Half-width of a gaussian grid, in standard deviations.
pub const GAUSSIAN_SPAN_SIGMAS: f64 = 6.0;

fn invalid(msg: String) -> SlipRateError {
    SlipRateError::InvalidDistribution(msg)
}

pub fn gaussian_density(x: f64, mean: f64, std_dev: f64) -> f64 {
    let z = (x - mean) / std_dev;
    (-0.5 * z * z).exp() / (std_dev * (2.0 * PI).sqrt())
}

/// Gaussian sampled over `mean ± 6σ` with spacing `step`.
pub fn gaussian(mean: f64, std_dev: f64, step: f64) -> Result<DiscretePdf> {
    if !(std_dev.is_finite() && std_dev > 0.0) {
        return Err(invalid(format!("standard deviation must be positive, got {std_dev}")));
    }
    let half = GAUSSIAN_SPAN_SIGMAS * std_dev;
    let values = grid::regular(mean - half, mean + half, step)?;
    gaussian_on(values, mean, std_dev)
}

/// Gaussian sampled at the given support values.
pub fn gaussian_on(values: Vec<f64>, mean: f64, std_dev: f64) -> Result<DiscretePdf> {
    if !(std_dev.is_finite() && std_dev > 0.0) {
        return Err(invalid(format!("standard deviation must be positive, got {std_dev}")));
    }
    let densities = values
        .iter()
        .map(|&x| gaussian_density(x, mean, std_dev))
        .collect();
    DiscretePdf::new(values, densities)
}

/// Uniform density over `[min, max]`.
pub fn boxcar(min: f64, max: f64, step: f64) -> Result<DiscretePdf> {
    if !(max > min) {
        return Err(invalid(format!("boxcar requires min < max, got [{min}, {max}]")));
    }
    let values = grid::regular(min, max, step)?;
    let densities = values.iter().map(|&x| if x <= max { 1.0 } else { 0.0 }).collect();
    DiscretePdf::new(values, densities)
}

/// Triangle rising from `min` to a peak at `mode` and falling to `max`.
pub fn triangular(min: f64, mode: f64, max: f64, step: f64) -> Result<DiscretePdf> {
    trapezoidal(min, mode, mode, max, step)
}

/// Trapezoid: ramps over `[x1, x2]` and `[x3, x4]`, flat in between.
pub fn trapezoidal(x1: f64, x2: f64, x3: f64, x4: f64, step: f64) -> Result<DiscretePdf> {
    if !(x1 <= x2 && x2 <= x3 && x3 <= x4 && x4 > x1) {
        return Err(invalid(format!(
            "trapezoid corners must be ordered, got {x1}, {x2}, {x3}, {x4}"
        )));
    }
    let values = grid::regular(x1, x4, step)?;
    let densities = values
        .iter()
        .map(|&x| {
            if x < x1 || x > x4 {
                0.0
            } else if x < x2 {
                (x - x1) / (x2 - x1)
            } else if x <= x3 {
                1.0
            } else {
                (x4 - x) / (x4 - x3)
            }
        })
        .collect();
    DiscretePdf::new(values, densities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_moments() {
        let pdf = gaussian(10.0, 1.0, 0.01).unwrap();
        assert!((pdf.mean() - 10.0).abs() < 1e-6);
        assert!((pdf.std_dev() - 1.0).abs() < 1e-4);
        assert!((pdf.mode() - 10.0).abs() < 1e-9);
        assert!(gaussian(0.0, 0.0, 0.1).is_err());
    }

    #[test]
    fn test_tiny_step_reports_grid_too_large() {
        assert!(matches!(
            gaussian(0.0, 1.0, 1e-20),
            Err(crate::SlipRateError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_triangular_peak() {
        let pdf = triangular(9.0, 11.0, 12.5, 0.1).unwrap();
        assert!((pdf.mode() - 11.0).abs() < 1e-9);
        assert_eq!(pdf.interpolate(9.0), 0.0);
        assert!((pdf.area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_boxcar_is_flat() {
        let pdf = boxcar(2.0, 4.0, 0.5).unwrap();
        assert!((pdf.interpolate(3.3) - 0.5).abs() < 1e-12);
        assert!((pdf.mean() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_trapezoid_rejects_unordered_corners() {
        assert!(trapezoidal(3.0, 2.0, 4.0, 5.0, 0.1).is_err());
    }
}
