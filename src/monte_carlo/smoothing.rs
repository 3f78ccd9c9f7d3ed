//! Kernel smoothing of sampled PDFs
//!
//! Kernels are expressed in grid samples and convolved with the densities of
//! a regularly sampled PDF. Mass pushed beyond the support is dropped before
//! renormalisation, so hard bounds such as a rate ceiling stay intact.

use serde::{Deserialize, Serialize};

use crate::algebra;
use crate::parametric::{gaussian_density, GAUSSIAN_SPAN_SIGMAS};
use crate::pdf::DiscretePdf;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingType {
    /// Gaussian with standard deviation of a quarter of the width
    #[default]
    Gaussian,
    Boxcar,
    None,
}

/// Symmetric kernel weights at integer sample offsets `-m..=m`.
pub fn kernel(kind: SmoothingType, width: usize) -> Vec<f64> {
    match kind {
        SmoothingType::None => vec![1.0],
        SmoothingType::Gaussian => {
            let sigma = width as f64 / 4.0;
            if sigma <= 0.0 {
                return vec![1.0];
            }
            let m = (0.25 * GAUSSIAN_SPAN_SIGMAS * width as f64).ceil() as i64;
            (-m..=m).map(|k| gaussian_density(k as f64, 0.0, sigma)).collect()
        }
        SmoothingType::Boxcar => vec![1.0; 2 * (width / 2) + 1],
    }
}

/// Smooth a PDF on a regular support.
pub fn smooth(pdf: &DiscretePdf, kind: SmoothingType, width: usize) -> Result<DiscretePdf> {
    let k = kernel(kind, width);
    if k.len() <= 1 {
        return Ok(pdf.clone());
    }
    let half = k.len() / 2;
    let full = algebra::convolve(pdf.densities(), &k);
    let densities = full[half..half + pdf.len()].to_vec();
    Ok(DiscretePdf::new(pdf.values().to_vec(), densities)?.with_metadata_of(pdf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid;

    fn spike() -> DiscretePdf {
        let x = grid::regular(0.0, 10.0, 0.1).unwrap();
        let d = x.iter().map(|&v| if (v - 5.0).abs() < 1e-9 { 1.0 } else { 0.0 }).collect();
        DiscretePdf::new(x, d).unwrap()
    }

    #[test]
    fn test_kernels_are_symmetric() {
        let g = kernel(SmoothingType::Gaussian, 8);
        assert_eq!(g.len(), 25);
        assert!((g[0] - g[24]).abs() < 1e-15);
        assert_eq!(kernel(SmoothingType::Boxcar, 4).len(), 5);
        assert_eq!(kernel(SmoothingType::None, 4), vec![1.0]);
    }

    #[test]
    fn test_smoothing_spreads_but_keeps_mean() {
        let raw = spike();
        let s = smooth(&raw, SmoothingType::Gaussian, 20).unwrap();
        assert!((s.mean() - 5.0).abs() < 1e-9);
        // sigma of 5 samples, 0.5 in value
        assert!((s.std_dev() - 0.5).abs() < 0.02);
        assert!((s.area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_boxcar_flat_top() {
        let s = smooth(&spike(), SmoothingType::Boxcar, 4).unwrap();
        assert!((s.interpolate(4.8) - s.interpolate(5.2)).abs() < 1e-12);
        assert_eq!(s.interpolate(4.6), 0.0);
    }

    #[test]
    fn test_edge_mass_is_dropped() {
        let x = grid::regular(0.0, 1.0, 0.1).unwrap();
        let mut d = vec![0.0; x.len()];
        d[10] = 1.0;
        let pdf = DiscretePdf::new(x, d).unwrap();
        let s = smooth(&pdf, SmoothingType::Gaussian, 8).unwrap();
        assert_eq!(s.max(), 1.0);
        assert_eq!(s.interpolate(1.05), 0.0);
    }
}
