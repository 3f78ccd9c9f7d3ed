//! Analytical slip-rate estimation
//!
//! Rates are quotients of displacement and age PDFs. For a marker sequence,
//! each interval difference is first truncated to non-negative support, which
//! encodes forward-only time and slip.

use tracing::{debug, info};

use crate::algebra::{self, QuotientOptions};
use crate::marker::{DatedMarker, MarkerSequence};
use crate::pdf::DiscretePdf;
use crate::{Result, SlipRateError};

/// Retained probability below which a truncation is considered to remove everything.
pub const MIN_RETAINED_MASS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticalConfig {
    /// Upper bound on physical slip rate
    pub max_rate: Option<f64>,
    pub max_quotient: f64,
    /// Rate grid spacing; `None` uses the quotient default
    pub rate_step: Option<f64>,
}

impl Default for AnalyticalConfig {
    fn default() -> Self {
        Self {
            max_rate: None,
            max_quotient: 100.0,
            rate_step: Some(0.01),
        }
    }
}

/// Slip-rate PDF of one named interval.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalRate {
    pub name: String,
    pub pdf: DiscretePdf,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticalEngine {
    config: AnalyticalConfig,
}

impl AnalyticalEngine {
    pub fn new(config: AnalyticalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticalConfig {
        &self.config
    }

    /// Quotient limit wide enough that the rate ceiling, not the limit, truncates.
    fn quotient_options(&self) -> QuotientOptions {
        let limit = match self.config.max_rate {
            Some(max_rate) => max_rate.max(self.config.max_quotient),
            None => self.config.max_quotient,
        };
        QuotientOptions {
            max_quotient: limit,
            step: self.config.rate_step,
        }
    }

    /// Average rate since a single marker formed: `displacement / age`.
    pub fn compute_slip_rate(&self, marker: &DatedMarker) -> Result<DiscretePdf> {
        let rate = algebra::divide_with(marker.displacement(), marker.age(), &self.quotient_options())?;
        let rate = self.apply_ceiling(marker.name(), rate)?;
        Ok(rate.named(marker.name()))
    }

    /// Incremental rate PDFs for every consecutive pair of markers.
    pub fn compute_slip_rates(&self, markers: &MarkerSequence) -> Result<Vec<IntervalRate>> {
        info!(
            markers = markers.len(),
            intervals = markers.interval_count(),
            max_rate = ?self.config.max_rate,
            "analytical slip rates"
        );
        markers
            .intervals()
            .zip(markers.interval_names())
            .map(|((younger, older), name)| {
                let dt = forward_only(&name, "age", older.age(), younger.age())?;
                let du = forward_only(&name, "displacement", older.displacement(), younger.displacement())?;
                let rate = algebra::divide_with(&du, &dt, &self.quotient_options())?;
                let pdf = self.apply_ceiling(&name, rate)?.named(name.clone());
                debug!(interval = %name, mean = pdf.mean(), "interval rate");
                Ok(IntervalRate { name, pdf })
            })
            .collect()
    }

    fn apply_ceiling(&self, interval: &str, rate: DiscretePdf) -> Result<DiscretePdf> {
        let Some(max_rate) = self.config.max_rate else {
            return Ok(rate);
        };
        if rate.probability_between(0.0, max_rate) < MIN_RETAINED_MASS || rate.min() >= max_rate {
            return Err(SlipRateError::RateCeilingExceedsSupport {
                interval: interval.to_string(),
                max_rate,
            });
        }
        rate.truncate(0.0, max_rate)
    }
}

/// `older - younger`, restricted to non-negative values.
fn forward_only(
    interval: &str,
    quantity: &'static str,
    older: &DiscretePdf,
    younger: &DiscretePdf,
) -> Result<DiscretePdf> {
    let diff = algebra::subtract(older, younger)?;
    let retained = 1.0 - diff.cdf_at(0.0);
    debug!(interval, quantity, retained, "forward-only truncation");
    if retained < MIN_RETAINED_MASS || diff.max() <= 0.0 {
        return Err(SlipRateError::NonPhysicalInterval {
            interval: interval.to_string(),
            quantity,
        });
    }
    diff.truncate(0.0, f64::INFINITY)
}
