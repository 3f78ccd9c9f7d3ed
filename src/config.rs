use serde::{Deserialize, Serialize};

use crate::analytical::AnalyticalConfig;
use crate::confidence::{ConfidenceMetric, ONE_SIGMA};
use crate::monte_carlo::{
    CriterionKind, MonteCarloConfig, SmoothingType, DEFAULT_BATCH_SIZE, DEFAULT_MAX_DRAWS,
    DEFAULT_MAX_PICKS, DEFAULT_N_SAMPLES,
};
use crate::units::{Unit, VariableType};
use crate::SlipRateError;

/// Options shared by both estimation engines and the reporting layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipRateConfig {
    pub age_unit_out: Option<Unit>,
    pub displacement_unit_out: Option<Unit>,
    pub max_rate: Option<f64>,
    /// Lower edge of Monte Carlo rate histograms
    pub min_rate: Option<f64>,
    pub rate_step: f64,
    pub max_quotient: f64,
    pub n_samples: u64,
    pub batch_size: u64,
    pub max_draws: u64,
    pub min_acceptance_ratio: f64,
    pub rejection_patience: u32,
    pub chunks_per_batch: usize,
    pub criterion: CriterionKind,
    pub smoothing_type: SmoothingType,
    pub smoothing_width: usize,
    pub max_picks: usize,
    pub confidence_metric: ConfidenceMetric,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for SlipRateConfig {
    fn default() -> Self {
        Self {
            age_unit_out: None,
            displacement_unit_out: None,
            max_rate: None,
            min_rate: None,
            rate_step: 0.01,
            max_quotient: 100.0,
            n_samples: DEFAULT_N_SAMPLES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_draws: DEFAULT_MAX_DRAWS,
            min_acceptance_ratio: 1e-4,
            rejection_patience: 5,
            chunks_per_batch: 8,
            criterion: CriterionKind::default(),
            smoothing_type: SmoothingType::default(),
            smoothing_width: 10,
            max_picks: DEFAULT_MAX_PICKS,
            confidence_metric: ConfidenceMetric::default(),
            confidence: ONE_SIGMA,
            seed: 0,
        }
    }
}

impl SlipRateConfig {
    pub fn validate(&self) -> Result<(), SlipRateError> {
        if let Some(unit) = self.age_unit_out {
            if !VariableType::Age.admits(unit) {
                return Err(SlipRateError::InvalidConfig(format!(
                    "age_unit_out must be a time unit, got {unit}"
                )));
            }
        }

        if let Some(unit) = self.displacement_unit_out {
            if !VariableType::Displacement.admits(unit) {
                return Err(SlipRateError::InvalidConfig(format!(
                    "displacement_unit_out must be a length unit, got {unit}"
                )));
            }
        }

        if let Some(max_rate) = self.max_rate {
            if !(max_rate.is_finite() && max_rate > 0.0) {
                return Err(SlipRateError::InvalidConfig(
                    "max_rate must be positive and finite".to_string(),
                ));
            }
        }

        if let Some(min_rate) = self.min_rate {
            let ceiling = self.max_rate.unwrap_or(self.max_quotient);
            if !(min_rate.is_finite() && min_rate < ceiling) {
                return Err(SlipRateError::InvalidConfig(format!(
                    "min_rate must be finite and below the rate ceiling {ceiling}, got {min_rate}"
                )));
            }
        }

        if !(self.rate_step.is_finite() && self.rate_step > 0.0) {
            return Err(SlipRateError::InvalidConfig(
                "rate_step must be positive and finite".to_string(),
            ));
        }

        if !(self.max_quotient.is_finite() && self.max_quotient > 0.0) {
            return Err(SlipRateError::InvalidConfig(
                "max_quotient must be positive and finite".to_string(),
            ));
        }

        if self.n_samples == 0 || self.batch_size == 0 || self.chunks_per_batch == 0 {
            return Err(SlipRateError::InvalidConfig(
                "n_samples, batch_size and chunks_per_batch must be greater than zero".to_string(),
            ));
        }

        if self.max_draws < self.batch_size {
            return Err(SlipRateError::InvalidConfig(
                "max_draws must be at least batch_size".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.min_acceptance_ratio) {
            return Err(SlipRateError::InvalidConfig(
                "min_acceptance_ratio must lie in [0, 1)".to_string(),
            ));
        }

        if self.rejection_patience == 0 {
            return Err(SlipRateError::InvalidConfig(
                "rejection_patience must be greater than zero".to_string(),
            ));
        }

        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(SlipRateError::ConfidenceOutOfRange(self.confidence));
        }

        Ok(())
    }

    pub fn analytical(&self) -> AnalyticalConfig {
        AnalyticalConfig {
            max_rate: self.max_rate,
            max_quotient: self.max_quotient,
            rate_step: Some(self.rate_step),
        }
    }

    pub fn monte_carlo(&self) -> MonteCarloConfig {
        MonteCarloConfig {
            n_samples: self.n_samples,
            batch_size: self.batch_size,
            max_draws: self.max_draws,
            min_acceptance_ratio: self.min_acceptance_ratio,
            rejection_patience: self.rejection_patience,
            chunks_per_batch: self.chunks_per_batch,
            max_rate: self.max_rate,
            min_rate: self.min_rate,
            max_quotient: self.max_quotient,
            rate_step: self.rate_step,
            criterion: self.criterion,
            smoothing: self.smoothing_type,
            smoothing_width: self.smoothing_width,
            max_picks: self.max_picks,
            seed: self.seed,
        }
    }
}
