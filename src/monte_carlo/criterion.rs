//! Acceptance predicates over one drawn sample vector
//!
//! Markers are ordered youngest first, so interval `i` spans markers `i` and
//! `i + 1` and its differences are `x[i + 1] - x[i]`. A sample vector is
//! accepted or rejected as a whole.

use serde::{Deserialize, Serialize};

pub trait Criterion: Send + Sync {
    fn accepts(&self, ages: &[f64], displacements: &[f64]) -> bool;
}

/// Accepts every draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassAll;

impl Criterion for PassAll {
    fn accepts(&self, _ages: &[f64], _displacements: &[f64]) -> bool {
        true
    }
}

/// Time runs forward and slip never reverses in any interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonNegative;

impl Criterion for NonNegative {
    fn accepts(&self, ages: &[f64], displacements: &[f64]) -> bool {
        ages.windows(2)
            .zip(displacements.windows(2))
            .all(|(a, d)| a[1] - a[0] > 0.0 && d[1] - d[0] >= 0.0)
    }
}

/// `NonNegative`, and every interval rate is at most `max_rate`.
#[derive(Debug, Clone, Copy)]
pub struct NonNegativeBounded {
    pub max_rate: f64,
}

impl Criterion for NonNegativeBounded {
    fn accepts(&self, ages: &[f64], displacements: &[f64]) -> bool {
        ages.windows(2).zip(displacements.windows(2)).all(|(a, d)| {
            let dt = a[1] - a[0];
            let du = d[1] - d[0];
            dt > 0.0 && du >= 0.0 && du / dt <= self.max_rate
        })
    }
}

/// Criterion selector used in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriterionKind {
    PassAll,
    NonNegative,
    /// Falls back to `NonNegative` when no rate ceiling is configured
    #[default]
    NonNegativeBounded,
}

impl CriterionKind {
    pub fn build(self, max_rate: Option<f64>) -> Box<dyn Criterion> {
        match (self, max_rate) {
            (CriterionKind::PassAll, _) => Box::new(PassAll),
            (CriterionKind::NonNegative, _) | (CriterionKind::NonNegativeBounded, None) => {
                Box::new(NonNegative)
            }
            (CriterionKind::NonNegativeBounded, Some(max_rate)) => {
                Box::new(NonNegativeBounded { max_rate })
            }
        }
    }

    /// Whether accepted rates can be negative.
    pub fn admits_negative_rates(self) -> bool {
        self == CriterionKind::PassAll
    }
}
