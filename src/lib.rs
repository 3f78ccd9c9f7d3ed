//! sliprate - fault slip rates from dated displacement markers
//!
//! Ages and displacements of geologic markers are only known as probability
//! density functions. This crate represents them as discrete PDFs, provides
//! the algebra needed to combine them, and estimates incremental slip rates
//! either analytically (weighted convolution) or by Monte Carlo rejection
//! sampling. Confidence intervals are extracted from the resulting PDFs.

pub mod algebra;
pub mod analytical;
pub mod confidence;
pub mod config;
pub mod grid;
pub mod marker;
pub mod monte_carlo;
pub mod parametric;
pub mod pdf;
pub mod units;

use thiserror::Error;

// Re-export main types
pub use algebra::{CrossCorrelation, JointPdf, QuotientOptions};
pub use analytical::{AnalyticalConfig, AnalyticalEngine, IntervalRate};
pub use confidence::{ConfidenceInterval, ConfidenceMetric};
pub use config::SlipRateConfig;
pub use marker::{DatedMarker, MarkerSequence};
pub use monte_carlo::{
    CancelToken, MonteCarloConfig, MonteCarloEngine, MonteCarloOutcome, Pick, RunStatus,
};
pub use pdf::{DiscretePdf, PdfSummary};
pub use units::{LengthUnit, TimeUnit, Unit, VariableType};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlipRateError {
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
    #[error("degenerate support: {points} point(s) given, at least 2 required")]
    DegenerateSupport { points: usize },
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("incompatible units for {operation}: {left} and {right}")]
    IncompatibleUnits {
        operation: &'static str,
        left: String,
        right: String,
    },
    #[error("interval {interval}: forward-only {quantity} constraint removes all probability mass")]
    NonPhysicalInterval {
        interval: String,
        quantity: &'static str,
    },
    #[error("interval {interval}: rate ceiling {max_rate} excludes the entire rate support")]
    RateCeilingExceedsSupport { interval: String, max_rate: f64 },
    #[error("acceptance ratio {ratio:.3e} stayed below {threshold:.3e} ({accepted} of {drawn} draws accepted)")]
    ExcessiveRejectionRate {
        ratio: f64,
        threshold: f64,
        accepted: u64,
        drawn: u64,
    },
    #[error("confidence {0} must lie strictly between 0 and 1")]
    ConfidenceOutOfRange(f64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("evaluation grid of {points} points exceeds the limit of {limit}")]
    GridTooLarge { points: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, SlipRateError>;
