//! Monte Carlo slip-rate estimation
//!
//! Every sample draws one age and one displacement per marker by probability
//! inverse transform. A sample vector is accepted only if the criterion holds
//! for all intervals at once, and accepted interval rates are binned.
//!
//! Batches are split into chunks drawn in parallel. Each chunk has its own
//! ChaCha8 stream derived from `(batch, chunk)`, and chunk histograms are
//! merged in chunk order, so a seed fully determines the result.
//!
//! Up to `max_picks` accepted samples are also kept verbatim, again in chunk
//! order, for export and for percentile ranges read straight off the draws.

pub mod criterion;
pub mod histogram;
pub mod smoothing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analytical::IntervalRate;
use crate::confidence::{self, ConfidenceInterval};
use crate::marker::MarkerSequence;
use crate::pdf::DiscretePdf;
use crate::units;
use crate::{Result, SlipRateError};

pub use criterion::{Criterion, CriterionKind, NonNegative, NonNegativeBounded, PassAll};
pub use histogram::Histogram;
pub use smoothing::SmoothingType;

pub const DEFAULT_N_SAMPLES: u64 = 10_000;
pub const DEFAULT_BATCH_SIZE: u64 = 10_000;
pub const DEFAULT_MAX_DRAWS: u64 = 10_000_000;
pub const DEFAULT_MAX_PICKS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloConfig {
    /// Accepted samples to collect
    pub n_samples: u64,
    /// Draws per batch
    pub batch_size: u64,
    /// Total draw budget
    pub max_draws: u64,
    /// Cumulative acceptance ratio considered usable
    pub min_acceptance_ratio: f64,
    /// Consecutive batches below `min_acceptance_ratio` before giving up
    pub rejection_patience: u32,
    pub chunks_per_batch: usize,
    pub max_rate: Option<f64>,
    /// Lower histogram edge; defaults to 0, or `-max_rate` when the
    /// criterion admits negative rates
    pub min_rate: Option<f64>,
    /// Histogram range when no `max_rate` is set
    pub max_quotient: f64,
    /// Histogram bin width
    pub rate_step: f64,
    pub criterion: CriterionKind,
    pub smoothing: SmoothingType,
    /// Kernel width in bins
    pub smoothing_width: usize,
    /// Accepted samples kept verbatim; 0 keeps none
    pub max_picks: usize,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_samples: DEFAULT_N_SAMPLES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_draws: DEFAULT_MAX_DRAWS,
            min_acceptance_ratio: 1e-4,
            rejection_patience: 5,
            chunks_per_batch: 8,
            max_rate: None,
            min_rate: None,
            max_quotient: 100.0,
            rate_step: 0.01,
            criterion: CriterionKind::default(),
            smoothing: SmoothingType::default(),
            smoothing_width: 10,
            max_picks: DEFAULT_MAX_PICKS,
            seed: 0,
        }
    }
}

/// Shared flag that stops a run before its next batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The requested number of samples was accepted
    Completed,
    /// `max_draws` ran out first
    IterationCapReached,
    Cancelled,
}

/// One accepted sample: an age and a displacement per marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub ages: Vec<f64>,
    pub displacements: Vec<f64>,
}

impl Pick {
    /// Incremental rate of every interval.
    pub fn rates(&self) -> Vec<f64> {
        self.displacements
            .windows(2)
            .zip(self.ages.windows(2))
            .map(|(d, a)| (d[1] - d[0]) / (a[1] - a[0]))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloOutcome {
    pub status: RunStatus,
    pub accepted: u64,
    pub drawn: u64,
    /// One PDF per interval; empty when nothing was accepted
    pub rates: Vec<IntervalRate>,
    /// The first `max_picks` accepted samples
    pub picks: Vec<Pick>,
}

impl MonteCarloOutcome {
    pub fn acceptance_ratio(&self) -> f64 {
        if self.drawn == 0 {
            0.0
        } else {
            self.accepted as f64 / self.drawn as f64
        }
    }

    /// Percentile range of each interval's rate over the kept picks.
    pub fn pick_ranges(&self, confidence: f64) -> Result<Vec<ConfidenceInterval>> {
        let intervals = self.rates.len();
        let mut columns = vec![Vec::with_capacity(self.picks.len()); intervals];
        for pick in &self.picks {
            for (column, rate) in columns.iter_mut().zip(pick.rates()) {
                column.push(rate);
            }
        }
        columns
            .iter()
            .map(|c| confidence::sample_range(c, confidence))
            .collect()
    }
}

struct ChunkResult {
    accepted: u64,
    histograms: Vec<Histogram>,
    picks: Vec<Pick>,
}

pub struct MonteCarloEngine {
    config: MonteCarloConfig,
    cancel: CancelToken,
}

impl MonteCarloEngine {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    fn validate(&self, markers: &MarkerSequence) -> Result<()> {
        let c = &self.config;
        if markers.interval_count() == 0 {
            return Err(SlipRateError::InvalidConfig(
                "Monte Carlo estimation needs at least two markers".to_string(),
            ));
        }
        if c.batch_size == 0 || c.chunks_per_batch == 0 || c.n_samples == 0 {
            return Err(SlipRateError::InvalidConfig(
                "n_samples, batch_size and chunks_per_batch must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn template(&self) -> Result<Histogram> {
        let c = &self.config;
        let hi = c.max_rate.unwrap_or(c.max_quotient);
        let lo = match c.min_rate {
            Some(lo) => lo,
            None if c.criterion.admits_negative_rates() => -hi,
            None => 0.0,
        };
        Histogram::new(lo, hi, c.rate_step)
    }

    /// Estimate incremental rate PDFs for every interval of `markers`.
    ///
    /// # Errors
    /// `ExcessiveRejectionRate` when the cumulative acceptance ratio stays
    /// below `min_acceptance_ratio` for `rejection_patience` batches.
    pub fn run(&self, markers: &MarkerSequence) -> Result<MonteCarloOutcome> {
        self.validate(markers)?;
        let c = &self.config;
        let criterion = c.criterion.build(c.max_rate);
        let template = self.template()?;
        let ages: Vec<&DiscretePdf> = markers.markers().iter().map(|m| m.age()).collect();
        let disps: Vec<&DiscretePdf> = markers.markers().iter().map(|m| m.displacement()).collect();
        let intervals = markers.interval_count();

        info!(
            intervals,
            n_samples = c.n_samples,
            criterion = ?c.criterion,
            seed = c.seed,
            "Monte Carlo slip rates"
        );

        let mut totals = vec![template.empty_like(); intervals];
        let mut picks: Vec<Pick> = Vec::new();
        let mut accepted = 0u64;
        let mut drawn = 0u64;
        let mut starved_batches = 0u32;
        let mut batch = 0u64;

        let status = loop {
            if self.cancel.is_cancelled() {
                break RunStatus::Cancelled;
            }
            if accepted >= c.n_samples {
                break RunStatus::Completed;
            }
            if drawn >= c.max_draws {
                warn!(accepted, drawn, "draw budget exhausted before reaching the sample target");
                break RunStatus::IterationCapReached;
            }

            let draws = c.batch_size.min(c.max_draws - drawn);
            let chunks = c.chunks_per_batch as u64;
            let keep = c.max_picks.saturating_sub(picks.len());
            let results: Vec<ChunkResult> = (0..chunks)
                .into_par_iter()
                .map(|chunk| {
                    let share = draws / chunks + u64::from(chunk < draws % chunks);
                    run_chunk(
                        c.seed,
                        batch * chunks + chunk,
                        share,
                        &ages,
                        &disps,
                        criterion.as_ref(),
                        &template,
                        keep,
                    )
                })
                .collect();

            for r in results {
                accepted += r.accepted;
                for (total, h) in totals.iter_mut().zip(&r.histograms) {
                    total.merge(h);
                }
                let room = c.max_picks.saturating_sub(picks.len());
                picks.extend(r.picks.into_iter().take(room));
            }
            drawn += draws;
            batch += 1;

            let ratio = accepted as f64 / drawn as f64;
            debug!(batch, accepted, drawn, ratio, "batch complete");
            if ratio < c.min_acceptance_ratio {
                starved_batches += 1;
                if starved_batches >= c.rejection_patience {
                    return Err(SlipRateError::ExcessiveRejectionRate {
                        ratio,
                        threshold: c.min_acceptance_ratio,
                        accepted,
                        drawn,
                    });
                }
            } else {
                starved_batches = 0;
            }
        };

        info!(?status, accepted, drawn, "Monte Carlo sampling finished");
        let rates = if accepted == 0 {
            Vec::new()
        } else {
            self.build_rates(markers, &totals)?
        };
        Ok(MonteCarloOutcome {
            status,
            accepted,
            drawn,
            rates,
            picks,
        })
    }

    fn build_rates(&self, markers: &MarkerSequence, totals: &[Histogram]) -> Result<Vec<IntervalRate>> {
        let first = &markers.markers()[0];
        let quantity = units::quotient(first.displacement().quantity(), first.age().quantity())?;
        totals
            .iter()
            .zip(markers.interval_names())
            .map(|(h, name)| {
                if h.overflow() > 0 {
                    warn!(interval = %name, outside = h.overflow(), "rates fell outside the histogram range");
                }
                let raw = h.to_pdf()?;
                let pdf = smoothing::smooth(&raw, self.config.smoothing, self.config.smoothing_width)?
                    .with_quantity(quantity)
                    .named(name.clone());
                Ok(IntervalRate { name, pdf })
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn run_chunk(
    seed: u64,
    stream: u64,
    draws: u64,
    ages: &[&DiscretePdf],
    disps: &[&DiscretePdf],
    criterion: &dyn Criterion,
    template: &Histogram,
    keep: usize,
) -> ChunkResult {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    let uniform = Uniform::new(0.0, 1.0);

    let mut histograms = vec![template.empty_like(); ages.len() - 1];
    let mut a = vec![0.0; ages.len()];
    let mut d = vec![0.0; disps.len()];
    let mut accepted = 0;
    let mut picks = Vec::new();

    for _ in 0..draws {
        for (slot, pdf) in a.iter_mut().zip(ages) {
            *slot = pdf.pit(uniform.sample(&mut rng));
        }
        for (slot, pdf) in d.iter_mut().zip(disps) {
            *slot = pdf.pit(uniform.sample(&mut rng));
        }
        if criterion.accepts(&a, &d) {
            accepted += 1;
            for (i, h) in histograms.iter_mut().enumerate() {
                h.record((d[i + 1] - d[i]) / (a[i + 1] - a[i]));
            }
            if picks.len() < keep {
                picks.push(Pick {
                    ages: a.clone(),
                    displacements: d.clone(),
                });
            }
        }
    }

    ChunkResult {
        accepted,
        histograms,
        picks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ONE_SIGMA;
    use crate::marker::DatedMarker;
    use crate::parametric::gaussian;
    use crate::units::{Unit, VariableType};

    fn marker(name: &str, age: f64, disp: f64) -> DatedMarker {
        let a = gaussian(age, 0.5, 0.02)
            .unwrap()
            .tagged(VariableType::Age, Some(Unit::KILOYEARS))
            .unwrap();
        let d = gaussian(disp, 1.0, 0.05)
            .unwrap()
            .tagged(VariableType::Displacement, Some(Unit::METERS))
            .unwrap();
        DatedMarker::new(name, a, d).unwrap()
    }

    fn pair() -> MarkerSequence {
        MarkerSequence::new(vec![marker("A", 2.0, 5.0), marker("B", 6.0, 25.0)]).unwrap()
    }

    fn small_config() -> MonteCarloConfig {
        MonteCarloConfig {
            n_samples: 20_000,
            batch_size: 5_000,
            max_rate: Some(20.0),
            seed: 7,
            ..MonteCarloConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = MonteCarloEngine::new(small_config()).run(&pair()).unwrap();
        let b = MonteCarloEngine::new(small_config()).run(&pair()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.status, RunStatus::Completed);
        assert!(a.accepted >= 20_000);
    }

    #[test]
    fn test_rate_near_ratio_of_means() {
        let out = MonteCarloEngine::new(small_config()).run(&pair()).unwrap();
        let rate = &out.rates[0];
        assert_eq!(rate.name, "B-A");
        assert!((rate.pdf.median() - 5.0).abs() < 0.1);
        assert_eq!(rate.pdf.unit().map(|u| u.to_string()), Some("m/ky".to_string()));
        assert_eq!(rate.pdf.interpolate(20.5), 0.0);
    }

    #[test]
    fn test_draw_budget() {
        let config = MonteCarloConfig {
            n_samples: 1_000_000,
            max_draws: 10_000,
            ..small_config()
        };
        let out = MonteCarloEngine::new(config).run(&pair()).unwrap();
        assert_eq!(out.status, RunStatus::IterationCapReached);
        assert_eq!(out.drawn, 10_000);
        assert!(!out.rates.is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let engine = MonteCarloEngine::new(small_config());
        engine.cancel_token().cancel();
        let out = engine.run(&pair()).unwrap();
        assert_eq!(out.status, RunStatus::Cancelled);
        assert_eq!(out.accepted, 0);
        assert!(out.rates.is_empty());
    }

    #[test]
    fn test_incompatible_markers_fail_fast() {
        let seq = MarkerSequence::new(vec![marker("A", 10.0, 5.0), marker("B", 2.0, 25.0)]).unwrap();
        let config = MonteCarloConfig {
            batch_size: 1_000,
            rejection_patience: 3,
            ..small_config()
        };
        let err = MonteCarloEngine::new(config).run(&seq).unwrap_err();
        assert!(matches!(
            err,
            SlipRateError::ExcessiveRejectionRate { accepted: 0, drawn: 3_000, .. }
        ));
    }

    #[test]
    fn test_picks_are_capped_and_accepted() {
        let config = MonteCarloConfig {
            max_picks: 500,
            ..small_config()
        };
        let out = MonteCarloEngine::new(config).run(&pair()).unwrap();
        assert_eq!(out.picks.len(), 500);
        for pick in &out.picks {
            assert_eq!(pick.ages.len(), 2);
            let rate = pick.rates()[0];
            assert!((0.0..=20.0).contains(&rate));
        }

        let from_picks = out.pick_ranges(ONE_SIGMA).unwrap();
        let from_pdf = confidence::equal_tailed(&out.rates[0].pdf, ONE_SIGMA).unwrap();
        assert_eq!(from_picks.len(), 1);
        assert!((from_picks[0].ranges[0].0 - from_pdf.ranges[0].0).abs() < 0.3);
        assert!((from_picks[0].ranges[0].1 - from_pdf.ranges[0].1).abs() < 0.3);

        let none = MonteCarloConfig {
            max_picks: 0,
            ..small_config()
        };
        assert!(MonteCarloEngine::new(none).run(&pair()).unwrap().picks.is_empty());
    }

    #[test]
    fn test_min_rate_sets_histogram_floor() {
        let config = MonteCarloConfig {
            min_rate: Some(5.0),
            ..small_config()
        };
        let out = MonteCarloEngine::new(config).run(&pair()).unwrap();
        let pdf = &out.rates[0].pdf;
        assert!(pdf.min() >= 5.0 && pdf.min() < 5.01);
        assert_eq!(pdf.cdf_at(5.0), 0.0);
        assert!(out.picks.iter().any(|p| p.rates()[0] < 5.0));

        let inverted = MonteCarloConfig {
            min_rate: Some(25.0),
            ..small_config()
        };
        assert!(matches!(
            MonteCarloEngine::new(inverted).run(&pair()),
            Err(SlipRateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_single_marker_rejected() {
        let seq = MarkerSequence::new(vec![marker("A", 2.0, 5.0)]).unwrap();
        assert!(MonteCarloEngine::new(small_config()).run(&seq).is_err());
    }
}
