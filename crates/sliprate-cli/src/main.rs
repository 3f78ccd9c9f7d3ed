use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sliprate::algebra;
use sliprate::monte_carlo::{smoothing, CriterionKind, SmoothingType};
use sliprate::parametric;
use sliprate::{
    AnalyticalEngine, ConfidenceMetric, DatedMarker, DiscretePdf, IntervalRate, MarkerSequence,
    MonteCarloEngine, RunStatus, SlipRateConfig, Unit, VariableType,
};
use sliprate_cli::io::{
    read_pdf, write_cross_correlation_csv, write_manifest_json, write_pdf, write_picks_csv, Manifest,
    SampleRange,
};
use sliprate_cli::markers::load_markers;
use sliprate_cli::report::{render_block, summarize, write_report};

#[derive(Debug, Parser)]
#[command(name = "sliprate")]
#[command(about = "Fault slip rates from dated displacement markers")]
struct Cli {
    /// TOML file with engine options; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Overrides {
    #[arg(long, global = true)]
    max_rate: Option<f64>,

    /// Lower edge of Monte Carlo rate histograms
    #[arg(long, global = true, allow_hyphen_values = true)]
    min_rate: Option<f64>,

    #[arg(long, global = true)]
    rate_step: Option<f64>,

    #[arg(long, global = true)]
    n_samples: Option<u64>,

    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Accepted Monte Carlo samples written to picks.csv
    #[arg(long, global = true)]
    max_picks: Option<usize>,

    #[arg(long, global = true, value_enum)]
    criterion: Option<CriterionArg>,

    #[arg(long, global = true, value_enum)]
    smoothing: Option<SmoothingArg>,

    /// Smoothing kernel width in histogram bins
    #[arg(long, global = true)]
    smoothing_width: Option<usize>,

    #[arg(long, global = true, value_enum)]
    metric: Option<MetricArg>,

    #[arg(long, global = true)]
    confidence: Option<f64>,

    #[arg(long, global = true)]
    age_unit_out: Option<Unit>,

    #[arg(long, global = true)]
    displacement_unit_out: Option<Unit>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CriterionArg {
    PassAll,
    NonNegative,
    NonNegativeBounded,
}

impl From<CriterionArg> for CriterionKind {
    fn from(arg: CriterionArg) -> Self {
        match arg {
            CriterionArg::PassAll => CriterionKind::PassAll,
            CriterionArg::NonNegative => CriterionKind::NonNegative,
            CriterionArg::NonNegativeBounded => CriterionKind::NonNegativeBounded,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SmoothingArg {
    Gaussian,
    Boxcar,
    None,
}

impl From<SmoothingArg> for SmoothingType {
    fn from(arg: SmoothingArg) -> Self {
        match arg {
            SmoothingArg::Gaussian => SmoothingType::Gaussian,
            SmoothingArg::Boxcar => SmoothingType::Boxcar,
            SmoothingArg::None => SmoothingType::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    Hpd,
    #[value(alias = "iqr")]
    EqualTailed,
}

impl From<MetricArg> for ConfidenceMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Hpd => ConfidenceMetric::Hpd,
            MetricArg::EqualTailed => ConfidenceMetric::EqualTailed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShapeArg {
    /// params: mean, standard deviation
    Gaussian,
    /// params: min, max
    Boxcar,
    /// params: min, mode, max
    Triangular,
    /// params: x1, x2, x3, x4
    Trapezoidal,
}

#[derive(Debug, Args)]
struct PairArgs {
    a: PathBuf,
    b: PathBuf,
}

#[derive(Debug, Args)]
struct BinaryArgs {
    #[command(flatten)]
    pair: PairArgs,

    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct ManyArgs {
    #[arg(required = true, num_args = 1..)]
    pdfs: Vec<PathBuf>,

    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sample a parametric shape into a PDF file
    MakePdf {
        #[arg(long, value_enum)]
        shape: ShapeArg,
        #[arg(long, value_delimiter = ',', required = true)]
        params: Vec<f64>,
        #[arg(long)]
        step: f64,
        #[arg(long, default_value = "other")]
        variable_type: VariableType,
        #[arg(long)]
        unit: Option<Unit>,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Resample a PDF onto a regular grid
    Interpolate {
        pdf: PathBuf,
        /// Defaults to the smallest value of the support
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,
        /// Defaults to the largest value of the support
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,
        /// Defaults to the median spacing of the support
        #[arg(long)]
        step: Option<f64>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Turn a calendar-year PDF into an age before a reference date
    CalyrToAge {
        calendar: PathBuf,
        /// Calendar year of age zero, e.g. 1950 for radiocarbon
        #[arg(long, default_value_t = 1950.0, allow_hyphen_values = true)]
        reference_date: f64,
        /// Drop ages younger than zero
        #[arg(long, default_value_t = false)]
        limit_zero: bool,
        /// Unit of the calendar values when the file declares none
        #[arg(long)]
        unit_in: Option<Unit>,
        #[arg(long, default_value = "ky")]
        unit_out: Unit,
        /// Smoothing kernel width in support samples; 0 leaves the PDF as is
        #[arg(long, default_value_t = 0)]
        smooth: usize,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Average rate since a single marker formed
    Rate {
        #[arg(long)]
        age: PathBuf,
        #[arg(long)]
        displacement: PathBuf,
        #[arg(long, default_value = "marker")]
        name: String,
        #[arg(long, default_value = "output-sliprate")]
        outdir: PathBuf,
    },
    /// Incremental rates between consecutive markers, analytically
    Rates {
        #[arg(long)]
        markers: PathBuf,
        #[arg(long, default_value = "output-sliprate")]
        outdir: PathBuf,
    },
    /// Incremental rates by Monte Carlo rejection sampling
    RatesMc {
        #[arg(long)]
        markers: PathBuf,
        #[arg(long, default_value = "output-sliprate-mc")]
        outdir: PathBuf,
    },
    /// Print summary statistics and a confidence interval
    Summary { pdf: PathBuf },
    /// Shared probability mass of two PDFs
    Overlap(PairArgs),
    /// Kolmogorov-Smirnov distance between two PDFs
    Ks(PairArgs),
    /// Probability that B exceeds A
    Gap(PairArgs),
    /// Correlation of two PDFs over all lags
    CrossCorrelate(BinaryArgs),
    Add(BinaryArgs),
    Subtract(BinaryArgs),
    Multiply(BinaryArgs),
    Divide(BinaryArgs),
    /// Density of values lying above A and below B
    Between(BinaryArgs),
    /// Weighted mixture of estimates of one quantity
    Merge {
        #[command(flatten)]
        inputs: ManyArgs,
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,
    },
    /// Point-wise product of estimates of one quantity
    Conflate(ManyArgs),
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, o: &Overrides) -> Result<SlipRateConfig> {
    let mut cfg = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse TOML config: {}", path.display()))?
        }
        None => SlipRateConfig::default(),
    };

    if let Some(v) = o.max_rate {
        cfg.max_rate = Some(v);
    }
    if let Some(v) = o.min_rate {
        cfg.min_rate = Some(v);
    }
    if let Some(v) = o.rate_step {
        cfg.rate_step = v;
    }
    if let Some(v) = o.n_samples {
        cfg.n_samples = v;
    }
    if let Some(v) = o.seed {
        cfg.seed = v;
    }
    if let Some(v) = o.max_picks {
        cfg.max_picks = v;
    }
    if let Some(v) = o.criterion {
        cfg.criterion = v.into();
    }
    if let Some(v) = o.smoothing {
        cfg.smoothing_type = v.into();
    }
    if let Some(v) = o.smoothing_width {
        cfg.smoothing_width = v;
    }
    if let Some(v) = o.metric {
        cfg.confidence_metric = v.into();
    }
    if let Some(v) = o.confidence {
        cfg.confidence = v;
    }
    if let Some(v) = o.age_unit_out {
        cfg.age_unit_out = Some(v);
    }
    if let Some(v) = o.displacement_unit_out {
        cfg.displacement_unit_out = Some(v);
    }

    cfg.validate()?;
    Ok(cfg)
}

fn label(pdf: &DiscretePdf, path: &Path) -> String {
    pdf.name().map(str::to_string).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    })
}

fn read_pair(pair: &PairArgs) -> Result<(DiscretePdf, DiscretePdf)> {
    Ok((read_pdf(&pair.a)?, read_pdf(&pair.b)?))
}

fn read_many(paths: &[PathBuf]) -> Result<Vec<DiscretePdf>> {
    paths.iter().map(|p| read_pdf(p)).collect()
}

fn print_summary(name: &str, pdf: &DiscretePdf, cfg: &SlipRateConfig) -> Result<()> {
    let row = summarize(name, pdf, cfg)?;
    print!("{}", render_block(name, pdf, &row));
    Ok(())
}

fn emit(pdf: DiscretePdf, name: String, output: &Path, cfg: &SlipRateConfig) -> Result<()> {
    let pdf = pdf.named(name.clone());
    write_pdf(output, &pdf)?;
    info!(path = %output.display(), "wrote PDF");
    print_summary(&name, &pdf, cfg)
}

fn prepare_markers(path: &Path, cfg: &SlipRateConfig) -> Result<MarkerSequence> {
    let markers = load_markers(path)?;
    markers.check_order();
    Ok(markers.convert_units(cfg.age_unit_out, cfg.displacement_unit_out)?)
}

fn marker_names(markers: &MarkerSequence) -> Vec<String> {
    markers.markers().iter().map(|m| m.name().to_string()).collect()
}

fn make_pdf(shape: ShapeArg, params: &[f64], step: f64) -> Result<DiscretePdf> {
    let expected = match shape {
        ShapeArg::Gaussian | ShapeArg::Boxcar => 2,
        ShapeArg::Triangular => 3,
        ShapeArg::Trapezoidal => 4,
    };
    if params.len() != expected {
        bail!("{shape:?} takes {expected} parameters, got {}", params.len());
    }
    let pdf = match shape {
        ShapeArg::Gaussian => parametric::gaussian(params[0], params[1], step)?,
        ShapeArg::Boxcar => parametric::boxcar(params[0], params[1], step)?,
        ShapeArg::Triangular => parametric::triangular(params[0], params[1], params[2], step)?,
        ShapeArg::Trapezoidal => {
            parametric::trapezoidal(params[0], params[1], params[2], params[3], step)?
        }
    };
    Ok(pdf)
}

struct CalendarOptions {
    reference_date: f64,
    limit_zero: bool,
    unit_in: Option<Unit>,
    unit_out: Unit,
    smoothing: SmoothingType,
    smooth: usize,
}

fn calendar_to_age(calendar: DiscretePdf, o: &CalendarOptions) -> Result<DiscretePdf> {
    let calendar = match (calendar.unit(), o.unit_in) {
        (Some(declared), Some(given)) if declared != given => {
            bail!("calendar file declares unit {declared} but --unit-in is {given}")
        }
        (None, Some(given)) => {
            let variable_type = calendar.variable_type();
            calendar.tagged(variable_type, Some(given))?
        }
        _ => calendar,
    };
    info!(reference = o.reference_date, limit_zero = o.limit_zero, "shifting calendar years to ages");
    let age = calendar
        .calendar_to_age(o.reference_date, o.limit_zero)?
        .convert_unit(o.unit_out)?;
    if o.smooth == 0 {
        return Ok(age);
    }
    Ok(smoothing::smooth(&age, o.smoothing, o.smooth)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Command::MakePdf {
            shape,
            params,
            step,
            variable_type,
            unit,
            name,
            output,
        } => {
            let mut pdf = make_pdf(shape, &params, step)?.tagged(variable_type, unit)?;
            if let Some(name) = name {
                pdf = pdf.named(name);
            }
            write_pdf(&output, &pdf)?;
            println!("{pdf}");
        }
        Command::Interpolate {
            pdf,
            min,
            max,
            step,
            output,
        } => {
            let source = read_pdf(&pdf)?;
            let resampled = source
                .regrid(min, max, step)
                .with_context(|| format!("resampling {}", pdf.display()))?;
            write_pdf(&output, &resampled)?;
            info!(path = %output.display(), points = resampled.len(), "wrote PDF");
            println!("{resampled}");
        }
        Command::CalyrToAge {
            calendar,
            reference_date,
            limit_zero,
            unit_in,
            unit_out,
            smooth,
            name,
            output,
        } => {
            let options = CalendarOptions {
                reference_date,
                limit_zero,
                unit_in,
                unit_out,
                smoothing: cfg.smoothing_type,
                smooth,
            };
            let mut age = calendar_to_age(read_pdf(&calendar)?, &options)
                .with_context(|| format!("converting {}", calendar.display()))?;
            if let Some(name) = name {
                age = age.named(name);
            }
            let title = label(&age, &calendar);
            write_pdf(&output, &age)?;
            info!(path = %output.display(), "wrote PDF");
            print_summary(&title, &age, &cfg)?;
        }
        Command::Rate {
            age,
            displacement,
            name,
            outdir,
        } => {
            let marker = DatedMarker::new(name.clone(), read_pdf(&age)?, read_pdf(&displacement)?)?
                .convert_units(cfg.age_unit_out, cfg.displacement_unit_out)?;
            let pdf = AnalyticalEngine::new(cfg.analytical()).compute_slip_rate(&marker)?;
            let rates = vec![IntervalRate { name: name.clone(), pdf }];
            write_report(&outdir, &format!("Slip rate since {name}"), &rates, &cfg)?;
            write_manifest_json(
                &outdir,
                &Manifest {
                    engine: "analytical".to_string(),
                    status: None,
                    accepted: None,
                    drawn: None,
                    markers: vec![name],
                    intervals: rates.iter().map(|r| r.name.clone()).collect(),
                    sample_ranges: Vec::new(),
                    config: cfg.clone(),
                },
            )?;
            println!("{}", outdir.display());
        }
        Command::Rates { markers, outdir } => {
            let seq = prepare_markers(&markers, &cfg)?;
            let rates = AnalyticalEngine::new(cfg.analytical())
                .compute_slip_rates(&seq)
                .with_context(|| format!("analytical slip rates for {}", markers.display()))?;
            write_report(&outdir, "Incremental slip rates (analytical)", &rates, &cfg)?;
            write_manifest_json(
                &outdir,
                &Manifest {
                    engine: "analytical".to_string(),
                    status: None,
                    accepted: None,
                    drawn: None,
                    markers: marker_names(&seq),
                    intervals: seq.interval_names(),
                    sample_ranges: Vec::new(),
                    config: cfg.clone(),
                },
            )?;
            println!("{}", outdir.display());
        }
        Command::RatesMc { markers, outdir } => {
            let seq = prepare_markers(&markers, &cfg)?;
            let outcome = MonteCarloEngine::new(cfg.monte_carlo())
                .run(&seq)
                .with_context(|| format!("Monte Carlo slip rates for {}", markers.display()))?;
            if outcome.status != RunStatus::Completed {
                warn!(
                    status = ?outcome.status,
                    accepted = outcome.accepted,
                    "sample target not reached; reporting partial results"
                );
            }
            if outcome.rates.is_empty() {
                bail!("no samples were accepted after {} draws", outcome.drawn);
            }
            write_report(
                &outdir,
                &format!(
                    "Incremental slip rates (Monte Carlo, {} of {} samples accepted)",
                    outcome.accepted, outcome.drawn
                ),
                &outcome.rates,
                &cfg,
            )?;
            let mut sample_ranges = Vec::new();
            if !outcome.picks.is_empty() {
                let path = outdir.join("picks.csv");
                write_picks_csv(&path, &marker_names(&seq), &seq.interval_names(), &outcome.picks)?;
                info!(path = %path.display(), picks = outcome.picks.len(), "wrote picks");
                for (rate, ci) in outcome.rates.iter().zip(outcome.pick_ranges(cfg.confidence)?) {
                    let (lo, hi) = ci.ranges[0];
                    println!(
                        "{} sample percentiles {:.2} %: {ci}",
                        rate.name,
                        100.0 * cfg.confidence
                    );
                    sample_ranges.push(SampleRange {
                        interval: rate.name.clone(),
                        confidence: cfg.confidence,
                        lo,
                        hi,
                    });
                }
            }
            write_manifest_json(
                &outdir,
                &Manifest {
                    engine: "monte-carlo".to_string(),
                    status: Some(format!("{:?}", outcome.status)),
                    accepted: Some(outcome.accepted),
                    drawn: Some(outcome.drawn),
                    markers: marker_names(&seq),
                    intervals: seq.interval_names(),
                    sample_ranges,
                    config: cfg.clone(),
                },
            )?;
            println!("{}", outdir.display());
        }
        Command::Summary { pdf } => {
            let p = read_pdf(&pdf)?;
            println!("{p}");
            print_summary(&label(&p, &pdf), &p, &cfg)?;
        }
        Command::Overlap(pair) => {
            let (a, b) = read_pair(&pair)?;
            println!("{:.6}", algebra::overlap_index(&a, &b)?);
        }
        Command::Ks(pair) => {
            let (a, b) = read_pair(&pair)?;
            println!("{:.6}", algebra::ks_statistic(&a, &b)?);
        }
        Command::Gap(pair) => {
            let (a, b) = read_pair(&pair)?;
            println!("{:.6}", algebra::gap_probability(&a, &b)?);
        }
        Command::CrossCorrelate(args) => {
            let (a, b) = read_pair(&args.pair)?;
            let xc = algebra::cross_correlate(&a, &b)?;
            write_cross_correlation_csv(&args.output, &xc)?;
            println!("peak lag: {:.6}", xc.peak_lag());
        }
        Command::Add(args) => {
            let (a, b) = read_pair(&args.pair)?;
            let name = format!("{} + {}", label(&a, &args.pair.a), label(&b, &args.pair.b));
            emit(algebra::add(&a, &b)?, name, &args.output, &cfg)?;
        }
        Command::Subtract(args) => {
            let (a, b) = read_pair(&args.pair)?;
            let name = format!("{} - {}", label(&a, &args.pair.a), label(&b, &args.pair.b));
            emit(algebra::subtract(&a, &b)?, name, &args.output, &cfg)?;
        }
        Command::Multiply(args) => {
            let (a, b) = read_pair(&args.pair)?;
            let name = format!("{} * {}", label(&a, &args.pair.a), label(&b, &args.pair.b));
            emit(algebra::multiply(&a, &b, None)?, name, &args.output, &cfg)?;
        }
        Command::Divide(args) => {
            let (a, b) = read_pair(&args.pair)?;
            let name = format!("{} / {}", label(&a, &args.pair.a), label(&b, &args.pair.b));
            let options = algebra::QuotientOptions {
                max_quotient: cfg.max_quotient,
                step: Some(cfg.rate_step),
            };
            emit(algebra::divide_with(&a, &b, &options)?, name, &args.output, &cfg)?;
        }
        Command::Between(args) => {
            let (a, b) = read_pair(&args.pair)?;
            let name = format!("between {} and {}", label(&a, &args.pair.a), label(&b, &args.pair.b));
            emit(algebra::between(&a, &b)?, name, &args.output, &cfg)?;
        }
        Command::Merge { inputs, weights } => {
            let pdfs = read_many(&inputs.pdfs)?;
            let refs: Vec<&DiscretePdf> = pdfs.iter().collect();
            let merged = algebra::merge(&refs, weights.as_deref())?;
            emit(merged, "merged".to_string(), &inputs.output, &cfg)?;
        }
        Command::Conflate(inputs) => {
            let pdfs = read_many(&inputs.pdfs)?;
            let refs: Vec<&DiscretePdf> = pdfs.iter().collect();
            emit(algebra::conflate(&refs)?, "conflated".to_string(), &inputs.output, &cfg)?;
        }
    }

    Ok(())
}
