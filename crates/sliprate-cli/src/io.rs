use anyhow::{bail, Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sliprate::{CrossCorrelation, DiscretePdf, Pick, SlipRateConfig, VariableType};

/// Summary line for one PDF, as written to `summary.csv`.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub name: String,
    pub unit: Option<String>,
    pub mode: f64,
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub metric: String,
    pub confidence: f64,
    pub ranges: Vec<(f64, f64)>,
}

/// Percentile range of one interval's rate over the Monte Carlo picks.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRange {
    pub interval: String,
    pub confidence: f64,
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub engine: String,
    pub status: Option<String>,
    pub accepted: Option<u64>,
    pub drawn: Option<u64>,
    pub markers: Vec<String>,
    pub intervals: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_ranges: Vec<SampleRange>,
    pub config: SlipRateConfig,
}

fn fmt_f64(v: f64) -> String {
    format!("{v}")
}

pub fn ensure_outdir(outdir: &Path) -> Result<()> {
    fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create output directory: {}", outdir.display()))
}

/// Parse the PDF text format.
///
/// Optional `# name:`, `# variable_type:` and `# unit:` headers are followed by
/// one `value density` pair per line, separated by a comma, spaces or a tab.
/// Other `#` lines are ignored.
pub fn parse_pdf(raw: &str) -> Result<DiscretePdf> {
    let mut name = None;
    let mut variable_type = VariableType::Other;
    let mut unit = None;
    let mut pairs = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some((key, value)) = comment.split_once(':') {
                let value = value.trim();
                match key.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
                    "name" => name = Some(value.to_string()),
                    "variable_type" => variable_type = value.parse()?,
                    "unit" if !value.is_empty() => unit = Some(value.parse()?),
                    _ => {}
                }
            }
            continue;
        }

        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() != 2 {
            bail!("line {}: expected a value and a density, got '{line}'", idx + 1);
        }
        let value: f64 = fields[0]
            .parse()
            .with_context(|| format!("line {}: invalid value '{}'", idx + 1, fields[0]))?;
        let density: f64 = fields[1]
            .parse()
            .with_context(|| format!("line {}: invalid density '{}'", idx + 1, fields[1]))?;
        pairs.push((value, density));
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (values, densities) = pairs.into_iter().unzip();
    let mut pdf = DiscretePdf::new(values, densities)?.tagged(variable_type, unit)?;
    if let Some(name) = name {
        pdf = pdf.named(name);
    }
    Ok(pdf)
}

pub fn read_pdf(path: &Path) -> Result<DiscretePdf> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read PDF file: {}", path.display()))?;
    parse_pdf(&raw).with_context(|| format!("failed to parse PDF file: {}", path.display()))
}

pub fn write_pdf(path: &Path, pdf: &DiscretePdf) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to open PDF file for writing: {}", path.display()))?;
    if let Some(name) = pdf.name() {
        writeln!(file, "# name: {name}")?;
    }
    writeln!(file, "# variable_type: {}", pdf.variable_type())?;
    if let Some(unit) = pdf.unit() {
        writeln!(file, "# unit: {unit}")?;
    }

    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
    for (v, d) in pdf.values().iter().zip(pdf.densities()) {
        wtr.write_record([fmt_f64(*v), fmt_f64(*d)])?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush PDF file: {}", path.display()))?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to open summary.csv for writing: {}", path.display()))?;

    wtr.write_record([
        "name",
        "unit",
        "mode",
        "median",
        "mean",
        "std",
        "metric",
        "confidence",
        "ranges",
    ])?;

    for row in rows {
        let ranges = row
            .ranges
            .iter()
            .map(|(lo, hi)| format!("{}:{}", fmt_f64(*lo), fmt_f64(*hi)))
            .collect::<Vec<_>>()
            .join(";");
        wtr.write_record([
            row.name.clone(),
            row.unit.clone().unwrap_or_else(|| "NA".to_string()),
            fmt_f64(row.mode),
            fmt_f64(row.median),
            fmt_f64(row.mean),
            fmt_f64(row.std_dev),
            row.metric.clone(),
            fmt_f64(row.confidence),
            ranges,
        ])?;
    }

    wtr.flush()
        .with_context(|| format!("failed to flush summary.csv: {}", path.display()))?;
    Ok(())
}

pub fn write_cross_correlation_csv(path: &Path, xc: &CrossCorrelation) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;
    wtr.write_record(["lag", "correlation", "normalized"])?;
    for ((lag, value), norm) in xc.lags.iter().zip(&xc.values).zip(xc.normalized()) {
        wtr.write_record([fmt_f64(*lag), fmt_f64(*value), fmt_f64(norm)])?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

/// One row per pick: every marker's age and displacement, then every
/// interval's rate.
pub fn write_picks_csv(path: &Path, markers: &[String], intervals: &[String], picks: &[Pick]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to open picks file for writing: {}", path.display()))?;

    let header: Vec<String> = std::iter::once("pick".to_string())
        .chain(markers.iter().map(|m| format!("age_{m}")))
        .chain(markers.iter().map(|m| format!("displacement_{m}")))
        .chain(intervals.iter().map(|i| format!("rate_{i}")))
        .collect();
    wtr.write_record(&header)?;

    for (k, pick) in picks.iter().enumerate() {
        if pick.ages.len() != markers.len() {
            bail!("pick {k} has {} ages for {} markers", pick.ages.len(), markers.len());
        }
        let row: Vec<String> = std::iter::once(k.to_string())
            .chain(pick.ages.iter().map(|v| fmt_f64(*v)))
            .chain(pick.displacements.iter().map(|v| fmt_f64(*v)))
            .chain(pick.rates().into_iter().map(fmt_f64))
            .collect();
        wtr.write_record(&row)?;
    }

    wtr.flush()
        .with_context(|| format!("failed to flush picks file: {}", path.display()))?;
    Ok(())
}

pub fn write_manifest_json(outdir: &Path, manifest: &Manifest) -> Result<PathBuf> {
    let path = outdir.join("manifest.json");
    let payload = serde_json::to_string_pretty(manifest).context("failed to serialize manifest")?;
    fs::write(&path, payload)
        .with_context(|| format!("failed to write manifest: {}", path.display()))?;
    Ok(path)
}
