//! Text reports and output directories for slip-rate runs

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use sliprate::{DiscretePdf, IntervalRate, SlipRateConfig};

use crate::io::{ensure_outdir, write_pdf, write_summary_csv, SummaryRow};

pub fn summarize(name: &str, pdf: &DiscretePdf, config: &SlipRateConfig) -> Result<SummaryRow> {
    let ci = config
        .confidence_metric
        .interval(pdf, config.confidence)
        .with_context(|| format!("confidence interval for {name}"))?;
    Ok(SummaryRow {
        name: name.to_string(),
        unit: pdf.unit().map(|u| u.to_string()),
        mode: pdf.mode(),
        median: pdf.median(),
        mean: pdf.mean(),
        std_dev: pdf.std_dev(),
        metric: metric_label(config).to_string(),
        confidence: config.confidence,
        ranges: ci.ranges,
    })
}

fn metric_label(config: &SlipRateConfig) -> &'static str {
    match config.confidence_metric {
        sliprate::ConfidenceMetric::Hpd => "hpd",
        sliprate::ConfidenceMetric::EqualTailed => "equal-tailed",
    }
}

/// Human-readable block for one PDF.
pub fn render_block(name: &str, pdf: &DiscretePdf, row: &SummaryRow) -> String {
    let mut out = format!("Interval: {name}\n");
    if let Some(unit) = &row.unit {
        out.push_str(&format!("  unit: {unit}\n"));
    }
    for line in pdf.summary().to_string().lines() {
        out.push_str(&format!("  {line}\n"));
    }
    let ranges = row
        .ranges
        .iter()
        .map(|(lo, hi)| format!("{lo:.3} - {hi:.3}"))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!(
        "  {} {:.1}%: {ranges}\n",
        row.metric,
        100.0 * row.confidence
    ));
    out
}

/// Write `report.txt`, `summary.csv` and one PDF file per interval.
pub fn write_report(outdir: &Path, title: &str, rates: &[IntervalRate], config: &SlipRateConfig) -> Result<Vec<SummaryRow>> {
    ensure_outdir(outdir)?;
    let mut text = format!("{title}\n\n");
    let mut rows = Vec::with_capacity(rates.len());
    for rate in rates {
        let row = summarize(&rate.name, &rate.pdf, config)?;
        text.push_str(&render_block(&rate.name, &rate.pdf, &row));
        text.push('\n');
        write_pdf(&outdir.join(format!("rate_{}.txt", rate.name)), &rate.pdf)?;
        rows.push(row);
    }

    let report_path = outdir.join("report.txt");
    fs::write(&report_path, text)
        .with_context(|| format!("failed to write report: {}", report_path.display()))?;
    write_summary_csv(&outdir.join("summary.csv"), &rows)?;
    Ok(rows)
}
