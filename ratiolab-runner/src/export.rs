//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for ranking reports:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: one row per instrument, ranked rows first, for spreadsheets
//! - **Markdown**: human-readable report
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ratiolab_core::{PctChange, RatioRow, UndefinedReason};

use crate::pipeline::{RankingReport, SCHEMA_VERSION};
use crate::sweep::SweepResults;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RankingReport` to pretty JSON.
pub fn export_json(report: &RankingReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RankingReport to JSON")
}

/// Deserialize a `RankingReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RankingReport> {
    let report: RankingReport =
        serde_json::from_str(json).context("failed to deserialize RankingReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn status_label(pct: &PctChange) -> &'static str {
    match pct {
        PctChange::Defined(_) => "ok",
        PctChange::Undefined(UndefinedReason::ZeroReferencePrice) => "zero_reference_price",
        PctChange::Undefined(UndefinedReason::ZeroStartRatio) => "zero_start_ratio",
        PctChange::Undefined(UndefinedReason::NonFinite) => "non_finite",
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_default()
}

/// Export a ranking as CSV.
///
/// Columns: rank, symbol, ratio_start, ratio_end, pct_change, status.
/// Undefined rows follow the ranked ones with an empty rank.
pub fn export_ranking_csv(report: &RankingReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "rank",
        "symbol",
        "ratio_start",
        "ratio_end",
        "pct_change",
        "status",
    ])?;

    let write_row = |wtr: &mut csv::Writer<Vec<u8>>, rank: String, row: &RatioRow| {
        let ratio_start = fmt_opt(row.ratio_start, 8);
        let ratio_end = fmt_opt(row.ratio_end, 8);
        let pct_change = fmt_opt(row.pct_change.value(), 4);
        wtr.write_record([
            rank.as_str(),
            row.symbol.as_str(),
            ratio_start.as_str(),
            ratio_end.as_str(),
            pct_change.as_str(),
            status_label(&row.pct_change),
        ])
    };

    for (i, row) in report.result.ranked().iter().enumerate() {
        write_row(&mut wtr, (i + 1).to_string(), row)?;
    }
    for row in report.result.undefined() {
        write_row(&mut wtr, String::new(), row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a sweep summary as CSV: one line per reference.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "reference",
        "ranked",
        "undefined",
        "best_symbol",
        "best_pct_change",
        "worst_symbol",
        "worst_pct_change",
        "error",
    ])?;
    for row in results.summary() {
        let (best_symbol, best_pct) = split_pick(&row.best);
        let (worst_symbol, worst_pct) = split_pick(&row.worst);
        let ranked = row.ranked.to_string();
        let undefined = row.undefined.to_string();
        wtr.write_record([
            row.reference.as_str(),
            ranked.as_str(),
            undefined.as_str(),
            best_symbol,
            best_pct.as_str(),
            worst_symbol,
            worst_pct.as_str(),
            row.error.as_deref().unwrap_or(""),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn split_pick(pick: &Option<(String, f64)>) -> (&str, String) {
    match pick {
        Some((symbol, pct)) => (symbol.as_str(), format!("{pct:.4}")),
        None => ("", String::new()),
    }
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a ranking run.
///
/// Creates a directory named `{reference}_{timestamp}/` under `output_dir`
/// containing:
/// - `manifest.json`: the full `RankingReport`
/// - `ranking.csv`: ranked and undefined rows
/// - `report.md`: the Markdown report
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &RankingReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.result.reference,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("ranking.csv"), export_ranking_csv(report)?)?;
    std::fs::write(run_dir.join("report.md"), generate_report(report))?;

    Ok(run_dir)
}

/// Load a `RankingReport` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<RankingReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown report for a ranking run.
pub fn generate_report(report: &RankingReport) -> String {
    let result = &report.result;
    let mut md = String::with_capacity(2048);

    md.push_str("# Ratio Ranking Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Reference | {} |\n", result.reference));
    md.push_str(&format!("| Period | {} to {} |\n", result.start, result.end));
    md.push_str(&format!("| Order | {} |\n", result.order));
    md.push_str(&format!("| Instruments | {} |\n", report.instrument_count));
    md.push_str(&format!(
        "| Adjustments | {} |\n",
        report.request.adjustments.len()
    ));
    md.push_str(&format!("| Panel Hash | {} |\n", report.panel_fingerprint));
    if report.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Ranked Changes in Ratios\n\n");
    if result.ranked().is_empty() {
        md.push_str("_No instrument has a defined change._\n\n");
    } else {
        md.push_str("| # | Symbol | Ratio (start) | Ratio (end) | Change |\n");
        md.push_str("| ---: | --- | ---: | ---: | ---: |\n");
        for (i, row) in result.ranked().iter().enumerate() {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {:+.2}% |\n",
                i + 1,
                row.symbol,
                fmt_opt(row.ratio_start, 4),
                fmt_opt(row.ratio_end, 4),
                row.pct_change.value().unwrap_or_default()
            ));
        }
        md.push('\n');
    }

    if !result.undefined().is_empty() {
        md.push_str("## Undefined Changes\n\n");
        for row in result.undefined() {
            md.push_str(&format!(
                "- {}: {}\n",
                row.symbol,
                status_label(&row.pct_change)
            ));
        }
        md.push('\n');
    }

    md
}
