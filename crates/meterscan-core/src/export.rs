//! CSV export of an analysis report.
//!
//! A report exports as three tables: a one-row summary, the findings and the
//! per-building risk. Written to a file, the summary and building tables go
//! to companion files next to it (`report.csv`, `report_summary.csv`,
//! `report_buildings.csv`); written to a stream, the three tables follow each
//! other separated by a blank line.

use crate::report::AnalysisReport;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn write_summary_csv<W: Write>(out: W, report: &AnalysisReport) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "run_id",
        "generated_at",
        "total_facilities",
        "flagged",
        "high",
        "medium",
        "low",
        "low_consumption_threshold",
        "neighbor_ratio_threshold",
        "sudden_drop_threshold",
    ])?;
    let t = &report.thresholds;
    writer.write_record([
        report.run_id.to_string(),
        report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        report.dataset.facilities.to_string(),
        report.flagged_count().to_string(),
        report.tier_counts.high.to_string(),
        report.tier_counts.medium.to_string(),
        report.tier_counts.low.to_string(),
        t.low_consumption_threshold.to_string(),
        t.neighbor_ratio_threshold.to_string(),
        t.sudden_drop_threshold.to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

pub fn write_findings_csv<W: Write>(out: W, report: &AnalysisReport) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "meter_id",
        "building_id",
        "risk_score",
        "risk_tier",
        "reasons",
        "mean",
        "total",
        "first_half_mean",
        "last_half_mean",
    ])?;
    for f in &report.findings {
        let s = &f.summary_stats;
        writer.write_record([
            f.meter_id.clone(),
            f.building_id.clone(),
            f.risk_score.to_string(),
            f.risk_tier.label().to_string(),
            f.reason(),
            format!("{:.2}", s.mean),
            format!("{:.2}", s.total),
            format!("{:.2}", s.first_half_mean),
            format!("{:.2}", s.last_half_mean),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_buildings_csv<W: Write>(out: W, report: &AnalysisReport) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["building_id", "flagged", "mean_risk"])?;
    for b in &report.building_risk {
        writer.write_record([
            b.building_id.clone(),
            b.flagged.to_string(),
            format!("{:.2}", b.mean_risk),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Summary, findings and buildings on one stream.
pub fn write_csv_sections<W: Write>(mut out: W, report: &AnalysisReport) -> csv::Result<()> {
    write_summary_csv(&mut out, report)?;
    writeln!(out)?;
    write_findings_csv(&mut out, report)?;
    writeln!(out)?;
    write_buildings_csv(&mut out, report)?;
    Ok(())
}

/// `dir/report.csv` + `summary` -> `dir/report_summary.csv`.
pub fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    path.with_file_name(format!("{stem}_{suffix}.{ext}"))
}

/// Write the findings to `path` and the other two tables to companion
/// files. Returns every path written, findings first.
pub fn write_csv_files(path: &Path, report: &AnalysisReport) -> csv::Result<Vec<PathBuf>> {
    let summary = companion_path(path, "summary");
    let buildings = companion_path(path, "buildings");

    write_findings_csv(std::fs::File::create(path)?, report)?;
    write_summary_csv(std::fs::File::create(&summary)?, report)?;
    write_buildings_csv(std::fs::File::create(&buildings)?, report)?;

    Ok(vec![path.to_path_buf(), summary, buildings])
}
