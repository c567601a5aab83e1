//! Tamper and anomaly scoring for metered gas consumption.
//!
//! Pipeline: [`table`] loads a raw sheet, [`preprocess`] cleans it into a
//! [`Dataset`], the [`engine`] runs the [`detector`] suite over every
//! facility and [`report`] aggregates the resulting findings, which
//! [`export`] writes out as CSV tables.

pub mod config;
pub mod dataset;
pub mod detector;
pub mod engine;
pub mod error;
pub mod export;
pub mod finding;
pub mod metrics;
pub mod preprocess;
pub mod report;
pub mod stats;
pub mod table;

pub use config::{EngineConfig, PreprocessConfig, Thresholds};
pub use dataset::{Dataset, Facility, ReadingColumn};
pub use engine::AnomalyEngine;
pub use error::{ConfigError, IngestError, IngestResult};
pub use finding::{Finding, RiskTier, RuleId, TriggeredRule};
pub use report::{AnalysisReport, FacilityDetail};
pub use table::RawTable;

/// Preprocess `raw` and analyse it on `workers` threads (1 = sequential).
pub fn analyze_table(
    raw: &RawTable,
    config: &EngineConfig,
    workers: usize,
) -> IngestResult<AnalysisReport> {
    let dataset = preprocess::preprocess(raw, &config.preprocess)?;
    let engine = AnomalyEngine::new(config.thresholds);
    Ok(if workers > 1 {
        engine.analyze_parallel(&dataset, workers)
    } else {
        engine.analyze(&dataset)
    })
}
