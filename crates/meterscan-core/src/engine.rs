//! meterscan anomaly engine
//!
//! Two-stage evaluation per facility:
//! 1. Detection Stage: run the six rules independently, in fixed order
//! 2. Decision Stage: sum contributions, classify the tier, drop facilities
//!    where nothing fired
//!
//! The engine keeps no state between runs. Facilities only share the
//! read-only dataset, so the parallel path needs no synchronisation beyond
//! its work queue.

use crate::config::Thresholds;
use crate::dataset::Dataset;
use crate::detector::{DetectorSuite, FacilityContext};
use crate::finding::Finding;
use crate::metrics;
use crate::report::{AnalysisReport, FacilityDetail};
use crate::stats::SummaryStats;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info};

/// Facilities handed to a worker per queue message.
const CHUNK_SIZE: usize = 256;

/// Score one facility of `dataset`. `None` when no rule fired or the index
/// is out of range.
pub fn score(dataset: &Dataset, index: usize, thresholds: &Thresholds) -> Option<Finding> {
    AnomalyEngine::new(*thresholds).score(dataset, index)
}

pub struct AnomalyEngine {
    thresholds: Thresholds,
    suite: DetectorSuite,
}

impl Default for AnomalyEngine {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl AnomalyEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            suite: DetectorSuite::new(&thresholds),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn suite(&self) -> &DetectorSuite {
        &self.suite
    }

    pub fn score(&self, dataset: &Dataset, index: usize) -> Option<Finding> {
        let ctx = FacilityContext::new(dataset, index)?;

        // === STAGE 1: Run all detectors ===
        let triggered = self.suite.run(&ctx);

        // === STAGE 2: Aggregate ===
        Finding::from_rules(
            &ctx.facility.meter_id,
            &ctx.facility.building_id,
            triggered,
            SummaryStats::from_readings(ctx.readings()),
        )
    }

    /// Score every row carrying `meter_id` and pair its readings with the
    /// column labels. Without column metadata months are labelled 1, 2, ...
    pub fn detail(&self, dataset: &Dataset, meter_id: &str) -> Vec<FacilityDetail> {
        dataset
            .indices_of(meter_id)
            .into_iter()
            .filter_map(|idx| {
                let facility = dataset.facility(idx)?;
                let series = facility
                    .readings
                    .iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let label = dataset
                            .columns()
                            .get(i)
                            .map_or_else(|| (i + 1).to_string(), |c| c.label.clone());
                        (label, *value)
                    })
                    .collect();
                Some(FacilityDetail {
                    meter_id: facility.meter_id.clone(),
                    building_id: facility.building_id.clone(),
                    finding: self.score(dataset, idx),
                    series,
                })
            })
            .collect()
    }

    /// Evaluate every facility on the calling thread.
    pub fn analyze(&self, dataset: &Dataset) -> AnalysisReport {
        let start = Instant::now();
        let findings = self.findings_in(dataset, 0..dataset.len());
        self.finish(dataset, findings, start)
    }

    /// Evaluate facilities on `workers` scoped threads. Findings come back in
    /// dataset order, so the report matches `analyze` apart from run metadata.
    pub fn analyze_parallel(&self, dataset: &Dataset, workers: usize) -> AnalysisReport {
        let start = Instant::now();
        let workers = workers.min(dataset.len().div_ceil(CHUNK_SIZE));
        let findings = if workers <= 1 {
            self.findings_in(dataset, 0..dataset.len())
        } else {
            self.findings_parallel(dataset, workers)
        };
        self.finish(dataset, findings, start)
    }

    fn findings_in(&self, dataset: &Dataset, range: Range<usize>) -> Vec<Finding> {
        range.filter_map(|idx| self.score(dataset, idx)).collect()
    }

    fn findings_parallel(&self, dataset: &Dataset, workers: usize) -> Vec<Finding> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Range<usize>>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, Finding)>();

        for start in (0..dataset.len()).step_by(CHUNK_SIZE) {
            let end = (start + CHUNK_SIZE).min(dataset.len());
            if job_tx.send(start..end).is_err() {
                break;
            }
        }
        drop(job_tx);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for range in job_rx.iter() {
                        for idx in range {
                            if let Some(finding) = self.score(dataset, idx) {
                                if result_tx.send((idx, finding)).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut indexed: Vec<(usize, Finding)> = result_rx.iter().collect();
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, f)| f).collect()
    }

    fn finish(&self, dataset: &Dataset, findings: Vec<Finding>, start: Instant) -> AnalysisReport {
        let elapsed = start.elapsed();

        metrics::FACILITIES_SCANNED.inc_by(dataset.len() as f64);
        metrics::FINDINGS_TOTAL.inc_by(findings.len() as f64);
        metrics::ANALYSIS_DURATION.observe(elapsed.as_secs_f64());
        for finding in &findings {
            for rule in &finding.triggered_rules {
                metrics::record_rule(rule.rule);
            }
            debug!(
                meter_id = %finding.meter_id,
                building_id = %finding.building_id,
                risk_score = finding.risk_score,
                tier = finding.risk_tier.label(),
                "Facility flagged."
            );
        }

        info!(
            facilities = dataset.len(),
            findings = findings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Analysis complete."
        );

        AnalysisReport::build(dataset, self.thresholds, findings)
    }
}
