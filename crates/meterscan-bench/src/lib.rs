//! Benchmark Suite for meterscan
//!
//! Runs the engine over generated sheets with known tampering and measures:
//! - Precision, Recall, F1-Score at facility level
//! - Per-scenario recall (was the expected rule among the fired ones)
//! - Sequential vs parallel wall time and facility throughput

use meterscan_core::{AnalysisReport, AnomalyEngine, RuleId, Thresholds};
use meterscan_sim::{GeneratorConfig, SheetGenerator, SimError, SyntheticSheet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::info;

/// Benchmark configuration
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BenchmarkConfig {
    pub name: String,
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Worker threads for the parallel pass
    pub workers: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            name: "Default Benchmark".to_string(),
            generator: GeneratorConfig::default(),
            thresholds: Thresholds::default(),
            workers: 4,
        }
    }
}

/// Benchmark results
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BenchmarkResults {
    pub config: String,
    pub seed: u64,
    pub total_facilities: usize,
    pub total_tampered: usize,
    pub total_findings: usize,

    // Facility-level accuracy
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,

    pub scenario_metrics: BTreeMap<String, ScenarioMetrics>,
    pub rule_triggers: BTreeMap<String, u64>,

    pub timing: TimingMetrics,
    /// Parallel findings identical to sequential ones
    pub parallel_consistent: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ScenarioMetrics {
    pub injected: u64,
    /// Flagged by any rule
    pub flagged: u64,
    /// Flagged with the scenario's expected rule among the fired ones
    pub caught: u64,
    pub recall: f64,
    pub avg_risk_score: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TimingMetrics {
    pub workers: usize,
    pub sequential_ms: f64,
    pub parallel_ms: f64,
    pub speedup: f64,
    pub sequential_fps: f64,
    pub parallel_fps: f64,
}

/// Main benchmark runner
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BenchmarkResults, SimError> {
        let config = &self.config;
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║           meterscan Benchmark - Ground Truth Mode            ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Config: {:52} ║", config.name);
        println!(
            "║ Buildings: {:5} | Months: {:3} | Tamper rate: {:5.2} {:>10} ║",
            config.generator.buildings, config.generator.months, config.generator.tamper_rate, ""
        );
        println!("║ Workers: {:51} ║", config.workers);
        println!("╚══════════════════════════════════════════════════════════════╝");

        let sheet = SheetGenerator::new(config.generator.clone())?.generate();
        let dataset = sheet.to_dataset();
        let engine = AnomalyEngine::new(config.thresholds);

        let start = Instant::now();
        let sequential = engine.analyze(&dataset);
        let sequential_elapsed = start.elapsed();

        let start = Instant::now();
        let parallel = engine.analyze_parallel(&dataset, config.workers);
        let parallel_elapsed = start.elapsed();

        info!(
            facilities = dataset.len(),
            sequential_ms = sequential_elapsed.as_secs_f64() * 1000.0,
            parallel_ms = parallel_elapsed.as_secs_f64() * 1000.0,
            "Benchmark passes finished."
        );

        let timing = TimingMetrics {
            workers: config.workers,
            sequential_ms: sequential_elapsed.as_secs_f64() * 1000.0,
            parallel_ms: parallel_elapsed.as_secs_f64() * 1000.0,
            speedup: ratio(sequential_elapsed.as_secs_f64(), parallel_elapsed.as_secs_f64()),
            sequential_fps: ratio(dataset.len() as f64, sequential_elapsed.as_secs_f64()),
            parallel_fps: ratio(dataset.len() as f64, parallel_elapsed.as_secs_f64()),
        };

        let mut results = score_against_truth(&config.name, &sheet, &sequential, timing);
        results.seed = config.generator.seed;
        results.parallel_consistent = sequential.findings == parallel.findings;
        Ok(results)
    }

    pub fn print_results(&self, results: &BenchmarkResults) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                    BENCHMARK RESULTS                         ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Configuration: {:45} ║", results.config);
        println!("╠──────────────────────────────────────────────────────────────╣");
        println!("║ Facilities:         {:>10}                               ║", results.total_facilities);
        println!("║ Tampered:           {:>10}                               ║", results.total_tampered);
        println!("║ Findings:           {:>10}                               ║", results.total_findings);
        println!("╠──────────────────────────────────────────────────────────────╣");
        println!("║ ACCURACY                                                     ║");
        println!("╠──────────────────────────────────────────────────────────────╣");
        println!("║ True Positives:     {:>10}                               ║", results.true_positives);
        println!("║ False Positives:    {:>10}                               ║", results.false_positives);
        println!("║ True Negatives:     {:>10}                               ║", results.true_negatives);
        println!("║ False Negatives:    {:>10}                               ║", results.false_negatives);
        println!("║ Precision:          {:>10.2}%                              ║", results.precision * 100.0);
        println!("║ Recall:             {:>10.2}%                              ║", results.recall * 100.0);
        println!("║ F1-Score:           {:>10.3}                               ║", results.f1_score);
        println!("╠──────────────────────────────────────────────────────────────╣");
        println!("║ TIMING ({} workers)                                           ║", results.timing.workers);
        println!("╠──────────────────────────────────────────────────────────────╣");
        println!("║ Sequential:         {:>10.2} ms                            ║", results.timing.sequential_ms);
        println!("║ Parallel:           {:>10.2} ms                            ║", results.timing.parallel_ms);
        println!("║ Speedup:            {:>10.2}x                              ║", results.timing.speedup);
        println!("║ Throughput:         {:>10.0} facilities/s                  ║", results.timing.parallel_fps);
        println!("║ Consistent:         {:>10}                               ║", results.parallel_consistent);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ PER-SCENARIO RECALL                                          ║");
        println!("╠──────────────────────────────────────────────────────────────╣");
        for (name, m) in &results.scenario_metrics {
            println!(
                "║ {:20} | n: {:4} | caught: {:5.1}% | avg: {:5.1} ║",
                name,
                m.injected,
                m.recall * 100.0,
                m.avg_risk_score
            );
        }
        println!("╚══════════════════════════════════════════════════════════════╝");
    }

    pub fn export_json(&self, results: &BenchmarkResults) -> String {
        serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string())
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Compare a report with the sheet's ground truth.
pub fn score_against_truth(
    name: &str,
    sheet: &SyntheticSheet,
    report: &AnalysisReport,
    timing: TimingMetrics,
) -> BenchmarkResults {
    let findings: HashMap<&str, &meterscan_core::Finding> = report
        .findings
        .iter()
        .map(|f| (f.meter_id.as_str(), f))
        .collect();

    let total = sheet.facilities.len() as u64;
    let tampered = sheet.truth.len() as u64;
    let flagged = findings.len() as u64;
    let tp = sheet
        .truth
        .iter()
        .filter(|t| findings.contains_key(t.meter_id.as_str()))
        .count() as u64;
    let fp = flagged - tp;
    let fn_ = tampered - tp;
    let tn = total - tp - fp - fn_;
    let (precision, recall, f1_score) = calculate_metrics(tp, fp, fn_);

    let mut scenario_metrics: BTreeMap<String, ScenarioMetrics> = BTreeMap::new();
    let mut score_sums: BTreeMap<String, u64> = BTreeMap::new();
    for truth in &sheet.truth {
        let m = scenario_metrics.entry(truth.scenario.clone()).or_default();
        m.injected += 1;
        if let Some(finding) = findings.get(truth.meter_id.as_str()) {
            m.flagged += 1;
            *score_sums.entry(truth.scenario.clone()).or_default() += u64::from(finding.risk_score);
            if finding.fired(truth.expected_rule) {
                m.caught += 1;
            }
        }
    }
    for (scenario, m) in scenario_metrics.iter_mut() {
        m.recall = ratio(m.caught as f64, m.injected as f64);
        let sum = score_sums.get(scenario).copied().unwrap_or(0);
        m.avg_risk_score = ratio(sum as f64, m.flagged as f64);
    }

    let mut rule_triggers: BTreeMap<String, u64> = RuleId::ALL
        .iter()
        .map(|r| (r.name().to_string(), 0))
        .collect();
    for finding in &report.findings {
        for rule in &finding.triggered_rules {
            *rule_triggers.entry(rule.rule.name().to_string()).or_default() += 1;
        }
    }

    BenchmarkResults {
        config: name.to_string(),
        seed: 0,
        total_facilities: total as usize,
        total_tampered: tampered as usize,
        total_findings: flagged as usize,
        true_positives: tp,
        false_positives: fp,
        true_negatives: tn,
        false_negatives: fn_,
        precision,
        recall,
        f1_score,
        scenario_metrics,
        rule_triggers,
        timing,
        parallel_consistent: true,
    }
}

/// Calculate precision, recall, f1 from confusion matrix values
pub fn calculate_metrics(tp: u64, fp: u64, fn_: u64) -> (f64, f64, f64) {
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Predefined benchmark scenarios
pub mod scenarios {
    use super::*;

    /// Small sheet for smoke runs
    pub fn quick_validation() -> BenchmarkConfig {
        BenchmarkConfig {
            name: "Quick Validation".to_string(),
            generator: GeneratorConfig {
                buildings: 20,
                seed: 1,
                ..Default::default()
            },
            workers: 2,
            ..Default::default()
        }
    }

    /// City district: mixed tampering at a realistic rate
    pub fn district() -> BenchmarkConfig {
        BenchmarkConfig {
            name: "District".to_string(),
            generator: GeneratorConfig {
                buildings: 2_000,
                months: 48,
                tamper_rate: 0.05,
                seed: 2016,
                ..Default::default()
            },
            workers: 8,
            ..Default::default()
        }
    }

    /// Full city: throughput-oriented
    pub fn city() -> BenchmarkConfig {
        BenchmarkConfig {
            name: "City".to_string(),
            generator: GeneratorConfig {
                buildings: 40_000,
                months: 120,
                tamper_rate: 0.03,
                seed: 2025,
                ..Default::default()
            },
            workers: 16,
            ..Default::default()
        }
    }

    pub fn by_name(name: &str) -> Option<BenchmarkConfig> {
        match name {
            "quick" => Some(quick_validation()),
            "district" => Some(district()),
            "city" => Some(city()),
            _ => None,
        }
    }

    pub fn list() -> Vec<(&'static str, &'static str)> {
        vec![
            ("quick", "20 buildings, 36 months, smoke test"),
            ("district", "2,000 buildings, 48 months, 5% tampered"),
            ("city", "40,000 buildings, 120 months, 3% tampered"),
        ]
    }
}
