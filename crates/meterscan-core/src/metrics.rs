//! Prometheus instruments for analysis runs.
//!
//! Registered lazily in the default registry on first touch.

use crate::finding::RuleId;
use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, TextEncoder};
use tracing::warn;

pub static FACILITIES_SCANNED: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new(
        "meterscan_facilities_scanned_total",
        "Total facilities evaluated",
    )
    .expect("valid metric definition");
    register(Box::new(c.clone()));
    c
});

pub static FINDINGS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("meterscan_findings_total", "Total findings emitted")
        .expect("valid metric definition");
    register(Box::new(c.clone()));
    c
});

pub static RULE_FIRED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let c = CounterVec::new(
        Opts::new("meterscan_rule_fired_total", "Rule hits by rule name"),
        &["rule"],
    )
    .expect("valid metric definition");
    register(Box::new(c.clone()));
    c
});

pub static ANALYSIS_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "meterscan_analysis_duration_seconds",
        "Wall time of full dataset analysis",
    ))
    .expect("valid metric definition");
    register(Box::new(h.clone()));
    h
});

/// Each instrument registers once per process, from its `Lazy`. A failure
/// here means another collector already owns the name, so the instrument
/// still counts but is missing from `render()`.
fn register(collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = prometheus::register(collector) {
        warn!(error = %e, "Metric registration failed.");
    }
}

pub fn record_rule(rule: RuleId) {
    RULE_FIRED_TOTAL.with_label_values(&[rule.name()]).inc();
}

/// Text exposition of everything in the default registry.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
