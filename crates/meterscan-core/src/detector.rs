//! The six tamper/anomaly rules.
//!
//! Each rule is a stateless unit: a pure function over one facility's
//! readings (the peer rule also reads the dataset's building index) wrapped
//! in a `Detector` that turns a hit into a fixed score contribution and a
//! human-readable description.

use crate::config::Thresholds;
use crate::dataset::{Dataset, Facility};
use crate::finding::{RuleId, TriggeredRule};
use crate::stats::{mean, ols_slope, positive_mean};

pub const SUDDEN_DROP_POINTS: u32 = 20;
pub const ZERO_MONTH_POINTS: u32 = 15;
pub const LOW_CONSUMPTION_POINTS: u32 = 25;
pub const TREND_POINTS: u32 = 30;
pub const SEASONAL_POINTS: u32 = 20;
pub const PEER_POINTS: u32 = 35;

/// Most recent months fitted by the trend rule.
pub const TREND_WINDOW: usize = 24;
pub const TREND_MIN_MONTHS: usize = 12;
/// Units per month; a steeper decline fires.
pub const TREND_SLOPE_LIMIT: f64 = -5.0;

pub const SEASONAL_MIN_MONTHS: usize = 24;
pub const SEASONAL_RATIO: f64 = 0.8;
pub const WINTER_MONTHS: [usize; 3] = [12, 1, 2];
pub const SUMMER_MONTHS: [usize; 3] = [6, 7, 8];

/// Calendar month (1-12) of reading `idx`, counting the first reading as
/// January.
pub fn positional_month(idx: usize) -> usize {
    idx % 12 + 1
}

/// Read-only view of one facility inside its dataset.
#[derive(Debug, Clone, Copy)]
pub struct FacilityContext<'a> {
    pub index: usize,
    pub facility: &'a Facility,
    pub dataset: &'a Dataset,
}

impl<'a> FacilityContext<'a> {
    pub fn new(dataset: &'a Dataset, index: usize) -> Option<Self> {
        dataset.facility(index).map(|facility| Self {
            index,
            facility,
            dataset,
        })
    }

    pub fn readings(&self) -> &'a [f64] {
        &self.facility.readings
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub contribution: u32,
    pub description: String,
}

pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn id(&self) -> RuleId;
    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult>;

    fn triggered(&self, ctx: &FacilityContext<'_>) -> Option<TriggeredRule> {
        self.evaluate(ctx).map(|r| TriggeredRule {
            rule: self.id(),
            contribution: r.contribution,
            description: r.description,
        })
    }
}

// ============================================================================
// RULE FUNCTIONS
// ============================================================================

/// Month-over-month drops steeper than `threshold_pct` percent, counted only
/// where the prior month is positive.
pub fn count_sudden_drops(readings: &[f64], threshold_pct: f64) -> usize {
    let keep = (100.0 - threshold_pct) / 100.0;
    readings
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] < w[0] * keep)
        .count()
}

pub fn count_zero_months(readings: &[f64]) -> usize {
    readings.iter().filter(|v| **v == 0.0).count()
}

/// Average of the positive months when the low-consumption rule fires.
/// A sequence without any positive month always fires with average 0.
pub fn low_consumption_average(readings: &[f64], threshold: f64) -> Option<f64> {
    match positive_mean(readings) {
        None => Some(0.0),
        Some(avg) if avg < threshold => Some(avg),
        Some(_) => None,
    }
}

/// Slope of the recent window when it declines faster than the limit.
pub fn declining_trend_slope(readings: &[f64]) -> Option<f64> {
    let recent = &readings[readings.len().saturating_sub(TREND_WINDOW)..];
    if recent.len() < TREND_MIN_MONTHS {
        return None;
    }
    ols_slope(recent).filter(|slope| *slope < TREND_SLOPE_LIMIT)
}

/// `(winter_mean, summer_mean)` when winter falls below the summer baseline.
/// Months are positional: index `i` is calendar month `i % 12 + 1`.
pub fn seasonal_inversion(readings: &[f64]) -> Option<(f64, f64)> {
    if readings.len() < SEASONAL_MIN_MONTHS {
        return None;
    }

    let mut winter = Vec::new();
    let mut summer = Vec::new();
    for (i, value) in readings.iter().enumerate() {
        let month = positional_month(i);
        if WINTER_MONTHS.contains(&month) {
            winter.push(*value);
        } else if SUMMER_MONTHS.contains(&month) {
            summer.push(*value);
        }
    }

    let winter_avg = mean(&winter)?;
    let summer_avg = mean(&summer)?;
    (winter_avg < summer_avg * SEASONAL_RATIO).then_some((winter_avg, summer_avg))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerComparison {
    pub subject_avg: f64,
    pub peer_avg: f64,
}

impl PeerComparison {
    /// How far below the peer average the subject sits, in percent.
    pub fn shortfall_pct(&self) -> f64 {
        (self.peer_avg - self.subject_avg) / self.peer_avg * 100.0
    }
}

/// Compare a facility with its building peers.
///
/// Peers without any positive month are ignored; the rule cannot fire when
/// no peer remains or when the subject itself has no positive month.
pub fn peer_shortfall(ctx: &FacilityContext<'_>, ratio_pct: f64) -> Option<PeerComparison> {
    let peer_avgs: Vec<f64> = ctx
        .dataset
        .peers_of(ctx.index)
        .filter_map(|peer| positive_mean(&peer.readings))
        .collect();
    let peer_avg = mean(&peer_avgs)?;
    let subject_avg = positive_mean(ctx.readings())?;

    (subject_avg < peer_avg * (ratio_pct / 100.0)).then_some(PeerComparison {
        subject_avg,
        peer_avg,
    })
}

// ============================================================================
// DETECTORS
// ============================================================================

pub struct SuddenDropDetector {
    threshold_pct: f64,
}

impl SuddenDropDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }
}

impl Detector for SuddenDropDetector {
    fn name(&self) -> &str {
        "Sudden drop"
    }

    fn id(&self) -> RuleId {
        RuleId::SuddenDrop
    }

    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult> {
        let count = count_sudden_drops(ctx.readings(), self.threshold_pct);
        (count > 0).then(|| DetectionResult {
            contribution: points_per(count, SUDDEN_DROP_POINTS),
            description: format!("Sudden drop: {}", counted(count, "time", "times")),
        })
    }
}

pub struct ZeroConsumptionDetector;

impl Detector for ZeroConsumptionDetector {
    fn name(&self) -> &str {
        "Zero consumption"
    }

    fn id(&self) -> RuleId {
        RuleId::ZeroConsumption
    }

    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult> {
        let count = count_zero_months(ctx.readings());
        (count > 0).then(|| DetectionResult {
            contribution: points_per(count, ZERO_MONTH_POINTS),
            description: format!("Zero consumption: {}", counted(count, "month", "months")),
        })
    }
}

pub struct LowConsumptionDetector {
    threshold: f64,
}

impl LowConsumptionDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Detector for LowConsumptionDetector {
    fn name(&self) -> &str {
        "Low consumption"
    }

    fn id(&self) -> RuleId {
        RuleId::LowConsumption
    }

    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult> {
        low_consumption_average(ctx.readings(), self.threshold).map(|avg| DetectionResult {
            contribution: LOW_CONSUMPTION_POINTS,
            description: format!("Low consumption: average {:.1}", avg),
        })
    }
}

pub struct TrendDetector;

impl Detector for TrendDetector {
    fn name(&self) -> &str {
        "Trend"
    }

    fn id(&self) -> RuleId {
        RuleId::Trend
    }

    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult> {
        declining_trend_slope(ctx.readings()).map(|slope| DetectionResult {
            contribution: TREND_POINTS,
            description: format!(
                "Trend anomaly: steadily declining consumption ({:.1} per month)",
                slope
            ),
        })
    }
}

pub struct SeasonalDetector;

impl Detector for SeasonalDetector {
    fn name(&self) -> &str {
        "Seasonal"
    }

    fn id(&self) -> RuleId {
        RuleId::Seasonal
    }

    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult> {
        seasonal_inversion(ctx.readings()).map(|(winter, summer)| DetectionResult {
            contribution: SEASONAL_POINTS,
            description: format!(
                "Seasonal anomaly: winter consumption lower than expected (winter avg {:.1}, summer avg {:.1})",
                winter, summer
            ),
        })
    }
}

pub struct PeerComparisonDetector {
    ratio_pct: f64,
}

impl PeerComparisonDetector {
    pub fn new(ratio_pct: f64) -> Self {
        Self { ratio_pct }
    }
}

impl Detector for PeerComparisonDetector {
    fn name(&self) -> &str {
        "Peer comparison"
    }

    fn id(&self) -> RuleId {
        RuleId::PeerComparison
    }

    fn evaluate(&self, ctx: &FacilityContext<'_>) -> Option<DetectionResult> {
        peer_shortfall(ctx, self.ratio_pct).map(|cmp| DetectionResult {
            contribution: PEER_POINTS,
            description: format!(
                "Peer anomaly: {:.0}% less consumption than building peers",
                cmp.shortfall_pct()
            ),
        })
    }
}

fn counted(count: usize, one: &str, many: &str) -> String {
    format!("{} {}", count, if count == 1 { one } else { many })
}

fn points_per(count: usize, points: u32) -> u32 {
    u32::try_from(count)
        .unwrap_or(u32::MAX)
        .saturating_mul(points)
}

/// The full suite in evaluation order.
pub struct DetectorSuite {
    pub sudden_drop: SuddenDropDetector,
    pub zero: ZeroConsumptionDetector,
    pub low: LowConsumptionDetector,
    pub trend: TrendDetector,
    pub seasonal: SeasonalDetector,
    pub peer: PeerComparisonDetector,
}

impl DetectorSuite {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            sudden_drop: SuddenDropDetector::new(thresholds.sudden_drop_threshold),
            zero: ZeroConsumptionDetector,
            low: LowConsumptionDetector::new(thresholds.low_consumption_threshold),
            trend: TrendDetector,
            seasonal: SeasonalDetector,
            peer: PeerComparisonDetector::new(thresholds.neighbor_ratio_threshold),
        }
    }

    /// Run every rule in fixed order and collect those that fired.
    pub fn run(&self, ctx: &FacilityContext<'_>) -> Vec<TriggeredRule> {
        let detectors: [&dyn Detector; 6] = [
            &self.sudden_drop,
            &self.zero,
            &self.low,
            &self.trend,
            &self.seasonal,
            &self.peer,
        ];
        detectors
            .iter()
            .filter_map(|d| d.triggered(ctx))
            .collect()
    }

    pub fn names(&self) -> Vec<(RuleId, String)> {
        vec![
            (self.sudden_drop.id(), self.sudden_drop.name().to_string()),
            (self.zero.id(), self.zero.name().to_string()),
            (self.low.id(), self.low.name().to_string()),
            (self.trend.id(), self.trend.name().to_string()),
            (self.seasonal.id(), self.seasonal.name().to_string()),
            (self.peer.id(), self.peer.name().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(readings: Vec<f64>) -> Dataset {
        Dataset::from_facilities(vec![Facility::new("1", "A", readings)])
    }

    #[test]
    fn test_sudden_drop_counts_steep_declines() {
        let mut data = vec![100.0; 11];
        data.push(20.0);
        assert_eq!(count_sudden_drops(&data, 70.0), 1);

        // 100 -> 30 is exactly 70%, not beyond it
        assert_eq!(count_sudden_drops(&[100.0, 30.0], 70.0), 0);
        assert_eq!(count_sudden_drops(&[100.0, 29.0], 70.0), 1);
    }

    #[test]
    fn test_sudden_drop_ignores_zero_prior() {
        assert_eq!(count_sudden_drops(&[0.0, 0.0, 50.0, 0.0, 0.0], 70.0), 1);
        assert_eq!(count_sudden_drops(&[], 70.0), 0);
        assert_eq!(count_sudden_drops(&[5.0], 70.0), 0);
    }

    #[test]
    fn test_zero_months() {
        assert_eq!(count_zero_months(&[0.0, 1.0, 0.0]), 2);
        assert_eq!(count_zero_months(&[]), 0);
    }

    #[test]
    fn test_low_consumption_all_zero_fires_with_zero_average() {
        assert_eq!(low_consumption_average(&[0.0; 12], 30.0), Some(0.0));
        assert_eq!(low_consumption_average(&[], 30.0), Some(0.0));
    }

    #[test]
    fn test_low_consumption_uses_positive_months_only() {
        // positive mean is 40 even though half the months are zero
        let data = [0.0, 40.0, 0.0, 40.0];
        assert_eq!(low_consumption_average(&data, 30.0), None);
        assert_eq!(low_consumption_average(&data, 50.0), Some(40.0));
    }

    #[test]
    fn test_trend_needs_twelve_months() {
        let short: Vec<f64> = (0..11).map(|i| 500.0 - 40.0 * i as f64).collect();
        assert_eq!(declining_trend_slope(&short), None);

        let long: Vec<f64> = (0..12).map(|i| 500.0 - 40.0 * i as f64).collect();
        let slope = declining_trend_slope(&long).unwrap();
        assert!((slope + 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_uses_last_24_months() {
        // steep decline early, flat for the last 24 months
        let mut data: Vec<f64> = (0..12).map(|i| 1000.0 - 50.0 * i as f64).collect();
        data.extend(std::iter::repeat_n(200.0, 24));
        assert_eq!(declining_trend_slope(&data), None);
    }

    #[test]
    fn test_trend_slope_limit_is_strict() {
        let exact: Vec<f64> = (0..12).map(|i| 200.0 - 5.0 * i as f64).collect();
        assert_eq!(declining_trend_slope(&exact), None);
    }

    #[test]
    fn test_seasonal_inversion() {
        let data: Vec<f64> = (0..24)
            .map(|i| match i % 12 + 1 {
                12 | 1 | 2 => 10.0,
                6 | 7 | 8 => 50.0,
                _ => 30.0,
            })
            .collect();
        assert_eq!(seasonal_inversion(&data), Some((10.0, 50.0)));
        assert_eq!(seasonal_inversion(&data[..23]), None);
    }

    #[test]
    fn test_seasonal_normal_heating_profile() {
        let data: Vec<f64> = (0..36)
            .map(|i| match i % 12 + 1 {
                12 | 1 | 2 => 200.0,
                6 | 7 | 8 => 20.0,
                _ => 80.0,
            })
            .collect();
        assert_eq!(seasonal_inversion(&data), None);
    }

    #[test]
    fn test_peer_shortfall_scenario() {
        let ds = Dataset::from_facilities(vec![
            Facility::new("1", "A", vec![30.0; 12]),
            Facility::new("2", "A", vec![100.0; 12]),
        ]);
        let ctx = FacilityContext::new(&ds, 0).unwrap();
        let cmp = peer_shortfall(&ctx, 60.0).unwrap();
        assert_eq!(cmp.subject_avg, 30.0);
        assert_eq!(cmp.peer_avg, 100.0);
        assert_eq!(format!("{:.0}", cmp.shortfall_pct()), "70");

        let peer_ctx = FacilityContext::new(&ds, 1).unwrap();
        assert!(peer_shortfall(&peer_ctx, 60.0).is_none());
    }

    #[test]
    fn test_peer_undefined_averages_never_fire() {
        let ds = Dataset::from_facilities(vec![
            Facility::new("1", "A", vec![0.0; 12]),
            Facility::new("2", "A", vec![100.0; 12]),
            Facility::new("3", "B", vec![5.0; 12]),
            Facility::new("4", "B", vec![0.0; 12]),
        ]);
        // subject has no positive month
        assert!(peer_shortfall(&FacilityContext::new(&ds, 0).unwrap(), 60.0).is_none());
        // only peer has no positive month
        assert!(peer_shortfall(&FacilityContext::new(&ds, 2).unwrap(), 60.0).is_none());
    }

    #[test]
    fn test_peer_alone_in_building() {
        let ds = single(vec![1.0; 12]);
        assert!(peer_shortfall(&FacilityContext::new(&ds, 0).unwrap(), 60.0).is_none());
    }

    #[test]
    fn test_suite_order_and_descriptions() {
        let ds = single(vec![0.0; 24]);
        let suite = DetectorSuite::new(&Thresholds::default());
        let rules = suite.run(&FacilityContext::new(&ds, 0).unwrap());

        let ids: Vec<RuleId> = rules.iter().map(|r| r.rule).collect();
        assert_eq!(ids, vec![RuleId::ZeroConsumption, RuleId::LowConsumption]);
        assert_eq!(rules[0].contribution, 24 * ZERO_MONTH_POINTS);
        assert_eq!(rules[0].description, "Zero consumption: 24 months");
        assert_eq!(rules[1].description, "Low consumption: average 0.0");
    }

    #[test]
    fn test_single_counts_read_singular() {
        let ds = single(vec![100.0, 100.0, 0.0, 100.0]);
        let suite = DetectorSuite::new(&Thresholds::default());
        let rules = suite.run(&FacilityContext::new(&ds, 0).unwrap());
        assert_eq!(rules[0].description, "Sudden drop: 1 time");
        assert_eq!(rules[1].description, "Zero consumption: 1 month");
        assert_eq!(counted(2, "time", "times"), "2 times");
        assert_eq!(counted(0, "month", "months"), "0 months");
    }

    #[test]
    fn test_suite_order_with_five_rules_firing() {
        // Fading to nothing: drops, zeros, low average and a falling trend,
        // next to a steady neighbour.
        let ds = Dataset::from_facilities(vec![
            Facility::new(
                "1",
                "A",
                vec![90.0, 60.0, 40.0, 25.0, 15.0, 10.0, 5.0, 2.0, 1.0, 0.0, 0.0, 0.0],
            ),
            Facility::new("2", "A", vec![100.0; 12]),
        ]);
        let suite = DetectorSuite::new(&Thresholds::default());
        let rules = suite.run(&FacilityContext::new(&ds, 0).unwrap());

        let ids: Vec<RuleId> = rules.iter().map(|r| r.rule).collect();
        assert_eq!(
            ids,
            vec![
                RuleId::SuddenDrop,
                RuleId::ZeroConsumption,
                RuleId::LowConsumption,
                RuleId::Trend,
                RuleId::PeerComparison,
            ]
        );
        let contributions: Vec<u32> = rules.iter().map(|r| r.contribution).collect();
        assert_eq!(contributions, vec![20, 45, 25, 30, 35]);
        assert_eq!(rules[0].description, "Sudden drop: 1 time");
        assert_eq!(rules[1].description, "Zero consumption: 3 months");
        assert_eq!(
            rules[4].description,
            "Peer anomaly: 72% less consumption than building peers"
        );

        let finding = crate::engine::score(&ds, 0, &Thresholds::default()).unwrap();
        assert_eq!(finding.risk_score, 155);
        assert_eq!(finding.risk_tier, crate::finding::RiskTier::High);
    }

    #[test]
    fn test_positional_month_wraps_yearly() {
        assert_eq!(positional_month(0), 1);
        assert_eq!(positional_month(11), 12);
        assert_eq!(positional_month(12), 1);
        assert!(WINTER_MONTHS.contains(&positional_month(23)));
        assert!(SUMMER_MONTHS.contains(&positional_month(18)));
    }

    #[test]
    fn test_suite_names_cover_all_rules() {
        let suite = DetectorSuite::new(&Thresholds::default());
        let ids: Vec<RuleId> = suite.names().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, RuleId::ALL.to_vec());
    }
}
