//! Run-level report: findings plus the aggregates the dashboard tabs show.

use crate::config::Thresholds;
use crate::dataset::Dataset;
use crate::finding::{Finding, RiskTier};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Shape of the analysed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub facilities: usize,
    pub buildings: usize,
    pub reading_columns: usize,
    /// Earliest and latest labelled month, when labels carry months.
    pub first_period: Option<NaiveDate>,
    pub last_period: Option<NaiveDate>,
    /// xxh3 of the cleaned dataset, hex encoded.
    pub checksum: String,
}

impl DatasetSummary {
    pub fn of(dataset: &Dataset) -> Self {
        let periods = || dataset.columns().iter().filter_map(|c| c.period());
        Self {
            facilities: dataset.len(),
            buildings: dataset.buildings().building_count(),
            reading_columns: dataset.columns().len(),
            first_period: periods().min(),
            last_period: periods().max(),
            checksum: format!("{:016x}", dataset.checksum()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub normal: usize,
}

impl TierCounts {
    pub fn tally<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.risk_tier {
                RiskTier::High => counts.high += 1,
                RiskTier::Medium => counts.medium += 1,
                RiskTier::Low => counts.low += 1,
                RiskTier::Normal => counts.normal += 1,
            }
        }
        counts
    }

    pub fn get(&self, tier: RiskTier) -> usize {
        match tier {
            RiskTier::High => self.high,
            RiskTier::Medium => self.medium,
            RiskTier::Low => self.low,
            RiskTier::Normal => self.normal,
        }
    }
}

/// Flagged facilities of one building and their mean score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRisk {
    pub building_id: String,
    pub flagged: usize,
    pub mean_risk: f64,
}

/// Group findings by building. Sorted by mean risk descending, then id.
/// Findings with a blank building id are left out.
pub fn building_risk(findings: &[Finding]) -> Vec<BuildingRisk> {
    let mut groups: HashMap<&str, (usize, u64)> = HashMap::new();
    for finding in findings.iter().filter(|f| !f.building_id.is_empty()) {
        let entry = groups.entry(finding.building_id.as_str()).or_default();
        entry.0 += 1;
        entry.1 += u64::from(finding.risk_score);
    }

    let mut rows: Vec<BuildingRisk> = groups
        .into_iter()
        .map(|(id, (flagged, total))| BuildingRisk {
            building_id: id.to_string(),
            flagged,
            mean_risk: total as f64 / flagged as f64,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.mean_risk
            .total_cmp(&a.mean_risk)
            .then_with(|| a.building_id.cmp(&b.building_id))
    });
    rows
}

/// One facility in full: its finding, if any rule fired, and the labelled
/// monthly series behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityDetail {
    pub meter_id: String,
    pub building_id: String,
    pub finding: Option<Finding>,
    pub series: Vec<(String, f64)>,
}

impl FacilityDetail {
    pub fn risk_score(&self) -> u32 {
        self.finding.as_ref().map_or(0, |f| f.risk_score)
    }

    pub fn risk_tier(&self) -> RiskTier {
        self.finding.as_ref().map_or(RiskTier::Normal, |f| f.risk_tier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub dataset: DatasetSummary,
    pub thresholds: Thresholds,
    pub findings: Vec<Finding>,
    pub tier_counts: TierCounts,
    pub building_risk: Vec<BuildingRisk>,
}

impl AnalysisReport {
    pub fn build(dataset: &Dataset, thresholds: Thresholds, findings: Vec<Finding>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            dataset: DatasetSummary::of(dataset),
            thresholds,
            tier_counts: TierCounts::tally(&findings),
            building_risk: building_risk(&findings),
            findings,
        }
    }

    pub fn flagged_count(&self) -> usize {
        self.findings.len()
    }

    /// Share of facilities with a finding, in percent.
    pub fn flagged_pct(&self) -> f64 {
        if self.dataset.facilities == 0 {
            0.0
        } else {
            self.flagged_count() as f64 * 100.0 / self.dataset.facilities as f64
        }
    }

    pub fn filter_by_tier(&self, tier: RiskTier) -> impl Iterator<Item = &Finding> + '_ {
        self.findings.iter().filter(move |f| f.risk_tier == tier)
    }

    /// Keep only findings of the given tiers; aggregates are recomputed.
    pub fn retain_tiers(&mut self, tiers: &[RiskTier]) {
        self.findings.retain(|f| tiers.contains(&f.risk_tier));
        self.tier_counts = TierCounts::tally(&self.findings);
        self.building_risk = building_risk(&self.findings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Facility, ReadingColumn};
    use crate::finding::{RuleId, TriggeredRule};
    use crate::stats::SummaryStats;

    fn finding(meter: &str, building: &str, score: u32) -> Finding {
        Finding::from_rules(
            meter,
            building,
            vec![TriggeredRule {
                rule: RuleId::PeerComparison,
                contribution: score,
                description: "peer".into(),
            }],
            SummaryStats::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_building_risk_sorted_by_mean_then_id() {
        let findings = vec![
            finding("1", "A", 20),
            finding("2", "A", 60),
            finding("3", "C", 40),
            finding("4", "B", 40),
            finding("5", "", 100),
        ];
        let rows = building_risk(&findings);
        let ids: Vec<&str> = rows.iter().map(|r| r.building_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(rows[0].flagged, 2);
        assert_eq!(rows[0].mean_risk, 40.0);
    }

    #[test]
    fn test_tier_counts_and_filter() {
        let findings = vec![finding("1", "A", 70), finding("2", "A", 45), finding("3", "B", 75)];
        let ds = Dataset::from_facilities(vec![Facility::new("1", "A", vec![1.0])]);
        let report = AnalysisReport::build(&ds, Thresholds::default(), findings);

        assert_eq!(report.tier_counts.get(RiskTier::High), 2);
        assert_eq!(report.tier_counts.medium, 1);
        assert_eq!(report.filter_by_tier(RiskTier::High).count(), 2);
        assert_eq!(report.filter_by_tier(RiskTier::Low).count(), 0);
        assert_eq!(report.flagged_count(), 3);
    }

    #[test]
    fn test_retain_tiers_recomputes_aggregates() {
        let findings = vec![finding("1", "A", 70), finding("2", "B", 45)];
        let mut report = AnalysisReport::build(&Dataset::default(), Thresholds::default(), findings);
        report.retain_tiers(&[RiskTier::Medium]);
        assert_eq!(report.flagged_count(), 1);
        assert_eq!(report.tier_counts.high, 0);
        assert_eq!(report.building_risk.len(), 1);
        assert_eq!(report.building_risk[0].building_id, "B");
    }

    #[test]
    fn test_dataset_summary_periods() {
        let columns = vec![
            ReadingColumn { label: "2017/3".into(), year: 2017, month: Some(3) },
            ReadingColumn { label: "2016/11".into(), year: 2016, month: Some(11) },
            ReadingColumn { label: "2018".into(), year: 2018, month: None },
        ];
        let ds = Dataset::new(columns, vec![Facility::new("1", "A", vec![1.0, 2.0, 3.0])]);
        let summary = DatasetSummary::of(&ds);
        assert_eq!(summary.reading_columns, 3);
        assert_eq!(summary.first_period, NaiveDate::from_ymd_opt(2016, 11, 1));
        assert_eq!(summary.last_period, NaiveDate::from_ymd_opt(2017, 3, 1));
        assert_eq!(summary.checksum.len(), 16);
    }

    #[test]
    fn test_report_serializes() {
        let report = AnalysisReport::build(&Dataset::default(), Thresholds::default(), Vec::new());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"tier_counts\""));
        assert_eq!(report.flagged_pct(), 0.0);
    }
}
