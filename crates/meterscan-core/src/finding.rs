//! Structured findings handed to the presentation/report side.
//!
//! A finding exists only for facilities where at least one rule fired.
//! Rule order inside a finding is the fixed detector evaluation order.

use crate::stats::SummaryStats;
use serde::{Deserialize, Serialize};

/// Number of detector rules in the suite.
pub const NUM_RULES: usize = 6;

/// Rule identifiers in evaluation order.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    SuddenDrop = 0,
    ZeroConsumption = 1,
    LowConsumption = 2,
    Trend = 3,
    Seasonal = 4,
    PeerComparison = 5,
}

impl RuleId {
    pub const ALL: [RuleId; NUM_RULES] = [
        Self::SuddenDrop,
        Self::ZeroConsumption,
        Self::LowConsumption,
        Self::Trend,
        Self::Seasonal,
        Self::PeerComparison,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SuddenDrop => "sudden_drop",
            Self::ZeroConsumption => "zero_consumption",
            Self::LowConsumption => "low_consumption",
            Self::Trend => "trend",
            Self::Seasonal => "seasonal",
            Self::PeerComparison => "peer_comparison",
        }
    }
}

/// Risk tier derived from the summed score.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum RiskTier {
    #[default]
    Normal = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskTier {
    pub const HIGH_FLOOR: u32 = 70;
    pub const MEDIUM_FLOOR: u32 = 40;
    pub const LOW_FLOOR: u32 = 20;

    /// Bands are evaluated high to low and are inclusive at the floor.
    pub fn from_score(score: u32) -> Self {
        if score >= Self::HIGH_FLOOR {
            Self::High
        } else if score >= Self::MEDIUM_FLOOR {
            Self::Medium
        } else if score >= Self::LOW_FLOOR {
            Self::Low
        } else {
            Self::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Normal => "Normal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// One rule that fired for a facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub rule: RuleId,
    pub contribution: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub meter_id: String,
    pub building_id: String,
    pub risk_score: u32,
    pub risk_tier: RiskTier,
    pub triggered_rules: Vec<TriggeredRule>,
    pub summary_stats: SummaryStats,
}

impl Finding {
    /// Returns `None` when no rule fired.
    pub fn from_rules(
        meter_id: &str,
        building_id: &str,
        triggered_rules: Vec<TriggeredRule>,
        summary_stats: SummaryStats,
    ) -> Option<Self> {
        if triggered_rules.is_empty() {
            return None;
        }
        let risk_score = triggered_rules
            .iter()
            .fold(0u32, |acc, r| acc.saturating_add(r.contribution));
        Some(Self {
            meter_id: meter_id.to_string(),
            building_id: building_id.to_string(),
            risk_score,
            risk_tier: RiskTier::from_score(risk_score),
            triggered_rules,
            summary_stats,
        })
    }

    pub fn fired(&self, rule: RuleId) -> bool {
        self.triggered_rules.iter().any(|r| r.rule == rule)
    }

    pub fn contribution(&self, rule: RuleId) -> u32 {
        self.triggered_rules
            .iter()
            .find(|r| r.rule == rule)
            .map(|r| r.contribution)
            .unwrap_or(0)
    }

    pub fn descriptions(&self) -> Vec<&str> {
        self.triggered_rules
            .iter()
            .map(|r| r.description.as_str())
            .collect()
    }

    /// Descriptions joined into one line, as the report tables show them.
    pub fn reason(&self) -> String {
        self.descriptions().join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(rule: RuleId, contribution: u32) -> TriggeredRule {
        TriggeredRule {
            rule,
            contribution,
            description: format!("{} fired", rule.name()),
        }
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        assert_eq!(RiskTier::from_score(70), RiskTier::High);
        assert_eq!(RiskTier::from_score(69), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(40), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(39), RiskTier::Low);
        assert_eq!(RiskTier::from_score(20), RiskTier::Low);
        assert_eq!(RiskTier::from_score(19), RiskTier::Normal);
        assert_eq!(RiskTier::from_score(0), RiskTier::Normal);
        assert_eq!(RiskTier::from_score(u32::MAX), RiskTier::High);
    }

    #[test]
    fn test_no_rules_no_finding() {
        assert!(Finding::from_rules("1", "A", Vec::new(), SummaryStats::default()).is_none());
    }

    #[test]
    fn test_finding_sums_contributions() {
        let finding = Finding::from_rules(
            "1",
            "A",
            vec![rule(RuleId::ZeroConsumption, 15), rule(RuleId::LowConsumption, 25)],
            SummaryStats::default(),
        )
        .unwrap();
        assert_eq!(finding.risk_score, 40);
        assert_eq!(finding.risk_tier, RiskTier::Medium);
        assert!(finding.fired(RuleId::LowConsumption));
        assert!(!finding.fired(RuleId::Trend));
        assert_eq!(finding.contribution(RuleId::ZeroConsumption), 15);
        assert_eq!(
            finding.reason(),
            "zero_consumption fired; low_consumption fired"
        );
    }

    #[test]
    fn test_low_score_finding_is_normal_tier() {
        let finding = Finding::from_rules(
            "1",
            "A",
            vec![rule(RuleId::ZeroConsumption, 15)],
            SummaryStats::default(),
        )
        .unwrap();
        assert_eq!(finding.risk_tier, RiskTier::Normal);
    }

    #[test]
    fn test_rule_id_roundtrip_and_tier_parse() {
        for (i, id) in RuleId::ALL.iter().enumerate() {
            assert_eq!(RuleId::from_u8(i as u8), Some(*id));
        }
        assert_eq!(RuleId::from_u8(6), None);
        assert_eq!(RiskTier::parse(" HIGH "), Some(RiskTier::High));
        assert_eq!(RiskTier::parse("extreme"), None);
    }
}
