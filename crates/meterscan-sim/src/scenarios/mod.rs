//! Tamper Scenarios
//!
//! Each scenario rewrites a normal consumption profile into the shape a
//! particular kind of tampering leaves behind:
//! - **sudden_cut**: consumption collapses from one month to the next
//! - **zeroed_months**: scattered months with no registered flow
//! - **bypass_low**: meter registers a small fraction of real use
//! - **declining_trend**: registered use shrinks month after month
//! - **seasonal_inversion**: winter heating load disappears
//! - **peer_under_draw**: far below the neighbours in the same building

pub mod tamper;

use meterscan_core::RuleId;
use rand::RngCore;

/// A tamper pattern applied to one facility's readings.
pub trait Scenario: Send + Sync {
    /// Identifier used on the command line and in ground truth.
    fn name(&self) -> &str;

    /// Rule this pattern is expected to trip.
    fn expected_rule(&self) -> RuleId;

    /// Rewrite `readings` in place. `level` is the facility's untampered
    /// monthly base level.
    fn apply(&self, readings: &mut [f64], level: f64, rng: &mut dyn RngCore);
}

pub use tamper::{
    BypassLow, DecliningTrend, PeerUnderDraw, SeasonalInversion, SuddenCut, ZeroedMonths,
};

/// Create a scenario by name with default parameters
pub fn create_scenario(name: &str) -> Option<Box<dyn Scenario>> {
    match name.trim().to_lowercase().as_str() {
        "sudden_cut" | "cut" => Some(Box::new(SuddenCut { keep: 0.15 })),
        "zeroed_months" | "zero" => Some(Box::new(ZeroedMonths { min: 3, max: 6 })),
        "bypass_low" | "bypass" => Some(Box::new(BypassLow { target: 15.0 })),
        "declining_trend" | "trend" => Some(Box::new(DecliningTrend { min_level: 240.0 })),
        "seasonal_inversion" | "seasonal" => Some(Box::new(SeasonalInversion { ratio: 0.4 })),
        "peer_under_draw" | "peer" => Some(Box::new(PeerUnderDraw { factor: 0.35 })),
        _ => None,
    }
}

/// List all available scenarios
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("sudden_cut", "Consumption collapses to a fraction from one month on"),
        ("zeroed_months", "A handful of months register no consumption"),
        ("bypass_low", "Meter bypassed, only a trickle registers"),
        ("declining_trend", "Registered consumption falls steadily over two years"),
        ("seasonal_inversion", "Winter heating load missing, winter below summer"),
        ("peer_under_draw", "Whole history far below the building's other meters"),
    ]
}

/// Every scenario with default parameters.
pub fn all_scenarios() -> Vec<Box<dyn Scenario>> {
    list_scenarios()
        .into_iter()
        .filter_map(|(name, _)| create_scenario(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_scenario_resolves() {
        for (name, _) in list_scenarios() {
            let scenario = create_scenario(name).unwrap();
            assert_eq!(scenario.name(), name);
        }
        assert!(create_scenario("meteor_strike").is_none());
        assert_eq!(all_scenarios().len(), 6);
    }
}
