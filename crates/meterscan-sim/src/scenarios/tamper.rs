//! Concrete tamper patterns.
//!
//! Month positions are counted from the first column, so index 0 is a
//! January when the sheet starts in January.

use crate::scenarios::Scenario;
use meterscan_core::RuleId;
use meterscan_core::detector::{SUMMER_MONTHS, WINTER_MONTHS, positional_month};
use meterscan_core::stats::positive_mean;
use rand::prelude::*;
use rand::seq::index;

// ============================================================================
// Sudden cut
// ============================================================================

/// From a random month on, only `keep` of the real flow registers.
pub struct SuddenCut {
    pub keep: f64,
}

impl Scenario for SuddenCut {
    fn name(&self) -> &str {
        "sudden_cut"
    }

    fn expected_rule(&self) -> RuleId {
        RuleId::SuddenDrop
    }

    fn apply(&self, readings: &mut [f64], _level: f64, rng: &mut dyn RngCore) {
        let n = readings.len();
        let lo = (n / 4).max(1);
        if lo >= n {
            return;
        }
        let cut = rng.random_range(lo..n);
        readings[cut..].iter_mut().for_each(|v| *v *= self.keep);
    }
}

// ============================================================================
// Zeroed months
// ============================================================================

/// Between `min` and `max` scattered months read exactly zero.
pub struct ZeroedMonths {
    pub min: usize,
    pub max: usize,
}

impl Scenario for ZeroedMonths {
    fn name(&self) -> &str {
        "zeroed_months"
    }

    fn expected_rule(&self) -> RuleId {
        RuleId::ZeroConsumption
    }

    fn apply(&self, readings: &mut [f64], _level: f64, rng: &mut dyn RngCore) {
        let count = rng.random_range(self.min..=self.max.max(self.min)).min(readings.len());
        for idx in index::sample(rng, readings.len(), count) {
            readings[idx] = 0.0;
        }
    }
}

// ============================================================================
// Bypass
// ============================================================================

/// Whole history rescaled to a positive average of `target`.
pub struct BypassLow {
    pub target: f64,
}

impl Scenario for BypassLow {
    fn name(&self) -> &str {
        "bypass_low"
    }

    fn expected_rule(&self) -> RuleId {
        RuleId::LowConsumption
    }

    fn apply(&self, readings: &mut [f64], _level: f64, _rng: &mut dyn RngCore) {
        let Some(avg) = positive_mean(readings) else {
            return;
        };
        let scale = self.target / avg;
        readings.iter_mut().for_each(|v| *v *= scale);
    }
}

// ============================================================================
// Declining trend
// ============================================================================

/// The last two years fade linearly to 15% of the real flow. Facilities
/// below `min_level` are first lifted to it, since the trend rule works on
/// an absolute slope.
pub struct DecliningTrend {
    pub min_level: f64,
}

impl DecliningTrend {
    const WINDOW: usize = 24;
    const FLOOR: f64 = 0.15;
}

impl Scenario for DecliningTrend {
    fn name(&self) -> &str {
        "declining_trend"
    }

    fn expected_rule(&self) -> RuleId {
        RuleId::Trend
    }

    fn apply(&self, readings: &mut [f64], level: f64, _rng: &mut dyn RngCore) {
        let lift = if level > 0.0 {
            (self.min_level / level).max(1.0)
        } else {
            1.0
        };
        readings.iter_mut().for_each(|v| *v *= lift);

        let window = readings.len().min(Self::WINDOW);
        if window < 2 {
            return;
        }
        let start = readings.len() - window;
        for (j, v) in readings[start..].iter_mut().enumerate() {
            *v *= 1.0 - (1.0 - Self::FLOOR) * j as f64 / (window - 1) as f64;
        }
    }
}

// ============================================================================
// Seasonal inversion
// ============================================================================

/// Winter months replaced by `ratio` of the summer average.
pub struct SeasonalInversion {
    pub ratio: f64,
}

impl Scenario for SeasonalInversion {
    fn name(&self) -> &str {
        "seasonal_inversion"
    }

    fn expected_rule(&self) -> RuleId {
        RuleId::Seasonal
    }

    fn apply(&self, readings: &mut [f64], _level: f64, _rng: &mut dyn RngCore) {
        let summer: Vec<f64> = readings
            .iter()
            .enumerate()
            .filter(|(i, _)| SUMMER_MONTHS.contains(&positional_month(*i)))
            .map(|(_, v)| *v)
            .collect();
        if summer.is_empty() {
            return;
        }
        let winter_value = summer.iter().sum::<f64>() / summer.len() as f64 * self.ratio;
        for (i, v) in readings.iter_mut().enumerate() {
            if WINTER_MONTHS.contains(&positional_month(i)) {
                *v = winter_value;
            }
        }
    }
}

// ============================================================================
// Peer under-draw
// ============================================================================

/// Whole history scaled by `factor`, leaving the building's other meters alone.
pub struct PeerUnderDraw {
    pub factor: f64,
}

impl Scenario for PeerUnderDraw {
    fn name(&self) -> &str {
        "peer_under_draw"
    }

    fn expected_rule(&self) -> RuleId {
        RuleId::PeerComparison
    }

    fn apply(&self, readings: &mut [f64], _level: f64, _rng: &mut dyn RngCore) {
        readings.iter_mut().for_each(|v| *v *= self.factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterscan_core::detector::{
        count_sudden_drops, count_zero_months, declining_trend_slope, low_consumption_average,
        seasonal_inversion,
    };
    use rand::rngs::StdRng;

    fn flat(n: usize, v: f64) -> Vec<f64> {
        vec![v; n]
    }

    #[test]
    fn test_sudden_cut_registers_one_drop() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut readings = flat(36, 120.0);
        SuddenCut { keep: 0.15 }.apply(&mut readings, 120.0, &mut rng);
        assert_eq!(count_sudden_drops(&readings, 70.0), 1);
    }

    #[test]
    fn test_zeroed_months_count_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut readings = flat(36, 120.0);
        ZeroedMonths { min: 3, max: 6 }.apply(&mut readings, 120.0, &mut rng);
        let zeros = count_zero_months(&readings);
        assert!((3..=6).contains(&zeros));
    }

    #[test]
    fn test_bypass_hits_target_average() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut readings: Vec<f64> = (0..24).map(|i| 100.0 + i as f64).collect();
        BypassLow { target: 15.0 }.apply(&mut readings, 100.0, &mut rng);
        let avg = low_consumption_average(&readings, 30.0).unwrap();
        assert!((avg - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_declining_trend_lifts_small_consumers() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut readings = flat(36, 60.0);
        DecliningTrend { min_level: 240.0 }.apply(&mut readings, 60.0, &mut rng);
        assert_eq!(readings[0], 240.0);
        assert!(declining_trend_slope(&readings).unwrap() < -5.0);
    }

    #[test]
    fn test_seasonal_inversion_puts_winter_below_summer() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut readings = flat(24, 100.0);
        SeasonalInversion { ratio: 0.4 }.apply(&mut readings, 100.0, &mut rng);
        let (winter, summer) = seasonal_inversion(&readings).unwrap();
        assert_eq!(winter, 40.0);
        assert_eq!(summer, 100.0);
    }
}
