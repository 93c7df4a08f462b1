//! Cost estimation for scaling actions.
//!
//! Newly added instances are split across spot, preemptible and on-demand
//! capacity according to the policy's cost mix; removed instances save
//! their full unit cost.

use serde::{Deserialize, Serialize};

use scalecast_core::{CostImpact, CostMix, ScalingDirection};

/// Discount on spot capacity (70% off the unit cost).
pub const SPOT_DISCOUNT: f64 = 0.7;

/// Discount on preemptible capacity (50% off the unit cost).
pub const PREEMPTIBLE_DISCOUNT: f64 = 0.5;

/// Estimates the incremental cost or savings of an action.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimator;

impl CostEstimator {
    pub fn estimate(
        &self,
        direction: ScalingDirection,
        current: u32,
        target: u32,
        mix: &CostMix,
    ) -> CostImpact {
        if !mix.enabled {
            return CostImpact::default();
        }

        match direction {
            ScalingDirection::NoAction => CostImpact::default(),
            ScalingDirection::ScaleUp => {
                let added = target.saturating_sub(current);
                let spot = share(added, mix.spot_fraction);
                let preemptible = share(added, mix.preemptible_fraction).min(added - spot);
                let on_demand = added - spot - preemptible;

                let unit = mix.unit_cost;
                let estimated_increase = f64::from(on_demand) * unit
                    + f64::from(spot) * unit * (1.0 - SPOT_DISCOUNT)
                    + f64::from(preemptible) * unit * (1.0 - PREEMPTIBLE_DISCOUNT);
                CostImpact {
                    estimated_increase,
                    estimated_savings: 0.0,
                }
            }
            ScalingDirection::ScaleDown => {
                let removed = current.saturating_sub(target);
                CostImpact {
                    estimated_increase: 0.0,
                    estimated_savings: f64::from(removed) * mix.unit_cost,
                }
            }
        }
    }
}

/// Whole instances of `count` assigned to a capacity class.
fn share(count: u32, fraction: f64) -> u32 {
    ((f64::from(count) * fraction).round() as u32).min(count)
}

/// Running cost totals for one service type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    pub total_increase: f64,
    pub total_savings: f64,
    /// Executed (non-no-op) actions counted so far.
    pub actions: u64,
}

impl CostSnapshot {
    pub fn record(&mut self, impact: &CostImpact) {
        self.total_increase += impact.estimated_increase;
        self.total_savings += impact.estimated_savings;
        self.actions += 1;
    }

    /// Net change (increase minus savings).
    pub fn net(&self) -> f64 {
        self.total_increase - self.total_savings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn mix(spot: f64, preemptible: f64) -> CostMix {
        CostMix {
            enabled: true,
            spot_fraction: spot,
            preemptible_fraction: preemptible,
            unit_cost: 0.1,
        }
    }

    #[test]
    fn scale_up_splits_capacity_classes() {
        let impact = CostEstimator.estimate(ScalingDirection::ScaleUp, 2, 12, &mix(0.3, 0.2));
        // 5 on-demand + 3 spot at 30% + 2 preemptible at 50%.
        assert_close(impact.estimated_increase, 0.5 + 0.09 + 0.1);
        assert_close(impact.estimated_increase, 0.69);
        assert_eq!(impact.estimated_savings, 0.0);
    }

    #[test]
    fn scale_up_all_on_demand() {
        let impact = CostEstimator.estimate(ScalingDirection::ScaleUp, 1, 4, &mix(0.0, 0.0));
        assert_close(impact.estimated_increase, 0.3);
    }

    #[test]
    fn scale_down_saves_unit_cost() {
        let impact = CostEstimator.estimate(ScalingDirection::ScaleDown, 5, 4, &mix(0.3, 0.2));
        assert_eq!(impact.estimated_increase, 0.0);
        assert_close(impact.estimated_savings, 0.1);
    }

    #[test]
    fn disabled_or_no_action_is_free() {
        let mut disabled = mix(0.3, 0.2);
        disabled.enabled = false;
        assert_eq!(
            CostEstimator.estimate(ScalingDirection::ScaleUp, 1, 5, &disabled),
            CostImpact::default()
        );
        assert_eq!(
            CostEstimator.estimate(ScalingDirection::NoAction, 3, 3, &mix(0.3, 0.2)),
            CostImpact::default()
        );
    }

    #[test]
    fn shares_never_exceed_added() {
        // round(1 × 0.5) = 1 spot leaves nothing for preemptible.
        let impact = CostEstimator.estimate(ScalingDirection::ScaleUp, 0, 1, &mix(0.5, 0.5));
        assert_close(impact.estimated_increase, 0.1 * 0.3);
    }

    #[test]
    fn snapshot_accumulates() {
        let mut snapshot = CostSnapshot::default();
        snapshot.record(&CostImpact {
            estimated_increase: 0.4,
            estimated_savings: 0.0,
        });
        snapshot.record(&CostImpact {
            estimated_increase: 0.0,
            estimated_savings: 0.1,
        });
        assert_eq!(snapshot.actions, 2);
        assert_close(snapshot.net(), 0.3);
    }
}
