//! Capacity adjuster: computes and applies a new capacity ceiling.
//!
//! # Scale-out
//!
//! ```text
//! apps_pending == 0:  reserved <= guard → no change
//!                     delta = reserved * scale_out_factor
//! apps_pending  > 0:  delta = (total / running) * scale_out_factor
//! new_max = clamp(current_max + delta, current_min + 1, maximum_units)
//! ```
//!
//! The policy is applied, then the application is recorded. With on-demand
//! backfill enabled, a shortfall of realized capacity against the lowest
//! maximum applied during the spot timeout raises the on-demand ceiling.
//!
//! # Scale-in
//!
//! ```text
//! apps_pending == 0:  new_max = floor
//! apps_pending  > 0:  new_max = clamp(current_max - (total / pending) * scale_in_factor,
//!                                     floor, maximum_units)
//! ```
//!
//! The on-demand ceiling returns to its configured default. Task fleets are
//! rebalanced to spot-only before the application is recorded.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use yarnscale_core::{
    CapacityController, ComputeLimits, Counter, Direction, FleetRole, PolicyApplication,
    ScalingSettings, TelemetrySource,
};
use yarnscale_state::StateStore;

use crate::cooldown::CooldownGate;
use crate::error::{remote, ScaleError, ScaleResult};

/// Result of an adjustment attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AdjustOutcome {
    /// The policy was changed and the application recorded.
    Applied {
        direction: Direction,
        from: u32,
        to: u32,
        maximum_on_demand_units: u32,
    },
    /// Nothing was changed.
    Unchanged {
        direction: Direction,
        reason: String,
    },
}

/// Live counters read before an adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveCounters {
    pub pending_units: f64,
    pub apps_pending: f64,
    pub total_units: f64,
    pub apps_running: f64,
    pub reserved_units: f64,
}

const LIVE_COUNTERS: [Counter; 5] = [
    Counter::PendingUnits,
    Counter::AppsPending,
    Counter::TotalUnits,
    Counter::AppsRunning,
    Counter::ReservedUnits,
];

/// Clamp a computed ceiling into `[lo, hi]`, truncating toward zero.
///
/// `lo > hi` cannot be satisfied and is an invariant violation.
pub fn clamp_units(value: f64, lo: u32, hi: u32) -> ScaleResult<u32> {
    if lo > hi {
        return Err(ScaleError::InvariantViolation(format!(
            "empty capacity range [{lo}, {hi}]"
        )));
    }
    let clamped = if value.is_nan() {
        lo
    } else {
        (value.trunc().max(lo as f64).min(hi as f64)) as u32
    };
    if value.is_nan() || value.trunc() != clamped as f64 {
        debug!(computed = value, clamped, lo, hi, "capacity clamped");
    }
    Ok(clamped)
}

/// Applies scaling actions through the remote control plane.
pub struct CapacityAdjuster {
    cluster: String,
    controller: Arc<dyn CapacityController>,
    telemetry: Arc<dyn TelemetrySource>,
    state: StateStore,
    pub(crate) call_timeout: Duration,
}

impl CapacityAdjuster {
    pub fn new(
        cluster: impl Into<String>,
        controller: Arc<dyn CapacityController>,
        telemetry: Arc<dyn TelemetrySource>,
        state: StateStore,
        call_timeout: Duration,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            controller,
            telemetry,
            state,
            call_timeout,
        }
    }

    /// Read the counters an adjustment needs from one snapshot.
    pub async fn read_live(&self) -> ScaleResult<LiveCounters> {
        let values = remote(
            "counters",
            self.call_timeout,
            self.telemetry.counters(&LIVE_COUNTERS),
        )
        .await?;
        let [pending_units, apps_pending, total_units, apps_running, reserved_units] =
            <[f64; 5]>::try_from(values).map_err(|v| ScaleError::RemoteCall {
                operation: "counters",
                reason: format!("expected {} counters, got {}", LIVE_COUNTERS.len(), v.len()),
            })?;
        Ok(LiveCounters {
            pending_units,
            apps_pending,
            total_units,
            apps_running,
            reserved_units,
        })
    }

    pub async fn get_policy(&self) -> ScaleResult<ComputeLimits> {
        remote("get_policy", self.call_timeout, self.controller.get_policy()).await
    }

    async fn put_policy(&self, policy: &ComputeLimits) -> ScaleResult<()> {
        remote("put_policy", self.call_timeout, self.controller.put_policy(policy)).await
    }

    /// Raise the capacity ceiling.
    pub async fn scale_out(
        &self,
        policy: &ComputeLimits,
        settings: &ScalingSettings,
        gate: &CooldownGate,
        now: u64,
    ) -> ScaleResult<AdjustOutcome> {
        let live = self.read_live().await?;
        let current_max = policy.maximum_units;

        let delta = if live.apps_pending <= 0.0 {
            if live.reserved_units <= settings.idle_reserved_units_guard {
                info!(
                    cluster = %self.cluster,
                    reserved_units = live.reserved_units,
                    guard = settings.idle_reserved_units_guard,
                    "no pending apps and little reserved, skipping scale-out"
                );
                return Ok(unchanged(Direction::Out, "idle cluster below reserved-units guard"));
            }
            live.reserved_units * settings.scale_out_factor
        } else {
            if live.apps_running <= 0.0 {
                warn!(
                    cluster = %self.cluster,
                    apps_pending = live.apps_pending,
                    "pending apps but none running, aborting scale-out"
                );
                return Err(ScaleError::InvariantViolation(
                    "apps pending with no running apps".to_string(),
                ));
            }
            (live.total_units / live.apps_running) * settings.scale_out_factor
        };

        let lo = policy
            .minimum_units
            .saturating_add(1)
            .max(settings.bounds.minimum_units);
        let new_max = clamp_units(
            current_max as f64 + delta,
            lo,
            settings.bounds.maximum_units,
        )?;
        if new_max <= current_max {
            return Ok(unchanged(Direction::Out, "computed ceiling does not exceed current"));
        }

        let mut updated = ComputeLimits {
            maximum_units: new_max,
            maximum_on_demand_units: policy.maximum_on_demand_units.min(new_max),
            ..*policy
        };
        self.put_policy(&updated).await?;
        gate.commit(&PolicyApplication {
            timestamp: now,
            direction: Direction::Out,
            applied_maximum_units: new_max,
        })?;
        info!(
            cluster = %self.cluster,
            from = current_max,
            to = new_max,
            delta,
            pending_units = live.pending_units,
            apps_pending = live.apps_pending,
            "scaled out"
        );

        // The scale-out stays committed when the backfill fails.
        if settings.on_demand_backfill {
            match self.backfill(&updated, settings, now).await {
                Ok(Some(on_demand)) => updated.maximum_on_demand_units = on_demand,
                Ok(None) => {}
                Err(e) => warn!(cluster = %self.cluster, error = %e, "on-demand backfill failed"),
            }
        }

        Ok(AdjustOutcome::Applied {
            direction: Direction::Out,
            from: current_max,
            to: new_max,
            maximum_on_demand_units: updated.maximum_on_demand_units,
        })
    }

    /// Raise the on-demand ceiling when spot capacity has lagged behind
    /// the applied maximum for the whole spot timeout.
    ///
    /// Returns the new on-demand ceiling if the policy was changed.
    pub async fn backfill(
        &self,
        policy: &ComputeLimits,
        settings: &ScalingSettings,
        now: u64,
    ) -> ScaleResult<Option<u32>> {
        let window_start = now.saturating_sub(settings.spot_instances_timeout_secs);
        let Some(in_force) = self.state.application_in_force_at(&self.cluster, window_start)? else {
            debug!(cluster = %self.cluster, window_start, "no application before backfill window");
            return Ok(None);
        };
        let lowest_applied = self
            .state
            .list_applications(&self.cluster, window_start, now)?
            .iter()
            .map(|a| a.applied_maximum_units)
            .fold(in_force.applied_maximum_units, u32::min);

        let fleets = remote("list_fleets", self.call_timeout, self.controller.list_fleets()).await?;
        let realized: u32 = fleets.iter().map(|f| f.provisioned_units()).sum();
        if lowest_applied <= realized {
            return Ok(None);
        }

        let shortfall = lowest_applied - realized;
        let on_demand = policy
            .maximum_on_demand_units
            .saturating_add(shortfall)
            .min(policy.maximum_units);
        if on_demand <= policy.maximum_on_demand_units {
            return Ok(None);
        }

        let updated = ComputeLimits {
            maximum_on_demand_units: on_demand,
            ..*policy
        };
        self.put_policy(&updated).await?;
        info!(
            cluster = %self.cluster,
            lowest_applied,
            realized,
            shortfall,
            from = policy.maximum_on_demand_units,
            to = on_demand,
            "on-demand backfill applied"
        );
        Ok(Some(on_demand))
    }

    /// Lower the capacity ceiling.
    pub async fn scale_in(
        &self,
        policy: &ComputeLimits,
        settings: &ScalingSettings,
        gate: &CooldownGate,
        now: u64,
    ) -> ScaleResult<AdjustOutcome> {
        let live = self.read_live().await?;
        let current_max = policy.maximum_units;
        let floor = settings.bounds.minimum_units.max(policy.minimum_units);

        let new_max = if live.apps_pending <= 0.0 {
            floor
        } else {
            let delta = (live.total_units / live.apps_pending) * settings.scale_in_factor;
            clamp_units(
                current_max as f64 - delta,
                floor,
                settings.bounds.maximum_units,
            )?
        };
        if new_max >= current_max {
            return Ok(unchanged(Direction::In, "computed ceiling is not below current"));
        }

        let on_demand = settings.bounds.maximum_on_demand_units.min(new_max);
        let updated = ComputeLimits {
            minimum_units: policy.minimum_units,
            maximum_units: new_max,
            maximum_on_demand_units: on_demand,
            maximum_core_units: policy.maximum_core_units.min(new_max),
        };
        self.put_policy(&updated).await?;
        self.rebalance(new_max, updated.maximum_core_units).await?;
        gate.commit(&PolicyApplication {
            timestamp: now,
            direction: Direction::In,
            applied_maximum_units: new_max,
        })?;
        info!(
            cluster = %self.cluster,
            from = current_max,
            to = new_max,
            maximum_on_demand_units = on_demand,
            apps_pending = live.apps_pending,
            "scaled in"
        );

        Ok(AdjustOutcome::Applied {
            direction: Direction::In,
            from: current_max,
            to: new_max,
            maximum_on_demand_units: on_demand,
        })
    }

    /// Move every task fleet to spot-only capacity for the new ceiling.
    pub async fn rebalance(&self, new_max: u32, core_units: u32) -> ScaleResult<u32> {
        let fleets = remote("list_fleets", self.call_timeout, self.controller.list_fleets()).await?;
        let spot_target = new_max.saturating_sub(core_units);
        let mut modified = 0;
        for fleet in fleets.iter().filter(|f| f.role == FleetRole::Task) {
            if fleet.target_on_demand_units == 0 && fleet.target_spot_units == spot_target {
                continue;
            }
            remote(
                "modify_fleet",
                self.call_timeout,
                self.controller.modify_fleet(&fleet.id, 0, spot_target),
            )
            .await?;
            debug!(
                cluster = %self.cluster,
                fleet = %fleet.id,
                on_demand = 0,
                spot = spot_target,
                "task fleet rebalanced"
            );
            modified += 1;
        }
        Ok(modified)
    }
}

fn unchanged(direction: Direction, reason: &str) -> AdjustOutcome {
    AdjustOutcome::Unchanged {
        direction,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_within_range() {
        assert_eq!(clamp_units(450.7, 129, 640).unwrap(), 450);
    }

    #[test]
    fn clamp_to_bounds() {
        assert_eq!(clamp_units(900.0, 129, 640).unwrap(), 640);
        assert_eq!(clamp_units(-50.0, 128, 640).unwrap(), 128);
        assert_eq!(clamp_units(f64::NEG_INFINITY, 128, 640).unwrap(), 128);
        assert_eq!(clamp_units(f64::INFINITY, 128, 640).unwrap(), 640);
        assert_eq!(clamp_units(f64::NAN, 128, 640).unwrap(), 128);
    }

    #[test]
    fn clamp_always_within_bounds() {
        for lo in [0u32, 1, 128, 500] {
            for hi in [lo, lo + 1, 640, 10_000] {
                for value in [-1e9, -1.0, 0.0, 0.5, 127.9, 640.0, 641.2, 1e12] {
                    let v = clamp_units(value, lo, hi).unwrap();
                    assert!(lo <= v && v <= hi, "{value} in [{lo}, {hi}] gave {v}");
                }
            }
        }
    }

    #[test]
    fn clamp_rejects_empty_range() {
        assert!(matches!(
            clamp_units(300.0, 641, 640),
            Err(ScaleError::InvariantViolation(_))
        ));
    }
}
