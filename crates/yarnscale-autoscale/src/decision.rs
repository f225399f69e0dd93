//! Decision engine: turns eight window means into a scaling signal.
//!
//! # Rules
//!
//! ```text
//! scale_out = (memory% <= out.memory OR capacity <= out.capacity)
//!             AND pending >= out.pending
//!             AND cpu >= out.cpu
//!             AND current_max < maximum_units
//!
//! scale_in  = (memory% > in.memory OR capacity > in.capacity
//!              OR pending < in.pending OR cpu < in.cpu)
//!             AND current_max > minimum_units
//!
//! both → NoOp, one → that direction, neither → NoOp
//! ```
//!
//! Any window with insufficient data yields `NoOp`.

use serde::Serialize;
use tracing::{debug, info};

use yarnscale_core::{CapacityBounds, Decision, Direction, Metric, Thresholds};

use crate::error::{ScaleError, ScaleResult};
use crate::window::WindowEvaluator;

/// Window means for one direction's thresholds.
///
/// Memory is held in percent here; samples store it as a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DirectionMeans {
    pub memory_available_pct: f64,
    pub capacity_remaining_gb: f64,
    pub pending_apps: f64,
    pub task_node_cpu_load: f64,
}

impl DirectionMeans {
    /// Evaluate the four windows configured for `direction`.
    ///
    /// Fails with `InsufficientData` on the first unusable window.
    pub fn collect(
        evaluator: &WindowEvaluator<'_>,
        direction: Direction,
        thresholds: &Thresholds,
        now: u64,
    ) -> ScaleResult<Self> {
        let mean = |metric: Metric| -> ScaleResult<f64> {
            Ok(evaluator
                .mean(direction, metric, thresholds.get(metric), now)?
                .mean)
        };
        Ok(Self {
            memory_available_pct: mean(Metric::MemoryAvailablePercentage)? * 100.0,
            capacity_remaining_gb: mean(Metric::CapacityRemainingGb)?,
            pending_apps: mean(Metric::PendingAppNum)?,
            task_node_cpu_load: mean(Metric::TaskNodeCpuLoad)?,
        })
    }
}

/// Every condition behind a decision, for logging and inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub decision: Decision,
    pub current_max: u32,
    /// Set when a window had too few samples; no condition was evaluated.
    pub insufficient: Option<String>,
    pub scale_out_means: Option<DirectionMeans>,
    pub scale_in_means: Option<DirectionMeans>,

    pub memory_low: bool,
    pub capacity_low: bool,
    pub pending_high: bool,
    pub cpu_high: bool,
    pub below_maximum: bool,
    pub scale_out: bool,

    pub memory_high: bool,
    pub capacity_high: bool,
    pub pending_low: bool,
    pub cpu_low: bool,
    pub above_minimum: bool,
    pub scale_in: bool,
}

impl Assessment {
    fn insufficient(current_max: u32, reason: &ScaleError) -> Self {
        Self {
            decision: Decision::NoOp,
            current_max,
            insufficient: Some(reason.to_string()),
            scale_out_means: None,
            scale_in_means: None,
            memory_low: false,
            capacity_low: false,
            pending_high: false,
            cpu_high: false,
            below_maximum: false,
            scale_out: false,
            memory_high: false,
            capacity_high: false,
            pending_low: false,
            cpu_low: false,
            above_minimum: false,
            scale_in: false,
        }
    }

    /// Emit the assessment as one structured event.
    pub fn log(&self, cluster: &str) {
        if let Some(reason) = &self.insufficient {
            debug!(%cluster, current_max = self.current_max, %reason, "no decision, insufficient data");
            return;
        }
        info!(
            %cluster,
            decision = %self.decision,
            current_max = self.current_max,
            memory_low = self.memory_low,
            capacity_low = self.capacity_low,
            pending_high = self.pending_high,
            cpu_high = self.cpu_high,
            below_maximum = self.below_maximum,
            scale_out = self.scale_out,
            memory_high = self.memory_high,
            capacity_high = self.capacity_high,
            pending_low = self.pending_low,
            cpu_low = self.cpu_low,
            above_minimum = self.above_minimum,
            scale_in = self.scale_in,
            "scaling assessment"
        );
    }
}

/// Pure threshold logic.
pub struct DecisionEngine<'a> {
    pub bounds: &'a CapacityBounds,
    pub scale_out: &'a Thresholds,
    pub scale_in: &'a Thresholds,
}

impl DecisionEngine<'_> {
    /// Decide from the window means of both directions.
    ///
    /// `InsufficientData` in either direction produces a `NoOp`
    /// assessment; any other error is returned.
    pub fn decide(
        &self,
        out_means: ScaleResult<DirectionMeans>,
        in_means: ScaleResult<DirectionMeans>,
        current_max: u32,
    ) -> ScaleResult<Assessment> {
        let (out_m, in_m) = match (out_means, in_means) {
            (Ok(o), Ok(i)) => (o, i),
            (Err(e), _) | (_, Err(e)) if e.is_insufficient_data() => {
                return Ok(Assessment::insufficient(current_max, &e));
            }
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        let out = self.scale_out;
        let memory_low = out_m.memory_available_pct <= out.memory_available_pct.value;
        let capacity_low = out_m.capacity_remaining_gb <= out.capacity_remaining_gb.value;
        let pending_high = out_m.pending_apps >= out.pending_apps.value;
        let cpu_high = out_m.task_node_cpu_load >= out.task_node_cpu_load.value;
        let below_maximum = current_max < self.bounds.maximum_units;
        let scale_out = (memory_low || capacity_low) && pending_high && cpu_high && below_maximum;

        let inn = self.scale_in;
        let memory_high = in_m.memory_available_pct > inn.memory_available_pct.value;
        let capacity_high = in_m.capacity_remaining_gb > inn.capacity_remaining_gb.value;
        let pending_low = in_m.pending_apps < inn.pending_apps.value;
        let cpu_low = in_m.task_node_cpu_load < inn.task_node_cpu_load.value;
        let above_minimum = current_max > self.bounds.minimum_units;
        let scale_in =
            (memory_high || capacity_high || pending_low || cpu_low) && above_minimum;

        let decision = match (scale_out, scale_in) {
            (true, false) => Decision::ScaleOut,
            (false, true) => Decision::ScaleIn,
            _ => Decision::NoOp,
        };

        Ok(Assessment {
            decision,
            current_max,
            insufficient: None,
            scale_out_means: Some(out_m),
            scale_in_means: Some(in_m),
            memory_low,
            capacity_low,
            pending_high,
            cpu_high,
            below_maximum,
            scale_out,
            memory_high,
            capacity_high,
            pending_low,
            cpu_low,
            above_minimum,
            scale_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnscale_core::MetricThreshold;

    fn t(value: f64) -> MetricThreshold {
        MetricThreshold {
            value,
            window_minutes: 5,
        }
    }

    fn out_thresholds() -> Thresholds {
        Thresholds {
            memory_available_pct: t(70.0),
            capacity_remaining_gb: t(150.0),
            pending_apps: t(10.0),
            task_node_cpu_load: t(80.0),
        }
    }

    fn in_thresholds() -> Thresholds {
        Thresholds {
            memory_available_pct: t(85.0),
            capacity_remaining_gb: t(200.0),
            pending_apps: t(5.0),
            task_node_cpu_load: t(60.0),
        }
    }

    fn bounds() -> CapacityBounds {
        CapacityBounds {
            minimum_units: 320,
            maximum_units: 640,
            maximum_on_demand_units: 128,
        }
    }

    fn means(memory: f64, capacity: f64, pending: f64, cpu: f64) -> DirectionMeans {
        DirectionMeans {
            memory_available_pct: memory,
            capacity_remaining_gb: capacity,
            pending_apps: pending,
            task_node_cpu_load: cpu,
        }
    }

    fn decide(m: DirectionMeans, current_max: u32) -> Assessment {
        let (b, o, i) = (bounds(), out_thresholds(), in_thresholds());
        let engine = DecisionEngine {
            bounds: &b,
            scale_out: &o,
            scale_in: &i,
        };
        engine.decide(Ok(m), Ok(m), current_max).unwrap()
    }

    #[test]
    fn busy_cluster_scales_out() {
        let a = decide(means(65.0, 120.0, 12.0, 85.0), 400);
        assert!(a.scale_out);
        assert!(!a.scale_in);
        assert_eq!(a.decision, Decision::ScaleOut);
    }

    #[test]
    fn scale_out_thresholds_are_inclusive() {
        let a = decide(means(70.0, 500.0, 10.0, 80.0), 400);
        assert!(a.memory_low && a.pending_high && a.cpu_high);
        assert!(a.scale_out);
    }

    #[test]
    fn scale_out_blocked_at_maximum() {
        let a = decide(means(65.0, 120.0, 12.0, 85.0), 640);
        assert!(!a.below_maximum);
        assert_eq!(a.decision, Decision::NoOp);
    }

    #[test]
    fn idle_cluster_scales_in() {
        let a = decide(means(90.0, 300.0, 0.0, 10.0), 400);
        assert_eq!(a.decision, Decision::ScaleIn);
    }

    #[test]
    fn scale_in_comparisons_are_strict() {
        // Every scale-in metric exactly at its threshold.
        let a = decide(means(85.0, 200.0, 5.0, 60.0), 400);
        assert!(!a.memory_high && !a.capacity_high && !a.pending_low && !a.cpu_low);
        assert_eq!(a.decision, Decision::NoOp);
    }

    #[test]
    fn scale_in_gated_at_minimum() {
        let a = decide(means(90.0, 300.0, 0.0, 10.0), 320);
        assert!(!a.scale_in && !a.above_minimum);
        assert_eq!(a.decision, Decision::NoOp);
    }

    #[test]
    fn both_directions_true_is_noop() {
        // Memory low and pending/cpu high for scale-out; capacity above
        // the scale-in bar makes scale-in true as well.
        let a = decide(means(65.0, 120.0, 12.0, 85.0), 400);
        assert!(a.scale_out);

        let (b, o, mut i) = (bounds(), out_thresholds(), in_thresholds());
        i.capacity_remaining_gb = t(100.0);
        let engine = DecisionEngine {
            bounds: &b,
            scale_out: &o,
            scale_in: &i,
        };
        let m = means(65.0, 120.0, 12.0, 85.0);
        let a = engine.decide(Ok(m), Ok(m), 400).unwrap();
        assert!(a.scale_out && a.scale_in);
        assert_eq!(a.decision, Decision::NoOp);
    }

    #[test]
    fn neither_direction_is_noop() {
        let a = decide(means(80.0, 180.0, 7.0, 70.0), 400);
        assert!(!a.scale_out && !a.scale_in);
        assert_eq!(a.decision, Decision::NoOp);
    }

    #[test]
    fn insufficient_data_in_either_direction_is_noop() {
        let (b, o, i) = (bounds(), out_thresholds(), in_thresholds());
        let engine = DecisionEngine {
            bounds: &b,
            scale_out: &o,
            scale_in: &i,
        };
        let busy = means(65.0, 120.0, 12.0, 85.0);
        let missing = || ScaleError::InsufficientData {
            direction: Direction::In,
            metric: Metric::TaskNodeCpuLoad,
            actual: 2,
            expected: 15,
        };

        let a = engine.decide(Ok(busy), Err(missing()), 400).unwrap();
        assert_eq!(a.decision, Decision::NoOp);
        assert!(a.insufficient.is_some());

        let a = engine.decide(Err(missing()), Ok(busy), 400).unwrap();
        assert_eq!(a.decision, Decision::NoOp);
    }

    #[test]
    fn store_failure_is_not_masked() {
        let (b, o, i) = (bounds(), out_thresholds(), in_thresholds());
        let engine = DecisionEngine {
            bounds: &b,
            scale_out: &o,
            scale_in: &i,
        };
        let m = means(65.0, 120.0, 12.0, 85.0);
        let err = engine
            .decide(Ok(m), Err(ScaleError::State("disk".into())), 400)
            .unwrap_err();
        assert!(matches!(err, ScaleError::State(_)));
    }

    #[test]
    fn collect_converts_memory_fraction_to_percent() {
        use yarnscale_core::MetricSample;
        use yarnscale_state::StateStore;

        let store = StateStore::open_in_memory().unwrap();
        let mut samples = Vec::new();
        for ts in [940, 960, 980] {
            for (metric, value) in [
                (Metric::MemoryAvailablePercentage, 0.65),
                (Metric::CapacityRemainingGb, 120.0),
                (Metric::PendingAppNum, 12.0),
                (Metric::TaskNodeCpuLoad, 85.0),
            ] {
                samples.push(MetricSample {
                    timestamp: ts,
                    metric,
                    value,
                });
            }
        }
        store.put_samples("j-1", &samples).unwrap();

        let mut thresholds = out_thresholds();
        for m in [
            &mut thresholds.memory_available_pct,
            &mut thresholds.capacity_remaining_gb,
            &mut thresholds.pending_apps,
            &mut thresholds.task_node_cpu_load,
        ] {
            m.window_minutes = 1;
        }
        let evaluator = WindowEvaluator::new(&store, "j-1", 20, 0.8);
        let m = DirectionMeans::collect(&evaluator, Direction::Out, &thresholds, 1_000).unwrap();
        assert!((m.memory_available_pct - 65.0).abs() < 1e-9);
        assert_eq!(m.pending_apps, 12.0);
    }
}
