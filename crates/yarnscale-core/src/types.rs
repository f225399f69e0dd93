//! Shared types used across yarnscale crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a managed cluster (e.g. `j-1F74M1P9SC57B`).
pub type ClusterId = String;

// ── Metrics ────────────────────────────────────────────────────────

/// The four metrics the decision engine monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Available YARN memory, stored as a fraction in `0.0..=1.0`.
    MemoryAvailablePercentage,
    /// Remaining YARN memory capacity in GB.
    CapacityRemainingGb,
    /// Number of pending YARN applications.
    PendingAppNum,
    /// Mean CPU load of the task nodes, in percent.
    TaskNodeCpuLoad,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::MemoryAvailablePercentage,
        Metric::CapacityRemainingGb,
        Metric::PendingAppNum,
        Metric::TaskNodeCpuLoad,
    ];

    /// Stable name used in storage keys and configuration keys.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::MemoryAvailablePercentage => "YARNMemoryAvailablePercentage",
            Metric::CapacityRemainingGb => "CapacityRemainingGB",
            Metric::PendingAppNum => "PendingAppNum",
            Metric::TaskNodeCpuLoad => "TaskNodeCPULoad",
        }
    }

    /// Range a stored sample must fall in.
    pub fn valid_range(&self) -> (f64, f64) {
        match self {
            Metric::MemoryAvailablePercentage => (0.0, 1.0),
            Metric::TaskNodeCpuLoad => (0.0, 100.0),
            Metric::CapacityRemainingGb | Metric::PendingAppNum => (0.0, f64::MAX),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single point in a metric time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub metric: Metric,
    pub value: f64,
}

impl MetricSample {
    /// Finite and within the metric's valid range.
    pub fn in_range(&self) -> bool {
        let (lo, hi) = self.metric.valid_range();
        self.value.is_finite() && self.value >= lo && self.value <= hi
    }
}

/// Live counters exposed by the YARN ResourceManager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    PendingUnits,
    AllocatedUnits,
    TotalUnits,
    ReservedUnits,
    AppsRunning,
    AppsPending,
    AvailableMb,
    TotalMb,
}

impl Counter {
    /// Field name in the ResourceManager `clusterMetrics` document.
    pub fn field(&self) -> &'static str {
        match self {
            Counter::PendingUnits => "pendingVirtualCores",
            Counter::AllocatedUnits => "allocatedVirtualCores",
            Counter::TotalUnits => "totalVirtualCores",
            Counter::ReservedUnits => "reservedVirtualCores",
            Counter::AppsRunning => "appsRunning",
            Counter::AppsPending => "appsPending",
            Counter::AvailableMb => "availableMB",
            Counter::TotalMb => "totalMB",
        }
    }
}

// ── Decisions ──────────────────────────────────────────────────────

/// Direction of a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    /// Configuration key prefix (`scaleOut` / `scaleIn`).
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Direction::Out => "scaleOut",
            Direction::In => "scaleIn",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Out => "scale-out",
            Direction::In => "scale-in",
        })
    }
}

/// Output of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    ScaleOut,
    ScaleIn,
    NoOp,
}

impl Decision {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Decision::ScaleOut => Some(Direction::Out),
            Decision::ScaleIn => Some(Direction::In),
            Decision::NoOp => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::ScaleOut => "scale-out",
            Decision::ScaleIn => "scale-in",
            Decision::NoOp => "no-op",
        })
    }
}

// ── Control plane ──────────────────────────────────────────────────

/// The elastic scaling policy of a cluster, in capacity units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeLimits {
    pub minimum_units: u32,
    pub maximum_units: u32,
    pub maximum_on_demand_units: u32,
    pub maximum_core_units: u32,
}

/// Role of an instance fleet within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetRole {
    Master,
    Core,
    Task,
}

/// An instance fleet and its capacity targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFleet {
    pub id: String,
    pub role: FleetRole,
    pub target_on_demand_units: u32,
    pub target_spot_units: u32,
    pub provisioned_on_demand_units: u32,
    pub provisioned_spot_units: u32,
}

impl InstanceFleet {
    pub fn target_units(&self) -> u32 {
        self.target_on_demand_units
            .saturating_add(self.target_spot_units)
    }

    pub fn provisioned_units(&self) -> u32 {
        self.provisioned_on_demand_units
            .saturating_add(self.provisioned_spot_units)
    }
}

// ── Persisted state ────────────────────────────────────────────────

/// Last action timestamps for a cluster (unix seconds, 0 = never).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScaleState {
    pub last_scale_out: u64,
    pub last_scale_in: u64,
}

impl ScaleState {
    pub fn last(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Out => self.last_scale_out,
            Direction::In => self.last_scale_in,
        }
    }

    /// Record an action; timestamps never move backwards.
    pub fn record(&mut self, direction: Direction, at: u64) {
        let slot = match direction {
            Direction::Out => &mut self.last_scale_out,
            Direction::In => &mut self.last_scale_in,
        };
        *slot = (*slot).max(at);
    }
}

/// One entry of the capacity-mutation audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyApplication {
    pub timestamp: u64,
    pub direction: Direction,
    pub applied_maximum_units: u32,
}
