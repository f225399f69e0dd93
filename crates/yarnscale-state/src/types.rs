//! Persisted record types and key layout for the state store.

use serde::{Deserialize, Serialize};

use yarnscale_core::{ComputeLimits, InstanceFleet, Metric};

/// Locally persisted control-plane state, used by the shadow controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlPlaneSnapshot {
    pub policy: ComputeLimits,
    pub fleets: Vec<InstanceFleet>,
}

/// Key of one metric sample.
pub fn sample_key(cluster: &str, metric: Metric, timestamp: u64) -> String {
    format!("{cluster}/{}/{timestamp:020}", metric.name())
}

/// Key prefix shared by all samples of a `(cluster, metric)` series.
pub fn series_prefix(cluster: &str, metric: Metric) -> String {
    format!("{cluster}/{}/", metric.name())
}

/// Key of one policy application; `seq` disambiguates same-second entries.
pub fn application_key(cluster: &str, timestamp: u64, seq: u32) -> String {
    format!("{cluster}/{timestamp:020}/{seq:04}")
}
