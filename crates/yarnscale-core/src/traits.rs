//! Collaborator seams of the scaling engine.
//!
//! The local stores (`ConfigStore`, `MetricWindowStore`) are synchronous;
//! they are backed by the embedded redb database. The remote collaborators
//! (`TelemetrySource`, `CapacityController`) return boxed futures so the
//! engine can bound every call with a timeout and hold them as trait
//! objects.

use std::future::Future;
use std::pin::Pin;

use crate::types::{ComputeLimits, Counter, InstanceFleet, Metric, MetricSample};

/// Boxed future alias for remote collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Key-value store of scalar configuration values.
pub trait ConfigStore: Send + Sync {
    /// Read one key. `None` if the key is absent.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Read many keys at once, in order.
    fn get_many(&self, keys: &[String]) -> anyhow::Result<Vec<Option<String>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    /// Write (or overwrite) one key.
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Append-only local time series of sampled metrics.
pub trait MetricWindowStore: Send + Sync {
    /// Samples for `(cluster, metric)` with `from <= timestamp <= to`,
    /// ordered by timestamp.
    fn query(
        &self,
        cluster: &str,
        metric: Metric,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<MetricSample>>;
}

/// Live, point-in-time counters from the cluster resource manager.
pub trait TelemetrySource: Send + Sync {
    /// Read one counter.
    fn counter(&self, counter: Counter) -> BoxFuture<'_, f64>;

    /// Read several counters from one snapshot, in order.
    ///
    /// The default reads them one at a time; sources that can fetch every
    /// counter in a single request should override it so related values
    /// are consistent with each other.
    fn counters<'a>(&'a self, counters: &'a [Counter]) -> BoxFuture<'a, Vec<f64>> {
        Box::pin(async move {
            let mut values = Vec::with_capacity(counters.len());
            for &counter in counters {
                values.push(self.counter(counter).await?);
            }
            Ok(values)
        })
    }

    /// Mean CPU load (percent) across running task nodes, `None` when
    /// there are no task nodes to measure.
    fn task_node_cpu_load(&self) -> BoxFuture<'_, Option<f64>>;
}

/// The remote control plane owning the elastic scaling policy.
pub trait CapacityController: Send + Sync {
    fn get_policy(&self) -> BoxFuture<'_, ComputeLimits>;

    fn put_policy<'a>(&'a self, policy: &'a ComputeLimits) -> BoxFuture<'a, ()>;

    fn list_fleets(&self) -> BoxFuture<'_, Vec<InstanceFleet>>;

    /// Set the on-demand and spot targets of one fleet.
    fn modify_fleet<'a>(
        &'a self,
        fleet_id: &'a str,
        on_demand_target: u32,
        spot_target: u32,
    ) -> BoxFuture<'a, ()>;
}
