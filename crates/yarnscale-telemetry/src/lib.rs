//! yarnscale-telemetry: metric sampling for a managed YARN cluster.
//!
//! Reads live counters from the ResourceManager REST API, derives the
//! monitored metrics, and persists them as time series in the state store.
//!
//! # Architecture
//!
//! ```text
//! YarnClient (TelemetrySource)
//!   ├── cluster_metrics() ← GET /ws/v1/cluster/metrics
//!   └── node_cpu_load()   ← GET /ws/v1/cluster/nodes
//!
//! TelemetryCollector
//!   ├── sample() → appends MetricSamples to StateStore
//!   ├── purge_expired() → drops samples past the retention horizon
//!   └── run() → periodic sampling loop
//! ```

pub mod collector;
pub mod yarn;

pub use collector::TelemetryCollector;
pub use yarn::{ClusterMetrics, TelemetryError, YarnClient};
