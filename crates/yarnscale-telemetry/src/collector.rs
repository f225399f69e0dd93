//! Telemetry collector: samples the monitored metrics of one cluster.
//!
//! Each tick reads the live ResourceManager counters, derives the four
//! monitored metrics, appends them to the state store, and purges samples
//! older than the retention horizon.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use yarnscale_core::{Counter, Metric, MetricSample, TelemetrySource};
use yarnscale_state::StateStore;

const SAMPLED_COUNTERS: [Counter; 3] = [Counter::AvailableMb, Counter::TotalMb, Counter::AppsPending];

/// Periodically samples a `TelemetrySource` into the state store.
pub struct TelemetryCollector {
    cluster: String,
    source: Arc<dyn TelemetrySource>,
    state: StateStore,
    /// Sampling interval.
    interval: Duration,
    /// Samples older than this are purged.
    retention: Duration,
}

impl TelemetryCollector {
    pub fn new(
        cluster: impl Into<String>,
        source: Arc<dyn TelemetrySource>,
        state: StateStore,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            source,
            state,
            interval,
            retention,
        }
    }

    /// Read the live counters once and persist the derived samples.
    ///
    /// Memory is skipped when the cluster reports no memory at all; CPU is
    /// skipped when no task node reports utilisation. A reading outside its
    /// metric's range is dropped on its own so the other metrics are still
    /// stored.
    pub async fn sample(&self) -> anyhow::Result<Vec<MetricSample>> {
        self.sample_at(epoch_secs()).await
    }

    pub async fn sample_at(&self, now: u64) -> anyhow::Result<Vec<MetricSample>> {
        let (counters, cpu) = tokio::try_join!(
            self.source.counters(&SAMPLED_COUNTERS),
            self.source.task_node_cpu_load(),
        )?;
        let [available_mb, total_mb, apps_pending] = <[f64; 3]>::try_from(counters)
            .map_err(|v| anyhow::anyhow!("expected 3 counters, got {}", v.len()))?;

        let mut samples = Vec::with_capacity(Metric::ALL.len());
        let mut push = |metric, value| {
            samples.push(MetricSample {
                timestamp: now,
                metric,
                value,
            })
        };

        if total_mb > 0.0 {
            push(Metric::MemoryAvailablePercentage, available_mb / total_mb);
        } else {
            warn!(cluster = %self.cluster, "cluster reports no memory, skipping memory sample");
        }
        push(Metric::CapacityRemainingGb, available_mb / 1024.0);
        push(Metric::PendingAppNum, apps_pending);
        if let Some(load) = cpu {
            push(Metric::TaskNodeCpuLoad, load);
        }

        samples.retain(|sample| {
            let keep = sample.in_range();
            if !keep {
                warn!(
                    cluster = %self.cluster,
                    metric = %sample.metric,
                    value = sample.value,
                    "reading out of range, dropping sample"
                );
            }
            keep
        });

        self.state.put_samples(&self.cluster, &samples)?;
        debug!(
            cluster = %self.cluster,
            count = samples.len(),
            available_mb,
            total_mb,
            apps_pending,
            ?cpu,
            "telemetry sampled"
        );
        Ok(samples)
    }

    /// Delete samples older than the retention horizon.
    pub fn purge_expired(&self) -> anyhow::Result<u32> {
        self.purge_expired_at(epoch_secs())
    }

    pub fn purge_expired_at(&self, now: u64) -> anyhow::Result<u32> {
        let cutoff = now.saturating_sub(self.retention.as_secs());
        let removed = self.state.purge_samples_before(&self.cluster, cutoff)?;
        if removed > 0 {
            info!(cluster = %self.cluster, removed, cutoff, "expired samples purged");
        }
        Ok(removed)
    }

    /// Run the sampling loop until shutdown signal.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            cluster = %self.cluster,
            interval_secs = self.interval.as_secs(),
            retention_days = self.retention.as_secs() / 86_400,
            "telemetry collector started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sample().await {
                        warn!(cluster = %self.cluster, error = %e, "telemetry sample failed");
                    }
                    if let Err(e) = self.purge_expired() {
                        warn!(cluster = %self.cluster, error = %e, "sample purge failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(cluster = %self.cluster, "telemetry collector shutting down");
                    break;
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
