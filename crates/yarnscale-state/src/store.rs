//! StateStore: redb-backed state persistence for yarnscale.
//!
//! Provides typed operations over configuration values, metric samples,
//! cooldown state, the policy application audit log, and the shadow
//! control-plane snapshot. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use yarnscale_core::{
    ConfigStore, Metric, MetricSample, MetricWindowStore, PolicyApplication, ScaleState,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Exclusive upper bound for keys starting with `prefix` (which ends in `/`).
fn prefix_end(prefix: &str) -> String {
    let mut end = prefix.trim_end_matches('/').to_string();
    end.push('0');
    end
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CONFIG).map_err(map_err!(Table))?;
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(SCALE_STATE).map_err(map_err!(Table))?;
        txn.open_table(POLICY_LOG).map_err(map_err!(Table))?;
        txn.open_table(CONTROL_PLANE).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Config ─────────────────────────────────────────────────────

    /// Insert or overwrite a configuration value.
    pub fn put_config(&self, key: &str, value: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CONFIG).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "config value stored");
        Ok(())
    }

    /// Write many configuration values in one transaction.
    ///
    /// With `overwrite == false`, keys that already exist are left alone.
    /// Returns the number of keys written.
    pub fn put_configs(&self, entries: &[(String, String)], overwrite: bool) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut written = 0;
        {
            let mut table = txn.open_table(CONFIG).map_err(map_err!(Table))?;
            for (key, value) in entries {
                if !overwrite && table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                    continue;
                }
                table
                    .insert(key.as_str(), value.as_str())
                    .map_err(map_err!(Write))?;
                written += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(written)
    }

    /// Get one configuration value.
    pub fn get_config(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONFIG).map_err(map_err!(Table))?;
        let value = table.get(key).map_err(map_err!(Read))?;
        Ok(value.map(|guard| guard.value().to_string()))
    }

    /// Get many configuration values from a single read transaction.
    pub fn get_configs(&self, keys: &[String]) -> StateResult<Vec<Option<String>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONFIG).map_err(map_err!(Table))?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let value = table.get(key.as_str()).map_err(map_err!(Read))?;
            results.push(value.map(|guard| guard.value().to_string()));
        }
        Ok(results)
    }

    /// List all configuration values under `/{prefix}/`.
    pub fn list_config(&self, prefix: &str) -> StateResult<Vec<(String, String)>> {
        let start = format!("/{prefix}/");
        let end = prefix_end(&start);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONFIG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.push((key.value().to_string(), value.value().to_string()));
        }
        Ok(results)
    }

    // ── Samples ────────────────────────────────────────────────────

    /// Append a batch of samples for a cluster in one transaction.
    ///
    /// Every sample is range-checked against its metric first; a batch with
    /// any invalid sample is rejected as a whole.
    pub fn put_samples(&self, cluster: &str, samples: &[MetricSample]) -> StateResult<()> {
        for sample in samples {
            validate_sample(sample)?;
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            for sample in samples {
                let key = sample_key(cluster, sample.metric, sample.timestamp);
                let value = serde_json::to_vec(sample).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%cluster, count = samples.len(), "samples stored");
        Ok(())
    }

    /// Samples of one series with `from <= timestamp <= to`, oldest first.
    pub fn query_samples(
        &self,
        cluster: &str,
        metric: Metric,
        from: u64,
        to: u64,
    ) -> StateResult<Vec<MetricSample>> {
        if from > to {
            return Ok(Vec::new());
        }
        let start = sample_key(cluster, metric, from);
        let end = sample_key(cluster, metric, to);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..=end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let sample: MetricSample =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(sample);
        }
        Ok(results)
    }

    /// Delete every sample of a cluster older than `cutoff`. Returns the
    /// number of samples removed.
    pub fn purge_samples_before(&self, cluster: &str, cutoff: u64) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            for metric in Metric::ALL {
                let start = series_prefix(cluster, metric);
                let end = sample_key(cluster, metric, cutoff);
                // Collect first; the table cannot be mutated while iterating.
                let keys: Vec<String> = table
                    .range(start.as_str()..end.as_str())
                    .map_err(map_err!(Read))?
                    .filter_map(|entry| {
                        let (key, _) = entry.ok()?;
                        Some(key.value().to_string())
                    })
                    .collect();
                for key in &keys {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                }
                count += keys.len() as u32;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%cluster, cutoff, removed = count, "expired samples purged");
        Ok(count)
    }

    // ── Scale state & audit log ────────────────────────────────────

    /// Cooldown timestamps for a cluster (all zero if never scaled).
    pub fn get_scale_state(&self, cluster: &str) -> StateResult<ScaleState> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCALE_STATE).map_err(map_err!(Table))?;
        match table.get(cluster).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(ScaleState::default()),
        }
    }

    /// Append an application to the audit log and advance the cooldown
    /// timestamp of its direction, in a single write transaction.
    ///
    /// Returns the scale state after the update.
    pub fn record_application(
        &self,
        cluster: &str,
        application: &PolicyApplication,
    ) -> StateResult<ScaleState> {
        let entry = serde_json::to_vec(application).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let state = {
            let mut log = txn.open_table(POLICY_LOG).map_err(map_err!(Table))?;
            let mut seq = 0;
            let key = loop {
                let key = application_key(cluster, application.timestamp, seq);
                if log.get(key.as_str()).map_err(map_err!(Read))?.is_none() {
                    break key;
                }
                seq += 1;
            };
            log.insert(key.as_str(), entry.as_slice())
                .map_err(map_err!(Write))?;

            let mut states = txn.open_table(SCALE_STATE).map_err(map_err!(Table))?;
            let mut state: ScaleState = match states.get(cluster).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => ScaleState::default(),
            };
            state.record(application.direction, application.timestamp);
            let value = serde_json::to_vec(&state).map_err(map_err!(Serialize))?;
            states
                .insert(cluster, value.as_slice())
                .map_err(map_err!(Write))?;
            state
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            %cluster,
            direction = %application.direction,
            applied_maximum_units = application.applied_maximum_units,
            "policy application recorded"
        );
        Ok(state)
    }

    /// Audit entries with `from <= timestamp <= to`, oldest first.
    pub fn list_applications(
        &self,
        cluster: &str,
        from: u64,
        to: u64,
    ) -> StateResult<Vec<PolicyApplication>> {
        if from > to {
            return Ok(Vec::new());
        }
        let start = application_key(cluster, from, 0);
        let end = application_key(cluster, to, 9999);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICY_LOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..=end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let app: PolicyApplication =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(app);
        }
        Ok(results)
    }

    /// The latest audit entry at or before `at`, if any.
    pub fn application_in_force_at(
        &self,
        cluster: &str,
        at: u64,
    ) -> StateResult<Option<PolicyApplication>> {
        let start = format!("{cluster}/");
        let end = application_key(cluster, at, 9999);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICY_LOG).map_err(map_err!(Table))?;
        let last = table
            .range(start.as_str()..=end.as_str())
            .map_err(map_err!(Read))?
            .next_back();
        match last {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let app = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(app))
            }
            None => Ok(None),
        }
    }

    /// The most recent `limit` audit entries, newest first.
    pub fn recent_applications(
        &self,
        cluster: &str,
        limit: usize,
    ) -> StateResult<Vec<PolicyApplication>> {
        let start = format!("{cluster}/");
        let end = prefix_end(&start);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICY_LOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let app: PolicyApplication =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(app);
        }
        Ok(results)
    }

    // ── Shadow control plane ───────────────────────────────────────

    /// Insert or replace the shadow control-plane snapshot of a cluster.
    pub fn put_control_plane(&self, cluster: &str, snapshot: &ControlPlaneSnapshot) -> StateResult<()> {
        let value = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CONTROL_PLANE).map_err(map_err!(Table))?;
            table
                .insert(cluster, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the shadow control-plane snapshot of a cluster.
    pub fn get_control_plane(&self, cluster: &str) -> StateResult<Option<ControlPlaneSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONTROL_PLANE).map_err(map_err!(Table))?;
        match table.get(cluster).map_err(map_err!(Read))? {
            Some(guard) => {
                let snapshot: ControlPlaneSnapshot =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

fn validate_sample(sample: &MetricSample) -> StateResult<()> {
    if !sample.in_range() {
        let (lo, hi) = sample.metric.valid_range();
        return Err(StateError::InvalidSample(format!(
            "{} = {} outside [{lo}, {hi}]",
            sample.metric, sample.value
        )));
    }
    Ok(())
}

impl ConfigStore for StateStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.get_config(key)?)
    }

    fn get_many(&self, keys: &[String]) -> anyhow::Result<Vec<Option<String>>> {
        Ok(self.get_configs(keys)?)
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        Ok(self.put_config(key, value)?)
    }
}

impl MetricWindowStore for StateStore {
    fn query(
        &self,
        cluster: &str,
        metric: Metric,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<MetricSample>> {
        Ok(self.query_samples(cluster, metric, from, to)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnscale_core::{ComputeLimits, Direction, FleetRole, InstanceFleet};

    fn sample(metric: Metric, timestamp: u64, value: f64) -> MetricSample {
        MetricSample {
            timestamp,
            metric,
            value,
        }
    }

    fn application(direction: Direction, timestamp: u64, units: u32) -> PolicyApplication {
        PolicyApplication {
            timestamp,
            direction,
            applied_maximum_units: units,
        }
    }

    // ── Config ─────────────────────────────────────────────────────

    #[test]
    fn config_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_config("/p/minimumUnits", "128").unwrap();

        assert_eq!(
            store.get_config("/p/minimumUnits").unwrap(),
            Some("128".to_string())
        );
        assert!(store.get_config("/p/nothing").unwrap().is_none());
    }

    #[test]
    fn config_batch_preserves_order_and_gaps() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_config("/p/a", "1").unwrap();
        store.put_config("/p/c", "3").unwrap();

        let keys = vec!["/p/c".to_string(), "/p/b".to_string(), "/p/a".to_string()];
        let values = store.get_configs(&keys).unwrap();
        assert_eq!(
            values,
            vec![Some("3".to_string()), None, Some("1".to_string())]
        );
    }

    #[test]
    fn config_bulk_write_without_overwrite_keeps_existing() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_config("/p/a", "custom").unwrap();

        let entries = vec![
            ("/p/a".to_string(), "default".to_string()),
            ("/p/b".to_string(), "2".to_string()),
        ];
        assert_eq!(store.put_configs(&entries, false).unwrap(), 1);
        assert_eq!(store.get_config("/p/a").unwrap().unwrap(), "custom");

        assert_eq!(store.put_configs(&entries, true).unwrap(), 2);
        assert_eq!(store.get_config("/p/a").unwrap().unwrap(), "default");
    }

    #[test]
    fn config_list_is_scoped_to_prefix() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_config("/p/a", "1").unwrap();
        store.put_config("/p/b", "2").unwrap();
        store.put_config("/other/a", "3").unwrap();

        let listed = store.list_config("p").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(k, _)| k.starts_with("/p/")));
    }

    // ── Samples ────────────────────────────────────────────────────

    #[test]
    fn samples_query_window_is_inclusive_and_ordered() {
        let store = StateStore::open_in_memory().unwrap();
        let samples: Vec<_> = [1000u64, 1020, 1040, 1060]
            .iter()
            .map(|&t| sample(Metric::PendingAppNum, t, t as f64))
            .collect();
        store.put_samples("j-1", &samples).unwrap();

        let window = store
            .query_samples("j-1", Metric::PendingAppNum, 1020, 1060)
            .unwrap();
        let stamps: Vec<u64> = window.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![1020, 1040, 1060]);
    }

    #[test]
    fn samples_are_isolated_per_cluster_and_metric() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_samples("j-1", &[sample(Metric::PendingAppNum, 1000, 3.0)])
            .unwrap();
        store
            .put_samples("j-2", &[sample(Metric::PendingAppNum, 1000, 4.0)])
            .unwrap();
        store
            .put_samples("j-1", &[sample(Metric::TaskNodeCpuLoad, 1000, 50.0)])
            .unwrap();

        let j1 = store
            .query_samples("j-1", Metric::PendingAppNum, 0, 2000)
            .unwrap();
        assert_eq!(j1.len(), 1);
        assert_eq!(j1[0].value, 3.0);
    }

    #[test]
    fn memory_sample_must_be_a_fraction() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .put_samples(
                "j-1",
                &[
                    sample(Metric::PendingAppNum, 1000, 1.0),
                    sample(Metric::MemoryAvailablePercentage, 1000, 65.0),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidSample(_)));

        // The whole batch was rejected.
        assert!(store
            .query_samples("j-1", Metric::PendingAppNum, 0, 2000)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nan_sample_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .put_samples("j-1", &[sample(Metric::CapacityRemainingGb, 1000, f64::NAN)])
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidSample(_)));
    }

    #[test]
    fn purge_removes_only_expired_samples() {
        let store = StateStore::open_in_memory().unwrap();
        for metric in Metric::ALL {
            store
                .put_samples(
                    "j-1",
                    &[sample(metric, 100, 0.5), sample(metric, 200, 0.5)],
                )
                .unwrap();
        }
        store
            .put_samples("j-2", &[sample(Metric::PendingAppNum, 100, 1.0)])
            .unwrap();

        let removed = store.purge_samples_before("j-1", 200).unwrap();
        assert_eq!(removed, 4);
        for metric in Metric::ALL {
            let left = store.query_samples("j-1", metric, 0, 1000).unwrap();
            assert_eq!(left.len(), 1);
            assert_eq!(left[0].timestamp, 200);
        }
        // Other clusters untouched.
        assert_eq!(
            store
                .query_samples("j-2", Metric::PendingAppNum, 0, 1000)
                .unwrap()
                .len(),
            1
        );
    }

    // ── Scale state & audit ────────────────────────────────────────

    #[test]
    fn scale_state_defaults_to_never() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.get_scale_state("j-1").unwrap(), ScaleState::default());
    }

    #[test]
    fn record_application_updates_log_and_state_together() {
        let store = StateStore::open_in_memory().unwrap();
        let state = store
            .record_application("j-1", &application(Direction::Out, 1000, 400))
            .unwrap();
        assert_eq!(state.last_scale_out, 1000);
        assert_eq!(state.last_scale_in, 0);

        assert_eq!(store.get_scale_state("j-1").unwrap(), state);
        let log = store.list_applications("j-1", 0, 5000).unwrap();
        assert_eq!(log, vec![application(Direction::Out, 1000, 400)]);
    }

    #[test]
    fn scale_state_is_monotonic() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .record_application("j-1", &application(Direction::In, 2000, 300))
            .unwrap();
        let state = store
            .record_application("j-1", &application(Direction::In, 1500, 280))
            .unwrap();
        assert_eq!(state.last_scale_in, 2000);
        // Both entries are still audited.
        assert_eq!(store.list_applications("j-1", 0, 5000).unwrap().len(), 2);
    }

    #[test]
    fn same_second_applications_are_both_kept() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .record_application("j-1", &application(Direction::Out, 1000, 400))
            .unwrap();
        store
            .record_application("j-1", &application(Direction::Out, 1000, 450))
            .unwrap();

        let log = store.list_applications("j-1", 1000, 1000).unwrap();
        let units: Vec<u32> = log.iter().map(|a| a.applied_maximum_units).collect();
        assert_eq!(units, vec![400, 450]);
    }

    #[test]
    fn application_in_force_is_latest_at_or_before() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .record_application("j-1", &application(Direction::Out, 1000, 400))
            .unwrap();
        store
            .record_application("j-1", &application(Direction::Out, 2000, 500))
            .unwrap();
        store
            .record_application("j-0", &application(Direction::Out, 1500, 999))
            .unwrap();

        assert!(store.application_in_force_at("j-1", 999).unwrap().is_none());
        assert_eq!(
            store
                .application_in_force_at("j-1", 1999)
                .unwrap()
                .unwrap()
                .applied_maximum_units,
            400
        );
        assert_eq!(
            store
                .application_in_force_at("j-1", 2000)
                .unwrap()
                .unwrap()
                .applied_maximum_units,
            500
        );
    }

    #[test]
    fn recent_applications_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for (t, u) in [(1000, 400), (2000, 500), (3000, 350)] {
            store
                .record_application("j-1", &application(Direction::Out, t, u))
                .unwrap();
        }
        let recent = store.recent_applications("j-1", 2).unwrap();
        let stamps: Vec<u64> = recent.iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![3000, 2000]);
    }

    // ── Shadow control plane ───────────────────────────────────────

    #[test]
    fn control_plane_snapshot_roundtrip() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_control_plane("j-1").unwrap().is_none());

        let snapshot = ControlPlaneSnapshot {
            policy: ComputeLimits {
                minimum_units: 128,
                maximum_units: 256,
                maximum_on_demand_units: 128,
                maximum_core_units: 64,
            },
            fleets: vec![InstanceFleet {
                id: "if-task".to_string(),
                role: FleetRole::Task,
                target_on_demand_units: 0,
                target_spot_units: 192,
                provisioned_on_demand_units: 0,
                provisioned_spot_units: 160,
            }],
        };
        store.put_control_plane("j-1", &snapshot).unwrap();
        assert_eq!(store.get_control_plane("j-1").unwrap(), Some(snapshot));
    }

    // ── Collaborator traits ────────────────────────────────────────

    #[test]
    fn store_serves_as_config_and_window_store() {
        let store = StateStore::open_in_memory().unwrap();
        let config: &dyn ConfigStore = &store;
        config.put("/p/maximumUnits", "640").unwrap();
        assert_eq!(
            config.get_many(&["/p/maximumUnits".to_string()]).unwrap(),
            vec![Some("640".to_string())]
        );

        store
            .put_samples("j-1", &[sample(Metric::TaskNodeCpuLoad, 1000, 85.0)])
            .unwrap();
        let windows: &dyn MetricWindowStore = &store;
        assert_eq!(
            windows
                .query("j-1", Metric::TaskNodeCpuLoad, 900, 1100)
                .unwrap()
                .len(),
            1
        );
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store
                .record_application("j-1", &application(Direction::Out, 1000, 400))
                .unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_scale_state("j-1").unwrap().last_scale_out, 1000);
        assert_eq!(store.recent_applications("j-1", 10).unwrap().len(), 1);
    }
}
