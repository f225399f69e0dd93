//! Typed scaling settings loaded from the configuration store.
//!
//! Every setting lives under `/{prefix}/{name}` in the [`ConfigStore`].
//! The full key set is read with a single batched `get_many` and parsed
//! into [`ScalingSettings`]; the settings are reloaded before every cycle
//! so operators can retune thresholds without restarting the daemon.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::traits::ConfigStore;
use crate::types::{Direction, Metric};

/// Default configuration key prefix.
pub const DEFAULT_PREFIX: &str = "managedScalingEnhanced";

/// Longest accepted averaging window: the default sample retention, 30 days.
pub const MAX_WINDOW_MINUTES: u64 = 30 * 24 * 60;

/// Errors raised while loading scaling settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration store unavailable: {0}")]
    Store(String),

    #[error("missing configuration key: {0}")]
    Missing(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Every scalar setting the controller reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MinimumUnits,
    MaximumUnits,
    MaximumOnDemandUnits,
    SpotInstancesTimeout,
    MonitorIntervalSeconds,
    ScaleOutCooldownSeconds,
    ScaleInCooldownSeconds,
    ScaleOutFactor,
    ScaleInFactor,
    IdleReservedUnitsGuard,
    OnDemandBackfillEnabled,
    DataSufficiencyRatio,
    /// Threshold value for one (direction, metric) pair.
    Value(Direction, Metric),
    /// Window length in minutes for one (direction, metric) pair.
    Minutes(Direction, Metric),
}

impl SettingKey {
    /// All keys, in the order they are fetched.
    pub fn all() -> Vec<SettingKey> {
        let mut keys = vec![
            SettingKey::MinimumUnits,
            SettingKey::MaximumUnits,
            SettingKey::MaximumOnDemandUnits,
            SettingKey::SpotInstancesTimeout,
            SettingKey::MonitorIntervalSeconds,
            SettingKey::ScaleOutCooldownSeconds,
            SettingKey::ScaleInCooldownSeconds,
            SettingKey::ScaleOutFactor,
            SettingKey::ScaleInFactor,
            SettingKey::IdleReservedUnitsGuard,
            SettingKey::OnDemandBackfillEnabled,
            SettingKey::DataSufficiencyRatio,
        ];
        for direction in [Direction::Out, Direction::In] {
            for metric in Metric::ALL {
                keys.push(SettingKey::Value(direction, metric));
                keys.push(SettingKey::Minutes(direction, metric));
            }
        }
        keys
    }

    /// Setting name without the prefix.
    pub fn name(&self) -> String {
        match self {
            SettingKey::MinimumUnits => "minimumUnits".to_string(),
            SettingKey::MaximumUnits => "maximumUnits".to_string(),
            SettingKey::MaximumOnDemandUnits => "maximumOnDemandUnits".to_string(),
            SettingKey::SpotInstancesTimeout => "spotInstancesTimeout".to_string(),
            SettingKey::MonitorIntervalSeconds => "monitorIntervalSeconds".to_string(),
            SettingKey::ScaleOutCooldownSeconds => "scaleOutCooldownSeconds".to_string(),
            SettingKey::ScaleInCooldownSeconds => "scaleInCooldownSeconds".to_string(),
            SettingKey::ScaleOutFactor => "scaleOutFactor".to_string(),
            SettingKey::ScaleInFactor => "scaleInFactor".to_string(),
            SettingKey::IdleReservedUnitsGuard => "idleReservedUnitsGuard".to_string(),
            SettingKey::OnDemandBackfillEnabled => "onDemandBackfillEnabled".to_string(),
            SettingKey::DataSufficiencyRatio => "dataSufficiencyRatio".to_string(),
            SettingKey::Value(direction, metric) => {
                format!("{}Avg{}Value", direction.key_prefix(), metric.name())
            }
            SettingKey::Minutes(direction, metric) => {
                format!("{}Avg{}Minutes", direction.key_prefix(), metric.name())
            }
        }
    }

    /// Full store key, `/{prefix}/{name}`.
    pub fn full_key(&self, prefix: &str) -> String {
        format!("/{prefix}/{}", self.name())
    }

    /// Value written by `seed-config`.
    pub fn seed_value(&self) -> &'static str {
        use Direction::{In, Out};
        use Metric::*;
        match self {
            SettingKey::MinimumUnits => "128",
            SettingKey::MaximumUnits => "512",
            SettingKey::MaximumOnDemandUnits => "128",
            SettingKey::SpotInstancesTimeout => "300",
            SettingKey::MonitorIntervalSeconds => "20",
            SettingKey::ScaleOutCooldownSeconds => "20",
            SettingKey::ScaleInCooldownSeconds => "20",
            SettingKey::ScaleOutFactor => "1.0",
            SettingKey::ScaleInFactor => "1.0",
            SettingKey::IdleReservedUnitsGuard => "10",
            SettingKey::OnDemandBackfillEnabled => "false",
            SettingKey::DataSufficiencyRatio => "0.8",
            SettingKey::Value(Out, MemoryAvailablePercentage) => "75",
            SettingKey::Value(Out, CapacityRemainingGb) => "150",
            SettingKey::Value(Out, PendingAppNum) => "10",
            SettingKey::Value(Out, TaskNodeCpuLoad) => "80",
            SettingKey::Value(In, MemoryAvailablePercentage) => "85",
            SettingKey::Value(In, CapacityRemainingGb) => "200",
            SettingKey::Value(In, PendingAppNum) => "5",
            SettingKey::Value(In, TaskNodeCpuLoad) => "60",
            SettingKey::Minutes(_, _) => "5",
        }
    }

    /// Keys that may be absent from the store; the seed value is used.
    ///
    /// The bounds and the per-metric thresholds are always required.
    fn optional(&self) -> bool {
        !matches!(
            self,
            SettingKey::MinimumUnits
                | SettingKey::MaximumUnits
                | SettingKey::MonitorIntervalSeconds
                | SettingKey::Value(..)
                | SettingKey::Minutes(..)
        )
    }
}

/// Configured capacity bounds of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBounds {
    pub minimum_units: u32,
    pub maximum_units: u32,
    /// Default on-demand ceiling restored on every scale-in.
    pub maximum_on_demand_units: u32,
}

/// Target value and window length for one monitored metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub value: f64,
    pub window_minutes: u64,
}

/// The per-metric thresholds for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub memory_available_pct: MetricThreshold,
    pub capacity_remaining_gb: MetricThreshold,
    pub pending_apps: MetricThreshold,
    pub task_node_cpu_load: MetricThreshold,
}

impl Thresholds {
    pub fn get(&self, metric: Metric) -> MetricThreshold {
        match metric {
            Metric::MemoryAvailablePercentage => self.memory_available_pct,
            Metric::CapacityRemainingGb => self.capacity_remaining_gb,
            Metric::PendingAppNum => self.pending_apps,
            Metric::TaskNodeCpuLoad => self.task_node_cpu_load,
        }
    }
}

/// All settings one evaluation cycle needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingSettings {
    pub bounds: CapacityBounds,
    pub scale_out: Thresholds,
    pub scale_in: Thresholds,
    /// Telemetry sampling cadence.
    pub monitor_interval_secs: u64,
    pub scale_out_cooldown_secs: u64,
    pub scale_in_cooldown_secs: u64,
    /// How long spot capacity may lag the applied maximum before
    /// on-demand backfill kicks in.
    pub spot_instances_timeout_secs: u64,
    pub scale_out_factor: f64,
    pub scale_in_factor: f64,
    /// Reserved units at or below which an idle cluster is not scaled out.
    pub idle_reserved_units_guard: f64,
    pub on_demand_backfill: bool,
    /// Fraction of the expected samples a window needs to be usable.
    pub data_sufficiency_ratio: f64,
}

impl ScalingSettings {
    /// Load and validate settings with one batched lookup.
    pub fn load(store: &dyn ConfigStore, prefix: &str) -> Result<Self, ConfigError> {
        let keys = SettingKey::all();
        let names: Vec<String> = keys.iter().map(|k| k.full_key(prefix)).collect();
        let values = store
            .get_many(&names)
            .map_err(|e| ConfigError::Store(e.to_string()))?;

        let raw: HashMap<SettingKey, Option<String>> = keys.into_iter().zip(values).collect();
        let reader = Reader { raw, prefix };
        let settings = reader.build()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The seed parameter set for a prefix, as `(full_key, value)` pairs.
    pub fn seed(prefix: &str) -> Vec<(String, String)> {
        SettingKey::all()
            .into_iter()
            .map(|k| (k.full_key(prefix), k.seed_value().to_string()))
            .collect()
    }

    pub fn thresholds(&self, direction: Direction) -> &Thresholds {
        match direction {
            Direction::Out => &self.scale_out,
            Direction::In => &self.scale_in,
        }
    }

    pub fn cooldown_secs(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Out => self.scale_out_cooldown_secs,
            Direction::In => self.scale_in_cooldown_secs,
        }
    }

    /// Check the cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.bounds;
        if b.minimum_units >= b.maximum_units {
            return Err(ConfigError::Inconsistent(format!(
                "minimumUnits ({}) must be below maximumUnits ({})",
                b.minimum_units, b.maximum_units
            )));
        }
        if b.maximum_on_demand_units > b.maximum_units {
            return Err(ConfigError::Inconsistent(format!(
                "maximumOnDemandUnits ({}) exceeds maximumUnits ({})",
                b.maximum_on_demand_units, b.maximum_units
            )));
        }
        if self.monitor_interval_secs == 0 {
            return Err(ConfigError::Inconsistent(
                "monitorIntervalSeconds must be positive".to_string(),
            ));
        }
        if !(self.data_sufficiency_ratio > 0.0 && self.data_sufficiency_ratio <= 1.0) {
            return Err(ConfigError::Inconsistent(format!(
                "dataSufficiencyRatio ({}) must be in (0, 1]",
                self.data_sufficiency_ratio
            )));
        }
        for direction in [Direction::Out, Direction::In] {
            for metric in Metric::ALL {
                let minutes = self.thresholds(direction).get(metric).window_minutes;
                if minutes > MAX_WINDOW_MINUTES {
                    return Err(ConfigError::Inconsistent(format!(
                        "{} ({minutes}) exceeds {MAX_WINDOW_MINUTES} minutes",
                        SettingKey::Minutes(direction, metric).name()
                    )));
                }
            }
        }
        for (name, factor) in [
            ("scaleOutFactor", self.scale_out_factor),
            ("scaleInFactor", self.scale_in_factor),
        ] {
            if !factor.is_finite() || factor < 0.0 {
                return Err(ConfigError::Inconsistent(format!(
                    "{name} ({factor}) must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

/// Typed accessors over the raw batched lookup.
struct Reader<'a> {
    raw: HashMap<SettingKey, Option<String>>,
    prefix: &'a str,
}

impl Reader<'_> {
    fn text(&self, key: SettingKey) -> Result<String, ConfigError> {
        match self.raw.get(&key).cloned().flatten() {
            Some(v) => Ok(v.trim().to_string()),
            None if key.optional() => Ok(key.seed_value().to_string()),
            None => Err(ConfigError::Missing(key.full_key(self.prefix))),
        }
    }

    fn parse<T>(&self, key: SettingKey) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.text(key)?;
        value.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.full_key(self.prefix),
            value: value.clone(),
            reason: e.to_string(),
        })
    }

    /// Parse an integer that may have been written as a float ("5.0").
    fn whole(&self, key: SettingKey) -> Result<u64, ConfigError> {
        let value = self.text(key)?;
        if let Ok(n) = value.parse::<u64>() {
            return Ok(n);
        }
        match value.parse::<f64>() {
            Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
            _ => Err(ConfigError::Invalid {
                key: key.full_key(self.prefix),
                value,
                reason: "expected a non-negative whole number".to_string(),
            }),
        }
    }

    fn units(&self, key: SettingKey) -> Result<u32, ConfigError> {
        let n = self.whole(key)?;
        u32::try_from(n).map_err(|_| ConfigError::Invalid {
            key: key.full_key(self.prefix),
            value: n.to_string(),
            reason: "capacity units out of range".to_string(),
        })
    }

    fn threshold(&self, direction: Direction, metric: Metric) -> Result<MetricThreshold, ConfigError> {
        Ok(MetricThreshold {
            value: self.parse(SettingKey::Value(direction, metric))?,
            window_minutes: self.whole(SettingKey::Minutes(direction, metric))?,
        })
    }

    fn thresholds(&self, direction: Direction) -> Result<Thresholds, ConfigError> {
        Ok(Thresholds {
            memory_available_pct: self.threshold(direction, Metric::MemoryAvailablePercentage)?,
            capacity_remaining_gb: self.threshold(direction, Metric::CapacityRemainingGb)?,
            pending_apps: self.threshold(direction, Metric::PendingAppNum)?,
            task_node_cpu_load: self.threshold(direction, Metric::TaskNodeCpuLoad)?,
        })
    }

    fn build(&self) -> Result<ScalingSettings, ConfigError> {
        Ok(ScalingSettings {
            bounds: CapacityBounds {
                minimum_units: self.units(SettingKey::MinimumUnits)?,
                maximum_units: self.units(SettingKey::MaximumUnits)?,
                maximum_on_demand_units: self.units(SettingKey::MaximumOnDemandUnits)?,
            },
            scale_out: self.thresholds(Direction::Out)?,
            scale_in: self.thresholds(Direction::In)?,
            monitor_interval_secs: self.whole(SettingKey::MonitorIntervalSeconds)?,
            scale_out_cooldown_secs: self.whole(SettingKey::ScaleOutCooldownSeconds)?,
            scale_in_cooldown_secs: self.whole(SettingKey::ScaleInCooldownSeconds)?,
            spot_instances_timeout_secs: self.whole(SettingKey::SpotInstancesTimeout)?,
            scale_out_factor: self.parse(SettingKey::ScaleOutFactor)?,
            scale_in_factor: self.parse(SettingKey::ScaleInFactor)?,
            idle_reserved_units_guard: self.parse(SettingKey::IdleReservedUnitsGuard)?,
            on_demand_backfill: self.parse(SettingKey::OnDemandBackfillEnabled)?,
            data_sufficiency_ratio: self.parse(SettingKey::DataSufficiencyRatio)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        values: Mutex<HashMap<String, String>>,
        batched_calls: Mutex<u32>,
    }

    impl ConfigStore for MapStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        fn get_many(&self, keys: &[String]) -> anyhow::Result<Vec<Option<String>>> {
            *self.batched_calls.lock().unwrap() += 1;
            let values = self.values.lock().unwrap();
            Ok(keys.iter().map(|k| values.get(k).cloned()).collect())
        }

        fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn seeded() -> MapStore {
        let store = MapStore::default();
        for (k, v) in ScalingSettings::seed(DEFAULT_PREFIX) {
            store.put(&k, &v).unwrap();
        }
        store
    }

    #[test]
    fn key_names_follow_parameter_layout() {
        assert_eq!(
            SettingKey::MinimumUnits.full_key("managedScalingEnhanced"),
            "/managedScalingEnhanced/minimumUnits"
        );
        assert_eq!(
            SettingKey::Value(Direction::Out, Metric::MemoryAvailablePercentage).name(),
            "scaleOutAvgYARNMemoryAvailablePercentageValue"
        );
        assert_eq!(
            SettingKey::Minutes(Direction::In, Metric::TaskNodeCpuLoad).name(),
            "scaleInAvgTaskNodeCPULoadMinutes"
        );
    }

    #[test]
    fn load_seeded_settings_with_one_batch() {
        let store = seeded();
        let settings = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap();

        assert_eq!(*store.batched_calls.lock().unwrap(), 1);
        assert_eq!(settings.bounds.minimum_units, 128);
        assert_eq!(settings.bounds.maximum_units, 512);
        assert_eq!(settings.scale_out.memory_available_pct.value, 75.0);
        assert_eq!(settings.scale_in.task_node_cpu_load.value, 60.0);
        assert_eq!(settings.scale_out.pending_apps.window_minutes, 5);
        assert_eq!(settings.data_sufficiency_ratio, 0.8);
        assert!(!settings.on_demand_backfill);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let store = seeded();
        store
            .values
            .lock()
            .unwrap()
            .remove("/managedScalingEnhanced/maximumUnits");

        let err = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(k) if k.ends_with("maximumUnits")));
    }

    #[test]
    fn optional_key_falls_back_to_seed() {
        let store = seeded();
        store
            .values
            .lock()
            .unwrap()
            .remove("/managedScalingEnhanced/scaleOutFactor");

        let settings = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap();
        assert_eq!(settings.scale_out_factor, 1.0);
    }

    #[test]
    fn whole_numbers_accept_float_notation() {
        let store = seeded();
        store
            .put("/managedScalingEnhanced/scaleOutAvgPendingAppNumMinutes", "10.0")
            .unwrap();

        let settings = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap();
        assert_eq!(settings.scale_out.pending_apps.window_minutes, 10);
    }

    #[test]
    fn garbage_value_is_rejected() {
        let store = seeded();
        store
            .put("/managedScalingEnhanced/scaleInAvgPendingAppNumValue", "lots")
            .unwrap();

        let err = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn minimum_must_be_below_maximum() {
        let store = seeded();
        store.put("/managedScalingEnhanced/minimumUnits", "512").unwrap();

        let err = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }

    #[test]
    fn on_demand_ceiling_cannot_exceed_maximum() {
        let store = seeded();
        store
            .put("/managedScalingEnhanced/maximumOnDemandUnits", "600")
            .unwrap();

        let err = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let store = seeded();
        store
            .put(
                "/managedScalingEnhanced/scaleOutAvgYARNMemoryAvailablePercentageMinutes",
                "307445734561825862",
            )
            .unwrap();

        let err = ScalingSettings::load(&store, DEFAULT_PREFIX).unwrap_err();
        assert!(
            matches!(err, ConfigError::Inconsistent(ref m) if m.contains("scaleOutAvgYARNMemoryAvailablePercentageMinutes"))
        );

        store
            .put(
                "/managedScalingEnhanced/scaleOutAvgYARNMemoryAvailablePercentageMinutes",
                &MAX_WINDOW_MINUTES.to_string(),
            )
            .unwrap();
        assert!(ScalingSettings::load(&store, DEFAULT_PREFIX).is_ok());
    }

    #[test]
    fn seed_covers_every_key() {
        let seed = ScalingSettings::seed("p");
        assert_eq!(seed.len(), SettingKey::all().len());
        assert!(seed.iter().all(|(k, _)| k.starts_with("/p/")));
    }
}
