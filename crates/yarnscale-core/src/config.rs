//! yarnscale.toml daemon configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::DEFAULT_PREFIX;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    /// Base URL of the YARN ResourceManager, e.g. `http://10.0.0.5:8088`.
    pub resource_manager_url: String,
    /// Configuration key prefix in the config store.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Days of samples kept before purging.
    pub retention_days: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/yarnscale"),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Sampling interval in seconds. Should match `monitorIntervalSeconds`.
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Evaluation interval in seconds.
    pub interval_secs: u64,
    /// Timeout applied to every remote call.
    pub call_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            call_timeout_secs: 10,
        }
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject intervals and timeouts the daemon loops cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.cluster.id.is_empty(), "cluster.id must not be empty");
        for (name, secs) in [
            ("telemetry.interval_secs", self.telemetry.interval_secs),
            ("telemetry.request_timeout_secs", self.telemetry.request_timeout_secs),
            ("controller.interval_secs", self.controller.interval_secs),
            ("controller.call_timeout_secs", self.controller.call_timeout_secs),
        ] {
            anyhow::ensure!(secs > 0, "{name} must be positive");
        }
        let days = self.storage.retention_days;
        anyhow::ensure!(days > 0, "storage.retention_days must be positive");
        anyhow::ensure!(
            days.checked_mul(SECS_PER_DAY).is_some(),
            "storage.retention_days ({days}) is too large"
        );
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the redb database for this cluster.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(format!("{}.redb", sanitize(&self.cluster.id)))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.retention_days.saturating_mul(SECS_PER_DAY))
    }

    /// Scaffold a minimal yarnscale.toml.
    pub fn scaffold(cluster_id: &str, resource_manager_url: &str) -> Self {
        DaemonConfig {
            cluster: ClusterConfig {
                id: cluster_id.to_string(),
                resource_manager_url: resource_manager_url.to_string(),
                prefix: default_prefix(),
            },
            storage: StorageConfig::default(),
            telemetry: TelemetryConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

/// Replace anything but alphanumerics and `_` with `_`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = DaemonConfig::scaffold("j-1F74M1P9SC57B", "http://10.0.0.5:8088");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("j-1F74M1P9SC57B"));
        assert!(toml_str.contains("managedScalingEnhanced"));
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[cluster]
id = "j-ABC"
resource_manager_url = "http://rm:8088"
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cluster.id, "j-ABC");
        assert_eq!(config.cluster.prefix, DEFAULT_PREFIX);
        assert_eq!(config.storage.retention_days, 30);
        assert_eq!(config.telemetry.interval_secs, 20);
        assert_eq!(config.controller.call_timeout_secs, 10);
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        assert!(DaemonConfig::scaffold("c", "http://rm:8088").validate().is_ok());

        let mut config = DaemonConfig::scaffold("c", "http://rm:8088");
        config.telemetry.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::scaffold("c", "http://rm:8088");
        config.controller.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::scaffold("c", "http://rm:8088");
        config.controller.call_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::scaffold("c", "http://rm:8088");
        config.storage.retention_days = u64::MAX / 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yarnscale.toml");
        std::fs::write(
            &path,
            r#"
[cluster]
id = "j-ABC"
resource_manager_url = "http://rm:8088"

[controller]
interval_secs = 0
call_timeout_secs = 10
"#,
        )
        .unwrap();

        let err = DaemonConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("controller.interval_secs"));
    }

    #[test]
    fn test_db_path_is_sanitized() {
        let mut config = DaemonConfig::scaffold("j-1F74", "http://rm:8088");
        config.storage.data_dir = PathBuf::from("/tmp/ys");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/ys/j_1F74.redb"));
    }

    #[test]
    fn test_retention_in_seconds() {
        let config = DaemonConfig::scaffold("c", "http://rm:8088");
        assert_eq!(config.retention(), Duration::from_secs(30 * 86_400));
    }
}
