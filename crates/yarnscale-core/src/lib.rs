//! yarnscale-core: shared types, scaling settings, and the traits the
//! subsystems talk through.

pub mod config;
pub mod settings;
pub mod traits;
pub mod types;

pub use config::DaemonConfig;
pub use settings::{CapacityBounds, ConfigError, MetricThreshold, ScalingSettings, SettingKey, Thresholds};
pub use traits::{BoxFuture, CapacityController, ConfigStore, MetricWindowStore, TelemetrySource};
pub use types::*;
