//! redb table definitions for the yarnscale state store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized
//! domain types). Time-series keys embed a zero-padded timestamp so that
//! lexicographic key order equals time order and windows are range scans.

use redb::TableDefinition;

/// Scalar configuration values keyed by `/{prefix}/{name}`.
pub const CONFIG: TableDefinition<&str, &str> = TableDefinition::new("config");

/// Metric samples keyed by `{cluster}/{metric}/{timestamp:020}`.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// Cooldown timestamps, one row keyed by `{cluster}`.
pub const SCALE_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("scale_state");

/// Policy application audit log keyed by `{cluster}/{timestamp:020}/{seq:04}`.
pub const POLICY_LOG: TableDefinition<&str, &[u8]> = TableDefinition::new("policy_log");

/// Shadow control-plane snapshot keyed by `{cluster}`.
pub const CONTROL_PLANE: TableDefinition<&str, &[u8]> = TableDefinition::new("control_plane");
