//! yarnscale-state: embedded state store for yarnscale.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the controller's configuration values, sampled metric time
//! series, cooldown state, and the policy application audit log.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns; config
//! scalars are stored as plain strings. Time-series keys embed zero-padded
//! timestamps, so a metric window is a single range scan.
//!
//! The audit append and the cooldown update for an action are written in
//! one write transaction; a reader never sees one without the other.
//!
//! `ShadowController` keeps a local stand-in for the remote control plane
//! in the same database.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod shadow;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use shadow::ShadowController;
pub use store::StateStore;
pub use types::*;
