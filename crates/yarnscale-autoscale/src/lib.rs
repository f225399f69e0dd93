//! yarnscale-autoscale: the scaling decision and capacity adjustment engine.
//!
//! Reads rolling-window means of the sampled metrics, decides whether the
//! cluster's capacity ceiling should grow or shrink, and applies the new
//! ceiling through the remote control plane under cooldown rules.
//!
//! # Cycle
//!
//! ```text
//! ScalingSettings::load (hot reload)
//!   → WindowEvaluator (8 window means, data-sufficiency check)
//!   → DecisionEngine  (ScaleOut | ScaleIn | NoOp)
//!   → CooldownGate    (last action per direction)
//!   → CapacityAdjuster (clamp, put policy, rebalance/backfill, commit)
//! ```
//!
//! The cooldown timestamp and audit entry of an action are committed only
//! after the policy mutation succeeded.

pub mod adjuster;
pub mod controller;
pub mod cooldown;
pub mod decision;
pub mod error;
pub mod window;

pub use adjuster::{clamp_units, AdjustOutcome, CapacityAdjuster, LiveCounters};
pub use controller::{Autoscaler, CycleOutcome, Evaluation};
pub use cooldown::CooldownGate;
pub use decision::{Assessment, DecisionEngine, DirectionMeans};
pub use error::{ScaleError, ScaleResult};
pub use window::{WindowEvaluator, WindowMean};
