//! Autoscaler: one evaluate/gate/adjust cycle per tick for one cluster.
//!
//! Settings are reloaded from the configuration store at the start of
//! every cycle. Cycles never overlap: a tick that finds the previous cycle
//! still running is skipped.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use yarnscale_core::{
    settings::DEFAULT_PREFIX, CapacityController, ComputeLimits, ConfigStore, Decision,
    Direction, MetricWindowStore, ScalingSettings, TelemetrySource,
};
use yarnscale_state::StateStore;

use crate::adjuster::{AdjustOutcome, CapacityAdjuster};
use crate::cooldown::CooldownGate;
use crate::decision::{Assessment, DecisionEngine, DirectionMeans};
use crate::error::ScaleResult;
use crate::window::WindowEvaluator;

/// Default bound on every remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A decision together with everything it was made from.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub assessment: Assessment,
    pub policy: ComputeLimits,
    #[serde(skip)]
    pub settings: ScalingSettings,
}

/// What a cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CycleOutcome {
    /// The previous cycle was still running.
    Busy,
    NoOp,
    /// A decision was made but its cooldown has not elapsed.
    CoolingDown(Direction),
    Adjusted(AdjustOutcome),
}

/// The scaling controller for one cluster.
pub struct Autoscaler {
    cluster: String,
    prefix: String,
    config: Arc<dyn ConfigStore>,
    windows: Arc<dyn MetricWindowStore>,
    gate: CooldownGate,
    adjuster: CapacityAdjuster,
    cycle_lock: Mutex<()>,
}

impl Autoscaler {
    /// Create an autoscaler that reads settings and samples from `state`.
    pub fn new(
        cluster: impl Into<String>,
        state: StateStore,
        telemetry: Arc<dyn TelemetrySource>,
        controller: Arc<dyn CapacityController>,
    ) -> Self {
        let cluster = cluster.into();
        let shared = Arc::new(state.clone());
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            config: shared.clone(),
            windows: shared,
            gate: CooldownGate::new(state.clone(), cluster.clone()),
            adjuster: CapacityAdjuster::new(
                cluster.clone(),
                controller,
                telemetry,
                state,
                DEFAULT_CALL_TIMEOUT,
            ),
            cycle_lock: Mutex::new(()),
            cluster,
        }
    }

    /// Set the configuration key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Read settings from a different configuration store.
    pub fn with_config_store(mut self, config: Arc<dyn ConfigStore>) -> Self {
        self.config = config;
        self
    }

    /// Set the bound applied to every remote call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.adjuster.call_timeout = timeout;
        self
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn load_settings(&self) -> ScaleResult<ScalingSettings> {
        Ok(ScalingSettings::load(self.config.as_ref(), &self.prefix)?)
    }

    /// Evaluate the current windows into a decision.
    pub async fn evaluate(&self) -> ScaleResult<Decision> {
        Ok(self.evaluate_at(epoch_secs()).await?.decision)
    }

    pub async fn evaluate_at(&self, now: u64) -> ScaleResult<Evaluation> {
        let settings = self.load_settings()?;
        let policy = self.adjuster.get_policy().await?;
        let evaluator = WindowEvaluator::new(
            self.windows.as_ref(),
            &self.cluster,
            settings.monitor_interval_secs,
            settings.data_sufficiency_ratio,
        );
        let out_means = DirectionMeans::collect(&evaluator, Direction::Out, &settings.scale_out, now);
        let in_means = DirectionMeans::collect(&evaluator, Direction::In, &settings.scale_in, now);

        let engine = DecisionEngine {
            bounds: &settings.bounds,
            scale_out: &settings.scale_out,
            scale_in: &settings.scale_in,
        };
        let assessment = engine.decide(out_means, in_means, policy.maximum_units)?;
        assessment.log(&self.cluster);

        Ok(Evaluation {
            decision: assessment.decision,
            assessment,
            policy,
            settings,
        })
    }

    /// Apply a scale-out now, without consulting the cooldown.
    pub async fn apply_scale_out(&self) -> ScaleResult<AdjustOutcome> {
        self.apply_at(Direction::Out, epoch_secs()).await
    }

    /// Apply a scale-in now, without consulting the cooldown.
    pub async fn apply_scale_in(&self) -> ScaleResult<AdjustOutcome> {
        self.apply_at(Direction::In, epoch_secs()).await
    }

    pub async fn apply_at(&self, direction: Direction, now: u64) -> ScaleResult<AdjustOutcome> {
        let settings = self.load_settings()?;
        let policy = self.adjuster.get_policy().await?;
        self.adjust(direction, &policy, &settings, now).await
    }

    async fn adjust(
        &self,
        direction: Direction,
        policy: &ComputeLimits,
        settings: &ScalingSettings,
        now: u64,
    ) -> ScaleResult<AdjustOutcome> {
        match direction {
            Direction::Out => self.adjuster.scale_out(policy, settings, &self.gate, now).await,
            Direction::In => self.adjuster.scale_in(policy, settings, &self.gate, now).await,
        }
    }

    /// Whether a cooldown currently allows `direction` at `now`.
    pub fn try_scale(&self, direction: Direction, now: u64) -> ScaleResult<bool> {
        let settings = self.load_settings()?;
        self.gate
            .try_scale(direction, now, settings.cooldown_secs(direction))
    }

    /// Run one evaluate → gate → adjust cycle.
    pub async fn run_cycle(&self) -> ScaleResult<CycleOutcome> {
        self.run_cycle_at(epoch_secs()).await
    }

    pub async fn run_cycle_at(&self, now: u64) -> ScaleResult<CycleOutcome> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!(cluster = %self.cluster, "previous cycle still running, skipping");
            return Ok(CycleOutcome::Busy);
        };

        let evaluation = self.evaluate_at(now).await?;
        let Some(direction) = evaluation.decision.direction() else {
            return Ok(CycleOutcome::NoOp);
        };

        let cooldown = evaluation.settings.cooldown_secs(direction);
        if !self.gate.try_scale(direction, now, cooldown)? {
            return Ok(CycleOutcome::CoolingDown(direction));
        }

        let outcome = self
            .adjust(direction, &evaluation.policy, &evaluation.settings, now)
            .await?;
        Ok(CycleOutcome::Adjusted(outcome))
    }

    /// Run the control loop until shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            cluster = %self.cluster,
            interval_secs = interval.as_secs(),
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.run_cycle().await {
                        Ok(outcome) => debug!(cluster = %self.cluster, ?outcome, "cycle complete"),
                        Err(e) => error!(cluster = %self.cluster, error = %e, "autoscaler cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!(cluster = %self.cluster, "autoscaler shutting down");
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
