//! Daemon mode: runs the telemetry collector and the autoscaler side by
//! side until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use yarnscale_autoscale::Autoscaler;
use yarnscale_core::{DaemonConfig, ScalingSettings};
use yarnscale_state::{ShadowController, StateStore};
use yarnscale_telemetry::{TelemetryCollector, YarnClient};

/// Wire the autoscaler for `config` against the shadow control plane.
pub fn build(config: &DaemonConfig, state: StateStore) -> anyhow::Result<(Autoscaler, Arc<YarnClient>)> {
    let settings = ScalingSettings::load(&state, &config.cluster.prefix)
        .context("scaling parameters not usable (run `yarnscaled seed-config`)")?;
    if settings.monitor_interval_secs != config.telemetry.interval_secs {
        warn!(
            monitor_interval_secs = settings.monitor_interval_secs,
            telemetry_interval_secs = config.telemetry.interval_secs,
            "sampling interval differs from monitorIntervalSeconds, windows may read as insufficient"
        );
    }

    let telemetry = Arc::new(YarnClient::new(
        &config.cluster.resource_manager_url,
        Duration::from_secs(config.telemetry.request_timeout_secs),
    )?);

    let shadow = ShadowController::new(state.clone(), config.cluster.id.clone());
    shadow.ensure_initialized(
        settings.bounds.minimum_units,
        settings.bounds.maximum_on_demand_units,
    )?;

    let scaler = Autoscaler::new(
        config.cluster.id.clone(),
        state,
        telemetry.clone(),
        Arc::new(shadow),
    )
    .with_prefix(config.cluster.prefix.clone())
    .with_call_timeout(Duration::from_secs(config.controller.call_timeout_secs));

    Ok((scaler, telemetry))
}

pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(cluster = %config.cluster.id, "yarnscale daemon starting");

    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.db_path();
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let (scaler, telemetry) = build(&config, state.clone())?;
    info!(
        interval = config.controller.interval_secs,
        rm = %telemetry.address(),
        "autoscaler initialized"
    );

    let collector = TelemetryCollector::new(
        config.cluster.id.clone(),
        telemetry,
        state,
        Duration::from_secs(config.telemetry.interval_secs),
        config.retention(),
    );
    info!(interval = config.telemetry.interval_secs, "telemetry collector initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector_shutdown = shutdown_rx.clone();
    let autoscale_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let collector_handle = tokio::spawn(async move {
        collector.run(collector_shutdown).await;
    });

    let interval = Duration::from_secs(config.controller.interval_secs);
    let autoscale_handle = tokio::spawn(async move {
        scaler.run(interval, autoscale_shutdown).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = collector_handle.await;
    let _ = autoscale_handle.await;

    info!("yarnscale daemon stopped");
    Ok(())
}
