//! yarnscaled: the yarnscale daemon.
//!
//! Single binary that assembles the yarnscale subsystems for one cluster:
//! - State store (redb)
//! - Telemetry collector (YARN ResourceManager)
//! - Autoscaler
//! - Shadow control plane
//!
//! # Usage
//!
//! ```text
//! yarnscaled init --cluster-id j-1F74M1P9SC57B --resource-manager-url http://10.0.0.5:8088
//! yarnscaled seed-config
//! yarnscaled run
//! yarnscaled evaluate
//! yarnscaled history --limit 20
//! ```

mod daemon;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use yarnscale_core::{DaemonConfig, ScalingSettings};
use yarnscale_state::StateStore;
use yarnscale_telemetry::YarnClient;

#[derive(Parser)]
#[command(name = "yarnscaled", about = "yarnscale autoscaling daemon")]
struct Cli {
    /// Path to yarnscale.toml.
    #[arg(long, global = true, default_value = "yarnscale.toml")]
    config: PathBuf,

    /// Override the data directory from the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter yarnscale.toml.
    Init {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        resource_manager_url: String,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Write the default scaling parameters to the config store.
    SeedConfig {
        /// Overwrite values that already exist.
        #[arg(long)]
        overwrite: bool,
    },

    /// Run the collector and autoscaler until interrupted.
    Run {
        /// Override the ResourceManager URL from the config file.
        #[arg(long)]
        resource_manager_url: Option<String>,
    },

    /// Evaluate once and print the decision with its assessment.
    Evaluate,

    /// Print the scale state and recent policy applications.
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Init {
            cluster_id,
            resource_manager_url,
            force,
        } => init_config(&cli.config, &cluster_id, &resource_manager_url, force),
        Command::SeedConfig { overwrite } => {
            let config = load_config(&cli.config, cli.data_dir)?;
            seed_config(&config, overwrite)
        }
        Command::Run {
            resource_manager_url,
        } => {
            let mut config = load_config(&cli.config, cli.data_dir)?;
            if let Some(url) = resource_manager_url {
                config.cluster.resource_manager_url = url;
            }
            daemon::run(config).await
        }
        Command::Evaluate => {
            let config = load_config(&cli.config, cli.data_dir)?;
            evaluate(&config).await
        }
        Command::History { limit } => {
            let config = load_config(&cli.config, cli.data_dir)?;
            history(&config, limit)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,yarnscaled=debug,yarnscale=debug"));
    // Logs go to stderr; stdout carries command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path, data_dir: Option<PathBuf>) -> anyhow::Result<DaemonConfig> {
    let mut config = DaemonConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    Ok(config)
}

fn open_state(config: &DaemonConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let path = config.db_path();
    let state = StateStore::open(&path)?;
    info!(path = ?path, "state store opened");
    Ok(state)
}

fn init_config(
    path: &Path,
    cluster_id: &str,
    resource_manager_url: &str,
    force: bool,
) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace)", path.display());
    }
    // Validate the URL before writing it.
    YarnClient::new(resource_manager_url, std::time::Duration::from_secs(1))?;
    let config = DaemonConfig::scaffold(cluster_id, resource_manager_url);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn seed_config(config: &DaemonConfig, overwrite: bool) -> anyhow::Result<()> {
    let state = open_state(config)?;
    let entries = ScalingSettings::seed(&config.cluster.prefix);
    let written = state.put_configs(&entries, overwrite)?;
    info!(
        prefix = %config.cluster.prefix,
        written,
        total = entries.len(),
        "scaling parameters seeded"
    );
    println!(
        "seeded {written} of {} parameters under /{}/",
        entries.len(),
        config.cluster.prefix
    );
    Ok(())
}

async fn evaluate(config: &DaemonConfig) -> anyhow::Result<()> {
    let state = open_state(config)?;
    let (scaler, _) = daemon::build(config, state)?;
    let evaluation = scaler.evaluate_at(epoch_secs()).await?;
    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}

fn history(config: &DaemonConfig, limit: usize) -> anyhow::Result<()> {
    let state = open_state(config)?;
    let cluster = &config.cluster.id;
    let scale_state = state.get_scale_state(cluster)?;
    let applications = state.recent_applications(cluster, limit)?;
    let report = serde_json::json!({
        "cluster": cluster,
        "scale_state": scale_state,
        "recent_applications": applications,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

