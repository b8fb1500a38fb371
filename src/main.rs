use anyhow::{Context, Result};
use janitor::api::client::TransmissionClient;
use janitor::core::config::Config;
use janitor::core::orchestrator::run_once;
use janitor::core::tracing_init::init_tracing;
use janitor::stores::state_store::FileStateStore;
use janitor::utils::time::current_timestamp;
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path).context(format!(
        "Failed to load configuration from '{}'",
        config_path.display()
    ))?;

    init_tracing(&config.logging)?;

    // One pass over the torrents, one request at a time
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        endpoint = %config.transmission.rpc_url(),
        state_path = %config.state.path.display(),
        stabilization_delay = config.thresholds.stabilization_delay,
        min_download_rate = config.thresholds.min_download_rate,
        min_rate_duration = config.thresholds.min_rate_duration,
        post_completion_delay = config.thresholds.post_completion_delay,
        "Torrent janitor starting"
    );

    let client = TransmissionClient::from_config(&config.transmission)
        .context("Failed to create Transmission client")?;
    let store = FileStateStore::new(config.state.path.clone());

    match run_once(&client, &store, &config.thresholds, current_timestamp()).await {
        Ok(report) => {
            report.log_summary();
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            Err(e.into())
        }
    }
}
