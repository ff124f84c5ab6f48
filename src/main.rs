//! Application entry: loads configuration, wires the connection pool,
//! gateway, and relay client together, and runs the flow named by a job
//! file. The report prints to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use launch_bundler::bundle::{BundleRelay, RelayClient};
use launch_bundler::config::Config;
use launch_bundler::connection::ConnectionPool;
use launch_bundler::flows::FlowRunner;
use launch_bundler::gateway::{ChainGateway, RpcGateway};
use launch_bundler::types::Job;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let mut config_path: Option<PathBuf> = None;
    let mut job_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            other => job_path = Some(PathBuf::from(other)),
        }
    }
    let job_path =
        job_path.context("usage: launch_bundler [--config <config.toml>] <job.toml>")?;

    let config = Config::load(config_path.as_deref())?;
    info!(
        rpc_endpoints = config.rpc_endpoints.len(),
        relays = config.relay_endpoints.len(),
        "Loaded config"
    );

    let raw_job = std::fs::read_to_string(&job_path)
        .with_context(|| format!("reading job file {}", job_path.display()))?;
    let job: Job =
        toml::from_str(&raw_job).with_context(|| format!("parsing {}", job_path.display()))?;

    let pool = Arc::new(ConnectionPool::new(
        config.rpc_endpoints.clone(),
        config.probe_timeout(),
    ));
    let gateway: Arc<dyn ChainGateway> = Arc::new(RpcGateway::new(pool));
    let relay: Arc<dyn BundleRelay> = Arc::new(RelayClient::new(config.relay_endpoints.clone()));
    let runner = FlowRunner::new(gateway, relay, config)?;

    let output = match job {
        Job::Create(request) => {
            serde_json::to_string_pretty(&runner.create_and_bundle(&request).await?)?
        }
        Job::Buy(request) => serde_json::to_string_pretty(&runner.buy_bundle(&request).await?)?,
        Job::Sell(request) => serde_json::to_string_pretty(&runner.sell_tokens(&request).await?)?,
        Job::Consolidate(request) => {
            serde_json::to_string_pretty(&runner.consolidate(&request).await?)?
        }
        Job::Distribute(request) => {
            serde_json::to_string_pretty(&runner.distribute(&request).await?)?
        }
        Job::Balances(request) => serde_json::to_string_pretty(&runner.balances(&request).await?)?,
        Job::Batches => serde_json::to_string_pretty(&runner.wallet_batches()?)?,
    };
    println!("{output}");
    Ok(())
}
