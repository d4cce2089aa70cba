use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cm_agent::{AgentSessionRouter, RestAgentClient};
use cm_domain::config::{Config, ConfigSeverity};
use cm_monitor::bus::Monitor;
use cm_monitor::cli::{load_config, Cli, Command, ConfigCommand};
use cm_monitor::correlator::Correlator;
use cm_policy::build_policy;
use cm_store::SegmentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_flag = cli.config.as_deref();

    match cli.command {
        // Default to run when no subcommand is given.
        None => run_monitor(config_flag, None).await,
        Some(Command::Run { api_base_url }) => {
            run_monitor(config_flag, api_base_url.as_deref()).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            init_cli_tracing();
            let (config, config_path) = load_config(config_flag);
            if !cm_monitor::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            init_cli_tracing();
            let (config, _config_path) = load_config(config_flag);
            cm_monitor::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("convmonitor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Build the pipeline and run the ingestion loop until shutdown.
async fn run_monitor(config_flag: Option<&str>, api_base_url: Option<&str>) -> anyhow::Result<()> {
    init_tracing();
    tracing::info!("ConvMonitor starting");

    let (mut config, config_path) = load_config(config_flag);
    if let Some(url) = api_base_url {
        config.agent.base_url = url.to_owned();
    }

    // Config issues are reported but never abort startup.
    for issue in config.validate() {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!(field = %issue.field, "{}", issue.message),
            ConfigSeverity::Warning => tracing::warn!(field = %issue.field, "{}", issue.message),
        }
    }
    tracing::info!(
        config = %config_path,
        nats_url = %config.nats.url,
        agent_url = %config.agent.base_url,
        policy = %config.policy.name,
        "configuration resolved"
    );

    let config = Arc::new(config);

    let store = Arc::new(SegmentStore::open(Path::new(&config.store.state_dir))?);
    let policy = build_policy(&config.policy);
    let provider = Arc::new(RestAgentClient::new(&config.agent)?);
    let router = Arc::new(AgentSessionRouter::new(provider, config.agent.owner.clone()));
    let correlator = Arc::new(Correlator::new(store.clone(), policy, router));

    let monitor = Monitor::new(config, correlator, store);
    monitor.run().await?;

    tracing::info!("ConvMonitor stopped");
    Ok(())
}

/// Structured JSON tracing for the long-running monitor.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cm_monitor=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Compact stderr-only tracing for one-shot CLI commands.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
