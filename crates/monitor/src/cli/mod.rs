pub mod config;

use clap::{Parser, Subcommand};

/// ConvMonitor — correlates conversation segments from NATS and forwards
/// sessions to an analysis agent.
#[derive(Debug, Parser)]
#[command(name = "convmonitor", version, about)]
pub struct Cli {
    /// Path to the YAML config file (also `CM_CONFIG`).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the monitor (default when no subcommand is given).
    Run {
        /// Agent API base URL, overriding config and `CM_AGENT_URL`.
        #[arg(long)]
        api_base_url: Option<String>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as YAML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path (flag > `CM_CONFIG` > `conf/monitor.yml`) and
/// load it, falling back to defaults on a missing or unparseable file.
/// Environment overrides for the bus and agent URLs are applied on top.
///
/// Shared by `run` and the `config` subcommands so the logic lives in
/// one place.
pub fn load_config(flag: Option<&str>) -> (cm_domain::config::Config, String) {
    let config_path = flag
        .map(str::to_owned)
        .or_else(|| std::env::var("CM_CONFIG").ok())
        .unwrap_or_else(|| "conf/monitor.yml".into());

    let mut config = cm_domain::config::Config::load_or_default(std::path::Path::new(&config_path));
    config.apply_env_overrides();

    (config, config_path)
}
