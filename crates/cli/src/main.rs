mod config_commands;
mod plugin_commands;
mod registry;
mod run_commands;
mod service_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    danmu_config::{DanmuConfig, discover_and_load, load_config},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "danmu", about = "Danmu: live-room events to your desktop, speakers and browser")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in `./` and the user config dir).
    #[arg(long, global = true, env = "DANMU_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a room and run every configured pipeline.
    Run(run_commands::RunArgs),
    /// Manage capture jobs on the remote service.
    Services {
        #[command(subcommand)]
        action: service_commands::ServiceAction,
    },
    /// List available plugins and their options.
    Plugins {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Rendered events go to stdout, so logs stay on stderr.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load `path`, or discover a config file, falling back to defaults.
pub(crate) fn load(path: Option<&Path>) -> Result<DanmuConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(discover_and_load().map(|(_, c)| c).unwrap_or_default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "danmu starting");

    let config_path = cli.config;
    match cli.command {
        Commands::Run(args) => {
            let config = load(config_path.as_deref())?;
            run_commands::handle_run(args, config).await
        },
        Commands::Services { action } => {
            let config = load(config_path.as_deref())?;
            service_commands::handle_services(action, &config.server).await
        },
        Commands::Plugins { json } => plugin_commands::handle_plugins(json),
        Commands::Config { action } => {
            config_commands::handle_config(action, config_path.as_deref())
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_room_and_overrides() {
        let cli = Cli::try_parse_from([
            "danmu",
            "--log-level",
            "debug",
            "run",
            "--platform",
            "bilibili",
            "--rid",
            "42",
            "--url",
            "ws://localhost:9000/x",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.platform, "bilibili");
        assert_eq!(args.rid, "42");
        assert_eq!(args.url.as_deref(), Some("ws://localhost:9000/x"));
        assert!(!args.start_service);
    }

    #[test]
    fn run_requires_platform_and_room() {
        assert!(Cli::try_parse_from(["danmu", "run", "--platform", "bilibili"]).is_err());
    }
}
