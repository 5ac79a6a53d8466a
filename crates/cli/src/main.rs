mod config_commands;
mod console;
mod plugin_commands;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    selfbot_config::SelfbotConfig,
    selfbot_runtime::Runtime,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "selfbot", about = "selfbot: plugins and scheduled jobs for a chat account")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "SELFBOT_CONFIG")]
    config: Option<PathBuf>,
    /// Custom config directory (overrides the default user config dir).
    #[arg(long, global = true, env = "SELFBOT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Custom data directory (overrides the default data dir).
    #[arg(long, global = true, env = "SELFBOT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the runtime on a console transport (default when no subcommand is provided).
    Run,
    /// Plugin management.
    Plugins {
        #[command(subcommand)]
        action: plugin_commands::PluginAction,
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

    // Logs go to stderr so console replies on stdout stay readable.
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

fn load_config(cli: &Cli) -> anyhow::Result<SelfbotConfig> {
    match &cli.config {
        Some(path) => selfbot_config::load_config(path),
        None => Ok(selfbot_config::discover_and_load()),
    }
}

async fn run(config: SelfbotConfig) -> anyhow::Result<()> {
    let runtime = Runtime::builder(config)
        .transport(Arc::new(console::ConsoleTransport::new()))
        .build()?;
    runtime.start().await?;
    info!("type a message (commands start with the configured prefix), Ctrl-C to quit");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    runtime.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "selfbot starting");

    // Apply directory overrides before loading config
    if let Some(ref dir) = cli.config_dir {
        selfbot_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        selfbot_config::set_data_dir(dir.clone());
    }
    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Plugins { action }) => plugin_commands::handle_plugins(config, action).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, &config, cli.config)
        },
    }
}
