//! clawdeck entry point.

mod chat;
mod commands;
mod format;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clawdeck_state::{GatewayStore, Theme};

#[derive(Parser)]
#[command(name = "clawdeck", version)]
#[command(about = "Control client for an agent gateway", long_about = None)]
struct Cli {
    /// Gateway WebSocket URL (overrides settings and CLAWDECK_GATEWAY_URL)
    #[arg(long, global = true, value_name = "URL")]
    url: Option<String>,

    /// Gateway auth token (overrides settings and CLAWDECK_GATEWAY_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, then show the gateway hello
    Status,

    /// Scheduled jobs
    Cron {
        #[command(subcommand)]
        action: CronCommand,
    },

    /// Gateway configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// List agents
    Agents,

    /// Show channel connection status
    Channels,

    /// List sessions
    Sessions,

    /// Show skill eligibility
    Skills,

    /// Chat with an agent session (interactive)
    Chat {
        /// Session key (default: the gateway's main session)
        #[arg(long, value_name = "KEY")]
        session: Option<String>,
    },

    /// Local settings file
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum CronCommand {
    /// List jobs
    List,
    /// Show scheduler status
    Status,
    /// Show the run log of a job
    Runs { id: String },
    /// Run a job now
    Run { id: String },
    /// Enable a job
    Enable { id: String },
    /// Disable a job
    Disable { id: String },
    /// Delete a job
    Remove { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the configuration
    Get {
        /// Print the raw file instead of the parsed JSON
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the effective settings
    Show,
    /// Save the given --url, --token, and --theme
    Set {
        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,
    },
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    Theme::parse(s).ok_or_else(|| format!("unknown theme '{s}' (light, dark, system)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Command::Settings { action } => return commands::settings(action, cli.url, cli.token),
        command => command,
    };

    let settings = commands::resolve_settings(cli.url, cli.token);
    tracing::debug!(url = %settings.gateway_url, "settings resolved");

    let store = GatewayStore::new(settings);
    commands::connect(&store).await?;
    let result = commands::run(&store, command).await;
    store.disconnect().await;
    result
}
