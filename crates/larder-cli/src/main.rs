//! `larder` binary: argument parsing, logging bootstrap, and wiring of
//! the HTTP surface and the Discord bridge runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use larder_core::date_codec::DEFAULT_DATE_FORMAT;
use larder_discord_runtime::{run_discord_bridge, DiscordRuntimeConfig};
use larder_gateway::{run_http_surface, RuntimeMetrics};
use larder_list::{ChannelListConfig, DEFAULT_MAX_CELL_WIDTH, DEFAULT_MESSAGE_LIMIT};
use larder_store::{ListStore, SqliteListStore};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "larder",
    about = "Chat-driven shared list manager for Discord channels",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "LARDER_DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token"
    )]
    discord_token: String,

    #[arg(
        long,
        env = "LARDER_BOT_USER_ID",
        help = "Bot user id; resolved via the API when omitted"
    )]
    bot_user_id: Option<String>,

    #[arg(
        long = "channel",
        env = "LARDER_CHANNELS",
        value_delimiter = ',',
        required = true,
        help = "Managed channel as name=channel_id; repeatable"
    )]
    channels: Vec<String>,

    #[arg(
        long,
        env = "LARDER_MAX_CELL_WIDTH",
        default_value_t = DEFAULT_MAX_CELL_WIDTH,
        value_parser = parse_positive_usize,
        help = "Wrap width for the table item column"
    )]
    max_cell_width: usize,

    #[arg(
        long,
        env = "LARDER_DATE_FORMAT",
        default_value = DEFAULT_DATE_FORMAT,
        help = "strftime format for the table date column"
    )]
    date_format: String,

    #[arg(
        long,
        env = "LARDER_MESSAGE_LIMIT",
        default_value_t = DEFAULT_MESSAGE_LIMIT,
        value_parser = parse_positive_usize,
        help = "Transport message character limit used when chunking tables"
    )]
    message_limit: usize,

    #[arg(
        long,
        env = "LARDER_HTTP_BIND",
        default_value = "127.0.0.1:8080",
        help = "Bind address for the health/metrics surface"
    )]
    http_bind: SocketAddr,

    #[arg(
        long,
        env = "LARDER_SQLITE_PATH",
        help = "Optional sqlite path mirroring published lists"
    )]
    sqlite_path: Option<PathBuf>,

    #[arg(
        long,
        env = "LARDER_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord REST API base URL"
    )]
    api_base: String,

    #[arg(
        long,
        env = "LARDER_GATEWAY_URL",
        default_value = "wss://gateway.discord.gg/?v=10&encoding=json",
        help = "Discord gateway websocket URL"
    )]
    gateway_url: String,

    #[arg(
        long,
        env = "LARDER_HISTORY_FETCH_LIMIT",
        default_value_t = 100,
        value_parser = parse_positive_usize,
        help = "Messages fetched per reconcile cycle (max 100)"
    )]
    history_fetch_limit: usize,

    #[arg(
        long,
        env = "LARDER_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "REST request timeout in milliseconds"
    )]
    request_timeout_ms: u64,

    #[arg(
        long,
        env = "LARDER_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Attempt cap for retryable REST failures"
    )]
    retry_max_attempts: usize,

    #[arg(
        long,
        env = "LARDER_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for REST retry backoff"
    )]
    retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "LARDER_RECONNECT_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay before gateway reconnect attempts"
    )]
    reconnect_delay_ms: u64,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LARDER_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Parses a `name=channel_id` pair into a channel config.
fn parse_channel_spec(spec: &str, cli: &Cli) -> Result<ChannelListConfig> {
    let Some((name, channel_id)) = spec.split_once('=') else {
        bail!("invalid --channel '{spec}': expected name=channel_id");
    };
    let name = name.trim();
    let channel_id = channel_id.trim();
    if name.is_empty() || channel_id.is_empty() {
        bail!("invalid --channel '{spec}': name and channel_id must be non-empty");
    }
    let mut config = ChannelListConfig::new(channel_id, name);
    config.max_cell_width = cli.max_cell_width;
    config.date_format = cli.date_format.clone();
    config.message_limit = cli.message_limit;
    config
        .validate()
        .with_context(|| format!("invalid configuration for channel '{name}'"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut channels = Vec::with_capacity(cli.channels.len());
    for spec in &cli.channels {
        channels.push(parse_channel_spec(spec, &cli)?);
    }

    let store: Option<Arc<dyn ListStore>> = match &cli.sqlite_path {
        Some(path) => {
            let store = SqliteListStore::open(path)
                .with_context(|| format!("failed to open sqlite mirror at {}", path.display()))?;
            Some(Arc::new(store))
        }
        None => None,
    };

    let metrics = Arc::new(RuntimeMetrics::default());
    let http_surface = tokio::spawn(run_http_surface(cli.http_bind, metrics.clone()));

    let runtime_config = DiscordRuntimeConfig {
        bot_token: cli.discord_token.clone(),
        bot_user_id: cli.bot_user_id.clone(),
        api_base: cli.api_base.clone(),
        gateway_url: cli.gateway_url.clone(),
        channels,
        history_fetch_limit: cli.history_fetch_limit.min(100),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
        store,
        metrics,
    };

    tracing::info!(
        channels = runtime_config.channels.len(),
        http_bind = %cli.http_bind,
        "starting larder"
    );

    let bridge = run_discord_bridge(runtime_config);
    tokio::select! {
        result = bridge => {
            result.context("discord bridge exited")?;
        }
        result = http_surface => {
            match result {
                Ok(surface_result) => surface_result.context("http surface exited")?,
                Err(error) => bail!("http surface task failed: {error}"),
            }
        }
    }
    Ok(())
}
