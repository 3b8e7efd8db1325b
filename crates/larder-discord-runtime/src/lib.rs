//! Discord bridge runtime: gateway events in, reconciled tables out.

mod discord_runtime;

pub use discord_runtime::{run_discord_bridge, DiscordRuntimeConfig};
