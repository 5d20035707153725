use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::session::SessionSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Commands registered per guild while developing
    pub activity: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    /// `None` keeps idle sessions connected.
    pub idle_disconnect: Option<Duration>,

    // Sources
    pub search_results: usize,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup, `std::env` in
    /// production.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let idle_disconnect = humantime::parse_duration(&var("IDLE_DISCONNECT", "5m"))
            .context("IDLE_DISCONNECT is not a duration (e.g. 5m, 90s)")?;

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),
            activity: var("BOT_ACTIVITY", "music"),

            // Audio
            default_volume: var("DEFAULT_VOLUME", "0.1").parse()?,
            max_queue_size: var("MAX_QUEUE_SIZE", "1000").parse()?,
            idle_disconnect: (!idle_disconnect.is_zero()).then_some(idle_disconnect),

            // Sources
            search_results: var("SEARCH_RESULTS", "10").parse()?,
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks on configured values.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is empty");
        }

        if !(self.default_volume > 0.0 && self.default_volume <= 1.0) {
            anyhow::bail!("Default volume must be in (0, 1], got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if !(1..=25).contains(&self.search_results) {
            anyhow::bail!("Search results must be between 1 and 25, got: {}", self.search_results);
        }

        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: self.default_volume,
            max_queue_size: self.max_queue_size,
            idle_timeout: self.idle_disconnect,
            rng_seed: None,
        }
    }

    /// Configuration for logging, without the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, idle disconnect {}\n  \
            Sources: {} ({} search results)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.idle_disconnect
                .map_or("off".to_string(), |d| humantime::format_duration(d).to_string()),
            self.ytdlp_path,
            self.search_results,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            activity: "music".to_string(),

            default_volume: 0.1,
            max_queue_size: 1000,
            idle_disconnect: Some(Duration::from_secs(300)),

            search_results: 10,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
