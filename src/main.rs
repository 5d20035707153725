use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::time::Duration;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::bot::{JukeboxBot, Sessions};
use crate::config::Config;
use crate::sources::YtDlpClient;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Jukebox v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Config::load()?;
    info!("{}", config.summary());

    let source = YtDlpClient::new(&config.ytdlp_path)?;
    if let Err(e) = source.verify().await {
        warn!("⚠️ yt-dlp is not usable, playback will fail: {}", e);
    }

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    let handler = JukeboxBot::new(config.clone(), source);
    let sessions = handler.sessions.clone();

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing sessions...");
        sessions.shutdown_all();
        wait_for_sessions(&sessions).await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Gives torn-down sessions a few seconds to leave their voice channels.
async fn wait_for_sessions(sessions: &Sessions) {
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while !sessions.is_empty() {
        if tokio::time::Instant::now() >= deadline {
            warn!("⚠️ {} session(s) still draining, shutting down anyway", sessions.len());
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("✅ All sessions closed");
}

/// `--health-check`: exits successfully when yt-dlp and ffmpeg run.
async fn health_check() -> Result<()> {
    let ytdlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
    YtDlpClient::new(ytdlp_path)?.verify().await?;

    let ffmpeg = tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg is missing");
    }
}
