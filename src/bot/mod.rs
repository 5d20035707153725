//! # Bot Module
//!
//! Discord glue around the playback sessions.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands, dispatches interactions to [`handlers`], and tears sessions
//! down when the bot is disconnected or left alone in its voice channel.
//! `/join` connects or moves the bot without starting a session.
//!
//! Sessions themselves live in a [`SessionRegistry`]; a session is created by
//! the first `/play` (or track selection) in a guild, joining the caller's
//! voice channel.

use anyhow::Result;
use serenity::{
    all::{ActivityData, ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use songbird::{Call, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod search;
pub mod status;

use crate::{
    audio::{player::SongbirdDriver, registry::SessionRegistry, session::Session},
    config::Config,
    sources::YtDlpClient,
};
use status::StatusBoard;

pub type GuildSession = Session<YtDlpClient, SongbirdDriver>;
pub type Sessions = SessionRegistry<YtDlpClient, SongbirdDriver>;

/// Main Discord bot handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    /// Metadata lookups and stream resolution.
    pub source: YtDlpClient,
    pub sessions: Arc<Sessions>,
}

impl JukeboxBot {
    pub fn new(config: Config, source: YtDlpClient) -> Self {
        Self {
            config: Arc::new(config),
            source,
            sessions: Arc::new(Sessions::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set (instant
    /// propagation) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}, commands not registered", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check the 'applications.commands' scope."
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check the 'applications.commands' scope."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// The guild's session, joining the user's voice channel and starting a
    /// new one if needed.
    pub async fn session_for_play(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
        text_channel: ChannelId,
    ) -> Result<Arc<GuildSession>> {
        if let Some(session) = self.sessions.get(guild_id) {
            return Ok(session);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird is not initialized"))?;

        // A bot placed with `/join` keeps its channel.
        let call = match connected_call(&manager, guild_id).await {
            Some(call) => call,
            None => {
                let voice_channel = user_voice_channel(ctx, guild_id, user_id)
                    .ok_or_else(|| anyhow::anyhow!("You need to be in a voice channel."))?;
                let call = manager.join(guild_id, voice_channel).await.map_err(|e| {
                    error!("❌ Could not join voice channel {}: {:?}", voice_channel, e);
                    anyhow::anyhow!("Could not join your voice channel.")
                })?;
                info!("🔊 Connected to voice channel {} in guild {}", voice_channel, guild_id);
                call
            }
        };

        let driver = SongbirdDriver::new(manager, guild_id, call);
        let board = Arc::new(StatusBoard::new(ctx.http.clone(), text_channel));
        let source = self.source.clone();
        let settings = self.config.session_settings();

        Ok(self
            .sessions
            .get_or_create(guild_id, || Session::new(guild_id, source, driver, board, settings)))
    }

    /// `/join`: connects to `requested` (or the caller's channel), moving the
    /// existing call if the bot is elsewhere.
    pub async fn join(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
        requested: Option<ChannelId>,
    ) -> Result<JoinTarget> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird is not initialized"))?;

        let current = match connected_call(&manager, guild_id).await {
            Some(call) => call
                .lock()
                .await
                .current_channel()
                .map(|channel| ChannelId::new(channel.0.get())),
            None => None,
        };
        let target = join_target(requested, user_voice_channel(ctx, guild_id, user_id), current);

        if let JoinTarget::Connect(channel) | JoinTarget::Move(channel) = target {
            manager.join(guild_id, channel).await.map_err(|e| {
                error!("❌ Could not join voice channel {}: {:?}", channel, e);
                anyhow::anyhow!("Could not connect to <#{}>.", channel)
            })?;
            info!("🔊 {:?} in guild {}", target, guild_id);
        }
        Ok(target)
    }

    /// Leaves a call opened by `/join` that no session owns.
    pub async fn leave_idle_call(&self, ctx: &Context, guild_id: GuildId) -> bool {
        let Some(manager) = songbird::get(ctx).await else {
            return false;
        };
        if connected_call(&manager, guild_id).await.is_none() {
            return false;
        }
        match manager.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Left the voice channel in guild {}", guild_id);
                true
            }
            Err(e) => {
                warn!("⚠️ Could not leave the voice channel in guild {}: {:?}", guild_id, e);
                false
            }
        }
    }
}

/// What `/join` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTarget {
    Connect(ChannelId),
    Move(ChannelId),
    AlreadyThere,
    /// No channel given and the caller is not in voice.
    NoChannel,
}

/// Picks the `/join` channel: the requested one, else the caller's.
pub fn join_target(
    requested: Option<ChannelId>,
    caller: Option<ChannelId>,
    current: Option<ChannelId>,
) -> JoinTarget {
    let Some(target) = requested.or(caller) else {
        return JoinTarget::NoChannel;
    };
    match current {
        Some(current) if current == target => JoinTarget::AlreadyThere,
        Some(_) => JoinTarget::Move(target),
        None => JoinTarget::Connect(target),
    }
}

/// The guild's songbird call, if it is connected to a channel.
async fn connected_call(
    manager: &Songbird,
    guild_id: GuildId,
) -> Option<Arc<tokio::sync::Mutex<Call>>> {
    let call = manager.get(guild_id)?;
    let connected = call.lock().await.current_channel().is_some();
    connected.then_some(call)
}

/// The voice channel `user_id` is connected to, from the cache.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
}

/// Whether the bot's voice channel has no human listeners left.
fn bot_is_alone(ctx: &Context, guild_id: GuildId) -> bool {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };
    let Some(channel) = guild.voice_states.get(&bot_id).and_then(|s| s.channel_id) else {
        return false;
    };

    !guild.voice_states.values().any(|state| {
        state.channel_id == Some(channel)
            && state.user_id != bot_id
            && !guild
                .members
                .get(&state.user_id)
                .map(|m| m.user.bot)
                .unwrap_or(false)
    })
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guild(s)", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::listening(&self.config.activity)));

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("Error handling component: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Tears the session down when the bot is disconnected, or when the last
    /// listener leaves its channel.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let bot_id = ctx.cache.current_user().id;
        if new.user_id == bot_id && new.channel_id.is_none() {
            info!("🔌 Bot disconnected in guild {}", guild_id);
            self.sessions.teardown(guild_id);
            return;
        }

        if self.sessions.get(guild_id).is_some() && bot_is_alone(&ctx, guild_id) {
            info!("🚪 Alone in the voice channel of guild {}, leaving", guild_id);
            self.sessions.teardown(guild_id);
        }
    }
}
