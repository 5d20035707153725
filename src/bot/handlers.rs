use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        guild::Member,
        id::{ChannelId, GuildId},
        user::User,
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        scheduler::{PlaybackDriver, TrackResolver},
        session::Session,
        track::Requester,
    },
    bot::{search, JoinTarget, JukeboxBot},
    error::{ControlError, ControlResult},
    sources::MusicSource,
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// A queue or playback command that only needs the guild's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Volume(Option<i64>),
    Jump(i64),
    Remove(Option<i64>),
    Clear,
    Seek(i64),
    Skip,
    Pause,
    Resume,
    Shuffle,
    LoopQueue,
    LoopTrack,
}

impl Control {
    /// Maps a slash command and its integer option to a control.
    pub fn parse(name: &str, arg: Option<i64>) -> Option<Self> {
        let control = match name {
            "volume" => Self::Volume(arg),
            "jump" => Self::Jump(arg.unwrap_or(0)),
            "remove" => Self::Remove(arg),
            "clear" => Self::Clear,
            "seek" => Self::Seek(arg.unwrap_or(0)),
            "skip" => Self::Skip,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "shuffle" => Self::Shuffle,
            "loop_queue" => Self::LoopQueue,
            "loop_track" => Self::LoopTrack,
            _ => return None,
        };
        Some(control)
    }
}

/// What a successful control replies with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success { title: String, description: String },
    Volume { now: f32, previous: Option<f32> },
}

impl Reply {
    fn success(title: &str, description: impl Into<String>) -> Self {
        Self::Success {
            title: title.to_string(),
            description: description.into(),
        }
    }

    pub fn embed(&self) -> CreateEmbed {
        match self {
            Self::Success { title, description } => embeds::create_success_embed(title, description),
            Self::Volume { now, previous } => embeds::create_volume_embed(*now, *previous),
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// 1-based positions from a command option; anything below 1 maps to 0,
/// which the session rejects as out of range.
fn position(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

/// Applies a control to a session.
pub async fn run_control<R, P>(control: Control, session: &Session<R, P>) -> ControlResult<Reply>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    let reply = match control {
        Control::Volume(None) => Reply::Volume {
            now: session.state().volume,
            previous: None,
        },
        Control::Volume(Some(percent)) => {
            let volume = percent as f32 / 100.0;
            let previous = session.set_volume(volume).await?;
            Reply::Volume {
                now: volume,
                previous: Some(previous),
            }
        }
        Control::Jump(index) => {
            let index = position(index);
            session.jump(index)?;
            Reply::success("Jump", format!("Track #{} will play next.", index))
        }
        Control::Remove(index) => {
            let removed = session.remove(index.map(position))?;
            Reply::success("Removed", format!("**{}** was removed from the queue.", removed.title))
        }
        Control::Clear => {
            session.clear().await?;
            Reply::success("Cleared", "The queue is empty.")
        }
        Control::Seek(seconds) => {
            let seconds = seconds.max(0) as u64;
            session.seek(seconds).await?;
            Reply::success("Seek", format!("Restarting at {}s.", seconds))
        }
        Control::Skip => {
            session.skip().await?;
            Reply::success("Skipped", "Moving on to the next track.")
        }
        Control::Pause => {
            session.pause().await?;
            Reply::success("Paused", "Use /resume to continue.")
        }
        Control::Resume => {
            session.resume().await?;
            Reply::success("Resumed", "Playback continues.")
        }
        Control::Shuffle => {
            session.shuffle();
            Reply::success("Shuffled", "The upcoming tracks were shuffled.")
        }
        Control::LoopQueue => {
            let enabled = session.toggle_loop_queue();
            Reply::success("Loop queue", format!("Loop queue {}.", on_off(enabled)))
        }
        Control::LoopTrack => {
            let enabled = session.toggle_loop_track();
            Reply::success("Loop track", format!("Loop track {}.", on_off(enabled)))
        }
    };
    Ok(reply)
}

fn control_error_embed(error: &ControlError) -> CreateEmbed {
    embeds::create_error_embed("Error", &error.to_string())
}

/// Display name for the queue listing: the guild nickname when there is one.
pub fn requester(member: Option<&Member>, user: &User) -> Requester {
    let name = member
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| user.display_name().to_string());
    Requester::new(user.id, name)
}

/// Handles slash commands.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a guild"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "search" => search::handle_search(ctx, &command, bot).await?,
        "playlist" => search::handle_playlist(ctx, &command, bot).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        name => {
            let arg = command.data.options.first().and_then(|o| o.value.as_i64());
            let embed = match Control::parse(name, arg) {
                Some(control) => {
                    let result = match bot.sessions.get(guild_id) {
                        Some(session) => run_control(control, &*session).await,
                        None => Err(ControlError::NotConnected),
                    };
                    result
                        .map(|reply| reply.embed())
                        .unwrap_or_else(|e| control_error_embed(&e))
                }
                None => embeds::create_error_embed("Unknown command", "This command is not supported."),
            };
            respond(ctx, &command, embed).await?;
        }
    }

    Ok(())
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// A string option of a slash command, by name.
pub(crate) fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str())
}

/// Looks `query` up, joins the user's channel if needed and queues the
/// results. Shared by `/play` and the search picker.
pub async fn enqueue_query(
    ctx: &Context,
    bot: &JukeboxBot,
    guild_id: GuildId,
    requester: Requester,
    text_channel: ChannelId,
    query: &str,
) -> CreateEmbed {
    let tracks = match bot.source.lookup(query, &requester).await {
        Ok(tracks) => tracks,
        Err(e) => {
            warn!("❌ {} lookup of '{}' failed: {}", bot.source.source_name(), query, e);
            return embeds::create_error_embed("Nothing found", &format!("Could not load `{}`.", query));
        }
    };

    let session = match bot
        .session_for_play(ctx, guild_id, requester.id, text_channel)
        .await
    {
        Ok(session) => session,
        Err(e) => return embeds::create_error_embed("Cannot play", &e.to_string()),
    };

    match session.enqueue(tracks.clone()).await {
        Ok(outcome) => embeds::create_tracks_added_embed(&tracks, &outcome),
        Err(e) => control_error_embed(&e),
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?
        .to_string();

    command.defer(&ctx.http).await?;

    let requester = requester(command.member.as_deref(), &command.user);
    let embed = enqueue_query(ctx, bot, guild_id, requester, command.channel_id, &query).await;

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

/// Re-sends the player at the bottom of the session's text channel.
async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.sessions.get(guild_id) {
        Some(session) if session.now_playing().is_some() => {
            session.refresh_status().await;
            embeds::create_success_embed("Now playing", "The player has been refreshed.")
        }
        _ => control_error_embed(&ControlError::NoActiveTrack),
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed).ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let requested = command
        .data
        .options
        .iter()
        .find(|o| o.name == "channel")
        .and_then(|o| o.value.as_channel_id());

    // Connecting can outlast the interaction deadline.
    command.defer(&ctx.http).await?;

    let embed = match bot.join(ctx, guild_id, command.user.id, requested).await {
        Ok(JoinTarget::Connect(channel)) => embeds::create_success_embed(
            "Connected",
            &format!("Connected to channel: <#{}>.", channel),
        ),
        Ok(JoinTarget::Move(channel)) => {
            embeds::create_success_embed("Moved", &format!("Moved to channel: <#{}>.", channel))
        }
        Ok(JoinTarget::AlreadyThere) => {
            embeds::create_info_embed("Join", "I'm already in the channel.")
        }
        Ok(JoinTarget::NoChannel) => {
            embeds::create_error_embed("Join", "Specify voice channel or join one first.")
        }
        Err(e) => embeds::create_error_embed("Cannot join", &e.to_string()),
    };
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = if bot.sessions.teardown(guild_id) || bot.leave_idle_call(ctx, guild_id).await {
        embeds::create_success_embed("Disconnected", "👋 Left the voice channel.")
    } else {
        control_error_embed(&ControlError::NotConnected)
    };
    respond(ctx, command, embed).await
}

/// Handles the player buttons and the search picker.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Component used outside a guild"))?;

    info!(
        "🔘 {} pressed by {} in guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    if component.data.custom_id == button_ids::TRACK_SELECT {
        return search::handle_track_selection(ctx, &component, bot, guild_id).await;
    }

    let Some(session) = bot.sessions.get(guild_id) else {
        return respond_ephemeral(ctx, &component, &ControlError::NotConnected).await;
    };

    let result = match component.data.custom_id.as_str() {
        button_ids::PLAY_PAUSE if session.state().paused => session.resume().await,
        button_ids::PLAY_PAUSE => session.pause().await,
        button_ids::SKIP => session.skip().await,
        button_ids::LOOP_QUEUE => {
            session.toggle_loop_queue();
            Ok(())
        }
        button_ids::LOOP_TRACK => {
            session.toggle_loop_track();
            Ok(())
        }
        button_ids::SHUFFLE => {
            session.shuffle();
            Ok(())
        }
        button_ids::REFRESH => Ok(()),
        other => {
            warn!("Unknown component id: {}", other);
            Ok(())
        }
    };

    if let Err(e) = result {
        return respond_ephemeral(ctx, &component, &e).await;
    }

    // A skipped track is replaced by a fresh now-playing message.
    let view = (component.data.custom_id != button_ids::SKIP)
        .then(|| session.now_playing())
        .flatten();
    let response = match view {
        Some(view) => CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .components(buttons::create_player_buttons(&view))
                .content(view.content),
        ),
        None => CreateInteractionResponse::Acknowledge,
    };
    component.create_response(&ctx.http, response).await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    component: &ComponentInteraction,
    error: &ControlError,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(control_error_embed(error))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
