use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, channel::ChannelType, id::GuildId},
    prelude::Context,
};

/// Registers the commands globally.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registers the commands for one guild (development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        search_command(),
        playlist_command(),
        volume_command(),
        jump_command(),
        remove_command(),
        CreateCommand::new("clear").description("Clear the queue and stop the current track"),
        seek_command(),
        CreateCommand::new("skip").description("Skip the current track"),
        CreateCommand::new("pause").description("Pause the current track"),
        CreateCommand::new("resume").description("Resume the paused track"),
        CreateCommand::new("shuffle").description("Shuffle the tracks after the current one"),
        CreateCommand::new("loop_queue").description("Loop the whole queue"),
        CreateCommand::new("loop_track").description("Loop the current track"),
        CreateCommand::new("nowplaying").description("Show the player"),
        join_command(),
        CreateCommand::new("leave").description("Stop playing and leave the voice channel"),
    ]
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a track or a playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search term")
                .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Search tracks and pick one")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Search term")
                .required(true),
        )
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Pick a track from a playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "Playlist URL")
                .required(true),
        )
}

// Queue control

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Show or change the volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "percent", "Volume (1-100)")
                .min_int_value(1)
                .max_int_value(100),
        )
}

fn jump_command() -> CreateCommand {
    CreateCommand::new("jump")
        .description("Play the given track after the current one")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Position in the queue")
                .min_int_value(1)
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Remove a track from the queue (the last one by default)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Position in the queue")
                .min_int_value(1),
        )
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Restart the current track at the given second")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "seconds", "Start position")
                .min_int_value(0)
                .required(true),
        )
}

// Voice

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Join a voice channel, yours by default")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "Voice channel to join")
                .channel_types(vec![ChannelType::Voice, ChannelType::Stage])
                .required(false),
        )
}
