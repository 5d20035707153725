use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::GuildId,
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::track::QueuedTrack,
    bot::{handlers, JukeboxBot},
    error::ResolutionError,
    sources::MusicSource,
    ui::{
        buttons::{self, MAX_SELECT_OPTIONS},
        embeds,
    },
};

/// `/search <query>`: offers the results in a select menu.
pub async fn handle_search(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let query = handlers::string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?
        .to_string();

    command.defer(&ctx.http).await?;

    let requester = handlers::requester(command.member.as_deref(), &command.user);
    let results = bot
        .source
        .search(&query, bot.config().search_results, &requester)
        .await;
    info!("🔍 Search '{}' by {}", query, requester.name);

    show_picker(ctx, command, &query, results).await
}

/// `/playlist <url>`: offers the playlist entries in a select menu.
pub async fn handle_playlist(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let url = handlers::string_option(command, "url")
        .ok_or_else(|| anyhow::anyhow!("Missing playlist URL"))?
        .to_string();

    command.defer(&ctx.http).await?;

    let requester = handlers::requester(command.member.as_deref(), &command.user);
    let results = bot.source.playlist(&url, &requester).await;

    show_picker(ctx, command, &url, results).await
}

/// Numbered listing of what the picker offers.
pub fn picker_description(tracks: &[QueuedTrack]) -> String {
    let shown = buttons::selectable(tracks);
    let mut description = shown
        .iter()
        .enumerate()
        .map(|(i, track)| format!("`{}.` {}", i + 1, track.title))
        .collect::<Vec<_>>()
        .join("\n");
    if tracks.len() > MAX_SELECT_OPTIONS {
        description.push_str(&format!(
            "\n\nShowing the last {} of {} tracks.",
            MAX_SELECT_OPTIONS,
            tracks.len()
        ));
    }
    description
}

async fn show_picker(
    ctx: &Context,
    command: &CommandInteraction,
    query: &str,
    results: Result<Vec<QueuedTrack>, ResolutionError>,
) -> Result<()> {
    let response = match results {
        Ok(tracks) if tracks.is_empty() => EditInteractionResponse::new().embed(
            embeds::create_error_embed("No results", &format!("Nothing found for `{}`.", query)),
        ),
        Ok(tracks) => EditInteractionResponse::new()
            .embed(embeds::create_info_embed("Choose a track!", &picker_description(&tracks)))
            .components(vec![buttons::create_track_select(&tracks)]),
        Err(e) => {
            warn!("❌ Could not load '{}': {}", query, e);
            EditInteractionResponse::new().embed(embeds::create_error_embed(
                "Search failed",
                &format!("Could not load `{}`.", query),
            ))
        }
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

/// A pick from the select menu: queues the chosen URL like `/play` does.
pub async fn handle_track_selection(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let url = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values.first().cloned(),
        _ => None,
    }
    .ok_or_else(|| anyhow::anyhow!("Track selection without a value"))?;

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let requester = handlers::requester(component.member.as_ref(), &component.user);
    let embed =
        handlers::enqueue_query(ctx, bot, guild_id, requester, component.channel_id, &url).await;

    component
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::tests::track;

    #[test]
    fn description_numbers_the_offered_tracks() {
        let tracks = vec![track("a"), track("b")];
        assert_eq!(picker_description(&tracks), "`1.` a\n`2.` b");
    }

    #[test]
    fn long_playlists_mention_the_cut() {
        let tracks: Vec<QueuedTrack> = (0..30).map(|i| track(&format!("t{i}"))).collect();
        let description = picker_description(&tracks);
        assert!(description.starts_with("`1.` t5\n"));
        assert!(description.ends_with("Showing the last 25 of 30 tracks."));
    }
}
