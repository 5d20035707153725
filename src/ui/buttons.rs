use serenity::{
    all::ButtonStyle,
    builder::{
        CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind,
        CreateSelectMenuOption,
    },
};

use crate::{
    audio::track::QueuedTrack,
    ui::now_playing::{readable_duration, NowPlayingView},
};

/// Custom ids of the message components.
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const LOOP_QUEUE: &str = "music_loop_queue";
    pub const LOOP_TRACK: &str = "music_loop_track";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const REFRESH: &str = "music_refresh";
    pub const TRACK_SELECT: &str = "music_track_select";
}

/// Discord rejects select menus with more options.
pub const MAX_SELECT_OPTIONS: usize = 25;
/// Longest label or description of a select option.
const MAX_OPTION_TEXT: usize = 100;

/// Controls under the now-playing message.
pub fn create_player_buttons(view: &NowPlayingView) -> Vec<CreateActionRow> {
    let play_pause = if view.paused { '▶' } else { '⏸' };

    let controls = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PLAY_PAUSE)
            .emoji(play_pause)
            .style(ButtonStyle::Primary),
        CreateButton::new(button_ids::SKIP)
            .emoji('⏭')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::LOOP_QUEUE)
            .emoji('🔁')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::LOOP_TRACK)
            .emoji('🔂')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::SHUFFLE)
            .emoji('🔀')
            .style(ButtonStyle::Secondary),
    ]);

    let links = CreateActionRow::Buttons(vec![
        CreateButton::new_link(&view.track_url).label("Current playing track link"),
        CreateButton::new(button_ids::REFRESH)
            .label("Refresh")
            .style(ButtonStyle::Secondary),
    ]);

    vec![controls, links]
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_OPTION_TEXT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_OPTION_TEXT - 1).collect();
    clipped.push('…');
    clipped
}

/// The tracks a select menu offers: the last [`MAX_SELECT_OPTIONS`].
pub fn selectable(tracks: &[QueuedTrack]) -> &[QueuedTrack] {
    &tracks[tracks.len().saturating_sub(MAX_SELECT_OPTIONS)..]
}

/// Picker for `/search` and `/playlist` results. The option value is the
/// track URL.
pub fn create_track_select(tracks: &[QueuedTrack]) -> CreateActionRow {
    let options = selectable(tracks)
        .iter()
        .map(|track| {
            let duration = track
                .duration
                .map(|secs| readable_duration(secs as i64))
                .unwrap_or_else(|| "unknown".to_string());
            CreateSelectMenuOption::new(clip(&track.title), track.url.clone()).description(duration)
        })
        .collect();

    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(button_ids::TRACK_SELECT, CreateSelectMenuKind::String { options })
            .placeholder("Choose a track!"),
    )
}
