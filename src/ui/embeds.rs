use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{session::EnqueueOutcome, track::QueuedTrack},
    ui::now_playing::readable_duration,
};

/// Embed colours.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "🎵 Jukebox";

fn duration_field(track: &QueuedTrack) -> String {
    track
        .duration
        .map(|secs| readable_duration(secs as i64))
        .unwrap_or_else(|| "🔴 Live / unknown".to_string())
}

/// Confirmation for `/play`, `/search` and `/playlist`.
pub fn create_tracks_added_embed(tracks: &[QueuedTrack], outcome: &EnqueueOutcome) -> CreateEmbed {
    let queue_length = readable_duration(outcome.queue_duration.as_secs() as i64);
    match tracks {
        [track] => CreateEmbed::default()
            .title("✅ Track added")
            .description(format!("**{}**", track.title))
            .url(&track.url)
            .color(colors::SUCCESS_GREEN)
            .field("⏱️ Duration", duration_field(track), true)
            .field("📍 Position", format!("#{}", outcome.first_position), true)
            .field("👤 Requested by", format!("<@{}>", track.requester.id), true)
            .field("🕒 Added", added_field(track), true)
            .field("📋 Queue length", queue_length, true)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        _ => {
            let last = outcome.first_position + outcome.added.saturating_sub(1);
            CreateEmbed::default()
                .title("📋 Tracks added")
                .description(format!("Added **{}** tracks to the queue.", outcome.added))
                .color(colors::MUSIC_PURPLE)
                .field("📍 Positions", format!("#{} - #{}", outcome.first_position, last), true)
                .field("📋 Queue length", queue_length, true)
                .timestamp(Timestamp::now())
                .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        }
    }
}

/// Discord relative timestamp ("2 minutes ago") of when the track was queued.
fn added_field(track: &QueuedTrack) -> String {
    format!("<t:{}:R>", track.added_at.timestamp())
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Volume with a visual bar.
pub fn create_volume_embed(volume: f32, previous: Option<f32>) -> CreateEmbed {
    let percent = volume_percent(volume);
    let description = match previous {
        Some(old) => format!("**{}%** → **{}%**", volume_percent(old), percent),
        None => format!("**{}%**", percent),
    };
    let emoji = if percent <= 50 { "🔉" } else { "🔊" };

    CreateEmbed::default()
        .title(format!("{} Volume", emoji))
        .description(description)
        .field("📊 Level", volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 /volume <1-100>"))
        .timestamp(Timestamp::now())
}

pub fn volume_percent(volume: f32) -> u32 {
    (volume * 100.0).round() as u32
}

fn volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = ((volume.clamp(0.0, 1.0) * segments as f32).round() as usize).min(segments);
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_time_is_a_relative_discord_timestamp() {
        let mut track = crate::audio::queue::tests::track("a");
        track.added_at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(added_field(&track), "<t:1700000000:R>");
    }

    #[test]
    fn volume_bar_is_proportional() {
        assert_eq!(volume_bar(0.5), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
        assert_eq!(volume_bar(1.0), format!("`[{}]`", "█".repeat(20)));
        assert_eq!(volume_percent(0.1), 10);
        assert_eq!(volume_percent(0.07), 7);
    }
}
