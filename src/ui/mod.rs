//! Chat-facing rendering: the now-playing text, embeds and components.

pub mod buttons;
pub mod embeds;
pub mod now_playing;
