//! Text of the now-playing message.
//!
//! Everything here is a pure function of a [`SessionSnapshot`], so the output
//! can be checked against golden strings.

use num_format::{Locale, ToFormattedString};
use std::time::Duration;

use crate::audio::track::QueuedTrack;

/// Rows of the queue listing shown at once.
pub const WINDOW_ROWS: usize = 10;

/// The parts of a session the view is computed from.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub titles: Vec<String>,
    pub current_index: isize,
    pub volume: f32,
    pub loop_queue: bool,
    pub loop_track: bool,
    pub paused: bool,
    pub current: QueuedTrack,
    /// Time since the current track (re)started.
    pub elapsed: Duration,
}

/// Rendered now-playing message.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingView {
    pub content: String,
    /// Link attached as a button below the message.
    pub track_url: String,
    pub paused: bool,
}

impl NowPlayingView {
    pub fn build(snapshot: &SessionSnapshot) -> Self {
        let len = snapshot.titles.len();
        let start = window_start(snapshot.current_index, len);

        let mut tracks = String::new();
        for (offset, title) in snapshot
            .titles
            .iter()
            .skip(start - 1)
            .take(WINDOW_ROWS)
            .enumerate()
        {
            let row_index = start + offset;
            let label: String = format!("{row_index}. ").chars().take(4).collect();
            let row = format!("{label}{title}");
            if snapshot.current_index + 1 == row_index as isize {
                tracks.push_str(&format!("---> {row} <---\n"));
            } else {
                tracks.push_str(&format!("     {row}\n"));
            }
        }

        let remains = len.saturating_sub(start + WINDOW_ROWS - 1);
        let elapsed = readable_duration(snapshot.elapsed.as_secs() as i64);
        let total = snapshot
            .current
            .duration
            .map(|secs| readable_duration(secs as i64))
            .unwrap_or_else(|| "unknown".to_string());
        let views = snapshot
            .current
            .view_count
            .map(|views| views.to_formatted_string(&Locale::en))
            .unwrap_or_else(|| "unknown".to_string());

        let content = format!(
            "```ml\n{tracks}\n\
             {remains} remaining track(s)     currently playing track:\n\
             (🔁) Loop Queue: {loop_q}      Requester: '{requester}'\n\
             (🔂) Loop Track: {loop_t}      Duration: {elapsed} (refreshable) / {total}\n\
             Volume: {volume}%               Views: {views}```",
            loop_q = flag(snapshot.loop_queue),
            loop_t = flag(snapshot.loop_track),
            requester = snapshot.current.requester.name,
            volume = (snapshot.volume * 100.0).round() as u32,
        );

        Self {
            content,
            track_url: snapshot.current.url.clone(),
            paused: snapshot.paused,
        }
    }
}

fn flag(on: bool) -> &'static str {
    if on {
        "✅"
    } else {
        "❌"
    }
}

/// 1-based position of the first listed row.
///
/// Short queues and the first tracks start at the top. Otherwise the window
/// keeps two rows of history above the playing track, and near the end of the
/// queue it stops scrolling so the last row is the last track.
pub fn window_start(current_index: isize, len: usize) -> usize {
    if current_index > 2 && len > WINDOW_ROWS {
        let remaining = (len as isize - current_index).clamp(0, 8);
        (remaining + current_index - 9).max(1) as usize
    } else {
        1
    }
}

/// `h:mm:ss`, or `m:ss` below an hour. Negative inputs render as `0:00:00`.
pub fn readable_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "0:00:00".to_string();
    }
    let (minutes, secs) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
