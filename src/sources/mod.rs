//! # Sources
//!
//! Where queued tracks come from. A source turns user input (URL, playlist,
//! search term) into [`QueuedTrack`]s; streams are only produced later, when
//! the scheduler resolves the track it is about to play.

pub mod ytdlp;

use async_trait::async_trait;

use crate::{
    audio::track::{QueuedTrack, Requester},
    error::ResolutionError,
};

pub use ytdlp::YtDlpClient;

/// yt-dlp search prefix, followed by the number of results.
pub const SEARCH_PREFIX: &str = "ytsearch";

/// Common interface of track metadata sources.
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Tracks for a URL (a playlist URL yields every entry), or the best match
    /// for a search term.
    async fn lookup(&self, query: &str, requester: &Requester) -> Result<Vec<QueuedTrack>, ResolutionError>;

    /// Up to `limit` search results.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        requester: &Requester,
    ) -> Result<Vec<QueuedTrack>, ResolutionError>;

    /// Every entry of a playlist.
    async fn playlist(&self, url: &str, requester: &Requester) -> Result<Vec<QueuedTrack>, ResolutionError>;

    fn source_name(&self) -> &'static str;
}
