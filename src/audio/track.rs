use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

/// Who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

impl Requester {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A queue entry: metadata only, no stream attached.
///
/// Stream URLs handed out by video sites expire, so the queue never stores
/// them. The scheduler turns a `QueuedTrack` into a [`ResolvedTrack`] right
/// before playing it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    pub url: String,
    pub title: String,
    /// Length in whole seconds, `None` when the source did not report it.
    pub duration: Option<u64>,
    pub requester: Requester,
    pub view_count: Option<u64>,
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(url: impl Into<String>, title: impl Into<String>, requester: Requester) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            duration: None,
            requester,
            view_count: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_view_count(mut self, views: u64) -> Self {
        self.view_count = Some(views);
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(Duration::from_secs)
    }
}

/// A track ready to be handed to the playback driver.
///
/// `track` carries the metadata refreshed by the resolver (duration and view
/// count are authoritative here), `stream` is whatever the driver plays.
#[derive(Debug)]
pub struct ResolvedTrack<S> {
    pub track: QueuedTrack,
    pub stream: S,
}

impl<S> ResolvedTrack<S> {
    pub fn new(track: QueuedTrack, stream: S) -> Self {
        Self { track, stream }
    }
}
