use rand::{seq::SliceRandom, Rng};
use std::time::Duration;
use tracing::{debug, info};

use super::track::QueuedTrack;
use crate::error::{ControlError, ControlResult};

/// Lowest value either cursor may hold ("before the first track").
pub const CURSOR_FLOOR: isize = -1;

/// Ordered list of tracks plus the two playback cursors.
///
/// Tracks are never popped when played: the queue is a playlist and
/// `current_index` walks over it. `next_index` is the position the scheduler
/// increments from when it picks the following track, so control operations
/// steer playback by writing it directly.
#[derive(Debug, Clone)]
pub struct TrackQueue {
    tracks: Vec<QueuedTrack>,
    current_index: isize,
    next_index: isize,
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackQueue {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            current_index: 0,
            next_index: CURSOR_FLOOR,
        }
    }

    /// Adds a track at the end. Cursors do not move.
    pub fn append(&mut self, track: QueuedTrack) {
        info!("➕ Queued: {}", track.title);
        self.tracks.push(track);
    }

    /// Removes the track at the 0-based `index`.
    ///
    /// Each cursor at or after `index` shifts left by one so it keeps pointing
    /// at the same logical entry.
    pub fn remove(&mut self, index: usize) -> ControlResult<QueuedTrack> {
        if index >= self.tracks.len() {
            return Err(ControlError::OutOfRange {
                index: index + 1,
                len: self.tracks.len(),
            });
        }

        let removed = self.tracks.remove(index);
        let index = index as isize;
        if index <= self.next_index {
            self.next_index = (self.next_index - 1).max(CURSOR_FLOOR);
        }
        if index <= self.current_index {
            self.current_index = (self.current_index - 1).max(CURSOR_FLOOR);
        }

        debug!(
            "❌ Removed track at {} (current={}, next={})",
            index, self.current_index, self.next_index
        );
        Ok(removed)
    }

    /// Empties the queue and puts both cursors before the start.
    pub fn clear(&mut self) {
        let cleared = self.tracks.len();
        self.tracks.clear();
        self.current_index = 0;
        self.next_index = CURSOR_FLOOR;
        info!("🗑️ Queue cleared ({} tracks)", cleared);
    }

    /// Shuffles every track after the current one.
    ///
    /// Entries `[0, current_index]` keep their positions, so neither the
    /// playing track nor the history moves.
    pub fn shuffle_from_current<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let start = (self.current_index + 1).max(0) as usize;
        if start >= self.tracks.len() {
            return;
        }
        self.tracks[start..].shuffle(rng);
        info!("🔀 Shuffled {} upcoming tracks", self.tracks.len() - start);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueuedTrack> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedTrack> {
        self.tracks.iter()
    }

    pub fn current_index(&self) -> isize {
        self.current_index
    }

    pub fn next_index(&self) -> isize {
        self.next_index
    }

    pub fn set_current_index(&mut self, index: isize) {
        self.current_index = index;
    }

    pub fn set_next_index(&mut self, index: isize) {
        self.next_index = index;
    }

    /// The track under `current_index`, if the cursor points into the queue.
    pub fn current(&self) -> Option<&QueuedTrack> {
        usize::try_from(self.current_index)
            .ok()
            .and_then(|index| self.tracks.get(index))
    }

    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().filter_map(QueuedTrack::duration).sum()
    }
}
