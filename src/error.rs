//! Error types shared by the playback core.
//!
//! Control errors are reported back to whoever issued the command and never
//! change session state. Resolution and playback errors are recovered inside
//! the scheduler: they are logged and the offending track is skipped.

use thiserror::Error;

/// Failure of a control operation (`/jump`, `/remove`, `/seek`, ...).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("Could not find a track at '{index}' index (queue has {len} track(s)).")]
    OutOfRange { index: usize, len: usize },

    #[error("There is no queue.")]
    EmptyQueue,

    #[error("There is no song being played.")]
    NoActiveTrack,

    #[error("Volume must be between 1 and 100 percent, got {}.", .0 * 100.0)]
    VolumeOutOfRange(f32),

    #[error("The queue is full (maximum {max} tracks).")]
    QueueFull { max: usize },

    #[error("I'm not connected to a voice channel.")]
    NotConnected,
}

/// The resolver could not turn a queued track into a playable stream.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to run resolver process: {0}")]
    Process(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("track is unavailable: {0}")]
    Unavailable(String),

    #[error("could not parse resolver output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The playback driver failed to start or lost a stream mid-way.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("playback driver error: {0}")]
    Driver(String),

    #[error("playback ended without reporting completion")]
    Dropped,
}

pub type ControlResult<T> = Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_errors_render_user_facing_text() {
        let err = ControlError::OutOfRange { index: 7, len: 3 };
        assert_eq!(
            err.to_string(),
            "Could not find a track at '7' index (queue has 3 track(s))."
        );
        assert_eq!(ControlError::EmptyQueue.to_string(), "There is no queue.");
    }
}
