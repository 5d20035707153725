//! # Audio Module
//!
//! Per-guild playback for the jukebox bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track queue
//! - Ordered playlist with the `current_index` / `next_index` cursors
//! - Cursor-preserving removal and tail shuffle
//!
//! ### [`scheduler`] - Scheduling loop
//! - `Idle → Selecting → Resolving → Playing` state machine, one task per guild
//! - Collaborator traits: [`scheduler::TrackResolver`],
//!   [`scheduler::PlaybackDriver`], [`scheduler::StatusRenderer`]
//!
//! ### [`session`] - Control API
//! - Commands mutate the queue and flags under the session lock
//! - Wakes the scheduler when it is idle
//!
//! ### [`registry`] - Sessions by guild
//!
//! ### [`player`] - songbird playback driver
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let session = registry.get_or_create(guild_id, || {
//!     Session::new(guild_id, resolver, driver, renderer, settings)
//! });
//! session.enqueue(tracks).await?;
//! session.jump(3)?;
//! session.seek(90).await?;
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod track;
