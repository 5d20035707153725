//! A guild's playback session: queue, session state, and the control
//! operations commands perform against a running scheduler.

use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Notify, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    queue::TrackQueue,
    scheduler::{PlaybackDriver, SchedulerPhase, StatusRenderer, TrackResolver},
    track::QueuedTrack,
};
use crate::{
    error::{ControlError, ControlResult},
    ui::now_playing::{NowPlayingView, SessionSnapshot},
};

/// Mutable playback settings of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub volume: f32,
    pub loop_queue: bool,
    pub loop_track: bool,
    /// One-shot start offset for the next resolved track, in seconds.
    pub seek_offset: u64,
    pub paused: bool,
    pub phase: SchedulerPhase,
}

/// Per-session limits taken from the bot configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub idle_timeout: Option<Duration>,
    /// Fixed seed for the shuffle RNG; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.1,
            max_queue_size: 1000,
            idle_timeout: Some(Duration::from_secs(300)),
            rng_seed: None,
        }
    }
}

/// The track the scheduler last handed to playback.
#[derive(Debug, Clone)]
pub(crate) struct NowPlaying {
    pub(crate) track: QueuedTrack,
    pub(crate) started_at: Instant,
}

/// Everything guarded by the session lock.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) queue: TrackQueue,
    pub(crate) state: SessionState,
    pub(crate) now_playing: Option<NowPlaying>,
    pub(crate) wake_pending: bool,
    /// Bumped by every operation that stops playback.
    pub(crate) interruptions: u64,
    rng: StdRng,
}

impl Shared {
    pub(crate) fn new(volume: f32, rng_seed: Option<u64>) -> Self {
        Self {
            queue: TrackQueue::new(),
            state: SessionState {
                volume,
                loop_queue: false,
                loop_track: false,
                seek_offset: 0,
                paused: false,
                // The scheduler's first step is a selection.
                phase: SchedulerPhase::Selecting,
            },
            now_playing: None,
            wake_pending: false,
            interruptions: 0,
            rng: match rng_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    pub(crate) fn start_track(&mut self, track: QueuedTrack) {
        self.now_playing = Some(NowPlaying {
            track,
            started_at: Instant::now(),
        });
    }

    /// Marks a wake as pending if the scheduler is idle.
    ///
    /// Returns `true` when the caller must notify. Further calls before the
    /// scheduler wakes return `false`, so signals coalesce.
    fn raise_wake(&mut self) -> bool {
        if self.state.phase == SchedulerPhase::Idle && !self.wake_pending {
            self.wake_pending = true;
            return true;
        }
        false
    }

    /// Whether the track under `current_index` is the one being played.
    fn playing_track_in_place(&self) -> bool {
        match (&self.now_playing, self.queue.current()) {
            (Some(playing), Some(current)) => playing.track.url == current.url,
            _ => false,
        }
    }
}

/// What `enqueue` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// 1-based position of the first added track.
    pub first_position: usize,
    /// The scheduler was idle and has been woken.
    pub woke_scheduler: bool,
    /// Known length of the whole queue after the append.
    pub queue_duration: Duration,
}

pub struct Session<R, P>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    guild_id: GuildId,
    pub(crate) shared: Mutex<Shared>,
    pub(crate) wake: Notify,
    pub(crate) cancel: CancellationToken,
    pub(crate) resolver: R,
    pub(crate) driver: P,
    pub(crate) renderer: Arc<dyn StatusRenderer>,
    pub(crate) settings: SessionSettings,
}

impl<R, P> Session<R, P>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    pub fn new(
        guild_id: GuildId,
        resolver: R,
        driver: P,
        renderer: Arc<dyn StatusRenderer>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            guild_id,
            shared: Mutex::new(Shared::new(settings.default_volume, settings.rng_seed)),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            resolver,
            driver,
            renderer,
            settings,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Appends tracks and wakes an idle scheduler.
    ///
    /// When something is already playing only the now-playing message is
    /// refreshed, since the queue listing changed.
    pub async fn enqueue(&self, tracks: Vec<QueuedTrack>) -> ControlResult<EnqueueOutcome> {
        let (outcome, refresh) = {
            let mut shared = self.shared.lock();
            let max = self.settings.max_queue_size;
            if shared.queue.len() + tracks.len() > max {
                return Err(ControlError::QueueFull { max });
            }

            let first_position = shared.queue.len() + 1;
            let added = tracks.len();
            for track in tracks {
                shared.queue.append(track);
            }

            let woke_scheduler = shared.raise_wake();
            let refresh = if woke_scheduler {
                None
            } else {
                self.view_locked(&shared)
            };
            (
                EnqueueOutcome {
                    added,
                    first_position,
                    woke_scheduler,
                    queue_duration: shared.queue.total_duration(),
                },
                refresh,
            )
        };

        if outcome.woke_scheduler {
            debug!("🔔 Waking scheduler for guild {}", self.guild_id);
            self.wake.notify_one();
        } else if let Some(view) = refresh {
            self.renderer.render(view).await;
        }
        Ok(outcome)
    }

    /// Makes the 1-based `index` the next track to play once the current one
    /// finishes.
    pub fn jump(&self, index: usize) -> ControlResult<()> {
        let mut shared = self.shared.lock();
        let len = shared.queue.len();
        if len == 0 {
            return Err(ControlError::EmptyQueue);
        }
        if index == 0 || index > len {
            return Err(ControlError::OutOfRange { index, len });
        }

        shared.queue.set_next_index(index as isize - 2);
        info!("⤵️ Jump to #{} in guild {}", index, self.guild_id);
        Ok(())
    }

    /// Removes the 1-based `index`, or the last track when `None`.
    pub fn remove(&self, index: Option<usize>) -> ControlResult<QueuedTrack> {
        let mut shared = self.shared.lock();
        let len = shared.queue.len();
        if len == 0 {
            return Err(ControlError::EmptyQueue);
        }
        let index = index.unwrap_or(len);
        if index == 0 || index > len {
            return Err(ControlError::OutOfRange { index, len });
        }
        shared.queue.remove(index - 1)
    }

    /// Empties the queue and stops the current track.
    pub async fn clear(&self) -> ControlResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.queue.is_empty() {
                return Err(ControlError::EmptyQueue);
            }
            shared.queue.clear();
            shared.now_playing = None;
            shared.state.seek_offset = 0;
            shared.interruptions += 1;
        }
        self.driver.stop().await;
        Ok(())
    }

    /// Restarts the playing track at `seconds`.
    pub async fn seek(&self, seconds: u64) -> ControlResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state.phase != SchedulerPhase::Playing
                || shared.state.paused
                || !shared.playing_track_in_place()
            {
                return Err(ControlError::NoActiveTrack);
            }
            shared.state.seek_offset = seconds;
            let current = shared.queue.current_index();
            shared.queue.set_next_index(current - 1);
            shared.interruptions += 1;
        }
        info!("⏩ Seek to {}s in guild {}", seconds, self.guild_id);
        self.driver.stop().await;
        Ok(())
    }

    /// Stops the current track so the scheduler moves on.
    pub async fn skip(&self) -> ControlResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state.phase != SchedulerPhase::Playing {
                return Err(ControlError::NoActiveTrack);
            }
            shared.interruptions += 1;
        }
        info!("⏭️ Skip in guild {}", self.guild_id);
        self.driver.stop().await;
        Ok(())
    }

    pub async fn pause(&self) -> ControlResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state.phase != SchedulerPhase::Playing || shared.state.paused {
                return Err(ControlError::NoActiveTrack);
            }
            shared.state.paused = true;
        }
        if let Err(e) = self.driver.pause().await {
            warn!("❌ Pause failed in guild {}: {}", self.guild_id, e);
        }
        Ok(())
    }

    pub async fn resume(&self) -> ControlResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state.phase != SchedulerPhase::Playing || !shared.state.paused {
                return Err(ControlError::NoActiveTrack);
            }
            shared.state.paused = false;
        }
        if let Err(e) = self.driver.resume().await {
            warn!("❌ Resume failed in guild {}: {}", self.guild_id, e);
        }
        Ok(())
    }

    /// Shuffles the tracks after the current one.
    pub fn shuffle(&self) {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;
        shared.queue.shuffle_from_current(&mut shared.rng);
    }

    pub fn toggle_loop_queue(&self) -> bool {
        let mut shared = self.shared.lock();
        shared.state.loop_queue = !shared.state.loop_queue;
        info!("🔁 Loop queue: {}", shared.state.loop_queue);
        shared.state.loop_queue
    }

    pub fn toggle_loop_track(&self) -> bool {
        let mut shared = self.shared.lock();
        shared.state.loop_track = !shared.state.loop_track;
        info!("🔂 Loop track: {}", shared.state.loop_track);
        shared.state.loop_track
    }

    /// Sets the volume (`0 < volume <= 1`) and returns the previous one.
    pub async fn set_volume(&self, volume: f32) -> ControlResult<f32> {
        if !(volume > 0.0 && volume <= 1.0) {
            return Err(ControlError::VolumeOutOfRange(volume));
        }
        let (old, live) = {
            let mut shared = self.shared.lock();
            let old = std::mem::replace(&mut shared.state.volume, volume);
            (old, shared.state.phase == SchedulerPhase::Playing)
        };
        if live {
            if let Err(e) = self.driver.set_volume(volume).await {
                warn!("❌ Could not apply volume in guild {}: {}", self.guild_id, e);
            }
        }
        info!("🔊 Volume {}% -> {}%", (old * 100.0).round(), (volume * 100.0).round());
        Ok(old)
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    /// `(current_index, next_index)`
    pub fn cursors(&self) -> (isize, isize) {
        let shared = self.shared.lock();
        (shared.queue.current_index(), shared.queue.next_index())
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn queued(&self) -> Vec<QueuedTrack> {
        self.shared.lock().queue.iter().cloned().collect()
    }

    /// The now-playing view, if a track has been started.
    pub fn now_playing(&self) -> Option<NowPlayingView> {
        self.view_locked(&self.shared.lock())
    }

    /// Re-renders the now-playing message.
    pub async fn refresh_status(&self) {
        if let Some(view) = self.now_playing() {
            self.renderer.render(view).await;
        }
    }

    /// Asks the scheduler to drain. In-flight resolution and playback waits
    /// are aborted.
    pub fn teardown(&self) {
        if !self.cancel.is_cancelled() {
            info!("🔌 Tearing down session for guild {}", self.guild_id);
            self.cancel.cancel();
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn view_locked(&self, shared: &Shared) -> Option<NowPlayingView> {
        let playing = shared.now_playing.as_ref()?;
        let snapshot = SessionSnapshot {
            titles: shared.queue.iter().map(|t| t.title.clone()).collect(),
            current_index: shared.queue.current_index(),
            volume: shared.state.volume,
            loop_queue: shared.state.loop_queue,
            loop_track: shared.state.loop_track,
            paused: shared.state.paused,
            current: playing.track.clone(),
            elapsed: playing.started_at.elapsed(),
        };
        Some(NowPlayingView::build(&snapshot))
    }
}
