//! The per-session scheduling loop and the collaborator traits it drives.
//!
//! One scheduler task runs per guild. It cycles through
//! `Idle → Selecting → Resolving → Playing → Selecting ...` and only leaves the
//! cycle through `Draining`, when the session is torn down or has been idle
//! for too long. The session lock is taken for the short selection and
//! bookkeeping steps and released before every `.await`.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{
    session::{Session, Shared},
    track::{QueuedTrack, ResolvedTrack},
};
use crate::{
    error::{PlaybackError, ResolutionError},
    ui::now_playing::NowPlayingView,
};

/// Seconds kept between a seek target and the end of the track.
pub const SEEK_TAIL_MARGIN: u64 = 5;

/// Turns a queued track into something the playback driver can play.
#[async_trait]
pub trait TrackResolver: Send + Sync + 'static {
    type Stream: Send + 'static;

    async fn resolve(
        &self,
        track: &QueuedTrack,
        seek_offset: u64,
    ) -> Result<ResolvedTrack<Self::Stream>, ResolutionError>;
}

/// Plays resolved streams in the voice channel.
///
/// `play` hands over a [`FinishSignal`]; the driver fires it when the stream
/// ends for any reason (natural end, `stop`, or an error).
#[async_trait]
pub trait PlaybackDriver: Send + Sync + 'static {
    type Stream: Send + 'static;

    async fn play(
        &self,
        stream: Self::Stream,
        volume: f32,
        start_at: Duration,
        on_finished: FinishSignal,
    ) -> Result<(), PlaybackError>;

    /// Stops the current stream. A no-op when nothing plays.
    async fn stop(&self);

    async fn pause(&self) -> Result<(), PlaybackError>;

    async fn resume(&self) -> Result<(), PlaybackError>;

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError>;

    /// Stops playback and releases the voice connection.
    async fn shutdown(&self);
}

/// Displays the now-playing message for a session.
#[async_trait]
pub trait StatusRenderer: Send + Sync + 'static {
    async fn render(&self, view: NowPlayingView);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// One-shot completion callback handed to [`PlaybackDriver::play`].
///
/// Firing consumes the signal, so a stream can complete at most once.
/// Dropping it unfired is reported to the scheduler as a playback error.
#[derive(Debug)]
pub struct FinishSignal(oneshot::Sender<PlaybackOutcome>);

impl FinishSignal {
    pub fn channel() -> (Self, oneshot::Receiver<PlaybackOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn finish(self, outcome: PlaybackOutcome) {
        // The scheduler may already be gone (teardown).
        let _ = self.0.send(outcome);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Selecting,
    Resolving,
    Playing,
    Draining,
}

/// Result of one selection step.
#[derive(Debug)]
pub(crate) enum Selection {
    Track {
        index: usize,
        track: QueuedTrack,
        seek_offset: u64,
        generation: u64,
    },
    Exhausted,
}

/// Caps a seek target so playback starts at least [`SEEK_TAIL_MARGIN`]
/// seconds before the end. Unknown durations are not clamped.
pub fn clamp_seek(offset: u64, duration: Option<u64>) -> u64 {
    match duration {
        Some(duration) if duration < offset + SEEK_TAIL_MARGIN => {
            duration.saturating_sub(SEEK_TAIL_MARGIN)
        }
        _ => offset,
    }
}

/// The selection step, run under the session lock.
///
/// `skip_repeat` suppresses the loop-track repeat once, used after the
/// current track failed to resolve.
pub(crate) fn select_next(shared: &mut Shared, skip_repeat: bool) -> Selection {
    shared.state.phase = SchedulerPhase::Selecting;

    let mut index = if shared.state.loop_track && !skip_repeat {
        shared.queue.current_index()
    } else {
        let next = shared.queue.next_index() + 1;
        shared.queue.set_next_index(next);
        next
    };

    let len = shared.queue.len() as isize;
    if index >= len {
        if shared.state.loop_queue && len > 0 {
            debug!("🔁 End of queue, looping back to the first track");
            index = 0;
            shared.queue.set_next_index(0);
        } else {
            // Rewind so the next increment lands on the first new track.
            shared.queue.set_next_index(len - 1);
            shared.state.phase = SchedulerPhase::Idle;
            shared.now_playing = None;
            return Selection::Exhausted;
        }
    }
    let index = index.max(0);

    shared.queue.set_current_index(index);
    let seek_offset = std::mem::take(&mut shared.state.seek_offset);
    shared.state.phase = SchedulerPhase::Resolving;

    match shared.queue.get(index as usize) {
        Some(track) => Selection::Track {
            index: index as usize,
            track: track.clone(),
            seek_offset,
            generation: shared.interruptions,
        },
        None => {
            shared.state.phase = SchedulerPhase::Idle;
            shared.now_playing = None;
            Selection::Exhausted
        }
    }
}

async fn idle_timer(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

impl<R, P> Session<R, P>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    /// Runs the scheduler until the session drains.
    pub async fn run(self: Arc<Self>) {
        info!("▶️ Scheduler started for guild {}", self.guild_id());

        let mut skip_repeat = false;
        let mut consecutive_failures = 0usize;

        loop {
            // Selecting
            let selection = select_next(&mut self.shared.lock(), skip_repeat);
            skip_repeat = false;

            let (index, track, seek_offset, generation) = match selection {
                Selection::Track {
                    index,
                    track,
                    seek_offset,
                    generation,
                } => (index, track, seek_offset, generation),
                Selection::Exhausted => {
                    debug!("📭 Queue exhausted, waiting for new tracks");
                    if self.wait_for_wake().await {
                        continue;
                    }
                    break;
                }
            };

            // Resolving
            debug!("🔍 Resolving #{} {}", index + 1, track.title);
            let resolved = tokio::select! {
                _ = self.cancel.cancelled() => break,
                resolved = self.resolver.resolve(&track, seek_offset) => resolved,
            };

            let resolved = match resolved {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("⏭️ Skipping '{}', resolution failed: {}", track.title, e);
                    skip_repeat = true;
                    consecutive_failures += 1;
                    // Checked and parked under one lock: an enqueue either
                    // grows the queue first or sees `Idle` and wakes us.
                    let give_up = {
                        let mut shared = self.shared.lock();
                        let give_up = consecutive_failures >= shared.queue.len().max(1);
                        if give_up {
                            shared.state.phase = SchedulerPhase::Idle;
                            shared.now_playing = None;
                        }
                        give_up
                    };
                    if give_up {
                        warn!("⚠️ Every queued track failed to resolve, going idle");
                        consecutive_failures = 0;
                        if self.wait_for_wake().await {
                            continue;
                        }
                        break;
                    }
                    continue;
                }
            };
            consecutive_failures = 0;

            let ResolvedTrack { track, stream } = resolved;
            let start_at = Duration::from_secs(clamp_seek(seek_offset, track.duration));

            let volume = {
                let mut shared = self.shared.lock();
                if shared.interruptions != generation {
                    debug!("🚫 Dropping '{}', playback was interrupted while resolving", track.title);
                    continue;
                }
                shared.state.phase = SchedulerPhase::Playing;
                shared.state.paused = false;
                shared.start_track(track.clone());
                shared.state.volume
            };

            // Playing
            let (signal, finished) = FinishSignal::channel();
            if let Err(e) = self.driver.play(stream, volume, start_at, signal).await {
                warn!("❌ Could not start '{}': {}", track.title, e);
                continue;
            }
            info!("🎵 Now playing #{}: {}", index + 1, track.title);

            let (interrupted, view) = {
                let shared = self.shared.lock();
                (shared.interruptions != generation, self.view_locked(&shared))
            };
            if interrupted {
                self.driver.stop().await;
            } else if let Some(view) = view {
                self.renderer.render(view).await;
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = finished => outcome,
            };

            match outcome {
                Ok(PlaybackOutcome::Finished) => debug!("✅ Finished '{}'", track.title),
                Ok(PlaybackOutcome::Failed(reason)) => {
                    let e = PlaybackError::Driver(reason);
                    warn!("❌ Playback of '{}' failed: {}", track.title, e);
                }
                Err(_) => warn!("❌ Playback of '{}' failed: {}", track.title, PlaybackError::Dropped),
            }
        }

        self.shared.lock().state.phase = SchedulerPhase::Draining;
        self.cancel.cancel();
        self.driver.shutdown().await;
        info!("⏹️ Scheduler drained for guild {}", self.guild_id());
    }

    /// Suspends in `Idle` until a wake signal, teardown, or the idle timeout.
    ///
    /// Returns `false` when the session must drain.
    async fn wait_for_wake(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = self.wake.notified() => {
                self.shared.lock().wake_pending = false;
                true
            }
            _ = idle_timer(self.settings.idle_timeout) => {
                // A wake raised as the timer fired still counts.
                let mut shared = self.shared.lock();
                if std::mem::take(&mut shared.wake_pending) {
                    return true;
                }
                info!("💤 Idle for too long in guild {}, disconnecting", self.guild_id());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::tests::{queue_of, track},
        session::Shared,
    };

    fn shared_with(names: &[&str]) -> Shared {
        let mut shared = Shared::new(0.1, Some(1));
        shared.queue = queue_of(names);
        shared
    }

    fn selected_index(selection: Selection) -> Option<usize> {
        match selection {
            Selection::Track { index, .. } => Some(index),
            Selection::Exhausted => None,
        }
    }

    #[test]
    fn clamp_seek_keeps_offsets_inside_the_track() {
        assert_eq!(clamp_seek(170, Some(180)), 170);
        assert_eq!(clamp_seek(178, Some(180)), 175);
        assert_eq!(clamp_seek(500, Some(180)), 175);
        assert_eq!(clamp_seek(10, Some(3)), 0);
        assert_eq!(clamp_seek(999, None), 999);
    }

    #[test]
    fn selection_walks_the_queue_in_order() {
        let mut shared = shared_with(&["a", "b", "c"]);
        let picked: Vec<Option<usize>> = (0..4)
            .map(|_| selected_index(select_next(&mut shared, false)))
            .collect();
        assert_eq!(picked, vec![Some(0), Some(1), Some(2), None]);
        assert_eq!(shared.state.phase, SchedulerPhase::Idle);
        // Rewound so the next enqueue is picked up.
        assert_eq!(shared.queue.next_index(), 2);
    }

    #[test]
    fn exhausted_queue_picks_up_appended_track() {
        let mut shared = shared_with(&["a"]);
        assert_eq!(selected_index(select_next(&mut shared, false)), Some(0));
        assert!(matches!(select_next(&mut shared, false), Selection::Exhausted));

        shared.queue.append(track("b"));
        assert_eq!(selected_index(select_next(&mut shared, false)), Some(1));
    }

    #[test]
    fn loop_queue_wraps_to_the_start() {
        let mut shared = shared_with(&["a", "b"]);
        shared.state.loop_queue = true;
        let picked: Vec<Option<usize>> = (0..5)
            .map(|_| selected_index(select_next(&mut shared, false)))
            .collect();
        assert_eq!(picked, vec![Some(0), Some(1), Some(0), Some(1), Some(0)]);
    }

    #[test]
    fn loop_queue_on_empty_queue_goes_idle() {
        let mut shared = shared_with(&[]);
        shared.state.loop_queue = true;
        assert!(matches!(select_next(&mut shared, false), Selection::Exhausted));
        assert_eq!(shared.state.phase, SchedulerPhase::Idle);
    }

    #[test]
    fn loop_track_repeats_without_moving_next_index() {
        let mut shared = shared_with(&["a", "b", "c"]);
        select_next(&mut shared, false);
        select_next(&mut shared, false);
        shared.state.loop_track = true;
        let next_before = shared.queue.next_index();

        for _ in 0..2 {
            assert_eq!(selected_index(select_next(&mut shared, false)), Some(1));
            assert_eq!(shared.queue.next_index(), next_before);
        }
    }

    #[test]
    fn skip_repeat_advances_past_a_looped_track() {
        let mut shared = shared_with(&["a", "b"]);
        select_next(&mut shared, false);
        shared.state.loop_track = true;
        assert_eq!(selected_index(select_next(&mut shared, true)), Some(1));
    }

    #[test]
    fn seek_offset_is_consumed_once() {
        let mut shared = shared_with(&["a", "b"]);
        shared.state.seek_offset = 42;
        match select_next(&mut shared, false) {
            Selection::Track { seek_offset, .. } => assert_eq!(seek_offset, 42),
            Selection::Exhausted => panic!("expected a track"),
        }
        assert_eq!(shared.state.seek_offset, 0);
    }

    #[test]
    fn jumped_cursor_is_consumed_like_a_normal_increment() {
        let mut shared = shared_with(&["a", "b", "c", "d", "e"]);
        select_next(&mut shared, false);
        // jump(4): next_index = 4 - 2
        shared.queue.set_next_index(2);
        assert_eq!(selected_index(select_next(&mut shared, false)), Some(3));
        assert_eq!(selected_index(select_next(&mut shared, false)), Some(4));
    }

    mod running {
        use super::*;
        use crate::{
            audio::session::{
                tests::{
                    idle_session, session_with, test_settings, tracks, FakeResolver, Started,
                    TestSession,
                },
                SessionSettings,
            },
            error::ControlError,
        };
        use std::sync::Arc;
        use tokio::{sync::mpsc, task::JoinHandle};

        async fn wait_until(mut cond: impl FnMut() -> bool) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while !cond() {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .expect("condition not reached in time");
        }

        async fn next_start(started: &mut mpsc::UnboundedReceiver<Started>) -> Started {
            tokio::time::timeout(Duration::from_secs(5), started.recv())
                .await
                .expect("no track started in time")
                .expect("driver dropped")
        }

        async fn idle(session: &Arc<TestSession>) {
            wait_until(|| session.state().phase == SchedulerPhase::Idle).await;
        }

        fn spawn(session: &Arc<TestSession>) -> JoinHandle<()> {
            tokio::spawn(session.clone().run())
        }

        async fn shut(session: &Arc<TestSession>, handle: JoinHandle<()>) {
            session.teardown();
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("scheduler did not drain")
                .expect("scheduler panicked");
        }

        fn resolved_titles(session: &Arc<TestSession>) -> Vec<String> {
            session
                .resolver
                .resolved
                .lock()
                .iter()
                .map(|(title, _)| title.clone())
                .collect()
        }

        #[tokio::test]
        async fn plays_every_track_once_then_idles() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            idle(&session).await;

            let outcome = session.enqueue(tracks(&["a", "b", "c"])).await.unwrap();
            assert!(outcome.woke_scheduler);

            for expected in ["a", "b", "c"] {
                assert_eq!(next_start(&mut started).await.title, expected);
                assert!(session.driver.finish_current());
            }
            idle(&session).await;

            assert!(started.try_recv().is_err());
            assert_eq!(resolved_titles(&session), vec!["a", "b", "c"]);
            assert_eq!(session.cursors(), (2, 2));
            assert!(!session.is_torn_down());
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn clear_goes_idle_and_enqueue_wakes_again() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b"])).await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "a");

            session.clear().await.unwrap();
            idle(&session).await;
            assert_eq!(session.state().phase, SchedulerPhase::Idle);
            assert!(!session.is_torn_down());
            assert_eq!(session.cursors(), (0, -1));

            session.enqueue(tracks(&["c"])).await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "c");
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn seek_replays_current_track_at_offset() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            let queue = vec![track("a"), track("b").with_duration(200)];
            session.enqueue(queue).await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "a");

            session.seek(170).await.unwrap();
            let again = next_start(&mut started).await;
            assert_eq!(again.title, "a");
            assert_eq!(again.start_at, Duration::from_secs(170));

            // 178 + 5 > 180
            session.seek(178).await.unwrap();
            let clamped = next_start(&mut started).await;
            assert_eq!(clamped.title, "a");
            assert_eq!(clamped.start_at, Duration::from_secs(175));

            assert_eq!(
                *session.resolver.resolved.lock(),
                vec![
                    ("a".to_string(), 0),
                    ("a".to_string(), 170),
                    ("a".to_string(), 178)
                ]
            );

            assert!(session.driver.finish_current());
            let next = next_start(&mut started).await;
            assert_eq!(next.title, "b");
            assert_eq!(next.start_at, Duration::ZERO);
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn loop_track_resolves_the_same_index_again() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b"])).await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "a");
            assert!(session.toggle_loop_track());

            for _ in 0..2 {
                assert!(session.driver.finish_current());
                assert_eq!(next_start(&mut started).await.title, "a");
                assert_eq!(session.cursors(), (0, 0));
            }
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn jump_selects_the_requested_position() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b", "c", "d"])).await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "a");

            session.jump(3).unwrap();
            assert!(session.driver.finish_current());
            assert_eq!(next_start(&mut started).await.title, "c");

            // With loop_track on, the jump waits until the repeat is turned off.
            session.toggle_loop_track();
            session.jump(1).unwrap();
            assert!(session.driver.finish_current());
            assert_eq!(next_start(&mut started).await.title, "c");

            session.toggle_loop_track();
            assert!(session.driver.finish_current());
            assert_eq!(next_start(&mut started).await.title, "a");
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn skip_moves_to_the_next_track() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b"])).await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "a");

            session.skip().await.unwrap();
            assert_eq!(next_start(&mut started).await.title, "b");
            session.skip().await.unwrap();
            idle(&session).await;
            assert_eq!(session.skip().await, Err(ControlError::NoActiveTrack));
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn failed_resolution_is_skipped() {
            let resolver = FakeResolver::default();
            resolver.failing.lock().insert(track("b").url);
            let (session, mut started, _renderer) = idle_session(resolver);
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b", "c"])).await.unwrap();

            assert_eq!(next_start(&mut started).await.title, "a");
            assert!(session.driver.finish_current());
            assert_eq!(next_start(&mut started).await.title, "c");
            assert_eq!(resolved_titles(&session), vec!["a", "b", "c"]);
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn failing_looped_queue_does_not_spin() {
            let resolver = FakeResolver::default();
            resolver.failing.lock().insert(track("a").url);
            resolver.failing.lock().insert(track("b").url);
            let (session, mut started, _renderer) = idle_session(resolver);
            session.toggle_loop_queue();
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b"])).await.unwrap();

            idle(&session).await;
            assert!(started.try_recv().is_err());
            assert_eq!(resolved_titles(&session), vec!["a", "b"]);
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn track_added_while_the_only_track_fails_is_played() {
            let gate = Arc::new(tokio::sync::Semaphore::new(0));
            let resolver = FakeResolver {
                gate: Some(gate.clone()),
                ..FakeResolver::default()
            };
            resolver.failing.lock().insert(track("a").url);
            let (session, mut started, _renderer) = idle_session(resolver);
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            wait_until(|| session.state().phase == SchedulerPhase::Resolving).await;

            // Not idle, so no wake is raised: the failure path must notice.
            let outcome = session.enqueue(tracks(&["b"])).await.unwrap();
            assert!(!outcome.woke_scheduler);
            gate.add_permits(2);

            assert_eq!(next_start(&mut started).await.title, "b");
            assert_eq!(resolved_titles(&session), vec!["a", "b"]);
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn enqueue_wakes_after_every_track_failed() {
            let resolver = FakeResolver::default();
            resolver.failing.lock().insert(track("a").url);
            let (session, mut started, _renderer) = idle_session(resolver);
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            wait_until(|| session.resolver.resolved.lock().len() == 1).await;
            idle(&session).await;

            let outcome = session.enqueue(tracks(&["b"])).await.unwrap();
            assert!(outcome.woke_scheduler);
            assert_eq!(next_start(&mut started).await.title, "b");
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn finished_or_cleared_queue_has_no_view() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            next_start(&mut started).await;
            assert!(session.now_playing().is_some());

            assert!(session.driver.finish_current());
            wait_until(|| session.now_playing().is_none()).await;
            assert_eq!(session.state().phase, SchedulerPhase::Idle);

            session.enqueue(tracks(&["b"])).await.unwrap();
            next_start(&mut started).await;
            session.clear().await.unwrap();
            assert!(session.now_playing().is_none());
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn refresh_re_renders_only_a_playing_view() {
            let (session, mut started, renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.refresh_status().await;
            assert!(renderer.views.lock().is_empty());

            session.enqueue(tracks(&["a"])).await.unwrap();
            next_start(&mut started).await;
            wait_until(|| !renderer.views.lock().is_empty()).await;
            let rendered = renderer.views.lock().len();

            session.refresh_status().await;
            let views = renderer.views.lock();
            assert_eq!(views.len(), rendered + 1);
            assert!(views[rendered].track_url.ends_with("v=a"));
            drop(views);
            shut(&session, handle).await;
        }

        #[tokio::test(start_paused = true)]
        async fn wake_racing_the_idle_timeout_still_plays() {
            let settings = SessionSettings {
                idle_timeout: Some(Duration::from_secs(300)),
                ..test_settings()
            };
            let (session, mut started, _renderer) = session_with(FakeResolver::default(), settings);
            let handle = spawn(&session);
            idle(&session).await;

            let outcome = session.enqueue(tracks(&["a"])).await.unwrap();
            assert!(outcome.woke_scheduler);
            tokio::time::advance(Duration::from_secs(301)).await;

            assert_eq!(next_start(&mut started).await.title, "a");
            assert!(!session.is_torn_down());
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn clear_while_resolving_discards_the_stream() {
            let gate = Arc::new(tokio::sync::Semaphore::new(0));
            let resolver = FakeResolver {
                gate: Some(gate.clone()),
                ..FakeResolver::default()
            };
            let (session, mut started, _renderer) = idle_session(resolver);
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            wait_until(|| session.state().phase == SchedulerPhase::Resolving).await;

            session.clear().await.unwrap();
            gate.add_permits(1);
            wait_until(|| !session.resolver.resolved.lock().is_empty()).await;
            idle(&session).await;

            assert!(started.try_recv().is_err());
            assert!(session.now_playing().is_none());
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn teardown_aborts_an_inflight_resolution() {
            let gate = Arc::new(tokio::sync::Semaphore::new(0));
            let resolver = FakeResolver {
                gate: Some(gate),
                ..FakeResolver::default()
            };
            let (session, _started, _renderer) = idle_session(resolver);
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            wait_until(|| session.state().phase == SchedulerPhase::Resolving).await;

            shut(&session, handle).await;
            assert_eq!(session.state().phase, SchedulerPhase::Draining);
            assert_eq!(*session.driver.shutdowns.lock(), 1);
        }

        #[tokio::test]
        async fn teardown_while_playing_drains() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            next_start(&mut started).await;

            shut(&session, handle).await;
            assert_eq!(session.state().phase, SchedulerPhase::Draining);
            assert!(session.driver.current.lock().is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn idle_timeout_drains_the_session() {
            let settings = SessionSettings {
                idle_timeout: Some(Duration::from_secs(300)),
                ..test_settings()
            };
            let (session, _started, _renderer) = session_with(FakeResolver::default(), settings);

            session.clone().run().await;

            assert_eq!(session.state().phase, SchedulerPhase::Draining);
            assert!(session.is_torn_down());
            assert_eq!(*session.driver.shutdowns.lock(), 1);
        }

        #[tokio::test]
        async fn volume_applies_live_and_to_the_next_track() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a", "b"])).await.unwrap();
            assert_eq!(next_start(&mut started).await.volume, 0.1);

            assert_eq!(session.set_volume(0.5).await, Ok(0.1));
            assert_eq!(*session.driver.volumes.lock(), vec![0.5]);

            assert!(session.driver.finish_current());
            assert_eq!(next_start(&mut started).await.volume, 0.5);
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn pause_blocks_seek_until_resumed() {
            let (session, mut started, _renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            next_start(&mut started).await;

            session.pause().await.unwrap();
            assert!(session.state().paused);
            assert_eq!(session.pause().await, Err(ControlError::NoActiveTrack));
            assert_eq!(session.seek(10).await, Err(ControlError::NoActiveTrack));

            session.resume().await.unwrap();
            assert!(!session.state().paused);
            session.seek(10).await.unwrap();
            assert_eq!(next_start(&mut started).await.start_at, Duration::from_secs(10));
            shut(&session, handle).await;
        }

        #[tokio::test]
        async fn enqueue_while_playing_refreshes_the_view() {
            let (session, mut started, renderer) = idle_session(FakeResolver::default());
            let handle = spawn(&session);
            session.enqueue(tracks(&["a"])).await.unwrap();
            next_start(&mut started).await;
            wait_until(|| renderer.views.lock().len() == 1).await;

            let outcome = session.enqueue(tracks(&["b"])).await.unwrap();
            assert!(!outcome.woke_scheduler);
            assert_eq!(renderer.views.lock().len(), 2);
            assert!(renderer.views.lock()[1].content.contains("2. b"));
            shut(&session, handle).await;
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn remove_during_resolution_decrements_once() {
            for _ in 0..200 {
                let (session, mut started, _renderer) = idle_session(FakeResolver::default());
                let handle = spawn(&session);
                session.enqueue(tracks(&["a", "b", "c"])).await.unwrap();

                let remover = {
                    let session = session.clone();
                    tokio::spawn(async move { session.remove(Some(1)) })
                };
                let first = next_start(&mut started).await;
                let removed = remover.await.expect("remove task panicked").unwrap();
                assert_eq!(removed.title, "a");
                assert_eq!(session.queue_len(), 2);

                // Either the removal beat the selection or it landed while
                // "a" was being resolved; both cursors move exactly once.
                let (expected_cursors, expected_next) = match first.title.as_str() {
                    "a" => ((-1, -1), "b"),
                    "b" => ((0, 0), "c"),
                    other => panic!("unexpected first track {other}"),
                };
                assert_eq!(session.cursors(), expected_cursors);

                assert!(session.driver.finish_current());
                assert_eq!(next_start(&mut started).await.title, expected_next);
                shut(&session, handle).await;
            }
        }
    }
}
