use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::Input,
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::scheduler::{FinishSignal, PlaybackDriver, PlaybackOutcome};
use crate::error::PlaybackError;

/// Plays resolved inputs on a guild's songbird [`Call`].
pub struct SongbirdDriver {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdDriver {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, call: Arc<tokio::sync::Mutex<Call>>) -> Self {
        Self {
            manager,
            guild_id,
            call,
            current: Mutex::new(None),
        }
    }

    fn handle(&self) -> Result<TrackHandle, PlaybackError> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| PlaybackError::Driver("no track loaded".to_string()))
    }
}

fn driver_error(e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::Driver(e.to_string())
}

/// Fires the scheduler's finish signal on track end or error.
///
/// Registered for both events; whichever comes first consumes the signal.
struct TrackFinishedHandler {
    guild_id: GuildId,
    signal: Arc<Mutex<Option<FinishSignal>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut outcome = PlaybackOutcome::Finished;
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Track error in guild {}: {}", self.guild_id, e);
                    outcome = PlaybackOutcome::Failed(e.to_string());
                }
            }
        }

        if let Some(signal) = self.signal.lock().take() {
            debug!("🏁 Track finished in guild {}", self.guild_id);
            signal.finish(outcome);
        }
        // Drop the handler once the track is over.
        Some(Event::Cancel)
    }
}

#[async_trait]
impl PlaybackDriver for SongbirdDriver {
    type Stream = Input;

    async fn play(
        &self,
        stream: Input,
        volume: f32,
        start_at: Duration,
        on_finished: FinishSignal,
    ) -> Result<(), PlaybackError> {
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only(Track::from(stream).volume(volume))
        };

        let signal = Arc::new(Mutex::new(Some(on_finished)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishedHandler {
                        guild_id: self.guild_id,
                        signal: signal.clone(),
                    },
                )
                .map_err(driver_error)?;
        }

        if !start_at.is_zero() {
            debug!("⏩ Starting at {:?}", start_at);
            let seek = handle.seek(start_at);
            let guild_id = self.guild_id;
            // The reply only arrives once the input is playable.
            tokio::spawn(async move {
                if let Err(e) = seek.result_async().await {
                    warn!("❌ Seek to {:?} failed in guild {}: {}", start_at, guild_id, e);
                }
            });
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            if let Err(e) = handle.stop() {
                debug!("Stop on finished track: {}", e);
            }
        }
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.handle()?.pause().map_err(driver_error)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        self.handle()?.play().map_err(driver_error)
    }

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.handle()?.set_volume(volume).map_err(driver_error)
    }

    async fn shutdown(&self) {
        self.stop().await;
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Left voice in guild {}", self.guild_id),
            Err(e) => debug!("Leaving voice in guild {}: {}", self.guild_id, e),
        }
    }
}
