use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

use super::{
    scheduler::{PlaybackDriver, TrackResolver},
    session::Session,
};

/// Live sessions by guild.
///
/// A session is created by the first command that needs one and removed when
/// its scheduler drains. The map's shard locks are never held while a
/// session's own lock is taken.
pub struct SessionRegistry<R, P>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    sessions: Arc<DashMap<GuildId, Arc<Session<R, P>>>>,
}

impl<R, P> Default for SessionRegistry<R, P>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> SessionRegistry<R, P>
where
    R: TrackResolver,
    P: PlaybackDriver<Stream = R::Stream>,
{
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// The guild's session, unless there is none or it is draining.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session<R, P>>> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_torn_down())
    }

    /// Returns the live session of the guild, or builds one with `make` and
    /// spawns its scheduler.
    ///
    /// A session that is still draining is replaced; its scheduler only
    /// removes the entry if it still points at that session.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        make: impl FnOnce() -> Session<R, P>,
    ) -> Arc<Session<R, P>> {
        let (session, created) = match self.sessions.entry(guild_id) {
            Entry::Occupied(mut occupied) if occupied.get().is_torn_down() => {
                let session = Arc::new(make());
                occupied.insert(session.clone());
                (session, true)
            }
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let session = Arc::new(make());
                vacant.insert(session.clone());
                (session, true)
            }
        };

        if created {
            info!("🆕 New session for guild {}", guild_id);
            self.spawn(session.clone());
        }
        session
    }

    fn spawn(&self, session: Arc<Session<R, P>>) {
        let sessions = self.sessions.clone();
        let guild_id = session.guild_id();
        let span = info_span!("session", guild = %guild_id);

        tokio::spawn(
            async move {
                session.clone().run().await;
                if sessions
                    .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &session))
                    .is_some()
                {
                    debug!("🗑️ Session for guild {} removed", guild_id);
                }
            }
            .instrument(span),
        );
    }

    /// Tears the guild's session down. Returns `false` if there was none.
    pub fn teardown(&self, guild_id: GuildId) -> bool {
        match self.get(guild_id) {
            Some(session) => {
                session.teardown();
                true
            }
            None => false,
        }
    }

    /// Tears down every session, used on shutdown.
    pub fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        info!("⏹️ Shutting down {} session(s)", sessions.len());
        for session in sessions {
            session.teardown();
        }
    }

    /// Number of entries, draining sessions included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
