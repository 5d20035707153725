use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage, GetMessages},
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    audio::scheduler::StatusRenderer,
    ui::{buttons, now_playing::NowPlayingView},
};

/// The now-playing message of a session's text channel.
///
/// The message is edited in place while it is the newest one in the channel,
/// otherwise it is deleted and sent again so it stays at the bottom.
pub struct StatusBoard {
    http: Arc<Http>,
    channel_id: ChannelId,
    message: Mutex<Option<MessageId>>,
}

impl StatusBoard {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self {
            http,
            channel_id,
            message: Mutex::new(None),
        }
    }

    async fn show(&self, view: &NowPlayingView) -> Result<()> {
        let mut message = self.message.lock().await;

        let newest = self
            .channel_id
            .messages(&*self.http, GetMessages::new().limit(1))
            .await?
            .first()
            .map(|m| m.id);

        match *message {
            Some(id) if newest == Some(id) => {
                self.channel_id
                    .edit_message(
                        &*self.http,
                        id,
                        EditMessage::new()
                            .content(&view.content)
                            .components(buttons::create_player_buttons(view)),
                    )
                    .await?;
                debug!("✏️ Now-playing message edited");
            }
            previous => {
                if let Some(id) = previous {
                    if let Err(e) = self.channel_id.delete_message(&self.http, id).await {
                        debug!("Old now-playing message already gone: {}", e);
                    }
                }
                let sent = self
                    .channel_id
                    .send_message(
                        &*self.http,
                        CreateMessage::new()
                            .content(&view.content)
                            .components(buttons::create_player_buttons(view)),
                    )
                    .await?;
                *message = Some(sent.id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StatusRenderer for StatusBoard {
    async fn render(&self, view: NowPlayingView) {
        if let Err(e) = self.show(&view).await {
            warn!("❌ Could not update now-playing message in {}: {:?}", self.channel_id, e);
        }
    }
}
