//! Keeps exactly one live status message per feed in a channel.
//!
//! Every message the reconciler writes ends with a marker line
//! `-# arbinquer:<feed>`. That marker is how a restarted process finds and
//! adopts its previous message, and how stray duplicates are recognised.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::ChatTransport;
use arbinquer_core::types::{ChannelMessage, FeedId};
use std::sync::Arc;
use std::time::Duration;

const TAG_PREFIX: &str = "-# arbinquer:";

/// Marker line identifying a feed's status message.
pub fn tag_line(feed_id: FeedId) -> String {
    format!("{TAG_PREFIX}{feed_id}")
}

/// Append the feed marker to rendered text.
pub fn tagged(feed_id: FeedId, text: &str) -> String {
    format!("{}\n{}", text.trim_end(), tag_line(feed_id))
}

/// Whether `content` carries the marker for `feed_id`.
pub fn is_tagged(feed_id: FeedId, content: &str) -> bool {
    let tag = tag_line(feed_id);
    content.lines().any(|line| line.trim() == tag)
}

/// What `reconcile` did to the live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Edited,
    /// An existing tagged message from an earlier run was taken over and edited.
    Adopted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub message_id: String,
    pub action: ReconcileAction,
    /// Duplicates deleted by the cleanup pass.
    pub removed: usize,
}

pub struct MessageReconciler {
    transport: Arc<dyn ChatTransport>,
    history_limit: usize,
    delete_pause: Duration,
}

impl MessageReconciler {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            history_limit: 50,
            delete_pause: Duration::from_millis(600),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_delete_pause(mut self, pause: Duration) -> Self {
        self.delete_pause = pause;
        self
    }

    /// Make the channel's status message for `feed_id` read `text`.
    ///
    /// `current` is the message the caller believes is live. It is edited in
    /// place; if it is absent or has vanished, the newest tagged message the
    /// bot already owns is adopted, else a new message is created. A cleanup
    /// pass then removes every other tagged bot message for this feed.
    pub async fn reconcile(
        &self,
        feed_id: FeedId,
        channel_id: &str,
        current: Option<&str>,
        text: &str,
    ) -> Result<Reconciled> {
        let content = tagged(feed_id, text);

        if let Some(message_id) = current {
            match self.transport.edit_message(channel_id, message_id, &content).await {
                Ok(()) => {
                    let removed = self.cleanup(feed_id, channel_id, message_id, None).await;
                    return Ok(Reconciled {
                        message_id: message_id.to_string(),
                        action: ReconcileAction::Edited,
                        removed,
                    });
                }
                Err(ArbinquerError::NotFound(_)) => {
                    tracing::info!(feed = %feed_id, channel = channel_id, message_id, "live message vanished");
                }
                Err(e) => return Err(e),
            }
        }

        let history = match self.transport.list_recent_messages(channel_id, self.history_limit).await {
            Ok(history) => Some(history),
            Err(e @ (ArbinquerError::RateLimited { .. } | ArbinquerError::PermissionDenied(_))) => return Err(e),
            Err(e) => {
                tracing::warn!(feed = %feed_id, channel = channel_id, "history scan failed: {e}");
                None
            }
        };

        let candidate = history
            .as_deref()
            .and_then(|h| own_tagged(feed_id, h).find(|m| Some(m.id.as_str()) != current))
            .map(|m| m.id.clone());

        let (message_id, action) = match candidate {
            Some(id) => match self.transport.edit_message(channel_id, &id, &content).await {
                Ok(()) => (id, ReconcileAction::Adopted),
                Err(ArbinquerError::NotFound(_)) => {
                    (self.transport.create_message(channel_id, &content).await?, ReconcileAction::Created)
                }
                Err(e) => return Err(e),
            },
            None => (self.transport.create_message(channel_id, &content).await?, ReconcileAction::Created),
        };

        let removed = self.cleanup(feed_id, channel_id, &message_id, history).await;
        Ok(Reconciled {
            message_id,
            action,
            removed,
        })
    }

    /// Delete tagged bot messages for `feed_id` other than `keep`.
    ///
    /// Bounded by the history window. Failures are logged, never returned:
    /// a leftover duplicate is cosmetic and the next run retries.
    pub async fn cleanup(
        &self,
        feed_id: FeedId,
        channel_id: &str,
        keep: &str,
        history: Option<Vec<ChannelMessage>>,
    ) -> usize {
        let history = match history {
            Some(h) => h,
            None => match self.transport.list_recent_messages(channel_id, self.history_limit).await {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(feed = %feed_id, channel = channel_id, "cleanup scan failed: {e}");
                    return 0;
                }
            },
        };

        let stale: Vec<&ChannelMessage> = own_tagged(feed_id, &history).filter(|m| m.id != keep).collect();
        let mut removed = 0;
        for (i, message) in stale.iter().enumerate() {
            if i > 0 && !self.delete_pause.is_zero() {
                tokio::time::sleep(self.delete_pause).await;
            }
            match self.transport.delete_message(channel_id, &message.id).await {
                Ok(()) | Err(ArbinquerError::NotFound(_)) => removed += 1,
                Err(e) => {
                    tracing::warn!(
                        feed = %feed_id,
                        channel = channel_id,
                        message_id = %message.id,
                        "cleanup delete failed: {e}"
                    );
                    break;
                }
            }
        }

        if removed > 0 {
            tracing::info!(feed = %feed_id, channel = channel_id, removed, "removed duplicate status messages");
        }
        removed
    }
}

fn own_tagged(feed_id: FeedId, history: &[ChannelMessage]) -> impl Iterator<Item = &ChannelMessage> {
    history
        .iter()
        .filter(move |m| m.author_is_self && is_tagged(feed_id, &m.content))
}
