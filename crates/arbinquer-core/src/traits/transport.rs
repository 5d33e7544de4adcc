//! Chat transport trait: the narrow REST surface the reconciler needs.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ChannelMessage;

/// Chat platform operations used for status messages.
///
/// Implementations map platform failures onto `PermissionDenied`,
/// `RateLimited`, `NotFound` and `Transport`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name (e.g. "discord").
    fn name(&self) -> &str;

    /// Post a new message and return its id.
    async fn create_message(&self, channel_id: &str, content: &str) -> Result<String>;

    /// Replace the content of an existing message.
    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()>;

    /// Delete a message.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;

    /// Most recent messages in the channel, newest first, at most `limit`.
    async fn list_recent_messages(&self, channel_id: &str, limit: usize) -> Result<Vec<ChannelMessage>>;
}
