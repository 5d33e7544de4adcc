//! Chat message types.

use serde::{Deserialize, Serialize};

/// A message read back from a channel's recent history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: String,
    pub author_is_self: bool,
    pub content: String,
}

impl ChannelMessage {
    pub fn new(id: impl Into<String>, author_is_self: bool, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author_is_self,
            content: content.into(),
        }
    }
}
