//! Feed source trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FeedId, Snapshot};

/// Yields the current state of one event type.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Which feed this source produces snapshots for.
    fn feed_id(&self) -> FeedId;

    /// Fetch and normalize the feed. Network and parse failures map to
    /// `ArbinquerError::Fetch` / `ArbinquerError::Parse`.
    async fn fetch(&self) -> Result<Snapshot>;
}
