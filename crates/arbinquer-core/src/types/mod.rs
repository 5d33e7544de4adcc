//! Shared data types.

pub mod feed;
pub mod message;
pub mod snapshot;

pub use feed::FeedId;
pub use message::ChannelMessage;
pub use snapshot::Snapshot;
