//! # Arbinquer Core
//!
//! Shared types, traits, errors, and configuration used by every other
//! Arbinquer crate.
//!
//! ```text
//! FeedSource ──fetch──▶ Snapshot ──render──▶ text ──▶ ChatTransport
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ArbinquerConfig;
pub use error::{ArbinquerError, Result};
pub use traits::{ChatTransport, FeedSource, Renderer};
pub use types::{ChannelMessage, FeedId, Snapshot};
