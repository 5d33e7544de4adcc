//! # Arbinquer Channels
//!
//! Chat transport implementations and the reconciler that keeps one live
//! status message per feed in a channel.

pub mod discord;
pub mod memory;
pub mod reconciler;

pub use discord::{DiscordChannel, DiscordConfig};
pub use memory::{Fault, MemoryTransport, Op};
pub use reconciler::{MessageReconciler, ReconcileAction, Reconciled};
