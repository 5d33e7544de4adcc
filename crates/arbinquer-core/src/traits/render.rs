//! Renderer trait.

use crate::error::Result;
use crate::types::Snapshot;

/// Formats a snapshot into display text.
pub trait Renderer: Send + Sync {
    fn render(&self, snapshot: &Snapshot) -> Result<String>;
}
