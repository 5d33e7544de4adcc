//! Unified error types for Arbinquer.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using ArbinquerError.
pub type Result<T> = std::result::Result<T, ArbinquerError>;

#[derive(Error, Debug)]
pub enum ArbinquerError {
    // Feed errors
    #[error("Feed fetch failed: {0}")]
    Fetch(String),

    #[error("Feed parse error: {0}")]
    Parse(String),

    // Chat transport errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited: retry after {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // Rendering errors
    #[error("Render error: {0}")]
    Render(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ArbinquerError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Failures that originate on the feed side of a run.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Parse(_))
    }

    /// Delay mandated by the chat platform, if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
