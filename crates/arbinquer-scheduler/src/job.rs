//! Per-feed job state.

use arbinquer_channels::ReconcileAction;
use arbinquer_core::types::{FeedId, Snapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::cadence::{Cadence, CadencePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
}

/// Result of one fetch → detect → reconcile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Posted(ReconcileAction),
    /// Fetched content matched what is already posted.
    Unchanged,
    FetchFailed,
    /// The bot lacks a channel permission; retried at normal cadence.
    Degraded,
    RateLimited(Duration),
    Failed,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Posted(_) | RunOutcome::Unchanged)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Posted(ReconcileAction::Created) => f.write_str("created"),
            RunOutcome::Posted(ReconcileAction::Edited) => f.write_str("edited"),
            RunOutcome::Posted(ReconcileAction::Adopted) => f.write_str("adopted"),
            RunOutcome::Unchanged => f.write_str("unchanged"),
            RunOutcome::FetchFailed => f.write_str("fetch failed"),
            RunOutcome::Degraded => f.write_str("degraded"),
            RunOutcome::RateLimited(d) => write!(f, "rate limited ({}ms)", d.as_millis()),
            RunOutcome::Failed => f.write_str("failed"),
        }
    }
}

/// One feed's schedule and live-message bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct FeedJob {
    pub feed_id: FeedId,
    pub cadence: Cadence,
    pub channel_id: String,
    /// Latest successful fetch.
    pub last_snapshot: Option<Snapshot>,
    /// Snapshot behind the text currently in the channel.
    pub last_posted: Option<Snapshot>,
    pub last_message_ref: Option<String>,
    pub next_run_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    /// Render or chat failures since the last successful post. Unlike
    /// `consecutive_failures` this survives successful fetches.
    pub publish_failures: u32,
    pub state: JobState,
    pub degraded: bool,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub runs: u64,
}

impl FeedJob {
    /// A fresh job. First run is immediate when `run_now`, else at the
    /// cadence's first slot.
    pub fn new(
        feed_id: FeedId,
        cadence: Cadence,
        channel_id: impl Into<String>,
        policy: &CadencePolicy,
        now: DateTime<Utc>,
        run_now: bool,
    ) -> Self {
        let next_run_at = if run_now { now } else { policy.next_run(&cadence, now, None) };
        Self {
            feed_id,
            cadence,
            channel_id: channel_id.into(),
            last_snapshot: None,
            last_posted: None,
            last_message_ref: None,
            next_run_at,
            consecutive_failures: 0,
            publish_failures: 0,
            state: JobState::Idle,
            degraded: false,
            last_error: None,
            last_run_at: None,
            runs: 0,
        }
    }

    /// Time left until the next run, zero if overdue.
    pub fn wait_from(&self, now: DateTime<Utc>) -> Duration {
        (self.next_run_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
