//! Decides whether a fetched snapshot needs to reach the channel.

use arbinquer_core::types::Snapshot;

use crate::cadence::Cadence;

/// Compares snapshots by payload only; fetch time and boundary are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// True on the first snapshot, or when the payload differs.
    pub fn has_changed(&self, previous: Option<&Snapshot>, current: &Snapshot) -> bool {
        match previous {
            None => true,
            Some(previous) => !previous.same_content(current),
        }
    }

    /// Only fixed-interval feeds skip unchanged content. Slot and boundary
    /// runs each correspond to an expected state change and always post.
    /// A job with no live message always posts.
    pub fn should_reconcile(
        &self,
        cadence: &Cadence,
        last_posted: Option<&Snapshot>,
        current: &Snapshot,
        has_live_message: bool,
    ) -> bool {
        if !has_live_message {
            return true;
        }
        match cadence {
            Cadence::FixedInterval { .. } => self.has_changed(last_posted, current),
            Cadence::FixedClockSlot { .. } | Cadence::DynamicNextBoundary => true,
        }
    }
}
