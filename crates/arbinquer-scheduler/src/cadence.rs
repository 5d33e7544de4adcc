//! When to re-check a feed.

use arbinquer_core::config::ScheduleConfig;
use arbinquer_core::types::Snapshot;
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Refresh cadence of one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Every hour at this minute (UTC).
    FixedClockSlot { minute: u8 },
    /// Every `every`, whatever the fetch returned.
    FixedInterval { every: Duration },
    /// Shortly after the snapshot's own `next_boundary_at`.
    DynamicNextBoundary,
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cadence::FixedClockSlot { minute } => write!(f, "hourly at :{minute:02}"),
            Cadence::FixedInterval { every } => write!(f, "every {}s", every.as_secs()),
            Cadence::DynamicNextBoundary => f.write_str("next boundary"),
        }
    }
}

/// Parameters shared by every cadence computation.
#[derive(Debug, Clone)]
pub struct CadencePolicy {
    /// Added to a boundary to tolerate source clock skew.
    pub boundary_margin: Duration,
    /// DynamicNextBoundary delay when the snapshot has no boundary.
    pub boundary_fallback: Duration,
    /// Shortest DynamicNextBoundary delay, also used for boundaries already past.
    pub boundary_min_delay: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self {
            boundary_margin: Duration::from_secs(5),
            boundary_fallback: Duration::from_secs(300),
            boundary_min_delay: Duration::from_secs(30),
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(1800),
        }
    }
}

impl CadencePolicy {
    pub fn from_config(schedule: &ScheduleConfig) -> Self {
        Self {
            boundary_margin: Duration::from_secs(schedule.cycle_margin_secs),
            boundary_fallback: Duration::from_secs(schedule.cycle_fallback_secs),
            backoff_base: Duration::from_secs(schedule.backoff_base_secs),
            backoff_max: Duration::from_secs(schedule.backoff_max_secs),
            ..Self::default()
        }
    }

    /// Next run after a successful fetch (or when no snapshot is available).
    /// Always strictly after `now`.
    pub fn next_run(&self, cadence: &Cadence, now: DateTime<Utc>, snapshot: Option<&Snapshot>) -> DateTime<Utc> {
        let next = match cadence {
            Cadence::FixedClockSlot { minute } => next_slot(now, *minute),
            Cadence::FixedInterval { every } => add(now, *every),
            Cadence::DynamicNextBoundary => match snapshot.and_then(|s| s.next_boundary_at) {
                Some(boundary) => {
                    let target = add(boundary, self.boundary_margin);
                    target.max(add(now, self.boundary_min_delay))
                }
                None => add(now, self.boundary_fallback),
            },
        };
        strictly_after(now, next)
    }

    /// `min(base * 2^(n-1), max)`; zero for `n == 0`.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exp = consecutive_failures.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Next run after a failed run. Backoff replaces the cadence, except that
    /// a fixed interval is never shortened.
    pub fn next_run_after_failure(
        &self,
        cadence: &Cadence,
        now: DateTime<Utc>,
        consecutive_failures: u32,
    ) -> DateTime<Utc> {
        let mut delay = self.backoff_delay(consecutive_failures);
        if let Cadence::FixedInterval { every } = cadence {
            delay = delay.max(*every);
        }
        strictly_after(now, add(now, delay))
    }

    /// Next run after the chat platform asked us to slow down.
    pub fn next_run_after_rate_limit(&self, now: DateTime<Utc>, retry_after: Duration) -> DateTime<Utc> {
        strictly_after(now, add(now, retry_after.max(Duration::from_secs(1))))
    }
}

/// First instant strictly after `now` whose minute-of-hour is `minute`.
fn next_slot(now: DateTime<Utc>, minute: u8) -> DateTime<Utc> {
    let hour_start = now
        .with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0));
    let Some(hour_start) = hour_start else {
        return add(now, Duration::from_secs(3600));
    };
    let slot = hour_start + TimeDelta::minutes(i64::from(minute.min(59)));
    if slot > now { slot } else { slot + TimeDelta::hours(1) }
}

fn add(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn strictly_after(now: DateTime<Utc>, next: DateTime<Utc>) -> DateTime<Utc> {
    if next > now { next } else { now + TimeDelta::seconds(1) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbinquer_core::types::FeedId;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    fn snapshot_with_boundary(boundary: Option<DateTime<Utc>>) -> Snapshot {
        Snapshot::new(FeedId::Cycles, at(0, 0, 0), &serde_json::json!({"state": "day"}), boundary).unwrap()
    }

    #[test]
    fn test_slot_exactly_on_boundary_advances_an_hour() {
        let policy = CadencePolicy::default();
        let slot = Cadence::FixedClockSlot { minute: 1 };
        assert_eq!(policy.next_run(&slot, at(10, 1, 0), None), at(11, 1, 0));
    }

    #[test]
    fn test_slot_before_and_after_minute() {
        let policy = CadencePolicy::default();
        let slot = Cadence::FixedClockSlot { minute: 1 };
        assert_eq!(policy.next_run(&slot, at(10, 0, 59), None), at(10, 1, 0));
        assert_eq!(policy.next_run(&slot, at(10, 1, 1), None), at(11, 1, 0));
        assert_eq!(policy.next_run(&slot, at(23, 30, 0), None), Utc.with_ymd_and_hms(2026, 3, 15, 0, 1, 0).unwrap());
    }

    #[test]
    fn test_fixed_interval() {
        let policy = CadencePolicy::default();
        let every = Cadence::FixedInterval { every: Duration::from_secs(300) };
        assert_eq!(policy.next_run(&every, at(10, 0, 0), None), at(10, 5, 0));
    }

    #[test]
    fn test_dynamic_uses_boundary_plus_margin() {
        let policy = CadencePolicy::default();
        let now = at(12, 0, 0);
        let snap = snapshot_with_boundary(Some(now + TimeDelta::seconds(600)));
        let next = policy.next_run(&Cadence::DynamicNextBoundary, now, Some(&snap));
        assert_eq!(next, now + TimeDelta::seconds(605));
    }

    #[test]
    fn test_dynamic_without_boundary_falls_back() {
        let policy = CadencePolicy::default();
        let now = at(12, 0, 0);
        let snap = snapshot_with_boundary(None);
        assert_eq!(
            policy.next_run(&Cadence::DynamicNextBoundary, now, Some(&snap)),
            now + TimeDelta::seconds(300)
        );
        assert_eq!(policy.next_run(&Cadence::DynamicNextBoundary, now, None), now + TimeDelta::seconds(300));
    }

    #[test]
    fn test_dynamic_past_boundary_rechecks_soon() {
        let policy = CadencePolicy::default();
        let now = at(12, 0, 0);
        let snap = snapshot_with_boundary(Some(now - TimeDelta::seconds(20)));
        assert_eq!(
            policy.next_run(&Cadence::DynamicNextBoundary, now, Some(&snap)),
            now + TimeDelta::seconds(30)
        );
    }

    #[test]
    fn test_backoff_monotonic_up_to_cap() {
        let policy = CadencePolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(120));

        let mut previous = Duration::ZERO;
        for n in 1..100 {
            let delay = policy.backoff_delay(n);
            assert!(delay >= previous, "backoff decreased at n={n}");
            assert!(delay <= policy.backoff_max);
            previous = delay;
        }
        assert_eq!(previous, policy.backoff_max);
    }

    #[test]
    fn test_failure_overrides_slot_but_not_interval() {
        let policy = CadencePolicy::default();
        let now = at(10, 1, 0);
        let slot = Cadence::FixedClockSlot { minute: 1 };
        assert_eq!(policy.next_run_after_failure(&slot, now, 1), now + TimeDelta::seconds(30));

        let every = Cadence::FixedInterval { every: Duration::from_secs(300) };
        assert_eq!(policy.next_run_after_failure(&every, now, 1), now + TimeDelta::seconds(300));
        assert_eq!(policy.next_run_after_failure(&every, now, 6), now + TimeDelta::seconds(960));
    }

    #[test]
    fn test_rate_limit_floor() {
        let policy = CadencePolicy::default();
        let now = at(10, 0, 0);
        assert_eq!(
            policy.next_run_after_rate_limit(now, Duration::from_millis(200)),
            now + TimeDelta::seconds(1)
        );
        assert_eq!(
            policy.next_run_after_rate_limit(now, Duration::from_secs(7)),
            now + TimeDelta::seconds(7)
        );
    }

    #[test]
    fn test_every_result_is_in_the_future() {
        let policy = CadencePolicy {
            boundary_min_delay: Duration::ZERO,
            boundary_margin: Duration::ZERO,
            ..CadencePolicy::default()
        };
        let now = at(8, 0, 0);
        let snap = snapshot_with_boundary(Some(now));
        assert!(policy.next_run(&Cadence::DynamicNextBoundary, now, Some(&snap)) > now);
        let zero = Cadence::FixedInterval { every: Duration::ZERO };
        assert!(policy.next_run(&zero, now, None) > now);
    }
}
