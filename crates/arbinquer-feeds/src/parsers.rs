//! Plain-text schedule parsers.
//!
//! Arbitration lines are `<unix_ts>,<node_id>`; incursion lines are
//! `<unix_ts>;<node>,<node>,...`. Blank and malformed lines are skipped.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbitrationHour {
    pub start_ts: i64,
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncursionDay {
    pub start_ts: i64,
    pub node_ids: Vec<String>,
}

/// Rows that start at a timestamp and stay current for a fixed window.
pub trait Scheduled {
    fn start_ts(&self) -> i64;
}

impl Scheduled for ArbitrationHour {
    fn start_ts(&self) -> i64 {
        self.start_ts
    }
}

impl Scheduled for IncursionDay {
    fn start_ts(&self) -> i64 {
        self.start_ts
    }
}

pub fn parse_arbys(text: &str) -> Vec<ArbitrationHour> {
    lines(text)
        .filter_map(|line| {
            let mut parts = line.split(',').map(str::trim);
            let (ts, node, rest) = (parts.next()?, parts.next()?, parts.next());
            if rest.is_some() || node.is_empty() {
                return None;
            }
            Some(ArbitrationHour {
                start_ts: ts.parse().ok()?,
                node_id: node.to_string(),
            })
        })
        .collect()
}

pub fn parse_incursions(text: &str) -> Vec<IncursionDay> {
    lines(text)
        .filter_map(|line| {
            let (ts, nodes) = line.split_once(';')?;
            if nodes.contains(';') {
                return None;
            }
            let node_ids: Vec<String> = nodes
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
            if node_ids.is_empty() {
                return None;
            }
            Some(IncursionDay {
                start_ts: ts.trim().parse().ok()?,
                node_ids,
            })
        })
        .collect()
}

/// The row whose `[start, start + window)` contains `now` (latest first),
/// else the earliest future row, else the latest row.
pub fn select_current<T: Scheduled>(rows: &[T], window_secs: i64, now: DateTime<Utc>) -> Option<&T> {
    let mut sorted: Vec<&T> = rows.iter().collect();
    sorted.sort_by_key(|r| r.start_ts());
    let now = now.timestamp();

    sorted
        .iter()
        .rev()
        .find(|r| r.start_ts() <= now && now < r.start_ts().saturating_add(window_secs))
        .or_else(|| sorted.iter().find(|r| r.start_ts() > now))
        .or_else(|| sorted.last())
        .copied()
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}
