//! Open-world day/night cycles.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::FeedSource;
use arbinquer_core::types::{FeedId, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::http::FeedClient;
use crate::text::title_case;

/// Response key and display name, in display order.
pub const CYCLES: &[(&str, &str)] = &[
    ("earthCycle", "Earth"),
    ("cetusCycle", "Cetus"),
    ("vallisCycle", "Orb Vallis"),
    ("cambionCycle", "Cambion"),
];

/// Numeric expiries above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEntry {
    pub name: String,
    pub state: String,
    pub expiry_ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclesStatus {
    pub cycles: Vec<CycleEntry>,
}

impl CyclesStatus {
    /// Earliest expiry still ahead of `now`.
    pub fn next_change(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cycles
            .iter()
            .filter_map(|c| c.expiry_ts)
            .filter_map(|ts| DateTime::from_timestamp(ts, 0))
            .filter(|at| *at >= now)
            .min()
    }
}

pub fn parse_expiry(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let ts = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if ts <= 0 {
                None
            } else if ts > MILLIS_THRESHOLD {
                Some(ts / 1000)
            } else {
                Some(ts)
            }
        }
        Value::String(s) if !s.is_empty() => DateTime::parse_from_rfc3339(s).ok().map(|t| t.timestamp()),
        _ => None,
    }
}

fn build_entry(name: &str, data: Option<&Value>) -> CycleEntry {
    let Some(data) = data.filter(|d| d.is_object()) else {
        return CycleEntry {
            name: name.to_string(),
            state: "Unknown".into(),
            expiry_ts: None,
        };
    };
    let state = match data.get("state").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        Some(state) => state.to_string(),
        None if data.get("isDay").and_then(Value::as_bool).unwrap_or(false) => "day".into(),
        None => "night".into(),
    };
    CycleEntry {
        name: name.to_string(),
        state: title_case(&state),
        expiry_ts: data.get("expiry").and_then(parse_expiry),
    }
}

pub fn build_cycles(body: &Value) -> Result<CyclesStatus> {
    if !body.is_object() {
        return Err(ArbinquerError::parse("cycles: expected a JSON object"));
    }
    Ok(CyclesStatus {
        cycles: CYCLES
            .iter()
            .map(|(key, name)| build_entry(name, body.get(*key)))
            .collect(),
    })
}

pub struct CyclesFeed {
    client: Arc<FeedClient>,
    url: String,
}

impl CyclesFeed {
    pub fn new(client: Arc<FeedClient>, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl FeedSource for CyclesFeed {
    fn feed_id(&self) -> FeedId {
        FeedId::Cycles
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let body: Value = self.client.get_json(&self.url).await?;
        let status = build_cycles(&body)?;
        let now = Utc::now();
        let boundary = status.next_change(now);
        tracing::debug!(next_change = ?boundary, "cycles fetched");
        Snapshot::new(FeedId::Cycles, now, &status, boundary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_cycles() {
        let body = json!({
            "earthCycle": { "state": "day", "expiry": "2026-03-14T12:00:00.000Z", "timeLeft": "1h" },
            "cetusCycle": { "isDay": false, "expiry": 1_773_489_600_000_i64 },
            "vallisCycle": { "state": "warm", "expiry": 1_773_489_000 },
            "other": 1
        });
        let status = build_cycles(&body).unwrap();
        let names: Vec<&str> = status.cycles.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Earth", "Cetus", "Orb Vallis", "Cambion"]);

        assert_eq!(status.cycles[0].state, "Day");
        assert_eq!(status.cycles[0].expiry_ts, Some(1_773_489_600));
        assert_eq!(status.cycles[1].state, "Night");
        assert_eq!(status.cycles[1].expiry_ts, Some(1_773_489_600));
        assert_eq!(status.cycles[2].state, "Warm");
        assert_eq!(status.cycles[3].state, "Unknown");
        assert_eq!(status.cycles[3].expiry_ts, None);
    }

    #[test]
    fn test_next_change_skips_past_expiries() {
        let status = CyclesStatus {
            cycles: vec![
                CycleEntry { name: "Earth".into(), state: "Day".into(), expiry_ts: Some(100) },
                CycleEntry { name: "Cetus".into(), state: "Day".into(), expiry_ts: Some(900) },
                CycleEntry { name: "Cambion".into(), state: "Fass".into(), expiry_ts: Some(500) },
            ],
        };
        let now = DateTime::from_timestamp(200, 0).unwrap();
        assert_eq!(status.next_change(now), DateTime::from_timestamp(500, 0));
        let later = DateTime::from_timestamp(1000, 0).unwrap();
        assert_eq!(status.next_change(later), None);
    }

    #[test]
    fn test_expiry_formats() {
        assert_eq!(parse_expiry(&json!("not a date")), None);
        assert_eq!(parse_expiry(&json!(0)), None);
        assert_eq!(parse_expiry(&json!(1_700_000_000.5)), Some(1_700_000_000));
        assert_eq!(parse_expiry(&Value::Null), None);
        assert!(build_cycles(&json!([])).is_err());
    }

    #[tokio::test]
    async fn test_fetch_sets_boundary() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let expiry = Utc::now().timestamp() + 600;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "earthCycle": { "state": "night", "expiry": expiry }
            })))
            .mount(&server)
            .await;

        let feed = CyclesFeed::new(Arc::new(FeedClient::new().unwrap()), server.uri());
        let snapshot = feed.fetch().await.unwrap();
        assert_eq!(snapshot.next_boundary_at.map(|b| b.timestamp()), Some(expiry));
    }
}
