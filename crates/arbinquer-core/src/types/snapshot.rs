//! Normalized feed readings.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::FeedId;
use crate::error::Result;

/// One normalized, comparable reading of a feed.
///
/// The payload is kept as canonical JSON so the scheduler can compare
/// snapshots without knowing the feed-specific shape. Object keys are
/// sorted by `serde_json`, which makes the fingerprint stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub feed_id: FeedId,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// When the represented state is expected to change next, if the feed says so.
    pub next_boundary_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Build a snapshot from a typed payload.
    pub fn new<T: Serialize>(
        feed_id: FeedId,
        fetched_at: DateTime<Utc>,
        payload: &T,
        next_boundary_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        Ok(Self {
            feed_id,
            fetched_at,
            payload: serde_json::to_value(payload)?,
            next_boundary_at,
        })
    }

    /// Decode the payload back into its feed-specific type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// SHA-256 of the canonical payload. Ignores `fetched_at` and `next_boundary_at`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.feed_id.as_str());
        hasher.update(b"\n");
        hasher.update(self.payload.to_string());
        format!("{:x}", hasher.finalize())
    }

    /// Same feed, same payload.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.feed_id == other.feed_id && self.payload == other.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        node: String,
        count: u32,
    }

    fn sample(at: i64) -> Snapshot {
        let payload = Sample { node: "SolNode1".into(), count: 3 };
        Snapshot::new(
            FeedId::Arbitration,
            Utc.timestamp_opt(at, 0).unwrap(),
            &payload,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_payload_round_trip() {
        let snap = sample(1_700_000_000);
        let decoded: Sample = snap.payload_as().unwrap();
        assert_eq!(decoded, Sample { node: "SolNode1".into(), count: 3 });
    }

    #[test]
    fn test_fingerprint_ignores_fetch_time() {
        let a = sample(1_700_000_000);
        let b = sample(1_700_003_600);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.same_content(&b));
    }

    #[test]
    fn test_fingerprint_tracks_payload() {
        let a = sample(0);
        let mut b = sample(0);
        b.payload = serde_json::json!({"node": "SolNode2", "count": 3});
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_fingerprint_includes_feed() {
        let a = sample(0);
        let mut b = sample(0);
        b.feed_id = FeedId::Incursions;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
