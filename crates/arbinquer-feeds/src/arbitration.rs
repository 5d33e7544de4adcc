//! Hourly arbitration rotation.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::FeedSource;
use arbinquer_core::types::{FeedId, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::exports::{CatalogLoader, NodeCatalog};
use crate::http::FeedClient;
use crate::parsers::{ArbitrationHour, parse_arbys, select_current};

pub const ROTATION_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationStatus {
    pub start_ts: i64,
    pub node_id: String,
    pub location: String,
    pub mission: Option<String>,
}

impl ArbitrationStatus {
    pub fn ends_ts(&self) -> i64 {
        self.start_ts.saturating_add(ROTATION_SECS)
    }
}

/// Current rotation from parsed schedule rows.
pub fn current_arbitration(
    rows: &[ArbitrationHour],
    catalog: &NodeCatalog,
    now: DateTime<Utc>,
) -> Result<ArbitrationStatus> {
    let current = select_current(rows, ROTATION_SECS, now)
        .ok_or_else(|| ArbinquerError::parse("arbitration schedule has no rows"))?;
    Ok(ArbitrationStatus {
        start_ts: current.start_ts,
        node_id: current.node_id.clone(),
        location: catalog.location(&current.node_id),
        mission: catalog.mission(&current.node_id),
    })
}

pub struct ArbitrationFeed {
    client: Arc<FeedClient>,
    catalog: Arc<CatalogLoader>,
    url: String,
}

impl ArbitrationFeed {
    pub fn new(client: Arc<FeedClient>, catalog: Arc<CatalogLoader>, url: impl Into<String>) -> Self {
        Self {
            client,
            catalog,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for ArbitrationFeed {
    fn feed_id(&self) -> FeedId {
        FeedId::Arbitration
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let text = self.client.get_text(&self.url).await?;
        let rows = parse_arbys(&text);
        let catalog = self.catalog.load().await?;
        let now = Utc::now();
        let status = current_arbitration(&rows, &catalog, now)?;
        let boundary = DateTime::from_timestamp(status.ends_ts(), 0);
        tracing::debug!(node = %status.node_id, "arbitration fetched");
        Snapshot::new(FeedId::Arbitration, now, &status, boundary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog() -> NodeCatalog {
        NodeCatalog::build(
            &json!({ "SolNode94": { "name": "Apollodorus", "systemName": "Mercury", "missionName": "survival" } }),
            None,
        )
    }

    #[test]
    fn test_current_arbitration_resolves_node() {
        let rows = parse_arbys("1000,SolNode1\n4600,SolNode94\n8200,SolNode2\n");
        let now = DateTime::from_timestamp(5000, 0).unwrap();
        let status = current_arbitration(&rows, &catalog(), now).unwrap();
        assert_eq!(status.start_ts, 4600);
        assert_eq!(status.location, "Apollodorus (Mercury)");
        assert_eq!(status.mission.as_deref(), Some("Survival"));
        assert_eq!(status.ends_ts(), 8200);
    }

    #[test]
    fn test_far_future_rotation_has_no_boundary() {
        let rows = parse_arbys("9223372036854775807,SolNode1\n");
        let status = current_arbitration(&rows, &catalog(), Utc::now()).unwrap();
        assert_eq!(status.ends_ts(), i64::MAX);
        assert!(DateTime::from_timestamp(status.ends_ts(), 0).is_none());
    }

    #[test]
    fn test_empty_schedule_is_parse_error() {
        let err = current_arbitration(&[], &catalog(), Utc::now()).unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_fetch_builds_snapshot() {
        let server = MockServer::start().await;
        let start = Utc::now().timestamp() - 600;
        Mock::given(method("GET"))
            .and(path("/arbys.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{start},SolNode94\n")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ExportRegions.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "SolNode94": { "name": "Apollodorus", "systemName": "Mercury" }
            })))
            .mount(&server)
            .await;

        let client = Arc::new(FeedClient::new().unwrap());
        let loader = Arc::new(CatalogLoader::new(
            client.clone(),
            format!("{}/ExportRegions.json", server.uri()),
            None,
        ));
        let feed = ArbitrationFeed::new(client, loader, format!("{}/arbys.txt", server.uri()));

        let snapshot = feed.fetch().await.unwrap();
        assert_eq!(snapshot.feed_id, FeedId::Arbitration);
        let status: ArbitrationStatus = snapshot.payload_as().unwrap();
        assert_eq!(status.location, "Apollodorus (Mercury)");
        assert_eq!(
            snapshot.next_boundary_at.map(|b| b.timestamp()),
            Some(start + ROTATION_SECS)
        );
    }
}
