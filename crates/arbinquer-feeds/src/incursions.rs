//! Daily Steel Path incursions.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::FeedSource;
use arbinquer_core::types::{FeedId, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::exports::{CatalogLoader, NodeCatalog};
use crate::http::FeedClient;
use crate::parsers::{IncursionDay, parse_incursions, select_current};

pub const ROTATION_SECS: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncursionsStatus {
    pub start_ts: i64,
    /// Resolved `location · mission` entries, in schedule order.
    pub nodes: Vec<String>,
}

impl IncursionsStatus {
    pub fn ends_ts(&self) -> i64 {
        self.start_ts.saturating_add(ROTATION_SECS)
    }
}

pub fn current_incursions(
    rows: &[IncursionDay],
    catalog: &NodeCatalog,
    now: DateTime<Utc>,
) -> Result<IncursionsStatus> {
    let current = select_current(rows, ROTATION_SECS, now)
        .ok_or_else(|| ArbinquerError::parse("incursion schedule has no rows"))?;
    Ok(IncursionsStatus {
        start_ts: current.start_ts,
        nodes: current.node_ids.iter().map(|id| describe(id, catalog)).collect(),
    })
}

fn describe(node_id: &str, catalog: &NodeCatalog) -> String {
    let location = catalog.location(node_id);
    match catalog.mission(node_id) {
        Some(mission) => format!("{location} · {mission}"),
        None => location,
    }
}

pub struct IncursionsFeed {
    client: Arc<FeedClient>,
    catalog: Arc<CatalogLoader>,
    url: String,
}

impl IncursionsFeed {
    pub fn new(client: Arc<FeedClient>, catalog: Arc<CatalogLoader>, url: impl Into<String>) -> Self {
        Self {
            client,
            catalog,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for IncursionsFeed {
    fn feed_id(&self) -> FeedId {
        FeedId::Incursions
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let text = self.client.get_text(&self.url).await?;
        let rows = parse_incursions(&text);
        let catalog = self.catalog.load().await?;
        let now = Utc::now();
        let status = current_incursions(&rows, &catalog, now)?;
        tracing::debug!(nodes = status.nodes.len(), "incursions fetched");
        Snapshot::new(
            FeedId::Incursions,
            now,
            &status,
            DateTime::from_timestamp(status.ends_ts(), 0),
        )
    }
}
