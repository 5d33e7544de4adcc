//! Active invasions.
//!
//! The endpoint lists one entry per invasion side; entries sharing an `id`
//! belong to the same invasion and are grouped in first-seen order.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::FeedSource;
use arbinquer_core::types::{FeedId, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::exports::{CatalogLoader, NodeCatalog};
use crate::http::FeedClient;
use crate::text::{split_camel, title_case};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInvasionSide {
    pub id: Option<String>,
    pub node: Option<String>,
    pub ally: Option<String>,
    pub missions: Vec<String>,
    #[serde(rename = "allyPay")]
    pub ally_pay: Vec<RawReward>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawReward {
    #[serde(rename = "ItemType")]
    pub item_type: Option<String>,
    #[serde(rename = "ItemCount")]
    pub item_count: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInvasions {
    List(Vec<RawInvasionSide>),
    Wrapped {
        #[serde(default)]
        invasions: Vec<RawInvasionSide>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvasionSide {
    pub faction: String,
    pub missions: Vec<String>,
    pub rewards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invasion {
    pub location: String,
    /// At most two sides, ordered by faction name.
    pub sides: Vec<InvasionSide>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvasionsStatus {
    pub invasions: Vec<Invasion>,
}

pub fn faction_name(code: Option<&str>) -> String {
    match code {
        None | Some("") => "Unknown".into(),
        Some("FC_CORPUS") => "Corpus".into(),
        Some("FC_GRINEER") => "Grineer".into(),
        Some("FC_INFESTATION") => "Infestation".into(),
        Some("FC_OROKIN") => "Orokin".into(),
        Some("FC_MITW") => "MurMur".into(),
        Some("FC_SENTIENT") => "Sentient".into(),
        Some(other) => other.into(),
    }
}

/// Accepts a bare array or an object with an `invasions` array.
pub fn parse_invasions(body: &str) -> Result<Vec<RawInvasionSide>> {
    let raw: RawInvasions = serde_json::from_str(body)
        .map_err(|e| ArbinquerError::parse(format!("invasions: {e}")))?;
    Ok(match raw {
        RawInvasions::List(sides) | RawInvasions::Wrapped { invasions: sides } => sides,
    })
}

pub fn build_invasions(sides: Vec<RawInvasionSide>, catalog: &NodeCatalog) -> InvasionsStatus {
    let mut groups: Vec<(String, Vec<RawInvasionSide>)> = Vec::new();
    for side in sides {
        let Some(id) = side.id.clone().filter(|id| !id.is_empty()) else {
            continue;
        };
        match groups.iter_mut().find(|(gid, _)| *gid == id) {
            Some((_, members)) => members.push(side),
            None => groups.push((id, vec![side])),
        }
    }

    let invasions = groups
        .into_iter()
        .map(|(_, members)| {
            let location = match members[0].node.as_deref() {
                Some(node) if !node.is_empty() => catalog.location(node),
                _ => "Unknown".to_string(),
            };
            let mut sides: Vec<InvasionSide> = members.iter().map(|s| build_side(s, catalog)).collect();
            sides.sort_by(|a, b| a.faction.cmp(&b.faction));
            sides.truncate(2);
            Invasion { location, sides }
        })
        .collect();
    InvasionsStatus { invasions }
}

fn build_side(side: &RawInvasionSide, catalog: &NodeCatalog) -> InvasionSide {
    let rewards = side
        .ally_pay
        .iter()
        .filter_map(|reward| {
            let name = catalog.item_name(reward.item_type.as_deref()?)?;
            Some(match reward.item_count {
                Some(n) if n > 1 => format!("{name} x{n}"),
                _ => name,
            })
        })
        .collect();
    InvasionSide {
        faction: faction_name(side.ally.as_deref()),
        missions: side.missions.iter().map(|m| title_case(&split_camel(m))).collect(),
        rewards,
    }
}

pub struct InvasionsFeed {
    client: Arc<FeedClient>,
    catalog: Arc<CatalogLoader>,
    url: String,
}

impl InvasionsFeed {
    pub fn new(client: Arc<FeedClient>, catalog: Arc<CatalogLoader>, url: impl Into<String>) -> Self {
        Self {
            client,
            catalog,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for InvasionsFeed {
    fn feed_id(&self) -> FeedId {
        FeedId::Invasions
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let body = self.client.get_text(&self.url).await?;
        let sides = parse_invasions(&body)?;
        let catalog = self.catalog.load().await?;
        let status = build_invasions(sides, &catalog);
        tracing::debug!(invasions = status.invasions.len(), "invasions fetched");
        Snapshot::new(FeedId::Invasions, Utc::now(), &status, None)
    }
}
