//! Node catalog built from the public region export.
//!
//! Two export shapes are accepted: a map keyed by node id whose values carry
//! `name`/`systemName`, or any structure containing `Nodes` lists whose
//! entries name their node under one of several key spellings.

use arbinquer_core::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::http::FeedClient;
use crate::text::{split_camel, title_case};

/// Localisation dictionary: export key → display string.
pub type Dictionary = HashMap<String, String>;

const LANGUAGE_PREFIX: &str = "/Lotus/Language/";

const NODE_ID_KEYS: &[&str] = &["Node", "node", "nodeId", "node_id", "NodeId"];
const NAME_KEYS: &[&str] = &["Name", "name", "nodeName", "NodeName", "nameKey"];
const PLANET_KEYS: &[&str] = &["systemName", "SystemName", "Planet", "planet", "Region", "region", "system"];
const MISSION_KEYS: &[&str] = &["missionName", "MissionName", "mission", "Mission"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub name: String,
    pub planet: Option<String>,
    pub mission: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    nodes: HashMap<String, NodeInfo>,
    dictionary: Dictionary,
}

impl NodeCatalog {
    pub fn build(exports: &Value, dictionary: Option<Dictionary>) -> Self {
        let dictionary = dictionary.unwrap_or_default();
        let nodes = match exports.as_object() {
            Some(map) if looks_like_node_map(map) => from_node_map(map, &dictionary),
            _ => from_node_lists(exports, &dictionary),
        };
        Self { nodes, dictionary }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeInfo> {
        self.nodes.get(node_id)
    }

    /// `Name (Planet)`, `Name`, or the raw id when unknown.
    pub fn location(&self, node_id: &str) -> String {
        match self.get(node_id) {
            Some(NodeInfo { name, planet: Some(planet), .. }) => format!("{name} ({planet})"),
            Some(node) => node.name.clone(),
            None => node_id.to_string(),
        }
    }

    pub fn mission(&self, node_id: &str) -> Option<String> {
        self.get(node_id)?.mission.as_deref().map(title_case)
    }

    /// Display name of a reward item type.
    pub fn item_name(&self, item_type: &str) -> Option<String> {
        if item_type.is_empty() {
            return None;
        }
        if let Some(name) = self.dictionary.get(item_type) {
            return Some(name.clone());
        }
        let base = item_type.rsplit('/').next().unwrap_or(item_type);
        Some(title_case(&split_camel(base)))
    }
}

/// Fetches the export (and optional dictionary) and builds a catalog.
/// Both documents are revalidated with conditional GETs on every load.
pub struct CatalogLoader {
    client: Arc<FeedClient>,
    exports_url: String,
    dict_url: Option<String>,
}

impl CatalogLoader {
    pub fn new(client: Arc<FeedClient>, exports_url: impl Into<String>, dict_url: Option<String>) -> Self {
        Self {
            client,
            exports_url: exports_url.into(),
            dict_url: dict_url.filter(|u| !u.is_empty()),
        }
    }

    pub async fn load(&self) -> Result<NodeCatalog> {
        let exports: Value = self.client.get_cached_json(&self.exports_url).await?;
        let dictionary = match &self.dict_url {
            Some(url) => Some(self.client.get_cached_json::<Dictionary>(url).await?),
            None => None,
        };
        let catalog = NodeCatalog::build(&exports, dictionary);
        tracing::debug!(nodes = catalog.len(), "node catalog loaded");
        Ok(catalog)
    }
}

fn resolve(raw: Option<&str>, dictionary: &Dictionary) -> Option<String> {
    let raw = raw.filter(|r| !r.is_empty())?;
    if let Some(name) = dictionary.get(raw) {
        return Some(name.clone());
    }
    if raw.starts_with(LANGUAGE_PREFIX) {
        return raw.rsplit('/').next().map(String::from);
    }
    Some(raw.to_string())
}

fn looks_like_node_map(map: &Map<String, Value>) -> bool {
    map.values()
        .filter_map(Value::as_object)
        .any(|v| v.contains_key("name") || v.contains_key("systemName"))
}

fn from_node_map(map: &Map<String, Value>, dictionary: &Dictionary) -> HashMap<String, NodeInfo> {
    map.iter()
        .filter_map(|(node_id, item)| {
            let item = item.as_object()?;
            let field = |a: &str, b: &str| {
                item.get(a)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .or_else(|| item.get(b).and_then(Value::as_str))
            };
            let info = NodeInfo {
                node_id: node_id.clone(),
                name: resolve(field("name", "Name"), dictionary).unwrap_or_else(|| node_id.clone()),
                planet: resolve(field("systemName", "SystemName"), dictionary),
                mission: resolve(field("missionName", "MissionName"), dictionary),
            };
            Some((node_id.clone(), info))
        })
        .collect()
}

fn from_node_lists(exports: &Value, dictionary: &Dictionary) -> HashMap<String, NodeInfo> {
    let mut entries = Vec::new();
    match exports.get("Nodes").and_then(Value::as_array) {
        Some(list) => entries.extend(list.iter().filter_map(Value::as_object)),
        None => collect_node_lists(exports, &mut entries),
    }

    let mut nodes = HashMap::new();
    for item in entries {
        let Some(node_id) = first_str(item, NODE_ID_KEYS) else {
            continue;
        };
        let info = NodeInfo {
            node_id: node_id.to_string(),
            name: resolve(first_str(item, NAME_KEYS), dictionary).unwrap_or_else(|| node_id.to_string()),
            planet: resolve(first_str(item, PLANET_KEYS), dictionary),
            mission: resolve(first_str(item, MISSION_KEYS), dictionary),
        };
        nodes.insert(node_id.to_string(), info);
    }
    nodes
}

fn collect_node_lists<'a>(value: &'a Value, found: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Object(map) => {
            if let Some(list) = map.get("Nodes").and_then(Value::as_array) {
                found.extend(list.iter().filter_map(Value::as_object));
            }
            for child in map.values() {
                collect_node_lists(child, found);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_node_lists(child, found);
            }
        }
        _ => {}
    }
}

fn first_str<'a>(item: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| item.get(*k).and_then(Value::as_str))
}
