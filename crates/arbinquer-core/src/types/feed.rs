//! Feed identifiers.

use serde::{Deserialize, Serialize};

/// One event type the bot keeps a status message for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FeedId {
    Arbitration,
    Incursions,
    Invasions,
    Cycles,
}

impl FeedId {
    pub const ALL: [FeedId; 4] = [
        FeedId::Arbitration,
        FeedId::Incursions,
        FeedId::Invasions,
        FeedId::Cycles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedId::Arbitration => "arbitration",
            FeedId::Incursions => "incursions",
            FeedId::Invasions => "invasions",
            FeedId::Cycles => "cycles",
        }
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeedId {
    type Err = crate::error::ArbinquerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arbitration" | "arbys" => Ok(FeedId::Arbitration),
            "incursions" | "incursion" => Ok(FeedId::Incursions),
            "invasions" | "invasion" => Ok(FeedId::Invasions),
            "cycles" | "cycle" => Ok(FeedId::Cycles),
            other => Err(crate::error::ArbinquerError::config(format!("unknown feed: {other}"))),
        }
    }
}
