//! # Arbinquer Feeds
//!
//! Game-event feed sources and the renderer for their status messages.

pub mod arbitration;
pub mod cycles;
pub mod exports;
pub mod http;
pub mod incursions;
pub mod invasions;
pub mod parsers;
pub mod render;
pub mod text;

use arbinquer_core::config::SourcesConfig;
use arbinquer_core::error::Result;
use arbinquer_core::traits::FeedSource;
use arbinquer_core::types::FeedId;
use std::sync::Arc;

pub use arbitration::ArbitrationFeed;
pub use cycles::CyclesFeed;
pub use exports::{CatalogLoader, NodeCatalog};
pub use http::FeedClient;
pub use incursions::IncursionsFeed;
pub use invasions::InvasionsFeed;
pub use render::FeedRenderer;

/// All feed sources, sharing one HTTP client and node catalog loader.
pub struct FeedSet {
    arbitration: Arc<ArbitrationFeed>,
    incursions: Arc<IncursionsFeed>,
    invasions: Arc<InvasionsFeed>,
    cycles: Arc<CyclesFeed>,
}

impl FeedSet {
    pub fn new(sources: &SourcesConfig) -> Result<Self> {
        let client = Arc::new(FeedClient::new()?);
        let catalog = Arc::new(CatalogLoader::new(
            client.clone(),
            sources.exports_url.clone(),
            Some(sources.dict_url.clone()),
        ));
        Ok(Self {
            arbitration: Arc::new(ArbitrationFeed::new(client.clone(), catalog.clone(), &sources.arbys_url)),
            incursions: Arc::new(IncursionsFeed::new(client.clone(), catalog.clone(), &sources.incursions_url)),
            invasions: Arc::new(InvasionsFeed::new(client.clone(), catalog, &sources.invasions_url)),
            cycles: Arc::new(CyclesFeed::new(client, &sources.cycles_url)),
        })
    }

    pub fn source(&self, feed: FeedId) -> Arc<dyn FeedSource> {
        match feed {
            FeedId::Arbitration => self.arbitration.clone(),
            FeedId::Incursions => self.incursions.clone(),
            FeedId::Invasions => self.invasions.clone(),
            FeedId::Cycles => self.cycles.clone(),
        }
    }
}
