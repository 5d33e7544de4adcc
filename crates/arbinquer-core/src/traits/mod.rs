//! Boundary traits implemented outside the scheduling core.

pub mod feed;
pub mod render;
pub mod transport;

pub use feed::FeedSource;
pub use render::Renderer;
pub use transport::ChatTransport;
