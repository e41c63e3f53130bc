//! Serves translated resources to proxies, grouped by role.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
mod discovery;
mod fallback;
mod metrics;
mod server;

pub use self::{
    cache::ResourceCache,
    discovery::{DiscoveryRequest, DiscoveryResponse, Node, ResourceType},
    fallback::{fallback_bundle, FALLBACK_BODY, FALLBACK_STATUS},
    metrics::{CacheMetrics, DiscoveryMetrics},
    server::{serve, DiscoveryService},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}
