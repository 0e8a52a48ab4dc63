//! Capabilities the engine consumes from the domain layer.
//!
//! - [`FollowerLookup`] pages through the current followers of a user or entity
//! - [`EntityResolver`] batch-fetches display objects by id
//! - [`HttpDomainClient`] implements both against the domain service API
//! - [`StaticFollowerLookup`] and [`StaticEntityResolver`] serve fixed data for
//!   tests and local runs
//!
//! ## Choosing an implementation
//!
//! ```ignore
//! use feed_engine_pipeline::capabilities::DomainSource;
//!
//! let (followers, resolver) = DomainSource::live("http://domain:8080").into_capabilities();
//! ```
mod http;
mod memory;

pub use http::HttpDomainClient;
pub use memory::{StaticEntityResolver, StaticFollowerLookup};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use feed_engine_shared::types::{EntityRef, EntityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CapabilityError;

/// One page of followers. `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerPage {
    pub follower_ids: Vec<Uuid>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Resolves the current follower set of a user or entity.
#[async_trait]
pub trait FollowerLookup: Send + Sync {
    async fn followers(
        &self,
        target: &EntityRef,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<FollowerPage, CapabilityError>;
}

/// Batch-fetches display objects for entities of one type.
///
/// Ids the domain no longer knows about (deleted, hidden) are simply absent
/// from the returned map.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, serde_json::Value>, CapabilityError>;
}

/// Where follower and entity data come from.
#[derive(Debug, Clone)]
pub enum DomainSource {
    /// Empty static capabilities, filled by the caller.
    Static,
    /// The domain service reachable at `base_url`.
    Live { base_url: String },
}

impl DomainSource {
    pub fn live(base_url: impl Into<String>) -> Self {
        Self::Live {
            base_url: base_url.into(),
        }
    }

    pub fn into_capabilities(self) -> (Arc<dyn FollowerLookup>, Arc<dyn EntityResolver>) {
        match self {
            DomainSource::Static => (
                Arc::new(StaticFollowerLookup::new()),
                Arc::new(StaticEntityResolver::new()),
            ),
            DomainSource::Live { base_url } => {
                let client = Arc::new(HttpDomainClient::new(&base_url));
                (client.clone(), client)
            }
        }
    }
}
