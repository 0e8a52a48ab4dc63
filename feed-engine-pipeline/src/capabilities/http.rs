use std::collections::HashMap;

use async_trait::async_trait;
use feed_engine_shared::types::{EntityRef, EntityType};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{EntityResolver, FollowerLookup, FollowerPage};
use crate::errors::CapabilityError;

/// Domain service client.
///
/// - `GET {base}/followers/{entity_type}/{id}?limit=..&cursor=..` returns a
///   [`FollowerPage`]
/// - `POST {base}/entities/{entity_type}/resolve` with `{"ids": [..]}` returns
///   `{"entities": {"<id>": {..}}}`
pub struct HttpDomainClient {
    base_url: String,
    client: ReqwestClient,
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    ids: &'a [Uuid],
}

#[derive(Deserialize)]
struct ResolveResponse {
    entities: HashMap<Uuid, serde_json::Value>,
}

impl HttpDomainClient {
    pub fn new(base_url: &str) -> Self {
        HttpDomainClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ReqwestClient::new(),
        }
    }

    fn check(response: reqwest::Response) -> Result<reqwest::Response, CapabilityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(CapabilityError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

#[async_trait]
impl FollowerLookup for HttpDomainClient {
    async fn followers(
        &self,
        target: &EntityRef,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<FollowerPage, CapabilityError> {
        let url = format!("{}/followers/{}/{}", self.base_url, target.entity_type, target.id);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let page: FollowerPage = Self::check(response)?.json().await?;
        debug!(target = %target, followers = page.follower_ids.len(), "Fetched follower page");
        Ok(page)
    }
}

#[async_trait]
impl EntityResolver for HttpDomainClient {
    async fn resolve(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, serde_json::Value>, CapabilityError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/entities/{}/resolve", self.base_url, entity_type);
        let response = self
            .client
            .post(&url)
            .json(&ResolveRequest { ids })
            .send()
            .await?;
        let body: ResolveResponse = Self::check(response)?.json().await?;
        Ok(body.entities)
    }
}
