//! Octopus Client
//!
//! Main client for the Octopus REST API, combining authentication, HTTP and
//! the catalog's kind-to-collection mapping.

use super::auth::ApiKey;
use super::http::OctopusHttpClient;
use crate::error::{ExportError, Result};
use crate::resource::{Catalog, Page, ResourceSource};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// One page of a collection endpoint
#[derive(Debug, Deserialize)]
struct CollectionPage {
    #[serde(rename = "Items", default)]
    items: Vec<Value>,
    #[serde(rename = "TotalResults", default)]
    total_results: Option<usize>,
}

/// Main Octopus client
#[derive(Clone)]
pub struct OctopusClient {
    credentials: ApiKey,
    http: OctopusHttpClient,
    server: Url,
    space_id: Option<String>,
    catalog: Arc<Catalog>,
}

impl OctopusClient {
    pub fn new(
        server: &str,
        credentials: ApiKey,
        space_id: Option<String>,
        catalog: Arc<Catalog>,
    ) -> Result<Self> {
        let server = Url::parse(server)
            .map_err(|e| ExportError::Config(format!("Invalid server URL {}: {}", server, e)))?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(ExportError::Config(format!(
                "Server URL must be http or https, got {}",
                server.scheme()
            )));
        }

        Ok(Self {
            credentials,
            http: OctopusHttpClient::new()?,
            server,
            space_id: space_id.filter(|s| !s.is_empty()),
            catalog,
        })
    }

    pub fn space_id(&self) -> Option<&str> {
        self.space_id.as_deref()
    }

    /// `{server}/api` or `{server}/api/{space}`
    fn api_root(&self) -> String {
        let root = self.server.as_str().trim_end_matches('/');
        match &self.space_id {
            Some(space) => format!("{}/api/{}", root, urlencoding::encode(space)),
            None => format!("{}/api", root),
        }
    }

    fn collection(&self, kind: &str) -> Result<&str> {
        Ok(&self.catalog.get(kind)?.collection)
    }

    /// Build a paged collection URL
    pub fn collection_url(&self, kind: &str, skip: usize, take: usize) -> Result<String> {
        Ok(format!(
            "{}/{}?skip={}&take={}",
            self.api_root(),
            self.collection(kind)?,
            skip,
            take
        ))
    }

    /// Build a single resource URL
    pub fn resource_url(&self, kind: &str, id: &str) -> Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.api_root(),
            self.collection(kind)?,
            urlencoding::encode(id)
        ))
    }
}

#[async_trait]
impl ResourceSource for OctopusClient {
    async fn page(&self, kind: &str, skip: usize, take: usize) -> Result<Page> {
        let url = self.collection_url(kind, skip, take)?;
        let Some(body) = self.http.get(&url, &self.credentials).await? else {
            return Err(ExportError::NotFound {
                kind: kind.to_string(),
                id: "*".to_string(),
            });
        };

        let page: CollectionPage = serde_json::from_value(body)?;
        Ok(Page {
            items: page.items,
            total: page.total_results,
        })
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Value> {
        let url = self.resource_url(kind, id)?;
        self.http
            .get(&url, &self.credentials)
            .await?
            .ok_or_else(|| ExportError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            })
    }
}
