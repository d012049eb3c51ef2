//! Resource Source
//!
//! The seam between the export engine and wherever resources come from. The
//! Octopus REST client implements it; tests use [`super::memory::MemorySource`].

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One page of a remote collection
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    /// Server-reported collection size, when available
    pub total: Option<usize>,
}

#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Fetch `take` items of `kind`, skipping the first `skip`.
    ///
    /// A collection that does not exist yields `ExportError::NotFound`.
    async fn page(&self, kind: &str, skip: usize, take: usize) -> Result<Page>;

    /// Fetch one resource; `ExportError::NotFound` when it does not exist
    async fn get(&self, kind: &str, id: &str) -> Result<Value>;
}
