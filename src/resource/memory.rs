//! In-memory resource source
//!
//! Serves fixed collections and records every request, so export behavior
//! can be checked without a server.

use super::source::{Page, ResourceSource};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemorySource {
    kinds: HashMap<String, Vec<Value>>,
    page_requests: AtomicUsize,
    get_requests: Mutex<HashMap<(String, String), usize>>,
    failing_skip: Option<(String, usize)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection; items are served in the given order
    pub fn with_kind(mut self, kind: &str, items: Vec<Value>) -> Self {
        self.kinds.insert(kind.to_string(), items);
        self
    }

    /// Make the page starting at `skip` fail with a server error
    pub fn fail_page_at(mut self, kind: &str, skip: usize) -> Self {
        self.failing_skip = Some((kind.to_string(), skip));
        self
    }

    /// Number of page requests served so far
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    /// Number of single-resource requests for `(kind, id)`
    pub fn get_requests(&self, kind: &str, id: &str) -> usize {
        self.get_requests
            .lock()
            .map(|counts| {
                counts
                    .get(&(kind.to_string(), id.to_string()))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ResourceSource for MemorySource {
    async fn page(&self, kind: &str, skip: usize, take: usize) -> Result<Page> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);

        if let Some((failing_kind, failing_skip)) = &self.failing_skip {
            if failing_kind == kind && *failing_skip == skip {
                return Err(ExportError::Status {
                    status: 500,
                    url: format!("memory://{}?skip={}", kind, skip),
                });
            }
        }

        let Some(items) = self.kinds.get(kind) else {
            return Err(ExportError::NotFound {
                kind: kind.to_string(),
                id: "*".to_string(),
            });
        };

        Ok(Page {
            items: items.iter().skip(skip).take(take).cloned().collect(),
            total: Some(items.len()),
        })
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Value> {
        if let Ok(mut counts) = self.get_requests.lock() {
            *counts.entry((kind.to_string(), id.to_string())).or_insert(0) += 1;
        }

        self.kinds
            .get(kind)
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item.get("Id").and_then(|v| v.as_str()) == Some(id))
            })
            .cloned()
            .ok_or_else(|| ExportError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            })
    }
}
