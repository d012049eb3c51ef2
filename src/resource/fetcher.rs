//! Resource Fetcher
//!
//! Streams every item of one resource kind by walking `skip`/`take` pages.
//! A background task requests one page at a time and hands items over a
//! bounded channel, so a slow consumer pauses the paging.

use super::cancel::CancelToken;
use super::source::ResourceSource;
use crate::error::Result;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Upper bound on items buffered between the producer and the consumer,
/// whatever the page size
const MAX_BUFFERED_ITEMS: usize = 1024;

/// Items of one kind, in server page order.
///
/// A failed page arrives as a final `Err` item. The stream ends early when
/// the fetch is cancelled.
pub struct PageStream {
    rx: mpsc::Receiver<Result<Value>>,
    producer: JoinHandle<()>,
}

impl PageStream {
    /// Stop consuming and wait for the producer task to exit
    pub async fn finish(self) {
        let PageStream { rx, producer } = self;
        drop(rx);
        if let Err(e) = producer.await {
            tracing::warn!("Page producer did not exit cleanly: {}", e);
        }
    }
}

impl Stream for PageStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start streaming every item of `kind`
pub fn fetch_pages(
    source: Arc<dyn ResourceSource>,
    kind: &str,
    page_size: usize,
    cancel: CancelToken,
) -> PageStream {
    let page_size = page_size.max(1);
    let (tx, rx) = mpsc::channel(page_size.min(MAX_BUFFERED_ITEMS));
    let producer = tokio::spawn(produce(source, kind.to_string(), page_size, cancel, tx));
    PageStream { rx, producer }
}

async fn produce(
    source: Arc<dyn ResourceSource>,
    kind: String,
    page_size: usize,
    cancel: CancelToken,
    tx: mpsc::Sender<Result<Value>>,
) {
    let mut skip = 0;

    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Fetch of {} cancelled at skip={}", kind, skip);
                return;
            }
            page = source.page(&kind, skip, page_size) => page,
        };

        let page = match page {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Collection {} not found, treating as empty", kind);
                return;
            }
            Err(e) => {
                tracing::error!("Fetching {} failed at skip={}: {}", kind, skip, e);
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let count = page.items.len();
        tracing::debug!("Fetched {} {} (skip={})", count, kind, skip);

        for item in page.items {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Fetch of {} cancelled mid-page", kind);
                    return;
                }
                sent = tx.send(Ok(item)) => {
                    if sent.is_err() {
                        // Consumer went away
                        return;
                    }
                }
            }
        }

        skip += count;
        let exhausted = page.total.is_some_and(|total| skip >= total);
        if count < page_size || exhausted {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::memory::MemorySource;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn environments(n: usize) -> Vec<Value> {
        (1..=n)
            .map(|i| json!({"Id": format!("Environments-{}", i), "Name": format!("Env {}", i)}))
            .collect()
    }

    fn ids(items: &[Value]) -> Vec<String> {
        items
            .iter()
            .map(|v| v["Id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_yields_all_items_in_order() {
        let source = Arc::new(MemorySource::new().with_kind("Environments", environments(25)));
        let stream = fetch_pages(source.clone(), "Environments", 10, CancelToken::new());

        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(ids(&items), ids(&environments(25)));
        assert_eq!(source.page_requests(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_on_total() {
        let source = Arc::new(MemorySource::new().with_kind("Environments", environments(20)));
        let stream = fetch_pages(source.clone(), "Environments", 10, CancelToken::new());

        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(items.len(), 20);
        assert_eq!(source.page_requests(), 2);
    }

    #[tokio::test]
    async fn test_huge_page_size_is_a_single_request() {
        let source = Arc::new(MemorySource::new().with_kind("Environments", environments(3)));
        let stream = fetch_pages(source.clone(), "Environments", usize::MAX, CancelToken::new());

        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(ids(&items), ids(&environments(3)));
        assert_eq!(source.page_requests(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let source = Arc::new(MemorySource::new());
        let stream = fetch_pages(source, "Tenants", 10, CancelToken::new());

        let items: Vec<Result<Value>> = stream.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_failed_page_ends_stream_after_emitted_items() {
        let source = Arc::new(
            MemorySource::new()
                .with_kind("Environments", environments(25))
                .fail_page_at("Environments", 10),
        );
        let stream = fetch_pages(source, "Environments", 10, CancelToken::new());

        let items: Vec<Result<Value>> = stream.collect().await;

        assert_eq!(items.len(), 11);
        assert!(items[..10].iter().all(|r| r.is_ok()));
        assert!(items[10].is_err());
    }

    #[tokio::test]
    async fn test_cancel_stops_paging() {
        let source = Arc::new(MemorySource::new().with_kind("Environments", environments(100)));
        let cancel = CancelToken::new();
        let mut stream = fetch_pages(source.clone(), "Environments", 10, cancel.clone());

        let mut received = 0;
        while received < 15 {
            stream.next().await.unwrap().unwrap();
            received += 1;
        }
        cancel.cancel();

        // Whatever was already buffered may still drain
        while let Some(item) = stream.next().await {
            item.unwrap();
            received += 1;
        }

        assert!(received < 100);
        assert!(source.page_requests() < 10);
        tokio::time::timeout(Duration::from_secs(1), stream.finish())
            .await
            .expect("producer should exit after cancel");
    }

    #[tokio::test]
    async fn test_dropping_consumer_releases_producer() {
        let source = Arc::new(MemorySource::new().with_kind("Environments", environments(100)));
        let mut stream = fetch_pages(source.clone(), "Environments", 5, CancelToken::new());

        stream.next().await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(1), stream.finish())
            .await
            .expect("producer should exit when the consumer leaves");
        assert!(source.page_requests() < 20);
    }
}
