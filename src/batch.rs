//! Concurrent execution of independent comparison requests.
//!
//! Each request gets its own browser. Requests run on tokio's blocking pool,
//! at most `jobs` at a time; results come back in input order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::compare::{Comparator, ComparisonRequest, ComparisonResponse};

/// Outcome of one request in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub live_url: String,
    pub test_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ComparisonResponse>,
    /// Whole-request failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.response.is_some()
    }
}

/// Run every request, at most `jobs` concurrently
pub async fn run_batch(
    comparator: Arc<Comparator>,
    requests: Vec<ComparisonRequest>,
    jobs: usize,
) -> Vec<BatchItem> {
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    info!(requests = requests.len(), jobs = jobs.max(1), "starting batch");

    let handles: Vec<_> = requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| {
            let comparator = Arc::clone(&comparator);
            let permits = Arc::clone(&permits);
            let live_url = request.live_url.clone();
            let test_url = request.test_url.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                tokio::task::spawn_blocking(move || comparator.compare(&request)).await
            });
            (index, live_url, test_url, handle)
        })
        .collect();

    let mut items = Vec::with_capacity(handles.len());
    for (index, live_url, test_url, handle) in handles {
        let (response, error) = match handle.await {
            Ok(Ok(Ok(response))) => (Some(response), None),
            Ok(Ok(Err(e))) => (None, Some(e.to_string())),
            Ok(Err(e)) | Err(e) => (None, Some(format!("comparison task failed: {}", e))),
        };
        if let Some(error) = &error {
            warn!(index, error = error.as_str(), "batch request failed");
        }
        items.push(BatchItem {
            live_url,
            test_url,
            response,
            error,
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockFramebuffer, MockLauncher, MockSite, Rect};
    use crate::region::SelectorRegion;
    use crate::session::PageTiming;
    use crate::store::MemoryStore;

    fn comparator() -> Arc<Comparator> {
        let site = MockSite::new(MockFramebuffer::new(50, 50)).element(".box", Rect::new(0, 0, 50, 50));
        let launcher = MockLauncher::new()
            .site("https://a.example/", site.clone())
            .site("https://b.example/", site);
        Arc::new(
            Comparator::new(Arc::new(launcher), Arc::new(MemoryStore::new()))
                .with_timing(PageTiming::immediate()),
        )
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_failures() {
        let ok = ComparisonRequest::new("https://a.example/", "https://b.example/")
            .regions([SelectorRegion::new("box", ".box")]);
        let bad = ComparisonRequest::new("https://a.example/", "https://down.example/")
            .regions([SelectorRegion::new("box", ".box")]);
        let invalid = ComparisonRequest::new("", "https://b.example/");

        let items = run_batch(comparator(), vec![ok.clone(), bad, invalid, ok], 2).await;

        assert_eq!(items.len(), 4);
        assert!(items[0].is_ok());
        assert_eq!(items[1].test_url, "https://down.example/");
        assert!(items[1].error.as_deref().unwrap_or_default().contains("test page failed"));
        assert!(items[2].error.as_deref().unwrap_or_default().contains("liveUrl and testUrl"));
        assert_eq!(
            items[3].response.as_ref().map(|r| r.summary.as_str()),
            Some("1 passed, 0 close, 0 need work")
        );
    }
}
