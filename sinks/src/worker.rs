//! Shared dispatch skeleton: items enter in router order, run under bounded
//! concurrency, and report a structured event each. Workers check the
//! cancellation flag before starting an item and let in-flight operations
//! finish.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sync_core::{CancelFlag, DispatchItem, FailureReason, ItemReport, Outcome};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// What happened to one item, before it is stamped with sink/source names.
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub outcome: Outcome,
    pub reason: Option<FailureReason>,
    pub error: Option<String>,
    pub old_value: Option<String>
}

impl ItemResult {
    pub fn ok(outcome: Outcome, old_value: Option<String>) -> Self {
        Self {
            outcome,
            reason: None,
            error: None,
            old_value
        }
    }

    pub fn failed(reason: FailureReason, error: Option<String>, old_value: Option<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            reason: Some(reason),
            error,
            old_value
        }
    }
}

/// One sink's item-level write logic; the pool drives it concurrently.
#[async_trait]
pub trait ItemWriter: Send + Sync {
    async fn sync_item(&self, item: &DispatchItem) -> ItemResult;
}

/// Run the batch through `writer` with at most `concurrency` in flight.
/// Returns how many items were skipped due to cancellation.
pub async fn run_pool<W: ItemWriter>(
    writer: &W,
    sink_name: &str,
    items: Vec<DispatchItem>,
    concurrency: usize,
    cancel: &CancelFlag,
    events: &UnboundedSender<ItemReport>
) -> usize {
    debug!(sink = sink_name, count = items.len(), concurrency, "Dispatching items");

    stream::iter(items)
        .map(|item| {
            let events = events.clone();
            async move {
                if cancel.is_cancelled() {
                    return 1usize;
                }
                let result = writer.sync_item(&item).await;
                let report = ItemReport {
                    sink: sink_name.to_string(),
                    full_name: item.full_name,
                    source_name: item.source_name,
                    outcome: result.outcome,
                    reason: result.reason,
                    error: result.error,
                    old_value: result.old_value,
                    new_value: item.value
                };
                let _ = events.send(report);
                0usize
            }
        })
        .buffer_unordered(concurrency.max(1))
        .fold(0usize, |skipped, s| async move { skipped + s })
        .await
}
