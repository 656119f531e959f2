//! Runs every configured source in parallel and applies the common
//! post-processing: name filters, whitespace normalization, and per-source
//! de-duplication so each source yields one authoritative item per name.

use crate::error::SourceResult;
use crate::filter::ItemFilter;
use crate::build_source;
use config::SourceSpec;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::SecretItem;
use tracing::{info, warn};

/// Result of collecting one source. Failures are carried rather than
/// short-circuiting so dry-run previews can report them alongside the
/// sources that succeeded.
pub struct SourceOutcome {
    pub name: String,
    pub result: SourceResult<Vec<SecretItem>>
}

pub async fn collect_all(
    specs: &[SourceSpec],
    vars: Arc<HashMap<String, String>>
) -> Vec<SourceOutcome> {
    let tasks = specs.iter().map(|spec| {
        let vars = vars.clone();
        async move {
            let result = collect_one(spec, vars).await;
            if let Ok(items) = &result {
                info!(source = %spec.name, count = items.len(), "Collected source");
            }
            SourceOutcome {
                name: spec.name.clone(),
                result
            }
        }
    });
    join_all(tasks).await
}

async fn collect_one(
    spec: &SourceSpec,
    vars: Arc<HashMap<String, String>>
) -> SourceResult<Vec<SecretItem>> {
    let source = build_source(spec, vars)?;
    let raw = source.pull().await?;
    let filter = ItemFilter::compile(spec.kind.filter())?;

    let mut items: Vec<SecretItem> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for mut item in filter.apply(raw) {
        let trimmed = item.name.trim();
        if trimmed.is_empty() {
            warn!(source = %spec.name, "skipping item with an empty name");
            continue;
        }
        if trimmed != item.name {
            item.name = trimmed.to_string();
        }
        item.source = Some(spec.name.clone());

        match positions.get(&item.name) {
            // Later discoveries override earlier ones, keeping the original
            // position so ordering stays deterministic.
            Some(&index) => items[index] = item,
            None => {
                positions.insert(item.name.clone(), items.len());
                items.push(item);
            }
        }
    }
    Ok(items)
}
