//! One-shot run: collect -> preview -> route -> dispatch -> summarize.

use crate::error::{EngineError, EngineResult};
use crate::preview;
use crate::reporter::{self, PrintFormat, ReporterOptions};
use crate::router;
use config::AppConfig;
use futures::future::join_all;
use sinks::{build_sink, load_sdk_config, Sink};
use sources::collect_all;
use std::sync::Arc;
use sync_core::{CancelFlag, SecretItem};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub print_values: bool,
    pub print_format: PrintFormat,
    pub print_sync_details: bool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    ItemsFailed,
    Cancelled
}

pub async fn run(
    cfg: &AppConfig,
    options: &RunOptions,
    cancel: CancelFlag
) -> EngineResult<RunStatus> {
    info!(
        sources = cfg.sources.len(),
        sinks = cfg.sinks.len(),
        "Collecting secrets from sources"
    );
    let vars = Arc::new(cfg.vars.clone());
    let outcomes = collect_all(&cfg.sources, vars).await;

    // Only a dry-run preview may continue past a failed source.
    let tolerate_failures = options.dry_run && options.print_values;
    let mut collected: Vec<(String, Vec<SecretItem>)> = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(items) => collected.push((outcome.name, items)),
            Err(source) if tolerate_failures => {
                failures.push((outcome.name, source.to_string()));
            }
            Err(source) => {
                return Err(EngineError::Source {
                    name: outcome.name,
                    source
                });
            }
        }
    }

    let total: usize = collected.iter().map(|(_, items)| items.len()).sum();
    info!(count = total, "Collected items");

    if options.dry_run || options.print_values {
        let previews = preview::build(cfg, &collected, &failures, options.print_values);
        preview::print(&previews, options.print_format);
    }
    if options.dry_run {
        info!("Dry run enabled; not pushing to AWS");
        return Ok(status_for(&cancel, false));
    }
    if total == 0 {
        info!("No items to push");
        return Ok(status_for(&cancel, false));
    }

    let batches = router::route(&collected, &cfg.sinks);

    info!("Pushing to sinks");
    let sdk = load_sdk_config(&cfg.aws).await;
    let sinks: Vec<Box<dyn Sink>> = cfg.sinks.iter().map(|s| build_sink(s, &sdk)).collect();

    let (events, reporter_handle) = reporter::spawn(ReporterOptions {
        print_sync_details: options.print_sync_details,
        print_values: options.print_sync_details && options.print_values
    });

    let dispatches = sinks.iter().zip(batches).map(|(sink, batch)| {
        let events = events.clone();
        let cancel = cancel.clone();
        async move { sink.push_many(batch, &cancel, &events).await }
    });
    let skipped: usize = join_all(dispatches).await.into_iter().sum();
    drop(events);

    let mut summary = reporter_handle
        .await
        .map_err(|e| EngineError::Reporter {
            message: e.to_string()
        })?;
    summary.add_skipped(skipped as u32);
    reporter::print_summary(&summary);
    info!("Push complete");

    Ok(status_for(&cancel, summary.has_failures()))
}

fn status_for(cancel: &CancelFlag, has_failures: bool) -> RunStatus {
    if cancel.is_cancelled() {
        RunStatus::Cancelled
    } else if has_failures {
        RunStatus::ItemsFailed
    } else {
        RunStatus::Success
    }
}
