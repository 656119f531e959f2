//! The reporter owns stdout. Sinks send [`ItemReport`] events over one
//! channel; the reporter prints per-item lines as they arrive and folds
//! everything into the final [`SyncSummary`].

use colored::Colorize;
use sync_core::{ItemReport, Outcome, SyncSummary};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintFormat {
    #[default]
    List,
    Table,
    Json
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReporterOptions {
    /// Print one line per dispatched item.
    pub print_sync_details: bool,
    /// Append value snapshots to those lines.
    pub print_values: bool
}

/// Spawn the reporter task; drop the sender to finish it and collect the
/// summary from the handle.
pub fn spawn(options: ReporterOptions) -> (UnboundedSender<ItemReport>, JoinHandle<SyncSummary>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_loop(rx, options));
    (tx, handle)
}

async fn run_loop(mut rx: UnboundedReceiver<ItemReport>, options: ReporterOptions) -> SyncSummary {
    let mut summary = SyncSummary::new();
    while let Some(report) = rx.recv().await {
        if options.print_sync_details {
            println!("{}", format_detail(&report, options.print_values));
        }
        summary.record(&report);
    }
    summary.complete();
    summary
}

fn format_detail(report: &ItemReport, print_values: bool) -> String {
    let action = action_detail(report, print_values);
    match report.outcome {
        Outcome::Failed => {
            let reason = report
                .reason
                .map(|r| r.as_str())
                .unwrap_or("error")
                .to_string();
            let mut line = format!(
                "[{}] {} -> {} ({reason})",
                report.sink,
                report.full_name,
                "failed".red().bold()
            );
            if let Some(error) = &report.error {
                line.push_str(": ");
                line.push_str(error);
            }
            line
        }
        _ => format!(
            "[{}] {} -> {} ({action})",
            report.sink,
            report.full_name,
            "succeeded".green()
        )
    }
}

fn action_detail(report: &ItemReport, print_values: bool) -> String {
    if !print_values {
        return report.outcome.as_str().to_string();
    }
    match report.outcome {
        Outcome::Created => format!("created '{}'", report.new_value),
        Outcome::Unchanged => format!(
            "unchanged '{}'",
            report.old_value.as_deref().unwrap_or_default()
        ),
        Outcome::Changed => format!(
            "changed '{}' -> '{}'",
            report.old_value.as_deref().unwrap_or_default(),
            report.new_value
        ),
        Outcome::Failed => report.outcome.as_str().to_string()
    }
}

/// Final per-sink and overall counts; always printed.
pub fn print_summary(summary: &SyncSummary) {
    for (sink, counts) in &summary.sinks {
        println!(
            "{sink}: {} created, {} unchanged, {} changed, {} failed",
            counts.created,
            counts.unchanged,
            counts.changed,
            if counts.failed > 0 {
                counts.failed.to_string().red().bold().to_string()
            } else {
                counts.failed.to_string()
            }
        );
    }
    let totals = summary.totals();
    let mut line = format!(
        "total: {} items ({} created, {} unchanged, {} changed, {} failed)",
        totals.total(),
        totals.created,
        totals.unchanged,
        totals.changed,
        totals.failed
    );
    if summary.skipped > 0 {
        line.push_str(&format!(", {} skipped after cancellation", summary.skipped));
    }
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::FailureReason;

    fn report(outcome: Outcome) -> ItemReport {
        ItemReport {
            sink: "params".to_string(),
            full_name: "/p/DB".to_string(),
            source_name: "env".to_string(),
            outcome,
            reason: matches!(outcome, Outcome::Failed).then_some(FailureReason::Exists),
            error: None,
            old_value: Some("old".to_string()),
            new_value: "new".to_string()
        }
    }

    #[tokio::test]
    async fn test_summary_is_folded_from_events() {
        let (tx, handle) = spawn(ReporterOptions::default());
        tx.send(report(Outcome::Created)).unwrap();
        tx.send(report(Outcome::Changed)).unwrap();
        tx.send(report(Outcome::Failed)).unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        let counts = &summary.sinks["params"];
        assert_eq!(counts.created, 1);
        assert_eq!(counts.changed, 1);
        assert_eq!(counts.failed, 1);
        assert!(summary.has_failures());
        assert!(summary.completed_at.is_some());
    }

    #[test]
    fn test_detail_line_without_values_hides_snapshots() {
        colored::control::set_override(false);
        let line = format_detail(&report(Outcome::Changed), false);
        assert_eq!(line, "[params] /p/DB -> succeeded (changed)");
    }

    #[test]
    fn test_detail_line_with_values_shows_transition() {
        colored::control::set_override(false);
        let line = format_detail(&report(Outcome::Changed), true);
        assert_eq!(line, "[params] /p/DB -> succeeded (changed 'old' -> 'new')");
    }

    #[test]
    fn test_created_line_shows_new_value() {
        colored::control::set_override(false);
        let line = format_detail(&report(Outcome::Created), true);
        assert_eq!(line, "[params] /p/DB -> succeeded (created 'new')");
    }

    #[test]
    fn test_failed_line_names_the_reason() {
        colored::control::set_override(false);
        let mut failed = report(Outcome::Failed);
        failed.error = Some("boom".to_string());
        let line = format_detail(&failed, false);
        assert_eq!(line, "[params] /p/DB -> failed (exists): boom");
    }
}
