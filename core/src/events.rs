use crate::types::{FailureReason, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured event emitted by a sink worker for every dispatched item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub sink: String,
    pub full_name: String,
    pub source_name: String,
    pub outcome: Outcome,
    pub reason: Option<FailureReason>,
    pub error: Option<String>,
    pub old_value: Option<String>,
    pub new_value: String
}

/// Per-sink outcome counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub created: u32,
    pub unchanged: u32,
    pub changed: u32,
    pub failed: u32
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::Failed => self.failed += 1
        }
    }

    pub fn total(&self) -> u32 {
        self.created + self.unchanged + self.changed + self.failed
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.created += other.created;
        self.unchanged += other.unchanged;
        self.changed += other.changed;
        self.failed += other.failed;
    }
}

/// Aggregate completion state of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sinks: BTreeMap<String, OutcomeCounts>,
    /// Items never dispatched because cancellation was requested.
    pub skipped: u32
}

impl SyncSummary {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn record(&mut self, report: &ItemReport) {
        self.sinks
            .entry(report.sink.clone())
            .or_default()
            .record(report.outcome);
    }

    pub fn add_skipped(&mut self, count: u32) {
        self.skipped += count;
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn has_failures(&self) -> bool {
        self.sinks.values().any(|c| c.failed > 0)
    }

    pub fn totals(&self) -> OutcomeCounts {
        let mut out = OutcomeCounts::default();
        for counts in self.sinks.values() {
            out.merge(counts);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(sink: &str, outcome: Outcome) -> ItemReport {
        ItemReport {
            sink: sink.to_string(),
            full_name: "/p/NAME".to_string(),
            source_name: "env".to_string(),
            outcome,
            reason: None,
            error: None,
            old_value: None,
            new_value: "v".to_string()
        }
    }

    #[test]
    fn test_summary_counts_by_sink() {
        let mut summary = SyncSummary::new();
        summary.record(&report("params", Outcome::Created));
        summary.record(&report("params", Outcome::Created));
        summary.record(&report("secrets", Outcome::Failed));

        assert_eq!(summary.sinks["params"].created, 2);
        assert_eq!(summary.sinks["secrets"].failed, 1);
        assert_eq!(summary.totals().total(), 3);
        assert!(summary.has_failures());
    }

    #[test]
    fn test_summary_completion() {
        let mut summary = SyncSummary::new();
        assert!(summary.completed_at.is_none());
        assert!(!summary.has_failures());

        summary.complete();
        assert!(summary.completed_at.is_some());
    }
}
