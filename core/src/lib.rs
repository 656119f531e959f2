//! # Sync Core
//!
//! Shared data model for the secrets-sync pipeline: items flowing from
//! sources, dispatch records flowing into sinks, and the structured events
//! the reporter consumes.

pub mod cancel;
pub mod events;
pub mod types;

pub use cancel::CancelFlag;
pub use events::{ItemReport, OutcomeCounts, SyncSummary};
pub use types::{DispatchItem, FailureReason, Outcome, SecretItem, TaggedRecord};
