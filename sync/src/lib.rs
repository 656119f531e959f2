//! # Sync Engine
//!
//! Composes the pipeline: collect from sources in parallel, route items to
//! the sinks subscribed to them, dispatch through the per-sink worker pools
//! and fold the resulting events into a final summary. Control flow is
//! strictly one-way; nothing here calls back upstream.

pub mod driver;
pub mod error;
pub mod preview;
pub mod reporter;
pub mod router;

pub use driver::{run, RunOptions, RunStatus};
pub use error::{EngineError, EngineResult};
pub use reporter::PrintFormat;
