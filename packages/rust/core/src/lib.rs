//! Pipelines over the transcript corpus.
//!
//! - [`index`] — build one search index per season file with an external tool
//! - [`ingest`] — upsert every episode transcript into the episodes table

pub mod index;
pub mod ingest;
pub mod progress;

pub use progress::{ProgressReporter, SilentProgress};
