//! Progress callbacks shared by both pipelines.

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before the index tool runs on a season file.
    fn index_started(&self, source: &str, current: usize, total: usize);
    /// Called after an episode was upserted.
    fn episode_ingested(&self, episode_id: &str, current: usize, total: usize);
    /// Called when the pipeline completes, successfully or not.
    fn finish(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn index_started(&self, _source: &str, _current: usize, _total: usize) {}
    fn episode_ingested(&self, _episode_id: &str, _current: usize, _total: usize) {}
    fn finish(&self) {}
}
