//! Index builder: one search index per season document.
//!
//! Every regular file in the seasons directory is handed to an external
//! index tool (`stork build` by default). The output name keeps the source
//! file's stem and swaps in the tool's extension:
//!
//! ```text
//! seasons/<name>.<ext>  →  indexes/<name>.st
//! ```
//!
//! A failing tool run never stops the loop; every outcome is recorded in the
//! [`IndexBuildReport`].

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use curiosity_shared::{CuriosityError, IndexToolConfig, Result};

use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// One invocation of the index tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexJob {
    /// Season document fed to the tool.
    pub source: PathBuf,
    /// Index artifact the tool writes.
    pub output: PathBuf,
}

/// Output path for `source`: its stem plus `extension`, inside `indexes_dir`.
pub fn index_output_path(source: &Path, indexes_dir: &Path, extension: &str) -> PathBuf {
    let stem = source.file_stem().unwrap_or(source.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(extension);
    indexes_dir.join(name)
}

/// List the season files in `seasons_dir`, sorted by name, and pair each with
/// its output path. Sub-directories are skipped.
pub fn plan_index_jobs(
    seasons_dir: &Path,
    indexes_dir: &Path,
    extension: &str,
) -> Result<Vec<IndexJob>> {
    let entries =
        std::fs::read_dir(seasons_dir).map_err(|e| CuriosityError::io(seasons_dir, e))?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CuriosityError::io(seasons_dir, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| CuriosityError::io(entry.path(), e))?;
        if file_type.is_dir() {
            debug!(path = %entry.path().display(), "skipping directory");
            continue;
        }
        sources.push(entry.path());
    }

    // read_dir order is platform-defined
    sources.sort();

    Ok(sources
        .into_iter()
        .map(|source| IndexJob {
            output: index_output_path(&source, indexes_dir, extension),
            source,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tool seam
// ---------------------------------------------------------------------------

/// Result of running the index tool on one season file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The tool exited successfully.
    Built,
    /// The tool ran and exited with a failure status (`None` if killed by a signal).
    ToolFailed { exit_code: Option<i32> },
    /// The tool could not be started at all.
    SpawnFailed { message: String },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Built)
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Built => f.write_str("built"),
            Self::ToolFailed {
                exit_code: Some(code),
            } => write!(f, "tool exited with status {code}"),
            Self::ToolFailed { exit_code: None } => f.write_str("tool terminated by signal"),
            Self::SpawnFailed { message } => f.write_str(message),
        }
    }
}

/// Something that turns a season document into an index artifact.
pub trait IndexTool {
    fn build(&self, job: &IndexJob) -> BuildOutcome;
}

/// Runs `<program> <subcommand> --input <source> --output <output>`.
#[derive(Debug, Clone)]
pub struct StorkTool {
    pub program: String,
    pub subcommand: String,
}

impl StorkTool {
    pub fn new(program: impl Into<String>, subcommand: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: subcommand.into(),
        }
    }

    /// The command that builds `job`, not yet spawned.
    pub fn command_for(&self, job: &IndexJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.subcommand)
            .arg("--input")
            .arg(&job.source)
            .arg("--output")
            .arg(&job.output);
        cmd
    }
}

impl From<&IndexToolConfig> for StorkTool {
    fn from(config: &IndexToolConfig) -> Self {
        Self::new(config.program.clone(), config.subcommand.clone())
    }
}

impl IndexTool for StorkTool {
    fn build(&self, job: &IndexJob) -> BuildOutcome {
        let status = self.command_for(job).stdin(Stdio::null()).status();

        match status {
            Ok(status) if status.success() => BuildOutcome::Built,
            Ok(status) => BuildOutcome::ToolFailed {
                exit_code: status.code(),
            },
            Err(e) => BuildOutcome::SpawnFailed {
                message: format!("failed to run `{}`: {e}", self.program),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Build loop
// ---------------------------------------------------------------------------

/// Configuration for [`run_index_build`].
#[derive(Debug, Clone)]
pub struct IndexBuildConfig {
    pub seasons_dir: PathBuf,
    pub indexes_dir: PathBuf,
    /// Extension of produced index files (without the dot).
    pub extension: String,
}

/// One attempted job and what happened.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub job: IndexJob,
    pub outcome: BuildOutcome,
}

/// Every outcome of an index build run.
#[derive(Debug, Default)]
pub struct IndexBuildReport {
    pub entries: Vec<IndexEntry>,
    pub elapsed: std::time::Duration,
}

impl IndexBuildReport {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn built(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    /// Entries whose tool run failed, in processing order.
    pub fn failures(&self) -> Vec<&IndexEntry> {
        self.entries
            .iter()
            .filter(|e| !e.outcome.is_success())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }

    /// Turn any failure into a [`CuriosityError::ToolInvocation`].
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(CuriosityError::ToolInvocation {
            failed: self.total() - self.built(),
            total: self.total(),
        })
    }
}

/// Run `tool` on every job in order, recording each outcome.
pub fn build_indexes(
    jobs: &[IndexJob],
    tool: &dyn IndexTool,
    progress: &dyn ProgressReporter,
) -> IndexBuildReport {
    let start = Instant::now();
    let total = jobs.len();
    let mut entries = Vec::with_capacity(total);

    for (i, job) in jobs.iter().enumerate() {
        let source = job.source.display().to_string();
        info!(source = %source, output = %job.output.display(), "building index");
        progress.index_started(&source, i + 1, total);

        let outcome = tool.build(job);
        if !outcome.is_success() {
            warn!(source = %source, %outcome, "index build failed");
        }

        entries.push(IndexEntry {
            job: job.clone(),
            outcome,
        });
    }

    IndexBuildReport {
        entries,
        elapsed: start.elapsed(),
    }
}

/// Plan the jobs for `config`, create the output directory, and build them all.
#[instrument(skip_all, fields(seasons = %config.seasons_dir.display(), indexes = %config.indexes_dir.display()))]
pub fn run_index_build(
    config: &IndexBuildConfig,
    tool: &dyn IndexTool,
    progress: &dyn ProgressReporter,
) -> Result<IndexBuildReport> {
    progress.phase("Scanning season files");
    let jobs = plan_index_jobs(&config.seasons_dir, &config.indexes_dir, &config.extension)?;

    if jobs.is_empty() {
        warn!("no season files found");
    } else {
        std::fs::create_dir_all(&config.indexes_dir)
            .map_err(|e| CuriosityError::io(&config.indexes_dir, e))?;
    }

    progress.phase("Building indexes");
    let report = build_indexes(&jobs, tool, progress);
    progress.finish();

    info!(
        total = report.total(),
        built = report.built(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "index build finished"
    );
    Ok(report)
}
