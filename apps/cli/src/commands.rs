//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use curiosity_core::ProgressReporter;
use curiosity_core::index::{IndexBuildConfig, IndexBuildReport, StorkTool, run_index_build};
use curiosity_core::ingest::{IngestConfig, ingest};
use curiosity_shared::{AppConfig, ConflictPolicy, config_file_path, init_config, load_config};
use curiosity_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Curiosity — search indexes and episode ingestion for a transcript corpus.
#[derive(Parser)]
#[command(
    name = "curiosity",
    version,
    about = "Build season search indexes and load episode transcripts into the database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./curiosity.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build one search index per season file with the external index tool.
    BuildIndexes {
        /// Directory of season documents (default: seasons).
        #[arg(long)]
        seasons_dir: Option<PathBuf>,

        /// Directory for index artifacts (default: indexes).
        #[arg(long)]
        indexes_dir: Option<PathBuf>,

        /// Index tool executable (default: stork).
        #[arg(long)]
        tool: Option<String>,

        /// Exit successfully even if some index builds failed.
        #[arg(long)]
        allow_failures: bool,
    },

    /// Upsert every episode transcript into the episodes table.
    Ingest {
        /// Database connection string: postgres:// URL or keyword string,
        /// libsql:// URL, file path, or :memory:.
        #[arg(env = "DATABASE_URL")]
        database_url: String,

        /// Season metadata JSON (default: seasons-metadata.json).
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Transcript root directory (default: transcripts).
        #[arg(long)]
        transcripts_dir: Option<PathBuf>,

        /// Columns refreshed for existing ids: body-only or all-fields.
        #[arg(long, value_parser = ConflictPolicy::from_str)]
        on_conflict: Option<ConflictPolicy>,

        /// Create the episodes table if it does not exist.
        #[arg(long)]
        create_table: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "curiosity=info",
        1 => "curiosity=debug",
        _ => "curiosity=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::BuildIndexes {
            seasons_dir,
            indexes_dir,
            tool,
            allow_failures,
        } => {
            let config = load_config(config_path)?;
            cmd_build_indexes(&config, seasons_dir, indexes_dir, tool, allow_failures)
        }
        Command::Ingest {
            database_url,
            metadata,
            transcripts_dir,
            on_conflict,
            create_table,
        } => {
            let config = load_config(config_path)?;
            cmd_ingest(
                &config,
                &database_url,
                metadata,
                transcripts_dir,
                on_conflict,
                create_table,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn index_started(&self, source: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Indexing [{current}/{total}] {source}"));
    }

    fn episode_ingested(&self, episode_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Ingesting [{current}/{total}] {episode_id}"));
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_build_indexes(
    config: &AppConfig,
    seasons_dir: Option<PathBuf>,
    indexes_dir: Option<PathBuf>,
    tool: Option<String>,
    allow_failures: bool,
) -> Result<()> {
    let build_config = IndexBuildConfig {
        seasons_dir: seasons_dir.unwrap_or_else(|| config.paths.seasons_dir.clone()),
        indexes_dir: indexes_dir.unwrap_or_else(|| config.paths.indexes_dir.clone()),
        extension: config.index.extension.clone(),
    };

    let mut stork = StorkTool::from(&config.index);
    if let Some(program) = tool {
        stork.program = program;
    }

    info!(
        seasons = %build_config.seasons_dir.display(),
        indexes = %build_config.indexes_dir.display(),
        tool = %stork.program,
        "building season indexes"
    );

    let reporter = CliProgress::new();
    let outcome = run_index_build(&build_config, &stork, &reporter);
    reporter.finish();
    let report = outcome?;

    println!();
    println!("  Index build finished");
    println!("  Built:   {}/{}", report.built(), report.total());
    println!("  Output:  {}", build_config.indexes_dir.display());
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());

    let failures = report.failures();
    if !failures.is_empty() {
        println!("  Failed:");
        for entry in &failures {
            println!("    {}: {}", entry.job.source.display(), entry.outcome);
        }
    }
    println!();

    index_exit_status(&report, allow_failures)
}

/// Failed builds make the command fail unless `--allow-failures` was given.
fn index_exit_status(report: &IndexBuildReport, allow_failures: bool) -> Result<()> {
    if allow_failures {
        return Ok(());
    }
    report.ensure_success()?;
    Ok(())
}

async fn cmd_ingest(
    config: &AppConfig,
    database_url: &str,
    metadata: Option<PathBuf>,
    transcripts_dir: Option<PathBuf>,
    on_conflict: Option<ConflictPolicy>,
    create_table: bool,
) -> Result<()> {
    let on_conflict = on_conflict.unwrap_or(config.ingest.on_conflict);

    let ingest_config = IngestConfig {
        metadata_path: metadata.unwrap_or_else(|| config.paths.metadata_file.clone()),
        transcripts_dir: transcripts_dir.unwrap_or_else(|| config.paths.transcripts_dir.clone()),
        on_conflict,
        create_table: create_table || config.ingest.create_table,
    };

    let storage = Storage::connect(database_url, config.storage.auth_token()).await?;

    info!(
        database = %storage.target(),
        metadata = %ingest_config.metadata_path.display(),
        policy = %on_conflict,
        "ingesting episodes"
    );

    let reporter = CliProgress::new();
    let outcome = ingest(&storage, &ingest_config, &reporter).await;
    reporter.finish();
    let result = outcome?;

    let rows = storage.count_episodes().await?;

    println!();
    println!("  Episodes ingested!");
    println!("  Seasons:   {}", result.seasons);
    println!("  Upserts:   {}", result.episodes_written);
    println!("  Distinct:  {}", result.distinct_ids);
    println!("  Rows now:  {rows}");
    println!("  Policy:    {on_conflict}");
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_config_init(explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    init_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(explicit: Option<&Path>) -> Result<()> {
    let config = load_config(explicit)?;
    let toml_str = toml::to_string_pretty(&config)
        .map_err(|e| eyre!("failed to render config: {e}"))?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curiosity_core::index::{BuildOutcome, IndexEntry, IndexJob};

    fn report(outcomes: Vec<BuildOutcome>) -> IndexBuildReport {
        IndexBuildReport {
            entries: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| IndexEntry {
                    job: IndexJob {
                        source: PathBuf::from(format!("seasons/{i}.toml")),
                        output: PathBuf::from(format!("indexes/{i}.st")),
                    },
                    outcome,
                })
                .collect(),
            elapsed: std::time::Duration::ZERO,
        }
    }

    #[test]
    fn failed_index_build_exits_non_zero() {
        let failed = report(vec![
            BuildOutcome::Built,
            BuildOutcome::ToolFailed { exit_code: Some(1) },
        ]);
        assert!(index_exit_status(&failed, false).is_err());
        assert!(index_exit_status(&failed, true).is_ok());
    }

    #[test]
    fn successful_index_build_exits_zero() {
        let built = report(vec![BuildOutcome::Built, BuildOutcome::Built]);
        assert!(index_exit_status(&built, false).is_ok());
        assert!(index_exit_status(&report(vec![]), false).is_ok());
    }

    #[test]
    fn on_conflict_accepts_known_policies() {
        let cli = Cli::try_parse_from(["curiosity", "ingest", ":memory:", "--on-conflict", "all-fields"])
            .expect("valid policy");
        match cli.command {
            Command::Ingest { on_conflict, database_url, .. } => {
                assert_eq!(on_conflict, Some(ConflictPolicy::AllFields));
                assert_eq!(database_url, ":memory:");
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn on_conflict_typo_is_a_usage_error() {
        let err = Cli::try_parse_from(["curiosity", "ingest", ":memory:", "--on-conflict", "all-feilds"])
            .err()
            .expect("typo rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
