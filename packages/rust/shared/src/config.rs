//! Application configuration for Curiosity.
//!
//! Config lives in `curiosity.toml` next to the corpus (the working directory).
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CuriosityError, Result};
use crate::types::ConflictPolicy;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "curiosity.toml";

// ---------------------------------------------------------------------------
// Config structs (matching curiosity.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Corpus layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// External index tool.
    #[serde(default)]
    pub index: IndexToolConfig,

    /// Episode ingestion.
    #[serde(default)]
    pub ingest: IngestSettings,

    /// Database connection settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[paths]` section. Relative paths resolve against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Per-season documents fed to the index tool.
    #[serde(default = "default_seasons_dir")]
    pub seasons_dir: PathBuf,

    /// Where index artifacts are written.
    #[serde(default = "default_indexes_dir")]
    pub indexes_dir: PathBuf,

    /// Season/episode metadata JSON.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,

    /// Root of `<season>/<episode-id>.txt` transcript files.
    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            seasons_dir: default_seasons_dir(),
            indexes_dir: default_indexes_dir(),
            metadata_file: default_metadata_file(),
            transcripts_dir: default_transcripts_dir(),
        }
    }
}

fn default_seasons_dir() -> PathBuf {
    "seasons".into()
}
fn default_indexes_dir() -> PathBuf {
    "indexes".into()
}
fn default_metadata_file() -> PathBuf {
    "seasons-metadata.json".into()
}
fn default_transcripts_dir() -> PathBuf {
    "transcripts".into()
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexToolConfig {
    /// Executable to run.
    #[serde(default = "default_tool_program")]
    pub program: String,

    /// Subcommand passed before `--input`/`--output`.
    #[serde(default = "default_tool_subcommand")]
    pub subcommand: String,

    /// Extension of produced index files (without the dot).
    #[serde(default = "default_index_extension")]
    pub extension: String,
}

impl Default for IndexToolConfig {
    fn default() -> Self {
        Self {
            program: default_tool_program(),
            subcommand: default_tool_subcommand(),
            extension: default_index_extension(),
        }
    }
}

fn default_tool_program() -> String {
    "stork".into()
}
fn default_tool_subcommand() -> String {
    "build".into()
}
fn default_index_extension() -> String {
    "st".into()
}

/// `[ingest]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Columns refreshed when an episode id already exists.
    #[serde(default)]
    pub on_conflict: ConflictPolicy,

    /// Create the `episodes` table if it does not exist yet.
    #[serde(default)]
    pub create_table: bool,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Name of the env var holding the remote auth token (never store the token itself).
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            auth_token_env: default_auth_token_env(),
        }
    }
}

fn default_auth_token_env() -> String {
    "LIBSQL_AUTH_TOKEN".into()
}

impl StorageConfig {
    /// Read the remote auth token from the configured env var, if set.
    pub fn auth_token(&self) -> Option<String> {
        match std::env::var(&self.auth_token_env) {
            Ok(val) if !val.is_empty() => Some(val),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path of the config file in the current working directory.
pub fn config_file_path() -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| CuriosityError::config(format!("cannot determine working directory: {e}")))?;
    Ok(cwd.join(CONFIG_FILE_NAME))
}

/// Load the application config.
///
/// An explicit path must exist. Without one, `./curiosity.toml` is used when
/// present and defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    let path = config_file_path()?;
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CuriosityError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CuriosityError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file to `path`, refusing to overwrite an existing one.
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(CuriosityError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| CuriosityError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| CuriosityError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}
