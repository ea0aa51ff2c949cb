//! Shared types, error model, and configuration for Curiosity.
//!
//! This crate is the foundation depended on by all other Curiosity crates.
//! It provides:
//! - [`CuriosityError`] — the unified error type
//! - Domain types ([`Season`], [`Episode`], [`EpisodeRow`], [`ConflictPolicy`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, IndexToolConfig, IngestSettings, PathsConfig, StorageConfig,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{CuriosityError, Result};
pub use types::{ConflictPolicy, Episode, EpisodeRow, Season};
