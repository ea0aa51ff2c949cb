//! Core domain types for the transcript corpus.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Season metadata
// ---------------------------------------------------------------------------

/// One entry of `seasons-metadata.json`.
///
/// Unknown keys are ignored so richer metadata files still parse, but
/// `episodes` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    /// Directory-safe identifier, also the transcript sub-directory name.
    pub slug: String,
    /// Episodes in publication order.
    pub episodes: Vec<Episode>,
}

/// A single episode as listed in the season metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Globally unique id; upsert key and transcript file stem.
    pub id: String,
    /// Display title.
    pub title: String,
}

// ---------------------------------------------------------------------------
// EpisodeRow
// ---------------------------------------------------------------------------

/// An episode as persisted in the `episodes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRow {
    pub id: String,
    pub season: String,
    pub title: String,
    /// Full transcript text.
    pub body: String,
}

impl EpisodeRow {
    /// Build a row from its metadata and the transcript body read from disk.
    pub fn new(season: &Season, episode: &Episode, body: String) -> Self {
        Self {
            id: episode.id.clone(),
            season: season.slug.clone(),
            title: episode.title.clone(),
            body,
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictPolicy
// ---------------------------------------------------------------------------

/// Which columns an upsert refreshes when the episode id already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Only `body` is overwritten; `season` and `title` keep their first value.
    #[default]
    BodyOnly,
    /// `season`, `title` and `body` are all overwritten.
    AllFields,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BodyOnly => "body-only",
            Self::AllFields => "all-fields",
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = crate::CuriosityError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "body-only" | "body" => Ok(Self::BodyOnly),
            "all-fields" | "all" => Ok(Self::AllFields),
            other => Err(crate::CuriosityError::config(format!(
                "invalid conflict policy '{other}': expected 'body-only' or 'all-fields'"
            ))),
        }
    }
}
