//! Episode ingestion: season metadata + transcripts → `episodes` table.
//!
//! Seasons are processed in file order and episodes in season order. Every
//! upsert of a run shares one [`EpisodeBatch`]; the batch is committed once
//! after the last episode, or rolled back on the first error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use curiosity_shared::{ConflictPolicy, CuriosityError, EpisodeRow, Result, Season};
use curiosity_storage::{EpisodeBatch, Storage};

use crate::progress::ProgressReporter;

/// Configuration for the [`ingest`] pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// `seasons-metadata.json`.
    pub metadata_path: PathBuf,
    /// Root of `<season>/<episode-id>.txt` transcripts.
    pub transcripts_dir: PathBuf,
    /// Columns refreshed when an episode id already exists.
    pub on_conflict: ConflictPolicy,
    /// Create the `episodes` table before ingesting if it is missing.
    pub create_table: bool,
}

/// Result of a successful ingest run.
#[derive(Debug)]
pub struct IngestResult {
    /// Seasons listed in the metadata.
    pub seasons: usize,
    /// Upserts executed (duplicate ids counted each time).
    pub episodes_written: usize,
    /// Distinct episode ids, i.e. rows touched.
    pub distinct_ids: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Read and parse the season metadata file.
pub fn load_metadata(path: &Path) -> Result<Vec<Season>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| CuriosityError::metadata(path, e.to_string()))?;

    serde_json::from_str(&content).map_err(|e| CuriosityError::metadata(path, e.to_string()))
}

/// `transcripts_dir/<season_slug>/<episode_id>.txt`
pub fn transcript_path(transcripts_dir: &Path, season_slug: &str, episode_id: &str) -> PathBuf {
    transcripts_dir
        .join(season_slug)
        .join(format!("{episode_id}.txt"))
}

/// Read a whole transcript. A missing file is a [`CuriosityError::MissingTranscript`].
pub fn read_transcript(transcripts_dir: &Path, season_slug: &str, episode_id: &str) -> Result<String> {
    let path = transcript_path(transcripts_dir, season_slug, episode_id);

    std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CuriosityError::MissingTranscript {
            season: season_slug.to_string(),
            episode: episode_id.to_string(),
            path: path.clone(),
        },
        _ => CuriosityError::io(&path, e),
    })
}

/// Run the ingest pipeline against `storage`.
///
/// 1. Parse metadata (fails before any database work)
/// 2. Optionally create the table
/// 3. Read each transcript and upsert its row
/// 4. Commit once, or roll back on the first error
#[instrument(skip_all, fields(metadata = %config.metadata_path.display(), policy = %config.on_conflict))]
pub async fn ingest(
    storage: &Storage,
    config: &IngestConfig,
    progress: &dyn ProgressReporter,
) -> Result<IngestResult> {
    let start = Instant::now();

    progress.phase("Reading season metadata");
    let seasons = load_metadata(&config.metadata_path)?;
    let total: usize = seasons.iter().map(|s| s.episodes.len()).sum();
    info!(seasons = seasons.len(), episodes = total, "loaded season metadata");

    if config.create_table {
        progress.phase("Preparing schema");
        storage.ensure_schema().await?;
    }

    progress.phase("Ingesting episodes");
    let mut batch = storage.begin_batch(config.on_conflict).await?;

    let outcome = upsert_all(&mut batch, &seasons, &config.transcripts_dir, progress, total).await;
    if let Err(e) = outcome {
        warn!(error = %e, pending = batch.written(), "ingest aborted, rolling back");
        if let Err(rollback_err) = batch.rollback().await {
            warn!(error = %rollback_err, "rollback failed");
        }
        progress.finish();
        return Err(e);
    }

    let written = batch.commit().await?;
    progress.finish();

    let distinct_ids = seasons
        .iter()
        .flat_map(|s| &s.episodes)
        .map(|e| e.id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let result = IngestResult {
        seasons: seasons.len(),
        episodes_written: written,
        distinct_ids,
        elapsed: start.elapsed(),
    };

    info!(
        written = result.episodes_written,
        distinct = result.distinct_ids,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "ingest committed"
    );
    Ok(result)
}

async fn upsert_all(
    batch: &mut EpisodeBatch<'_>,
    seasons: &[Season],
    transcripts_dir: &Path,
    progress: &dyn ProgressReporter,
    total: usize,
) -> Result<()> {
    let mut current = 0;
    for season in seasons {
        debug!(season = %season.slug, episodes = season.episodes.len(), "ingesting season");

        for episode in &season.episodes {
            let body = read_transcript(transcripts_dir, &season.slug, &episode.id)?;
            batch.upsert(&EpisodeRow::new(season, episode, body)).await?;

            current += 1;
            progress.episode_ingested(&episode.id, current, total);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use curiosity_storage::ConnectionTarget;
    use uuid::Uuid;

    /// A throwaway corpus directory plus database file.
    struct Corpus {
        root: PathBuf,
    }

    impl Corpus {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("curiosity_ingest_{}", Uuid::now_v7()));
            std::fs::create_dir_all(root.join("transcripts")).unwrap();
            Self { root }
        }

        fn metadata(&self, json: &str) {
            std::fs::write(self.root.join("seasons-metadata.json"), json).unwrap();
        }

        fn transcript(&self, season: &str, id: &str, body: &str) {
            let path = transcript_path(&self.root.join("transcripts"), season, id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }

        fn config(&self, on_conflict: ConflictPolicy) -> IngestConfig {
            IngestConfig {
                metadata_path: self.root.join("seasons-metadata.json"),
                transcripts_dir: self.root.join("transcripts"),
                on_conflict,
                create_table: false,
            }
        }

        async fn storage(&self) -> Storage {
            let storage = Storage::open(ConnectionTarget::Local(self.root.join("episodes.db")), None)
                .await
                .expect("open db");
            storage.ensure_schema().await.expect("schema");
            storage
        }
    }

    const TWO_SEASONS: &str = r#"[
        { "slug": "marielda", "episodes": [
            { "id": "m-01", "title": "Start" },
            { "id": "m-02", "title": "Middle" }
        ]},
        { "slug": "extras", "episodes": [
            { "id": "x-01", "title": "Bonus" }
        ]}
    ]"#;

    #[test]
    fn transcript_path_layout() {
        assert_eq!(
            transcript_path(Path::new("transcripts"), "marielda", "m-01"),
            PathBuf::from("transcripts/marielda/m-01.txt")
        );
    }

    #[tokio::test]
    async fn one_row_per_episode() {
        let corpus = Corpus::new();
        corpus.metadata(TWO_SEASONS);
        corpus.transcript("marielda", "m-01", "first transcript");
        corpus.transcript("marielda", "m-02", "second transcript");
        corpus.transcript("extras", "x-01", "bonus transcript");
        let storage = corpus.storage().await;

        let result = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .expect("ingest");

        assert_eq!(result.seasons, 2);
        assert_eq!(result.episodes_written, 3);
        assert_eq!(result.distinct_ids, 3);
        assert_eq!(
            storage.list_episode_ids().await.unwrap(),
            vec!["m-01", "m-02", "x-01"]
        );

        let row = storage.get_episode("x-01").await.unwrap().unwrap();
        assert_eq!(row.season, "extras");
        assert_eq!(row.title, "Bonus");
        assert_eq!(row.body, "bonus transcript");
    }

    #[tokio::test]
    async fn reingest_updates_body_in_place() {
        let corpus = Corpus::new();
        corpus.metadata(r#"[{ "slug": "s1", "episodes": [{ "id": "e1", "title": "One" }] }]"#);
        corpus.transcript("s1", "e1", "draft");
        let storage = corpus.storage().await;
        let config = corpus.config(ConflictPolicy::BodyOnly);

        ingest(&storage, &config, &SilentProgress).await.unwrap();
        corpus.transcript("s1", "e1", "corrected");
        ingest(&storage, &config, &SilentProgress).await.unwrap();

        assert_eq!(storage.count_episodes().await.unwrap(), 1);
        let row = storage.get_episode("e1").await.unwrap().unwrap();
        assert_eq!(row.body, "corrected");
    }

    #[tokio::test]
    async fn missing_transcript_rolls_back_the_run() {
        let corpus = Corpus::new();
        corpus.metadata(TWO_SEASONS);
        corpus.transcript("marielda", "m-01", "present");
        // m-02 has no transcript
        corpus.transcript("extras", "x-01", "present");
        let storage = corpus.storage().await;

        let err = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .unwrap_err();

        match &err {
            CuriosityError::MissingTranscript { season, episode, path } => {
                assert_eq!(season, "marielda");
                assert_eq!(episode, "m-02");
                assert!(path.ends_with("marielda/m-02.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // m-01 was upserted before the failure but never committed
        assert_eq!(storage.count_episodes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn body_only_policy_keeps_old_season_and_title() {
        let corpus = Corpus::new();
        let storage = corpus.storage().await;
        let mut batch = storage.begin_batch(ConflictPolicy::BodyOnly).await.unwrap();
        batch
            .upsert(&EpisodeRow {
                id: "e1".into(),
                season: "s1".into(),
                title: "Old".into(),
                body: "old".into(),
            })
            .await
            .unwrap();
        batch.commit().await.unwrap();

        corpus.metadata(r#"[{ "slug": "s2", "episodes": [{ "id": "e1", "title": "New" }] }]"#);
        corpus.transcript("s2", "e1", "new");

        ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .unwrap();

        let row = storage.get_episode("e1").await.unwrap().unwrap();
        assert_eq!(row.body, "new");
        assert_eq!(row.season, "s1");
        assert_eq!(row.title, "Old");
    }

    #[tokio::test]
    async fn all_fields_policy_refreshes_season_and_title() {
        let corpus = Corpus::new();
        corpus.metadata(r#"[{ "slug": "s1", "episodes": [{ "id": "e1", "title": "Old" }] }]"#);
        corpus.transcript("s1", "e1", "old");
        let storage = corpus.storage().await;
        ingest(&storage, &corpus.config(ConflictPolicy::AllFields), &SilentProgress)
            .await
            .unwrap();

        corpus.metadata(r#"[{ "slug": "s2", "episodes": [{ "id": "e1", "title": "New" }] }]"#);
        corpus.transcript("s2", "e1", "new");
        ingest(&storage, &corpus.config(ConflictPolicy::AllFields), &SilentProgress)
            .await
            .unwrap();

        let row = storage.get_episode("e1").await.unwrap().unwrap();
        assert_eq!(row.body, "new");
        assert_eq!(row.season, "s2");
        assert_eq!(row.title, "New");
    }

    #[tokio::test]
    async fn empty_metadata_commits_nothing() {
        let corpus = Corpus::new();
        corpus.metadata("[]");
        let storage = corpus.storage().await;

        let result = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .expect("empty ingest succeeds");

        assert_eq!(result.seasons, 0);
        assert_eq!(result.episodes_written, 0);
        assert_eq!(storage.count_episodes().await.unwrap(), 0);

        // The empty transaction was committed, so a new one can start and land.
        let mut batch = storage.begin_batch(ConflictPolicy::BodyOnly).await.unwrap();
        batch
            .upsert(&EpisodeRow {
                id: "after".into(),
                season: "s".into(),
                title: "t".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
        assert_eq!(batch.commit().await.expect("second transaction commits"), 1);
        assert_eq!(storage.count_episodes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn season_without_episodes_key_is_rejected() {
        let corpus = Corpus::new();
        corpus.metadata(r#"[{ "slug": "s1" }]"#);
        let storage = corpus.storage().await;

        let err = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CuriosityError::MetadataParse { .. }));
        assert_eq!(storage.count_episodes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_later_entry_wins() {
        let corpus = Corpus::new();
        corpus.metadata(
            r#"[
                { "slug": "a", "episodes": [{ "id": "e1", "title": "First" }] },
                { "slug": "b", "episodes": [{ "id": "e1", "title": "Second" }] }
            ]"#,
        );
        corpus.transcript("a", "e1", "from a");
        corpus.transcript("b", "e1", "from b");
        let storage = corpus.storage().await;

        let result = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.episodes_written, 2);
        assert_eq!(result.distinct_ids, 1);
        assert_eq!(storage.count_episodes().await.unwrap(), 1);
        assert_eq!(storage.get_episode("e1").await.unwrap().unwrap().body, "from b");
    }

    #[tokio::test]
    async fn malformed_metadata_is_rejected() {
        let corpus = Corpus::new();
        corpus.metadata(r#"[{ "slug": "s1", "episodes": [{ "id": 7 }] }"#);
        let storage = corpus.storage().await;

        let err = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CuriosityError::MetadataParse { .. }));
    }

    #[tokio::test]
    async fn missing_metadata_is_rejected() {
        let corpus = Corpus::new();
        let storage = corpus.storage().await;

        let err = ingest(&storage, &corpus.config(ConflictPolicy::BodyOnly), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CuriosityError::MetadataParse { .. }));
    }

    #[tokio::test]
    async fn create_table_on_fresh_database() {
        let corpus = Corpus::new();
        corpus.metadata(r#"[{ "slug": "s1", "episodes": [{ "id": "e1", "title": "One" }] }]"#);
        corpus.transcript("s1", "e1", "body");
        let storage = Storage::open(ConnectionTarget::Local(corpus.root.join("fresh.db")), None)
            .await
            .unwrap();

        let mut config = corpus.config(ConflictPolicy::BodyOnly);
        config.create_table = true;
        ingest(&storage, &config, &SilentProgress).await.expect("ingest");

        assert_eq!(storage.count_episodes().await.unwrap(), 1);
    }
}
