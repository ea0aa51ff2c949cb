//! Storage layer for ingested episodes.
//!
//! The [`Storage`] struct owns one connection to the episodes database: a
//! local or remote libSQL database, or a PostgreSQL server. Writes go through
//! an [`EpisodeBatch`], a transaction that is consumed by exactly one of
//! [`EpisodeBatch::commit`] or [`EpisodeBatch::rollback`].

mod migrations;
mod target;

pub use target::ConnectionTarget;

use curiosity_shared::{ConflictPolicy, CuriosityError, EpisodeRow, Result};
use libsql::{Connection, Database, Transaction, params};
use tokio_postgres::{Client, NoTls};

/// Upsert refreshing only the transcript body on conflict.
const UPSERT_BODY_ONLY: &str = "INSERT INTO episodes (id, season, title, body)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(id) DO UPDATE SET
       body = excluded.body";

/// Upsert refreshing every column on conflict.
const UPSERT_ALL_FIELDS: &str = "INSERT INTO episodes (id, season, title, body)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(id) DO UPDATE SET
       season = excluded.season,
       title = excluded.title,
       body = excluded.body";

const PG_UPSERT_BODY_ONLY: &str = "INSERT INTO episodes (id, season, title, body)
     VALUES ($1, $2, $3, $4)
     ON CONFLICT(id) DO UPDATE SET
       body = excluded.body";

const PG_UPSERT_ALL_FIELDS: &str = "INSERT INTO episodes (id, season, title, body)
     VALUES ($1, $2, $3, $4)
     ON CONFLICT(id) DO UPDATE SET
       season = excluded.season,
       title = excluded.title,
       body = excluded.body";

/// The libSQL upsert statement used for `policy`.
pub fn upsert_sql(policy: ConflictPolicy) -> &'static str {
    match policy {
        ConflictPolicy::BodyOnly => UPSERT_BODY_ONLY,
        ConflictPolicy::AllFields => UPSERT_ALL_FIELDS,
    }
}

/// The PostgreSQL upsert statement used for `policy`.
pub fn postgres_upsert_sql(policy: ConflictPolicy) -> &'static str {
    match policy {
        ConflictPolicy::BodyOnly => PG_UPSERT_BODY_ONLY,
        ConflictPolicy::AllFields => PG_UPSERT_ALL_FIELDS,
    }
}

fn storage_err(e: libsql::Error) -> CuriosityError {
    CuriosityError::Storage(e.to_string())
}

/// Server-side message when there is one; `tokio_postgres` only says "db error" otherwise.
fn pg_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

fn pg_err(e: tokio_postgres::Error) -> CuriosityError {
    CuriosityError::Storage(pg_message(&e))
}

enum Backend {
    Libsql {
        #[allow(dead_code)]
        db: Database,
        conn: Connection,
    },
    Postgres {
        client: Client,
    },
}

/// Primary storage handle wrapping one database connection.
pub struct Storage {
    backend: Backend,
    target: ConnectionTarget,
}

impl Storage {
    /// Parse `conn_str` and connect. `auth_token` is only used for remote libSQL targets.
    pub async fn connect(conn_str: &str, auth_token: Option<String>) -> Result<Self> {
        let target = ConnectionTarget::parse(conn_str)?;
        Self::open(target, auth_token).await
    }

    /// Open a connection to `target`.
    pub async fn open(target: ConnectionTarget, auth_token: Option<String>) -> Result<Self> {
        let backend = match &target {
            ConnectionTarget::Local(path) => {
                // Ensure parent directory exists
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| CuriosityError::io(parent, e))?;
                }
                libsql_backend(libsql::Builder::new_local(path).build().await, &target)?
            }
            ConnectionTarget::Memory => {
                libsql_backend(libsql::Builder::new_local(":memory:").build().await, &target)?
            }
            ConnectionTarget::Remote(url) => {
                if auth_token.is_none() {
                    tracing::warn!(%target, "no auth token set for remote database");
                }
                let built = libsql::Builder::new_remote(url.clone(), auth_token.unwrap_or_default())
                    .build()
                    .await;
                libsql_backend(built, &target)?
            }
            ConnectionTarget::Postgres(conn_str) => {
                let client = connect_postgres(conn_str).await.map_err(|e| {
                    CuriosityError::Storage(format!("failed to open {target}: {}", pg_message(&e)))
                })?;
                Backend::Postgres { client }
            }
        };

        tracing::debug!(%target, "database connection opened");
        Ok(Self { backend, target })
    }

    /// The target this storage is connected to.
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Create the `episodes` table (and migration bookkeeping) if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                let applied = match &self.backend {
                    Backend::Libsql { conn, .. } => conn
                        .execute_batch(migration.sql)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                    Backend::Postgres { client } => client
                        .batch_execute(migration.postgres_sql)
                        .await
                        .map_err(|e| pg_message(&e)),
                };
                applied.map_err(|e| {
                    CuriosityError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        const SQL: &str = "SELECT MAX(version) FROM schema_migrations";

        match &self.backend {
            Backend::Libsql { conn, .. } => match conn.query(SQL, params![]).await {
                Ok(mut rows) => {
                    if let Ok(Some(row)) = rows.next().await {
                        row.get::<u32>(0).unwrap_or(0)
                    } else {
                        0
                    }
                }
                Err(_) => 0, // Table doesn't exist yet
            },
            Backend::Postgres { client } => match client.query_opt(SQL, &[]).await {
                Ok(Some(row)) => row
                    .try_get::<_, Option<i32>>(0)
                    .ok()
                    .flatten()
                    .map_or(0, |v| v as u32),
                _ => 0,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Episode writes
    // -----------------------------------------------------------------------

    /// Start a batch of upserts inside one transaction.
    pub async fn begin_batch(&self, policy: ConflictPolicy) -> Result<EpisodeBatch<'_>> {
        let tx = match &self.backend {
            Backend::Libsql { conn, .. } => {
                let tx = conn.transaction().await.map_err(|e| {
                    CuriosityError::Storage(format!("failed to begin transaction: {e}"))
                })?;
                BatchTx::Libsql(tx)
            }
            Backend::Postgres { client } => {
                client.batch_execute("BEGIN").await.map_err(|e| {
                    CuriosityError::Storage(format!(
                        "failed to begin transaction: {}",
                        pg_message(&e)
                    ))
                })?;
                BatchTx::Postgres(client)
            }
        };
        tracing::debug!(%policy, "episode batch started");
        Ok(EpisodeBatch {
            tx,
            policy,
            written: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Episode reads
    // -----------------------------------------------------------------------

    /// Get an episode row by id.
    pub async fn get_episode(&self, id: &str) -> Result<Option<EpisodeRow>> {
        match &self.backend {
            Backend::Libsql { conn, .. } => {
                let mut rows = conn
                    .query(
                        "SELECT id, season, title, body FROM episodes WHERE id = ?1",
                        params![id],
                    )
                    .await
                    .map_err(storage_err)?;

                match rows.next().await {
                    Ok(Some(row)) => Ok(Some(row_to_episode(&row)?)),
                    Ok(None) => Ok(None),
                    Err(e) => Err(storage_err(e)),
                }
            }
            Backend::Postgres { client } => {
                let row = client
                    .query_opt(
                        "SELECT id, season, title, body FROM episodes WHERE id = $1",
                        &[&id],
                    )
                    .await
                    .map_err(pg_err)?;
                row.as_ref().map(pg_row_to_episode).transpose()
            }
        }
    }

    /// List all episode ids, sorted.
    pub async fn list_episode_ids(&self) -> Result<Vec<String>> {
        const SQL: &str = "SELECT id FROM episodes ORDER BY id";

        match &self.backend {
            Backend::Libsql { conn, .. } => {
                let mut rows = conn.query(SQL, params![]).await.map_err(storage_err)?;

                let mut ids = Vec::new();
                while let Some(row) = rows.next().await.map_err(storage_err)? {
                    ids.push(row.get::<String>(0).map_err(storage_err)?);
                }
                Ok(ids)
            }
            Backend::Postgres { client } => client
                .query(SQL, &[])
                .await
                .map_err(pg_err)?
                .iter()
                .map(|row| row.try_get::<_, String>(0).map_err(pg_err))
                .collect(),
        }
    }

    /// Number of rows in the `episodes` table.
    pub async fn count_episodes(&self) -> Result<u64> {
        const SQL: &str = "SELECT COUNT(*) FROM episodes";

        match &self.backend {
            Backend::Libsql { conn, .. } => {
                let mut rows = conn.query(SQL, params![]).await.map_err(storage_err)?;

                match rows.next().await.map_err(storage_err)? {
                    Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
                    None => Ok(0),
                }
            }
            Backend::Postgres { client } => {
                let row = client.query_one(SQL, &[]).await.map_err(pg_err)?;
                Ok(row.try_get::<_, i64>(0).map_err(pg_err)? as u64)
            }
        }
    }
}

fn libsql_backend(
    built: std::result::Result<Database, libsql::Error>,
    target: &ConnectionTarget,
) -> Result<Backend> {
    let db = built
        .map_err(|e| CuriosityError::Storage(format!("failed to open {target}: {e}")))?;
    let conn = db.connect().map_err(storage_err)?;
    Ok(Backend::Libsql { db, conn })
}

/// Open a PostgreSQL connection and drive it on a background task.
async fn connect_postgres(conn_str: &str) -> std::result::Result<Client, tokio_postgres::Error> {
    let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "postgres connection closed with error");
        }
    });
    Ok(client)
}

enum BatchTx<'a> {
    Libsql(Transaction),
    /// Bracketed by `BEGIN` / `COMMIT` on the shared client.
    Postgres(&'a Client),
}

/// Upserts sharing a single transaction.
pub struct EpisodeBatch<'a> {
    tx: BatchTx<'a>,
    policy: ConflictPolicy,
    written: usize,
}

impl EpisodeBatch<'_> {
    /// Insert `row`, or update the existing row with the same id.
    pub async fn upsert(&mut self, row: &EpisodeRow) -> Result<()> {
        let outcome = match &self.tx {
            BatchTx::Libsql(tx) => tx
                .execute(
                    upsert_sql(self.policy),
                    params![
                        row.id.as_str(),
                        row.season.as_str(),
                        row.title.as_str(),
                        row.body.as_str(),
                    ],
                )
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            BatchTx::Postgres(client) => client
                .execute(
                    postgres_upsert_sql(self.policy),
                    &[&row.id, &row.season, &row.title, &row.body],
                )
                .await
                .map(|_| ())
                .map_err(|e| pg_message(&e)),
        };
        outcome.map_err(|e| {
            CuriosityError::Storage(format!("upsert of episode '{}' failed: {e}", row.id))
        })?;
        self.written += 1;
        Ok(())
    }

    /// Upserts executed so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Commit every upsert in the batch. Returns the number written.
    pub async fn commit(self) -> Result<usize> {
        let written = self.written;
        let outcome = match self.tx {
            BatchTx::Libsql(tx) => tx.commit().await.map_err(|e| e.to_string()),
            BatchTx::Postgres(client) => client
                .batch_execute("COMMIT")
                .await
                .map_err(|e| pg_message(&e)),
        };
        outcome.map_err(|e| CuriosityError::Storage(format!("commit failed: {e}")))?;
        tracing::debug!(written, "episode batch committed");
        Ok(written)
    }

    /// Discard every upsert in the batch.
    pub async fn rollback(self) -> Result<()> {
        let discarded = self.written;
        let outcome = match self.tx {
            BatchTx::Libsql(tx) => tx.rollback().await.map_err(|e| e.to_string()),
            BatchTx::Postgres(client) => client
                .batch_execute("ROLLBACK")
                .await
                .map_err(|e| pg_message(&e)),
        };
        outcome.map_err(|e| CuriosityError::Storage(format!("rollback failed: {e}")))?;
        tracing::debug!(discarded, "episode batch rolled back");
        Ok(())
    }
}

/// Convert a database row to an [`EpisodeRow`].
fn row_to_episode(row: &libsql::Row) -> Result<EpisodeRow> {
    Ok(EpisodeRow {
        id: row.get::<String>(0).map_err(storage_err)?,
        season: row.get::<String>(1).map_err(storage_err)?,
        title: row.get::<String>(2).map_err(storage_err)?,
        body: row.get::<String>(3).map_err(storage_err)?,
    })
}

fn pg_row_to_episode(row: &tokio_postgres::Row) -> Result<EpisodeRow> {
    Ok(EpisodeRow {
        id: row.try_get(0).map_err(pg_err)?,
        season: row.try_get(1).map_err(pg_err)?,
        title: row.try_get(2).map_err(pg_err)?,
        body: row.try_get(3).map_err(pg_err)?,
    })
}
