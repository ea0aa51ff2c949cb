//! SQL migration definitions for the episodes database.
//!
//! Migrations are only applied when schema creation is requested; by default
//! the `episodes` table is owned by whoever provisions the database.

/// A database migration with a version and SQL statements per dialect.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    /// libSQL / SQLite statements.
    pub sql: &'static str,
    /// PostgreSQL statements.
    pub postgres_sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: episodes",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per episode id; body holds the full transcript
CREATE TABLE IF NOT EXISTS episodes (
    id     TEXT PRIMARY KEY,
    season TEXT NOT NULL,
    title  TEXT NOT NULL,
    body   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_season ON episodes(season);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        postgres_sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS episodes (
    id     TEXT PRIMARY KEY,
    season TEXT NOT NULL,
    title  TEXT NOT NULL,
    body   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_season ON episodes(season);

INSERT INTO schema_migrations (version) VALUES (1) ON CONFLICT DO NOTHING;
"#,
    }]
}
