use std::collections::HashSet;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use tracing::{debug, info};

use crate::config::Config;

/// Schema migrations, applied in order. The id doubles as the row key in
/// `migration_history`, so renumbering a shipped migration is not allowed.
struct Migration {
    id: i64,
    label: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        label: "reminder_tables",
        sql: include_str!("../migrations/20260301_000001_initial_schema.sql"),
    },
    Migration {
        id: 2,
        label: "snoozed_index",
        sql: include_str!("../migrations/20260301_000002_snoozed_index.sql"),
    },
];

/// Open (or create) the reminder database and bring its schema current.
/// WAL keeps the dispatcher's reads from blocking request-side writes;
/// foreign keys must be on for the reminder → occurrence cascade.
pub async fn create_pool(config: &Config) -> Result<SqlitePool> {
    let path = config.db_path();

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("preparing data directory {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("opening reminder database at {}", path.display()))?;

    migrate(&pool).await?;
    info!(path = %path.display(), "reminder database ready");

    Ok(pool)
}

/// Apply every migration not yet recorded in `migration_history`.
async fn migrate(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS migration_history (
            id INTEGER PRIMARY KEY NOT NULL,
            label TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )",
    )
    .await
    .context("ensuring migration_history exists")?;

    let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM migration_history")
        .fetch_all(pool)
        .await
        .context("reading migration history")?;
    let applied: HashSet<i64> = rows.into_iter().map(|(id,)| id).collect();

    let mut fresh = 0;
    for migration in MIGRATIONS {
        if applied.contains(&migration.id) {
            continue;
        }
        pool.execute(migration.sql)
            .await
            .with_context(|| format!("running migration {} ({})", migration.id, migration.label))?;
        sqlx::query("INSERT INTO migration_history (id, label) VALUES (?, ?)")
            .bind(migration.id)
            .bind(migration.label)
            .execute(pool)
            .await
            .with_context(|| format!("recording migration {} in history", migration.id))?;
        info!(id = migration.id, label = migration.label, "migration applied");
        fresh += 1;
    }

    if fresh == 0 {
        debug!("schema already current");
    } else {
        info!(count = fresh, "schema migrated");
    }

    Ok(())
}

/// In-memory database with the full schema, for tests. A single
/// connection, because every new in-memory connection is a fresh database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connecting to in-memory database");
    migrate(&pool).await.expect("applying migrations");
    pool
}
