use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

use super::{EditEntry, ExportData, ExportStats, PostEntry, UserEntry};

/// Relational export into a SQLite database.
///
/// Rows are upserted, so exporting the same cache twice leaves the database
/// unchanged.
#[derive(Debug, Clone)]
pub struct SqliteExporter {
    pool: SqlitePool,
}

impl SqliteExporter {
    /// Open (creating if needed) the database at `path` and ensure the tables exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or table creation fails.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let exporter = Self { pool };
        exporter.create_tables().await?;
        info!(path = %path.display(), "SQLite export database ready");

        Ok(exporter)
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                name TEXT,
                primary_group_name TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS comments (
                post_id INTEGER PRIMARY KEY,
                category_slug TEXT NOT NULL,
                topic_id INTEGER NOT NULL,
                creation_time TEXT NOT NULL,
                update_time TEXT,
                username TEXT NOT NULL,
                is_initial_post INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create comments table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS edits (
                topic_id INTEGER NOT NULL,
                edit_number INTEGER NOT NULL,
                creation_time TEXT NOT NULL,
                username TEXT NOT NULL,
                PRIMARY KEY (topic_id, edit_number)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create edits table")?;

        debug!("Export tables ensured");
        Ok(())
    }

    /// Upsert every row of `data` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be opened or committed.
    /// A failing row is logged and counted, and the rest still go in.
    pub async fn export(&self, data: &ExportData) -> Result<ExportStats> {
        let mut stats = ExportStats::default();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin export transaction")?;

        for user in &data.users {
            match upsert_user(&mut tx, user).await {
                Ok(()) => stats.rows_written += 1,
                Err(e) => {
                    warn!(username = %user.username, error = %e, "Failed to export user");
                    stats.rows_failed += 1;
                }
            }
        }

        for post in &data.posts {
            match upsert_comment(&mut tx, post).await {
                Ok(()) => stats.rows_written += 1,
                Err(e) => {
                    warn!(post_id = post.post_id, error = %e, "Failed to export post");
                    stats.rows_failed += 1;
                }
            }
        }

        for edit in &data.edits {
            match insert_edit(&mut tx, edit).await {
                Ok(()) => stats.rows_written += 1,
                Err(e) => {
                    warn!(
                        topic_id = edit.topic_id,
                        edit_number = edit.edit_number,
                        error = %e,
                        "Failed to export edit"
                    );
                    stats.rows_failed += 1;
                }
            }
        }

        tx.commit()
            .await
            .context("Failed to commit export transaction")?;

        info!(
            written = stats.rows_written,
            failed = stats.rows_failed,
            "SQLite export complete"
        );
        Ok(stats)
    }
}

async fn upsert_user(tx: &mut Transaction<'_, Sqlite>, user: &UserEntry) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO users (user_id, username, name, primary_group_name)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            username = excluded.username,
            name = excluded.name,
            primary_group_name = excluded.primary_group_name
        ",
    )
    .bind(user.user_id)
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.primary_group_name)
    .execute(&mut **tx)
    .await
    .context("Failed to upsert user")?;

    Ok(())
}

async fn upsert_comment(tx: &mut Transaction<'_, Sqlite>, post: &PostEntry) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO comments
            (post_id, category_slug, topic_id, creation_time, update_time, username, is_initial_post)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(post_id) DO UPDATE SET
            category_slug = excluded.category_slug,
            update_time = excluded.update_time
        ",
    )
    .bind(post.post_id as i64)
    .bind(&post.category_slug)
    .bind(post.topic_id as i64)
    .bind(post.creation_time)
    .bind(post.update_time)
    .bind(&post.username)
    .bind(post.is_initial_post)
    .execute(&mut **tx)
    .await
    .context("Failed to upsert comment")?;

    Ok(())
}

async fn insert_edit(tx: &mut Transaction<'_, Sqlite>, edit: &EditEntry) -> Result<()> {
    sqlx::query(
        r"
        INSERT OR IGNORE INTO edits (topic_id, edit_number, creation_time, username)
        VALUES (?, ?, ?, ?)
        ",
    )
    .bind(edit.topic_id as i64)
    .bind(edit.edit_number)
    .bind(edit.creation_time)
    .bind(&edit.username)
    .execute(&mut **tx)
    .await
    .context("Failed to insert edit")?;

    Ok(())
}
