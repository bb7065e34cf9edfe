use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::{EditEntry, ExportData, ExportStats, PostEntry, UserEntry};

/// Folder used by the CSV export when none is configured.
pub const DEFAULT_CSV_FOLDER: &str = "out";

pub const USERS_FILE: &str = "users.csv";
pub const COMMENTS_FILE: &str = "topic_comments.csv";
pub const EDITS_FILE: &str = "topic_edits.csv";

/// Writes one CSV file per row kind into a folder.
///
/// Each export replaces the files it writes. A row kind with no rows leaves
/// its file untouched.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    folder: PathBuf,
}

#[derive(Serialize)]
struct CommentRow<'a> {
    #[serde(rename = "Category Slug")]
    category_slug: &'a str,
    #[serde(rename = "Topic ID")]
    topic_id: u64,
    #[serde(rename = "Post ID")]
    post_id: u64,
    #[serde(rename = "Creation Time")]
    creation_time: String,
    #[serde(rename = "Last Update Time")]
    update_time: Option<String>,
    #[serde(rename = "Creator Username")]
    username: &'a str,
    #[serde(rename = "Is the topic's main post")]
    is_initial_post: bool,
}

impl<'a> From<&'a PostEntry> for CommentRow<'a> {
    fn from(post: &'a PostEntry) -> Self {
        Self {
            category_slug: &post.category_slug,
            topic_id: post.topic_id,
            post_id: post.post_id,
            creation_time: timestamp(post.creation_time),
            update_time: post.update_time.map(timestamp),
            username: &post.username,
            is_initial_post: post.is_initial_post,
        }
    }
}

#[derive(Serialize)]
struct EditRow<'a> {
    #[serde(rename = "Topic ID")]
    topic_id: u64,
    #[serde(rename = "Edit Number")]
    edit_number: u32,
    #[serde(rename = "Creation Time")]
    creation_time: String,
    #[serde(rename = "Editor Username")]
    username: &'a str,
}

impl<'a> From<&'a EditEntry> for EditRow<'a> {
    fn from(edit: &'a EditEntry) -> Self {
        Self {
            topic_id: edit.topic_id,
            edit_number: edit.edit_number,
            creation_time: timestamp(edit.creation_time),
            username: &edit.username,
        }
    }
}

#[derive(Serialize)]
struct UserRow<'a> {
    #[serde(rename = "User ID")]
    user_id: i64,
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Name")]
    name: Option<&'a str>,
    #[serde(rename = "Primary Group Name")]
    primary_group_name: Option<&'a str>,
}

impl<'a> From<&'a UserEntry> for UserRow<'a> {
    fn from(user: &'a UserEntry) -> Self {
        Self {
            user_id: user.user_id,
            username: &user.username,
            name: user.name.as_deref(),
            primary_group_name: user.primary_group_name.as_deref(),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serialize `rows` with a header line taken from the row's field names.
fn to_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("Failed to serialize CSV row")?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV buffer: {}", e.error()))
}

impl CsvExporter {
    #[must_use]
    pub fn new(folder: PathBuf) -> Self {
        Self { folder }
    }

    /// Write the non-empty row kinds of `data` into the folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be created or a file cannot be
    /// written.
    pub async fn export(&self, data: &ExportData) -> Result<ExportStats> {
        tokio::fs::create_dir_all(&self.folder)
            .await
            .with_context(|| format!("Failed to create CSV folder: {}", self.folder.display()))?;

        let mut stats = ExportStats::default();

        if !data.users.is_empty() {
            self.write(USERS_FILE, to_csv(data.users.iter().map(UserRow::from))?)
                .await?;
            stats.rows_written += data.users.len();
        }
        if !data.posts.is_empty() {
            self.write(COMMENTS_FILE, to_csv(data.posts.iter().map(CommentRow::from))?)
                .await?;
            stats.rows_written += data.posts.len();
        }
        if !data.edits.is_empty() {
            self.write(EDITS_FILE, to_csv(data.edits.iter().map(EditRow::from))?)
                .await?;
            stats.rows_written += data.edits.len();
        }

        info!(
            folder = %self.folder.display(),
            rows = stats.rows_written,
            "CSV export written"
        );
        Ok(stats)
    }

    async fn write(&self, file: &str, body: Vec<u8>) -> Result<()> {
        let path = self.folder.join(file);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        debug!(path = %path.display(), bytes = body.len(), "CSV file written");
        Ok(())
    }
}
