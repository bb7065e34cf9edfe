//! Flattening of cache snapshots into exportable rows, and the export backends.

mod csv;
mod json;
mod sqlite;

pub use self::csv::{CsvExporter, DEFAULT_CSV_FOLDER};
pub use json::JsonExporter;
pub use sqlite::SqliteExporter;

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::CacheSnapshot;
use crate::constants::SUBCATEGORY_SEPARATOR;
use crate::discourse::TopicDetail;

/// Which row kinds an export includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportItems {
    pub posts: bool,
    pub edits: bool,
    pub users: bool,
}

impl Default for ExportItems {
    fn default() -> Self {
        Self {
            posts: true,
            edits: true,
            users: true,
        }
    }
}

/// One post of a cached topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntry {
    pub category_slug: String,
    pub topic_id: u64,
    pub post_id: u64,
    pub creation_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    pub username: String,
    pub is_initial_post: bool,
}

/// One edit of a topic's main post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    pub topic_id: u64,
    pub edit_number: u32,
    pub creation_time: DateTime<Utc>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub user_id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_group_name: Option<String>,
}

/// Everything one export writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub posts: Vec<PostEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<EditEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserEntry>,
}

impl ExportData {
    /// Flatten a snapshot, keeping only the requested row kinds.
    ///
    /// Rows come out in map order (category, topic id, post order; topic id,
    /// revision number; username), so equal snapshots yield equal exports.
    ///
    /// A topic cached under several slugs is exported once, under the slug
    /// chosen by [`owning_slugs`].
    #[must_use]
    pub fn from_snapshot(snapshot: &CacheSnapshot, items: ExportItems) -> Self {
        let mut data = Self::default();

        if items.posts {
            let owners = owning_slugs(snapshot);
            for (slug, bucket) in &snapshot.topics {
                for (topic_id, topic) in bucket {
                    if owners.get(topic_id) != Some(&slug.as_str()) {
                        continue;
                    }
                    data.posts.extend(topic.posts.iter().map(|post| PostEntry {
                        category_slug: slug.clone(),
                        topic_id: *topic_id,
                        post_id: post.id,
                        creation_time: post.created_at,
                        update_time: post.updated_at,
                        username: post.username.clone(),
                        is_initial_post: post.post_number == 1,
                    }));
                }
            }
        }

        if items.edits {
            for (topic_id, revisions) in &snapshot.edits {
                data.edits.extend(revisions.values().map(|revision| EditEntry {
                    topic_id: *topic_id,
                    edit_number: revision.number,
                    creation_time: revision.created_at,
                    username: revision.editor_username.clone(),
                }));
            }
        }

        if items.users {
            data.users = snapshot
                .users
                .values()
                .map(|user| UserEntry {
                    user_id: user.id,
                    username: user.username.clone(),
                    name: user.name.clone(),
                    primary_group_name: user.primary_group_name.clone(),
                })
                .collect();
        }

        data
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.edits.is_empty() && self.users.is_empty()
    }
}

/// Pick one slug per topic id: the copy with the newest `last_posted_at`,
/// then the deepest subcategory path, then the first in map order.
fn owning_slugs(snapshot: &CacheSnapshot) -> BTreeMap<u64, &str> {
    fn depth(slug: &str) -> usize {
        slug.matches(SUBCATEGORY_SEPARATOR).count()
    }

    let mut owners: BTreeMap<u64, (&str, &TopicDetail)> = BTreeMap::new();

    for (slug, bucket) in &snapshot.topics {
        for (topic_id, topic) in bucket {
            let replace = owners.get(topic_id).map_or(true, |(owner, current)| {
                (topic.last_posted_at, depth(slug)) > (current.last_posted_at, depth(owner))
            });
            if replace {
                owners.insert(*topic_id, (slug.as_str(), topic));
            }
        }
    }

    owners
        .into_iter()
        .map(|(topic_id, (slug, _))| (topic_id, slug))
        .collect()
}

/// Rows written by one export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub rows_written: usize,
    pub rows_failed: usize,
}

/// Configured export backend.
#[derive(Debug)]
pub enum Exporter {
    Json(JsonExporter),
    Sqlite(SqliteExporter),
    Csv(CsvExporter),
}

impl Exporter {
    /// Write `data` to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written at all. Individual
    /// row failures in the relational backend are logged and counted instead.
    pub async fn export(&self, data: &ExportData) -> Result<ExportStats> {
        match self {
            Self::Json(exporter) => exporter.export(data).await,
            Self::Sqlite(exporter) => exporter.export(data).await,
            Self::Csv(exporter) => exporter.export(data).await,
        }
    }
}
