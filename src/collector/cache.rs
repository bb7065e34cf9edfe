//! Process-wide store of everything collected so far.
//!
//! The cache only grows: topics are replaced by strictly newer copies (or
//! follow their category when moved), users are written once, and revisions
//! accumulate. It persists across collection
//! cycles so each cycle can skip what is already current.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discourse::{Revision, TopicDetail, User};

/// Topics of one category, keyed by topic id.
pub type TopicBucket = BTreeMap<u64, TopicDetail>;

/// Users keyed by username.
pub type UserMap = BTreeMap<String, User>;

/// Revisions of one topic's main post, keyed by revision number.
pub type RevisionMap = BTreeMap<u32, Revision>;

/// Plain copy of the cache contents, handed to exporters.
///
/// Ordered maps keep serialization deterministic, so two snapshots of the same
/// content are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Category slug -> topic id -> topic.
    pub topics: BTreeMap<String, TopicBucket>,
    pub users: UserMap,
    /// Topic id -> revision number -> revision.
    pub edits: BTreeMap<u64, RevisionMap>,
}

impl CacheSnapshot {
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn revision_count(&self) -> usize {
        self.edits.values().map(BTreeMap::len).sum()
    }
}

/// Outcome of merging one worker's results into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub topics_written: usize,
    /// Incoming topics that were not newer than the cached copy.
    pub topics_kept: usize,
    /// Copies dropped from other categories because the topic moved.
    pub topics_moved: usize,
    pub users_added: usize,
}

/// Shared, lock-guarded collection cache.
///
/// Workers hold it through an `Arc` and read from it without coordination;
/// only commits take the write side, and never across an `.await`.
#[derive(Debug, Default)]
pub struct CacheStore {
    inner: RwLock<CacheSnapshot>,
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cache from a previous snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheSnapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the bucket for `slug` as it stands now (empty if unknown).
    ///
    /// Commits made by other workers after this call are not reflected.
    #[must_use]
    pub fn topic_bucket(&self, slug: &str) -> TopicBucket {
        self.read().topics.get(slug).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn topic(&self, slug: &str, topic_id: u64) -> Option<TopicDetail> {
        self.read()
            .topics
            .get(slug)
            .and_then(|bucket| bucket.get(&topic_id))
            .cloned()
    }

    /// Locate a topic in whichever category bucket holds it.
    #[must_use]
    pub fn find_topic(&self, topic_id: u64) -> Option<(String, TopicDetail)> {
        self.read().topics.iter().find_map(|(slug, bucket)| {
            bucket
                .get(&topic_id)
                .map(|topic| (slug.clone(), topic.clone()))
        })
    }

    #[must_use]
    pub fn has_user(&self, username: &str) -> bool {
        self.read().users.contains_key(username)
    }

    #[must_use]
    pub fn user(&self, username: &str) -> Option<User> {
        self.read().users.get(username).cloned()
    }

    #[must_use]
    pub fn revisions(&self, topic_id: u64) -> RevisionMap {
        self.read().edits.get(&topic_id).cloned().unwrap_or_default()
    }

    /// Merge one category's freshly fetched topics and harvested users.
    ///
    /// A topic replaces the cached copy only if absent or strictly newer by
    /// `last_posted_at`. Users already present are left untouched.
    ///
    /// A written topic whose `category_id` differs from a copy held under
    /// another slug has moved, and the older copy is dropped. Copies with the
    /// same `category_id` stay, since a parent category's feed also lists its
    /// subcategories' topics.
    pub fn commit_topics(&self, slug: &str, topics: TopicBucket, users: UserMap) -> CommitStats {
        let mut stats = CommitStats::default();
        let mut cache = self.write();

        if !topics.is_empty() {
            let mut written = Vec::new();
            let bucket = cache.topics.entry(slug.to_string()).or_default();
            for (id, incoming) in topics {
                match bucket.get(&id) {
                    Some(existing) if incoming.last_posted_at <= existing.last_posted_at => {
                        stats.topics_kept += 1;
                    }
                    _ => {
                        written.push((id, incoming.category_id, incoming.last_posted_at));
                        bucket.insert(id, incoming);
                        stats.topics_written += 1;
                    }
                }
            }

            for (other_slug, other) in cache.topics.iter_mut().filter(|(s, _)| *s != slug) {
                for (id, category_id, last_posted_at) in &written {
                    let moved = other.get(id).is_some_and(|stale| {
                        stale.category_id != *category_id && stale.last_posted_at <= *last_posted_at
                    });
                    if moved {
                        other.remove(id);
                        stats.topics_moved += 1;
                        debug!(topic_id = id, from = %other_slug, to = %slug, "Topic changed category");
                    }
                }
            }
            cache.topics.retain(|_, bucket| !bucket.is_empty());
        }

        stats.users_added = merge_users(&mut cache.users, users);
        stats
    }

    /// Merge users first-write-wins. Returns how many were new.
    pub fn merge_users(&self, users: UserMap) -> usize {
        merge_users(&mut self.write().users, users)
    }

    /// Add revisions to a topic's edit history. Existing numbers are kept.
    ///
    /// Returns how many revisions were new.
    pub fn merge_edits(
        &self,
        topic_id: u64,
        revisions: impl IntoIterator<Item = Revision>,
    ) -> usize {
        let mut cache = self.write();
        let history = cache.edits.entry(topic_id).or_default();
        let mut added = 0;
        for revision in revisions {
            if let Entry::Vacant(slot) = history.entry(revision.number) {
                slot.insert(revision);
                added += 1;
            }
        }
        added
    }

    /// Category slugs that currently hold at least one topic.
    #[must_use]
    pub fn category_slugs(&self) -> Vec<String> {
        self.read()
            .topics
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(slug, _)| slug.clone())
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        self.read().clone()
    }
}

fn merge_users(target: &mut UserMap, users: UserMap) -> usize {
    let mut added = 0;
    for (username, user) in users {
        if let Entry::Vacant(slot) = target.entry(username) {
            slot.insert(user);
            added += 1;
        }
    }
    added
}
