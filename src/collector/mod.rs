//! Incremental collection of topics, users and edit history.
//!
//! A cycle runs in two phases, each fanned out as one task per category and
//! joined before the next begins:
//!
//! 1. topic sync: page through each category feed, fetch stale topics,
//!    harvest their users, commit to the cache;
//! 2. edit sweep: walk the revision chain of every cached topic's main post.
//!
//! A failing unit (page, topic, user, revision) is logged and skipped. Only a
//! failure to enumerate categories aborts the cycle.

pub mod cache;
mod revisions;
mod topic_sync;
mod users;

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use cache::{CacheSnapshot, CacheStore, CommitStats, RevisionMap, TopicBucket, UserMap};
pub use revisions::{reconstruct_topic_edits, ReconstructStats, RevisionWalk, FIRST_EDIT_REVISION};
pub use topic_sync::{is_current, sync_category, SyncOptions, SyncReport};
pub use users::harvest_users;

use crate::constants::SUBCATEGORY_SEPARATOR;
use crate::discourse::{ApiError, Category, ForumApi};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to enumerate categories: {0}")]
    Enumeration(#[source] ApiError),
}

/// Which part of the forum a cycle covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every top-level category and one level of subcategories.
    AllCategories,
    /// Only the given category slugs.
    Categories(Vec<String>),
    /// A single topic, bypassing category pagination.
    Topic(u64),
}

/// What a cycle should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectItems {
    pub posts: bool,
    pub users: bool,
    pub edits: bool,
}

impl Default for CollectItems {
    fn default() -> Self {
        Self {
            posts: true,
            users: true,
            edits: true,
        }
    }
}

impl CollectItems {
    /// Topic sync also runs for edits alone, since the sweep reads cached topics.
    #[must_use]
    pub fn needs_topic_sync(&self) -> bool {
        self.posts || self.users || self.edits
    }
}

/// Totals of one edit sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditSweepReport {
    pub topics_swept: usize,
    pub revisions_fetched: usize,
    pub revisions_added: usize,
    pub partial_chains: usize,
}

impl EditSweepReport {
    fn record(&mut self, stats: ReconstructStats) {
        self.topics_swept += 1;
        self.revisions_fetched += stats.revisions_fetched;
        self.revisions_added += stats.revisions_added;
        self.partial_chains += usize::from(stats.partial);
    }

    fn absorb(&mut self, other: Self) {
        self.topics_swept += other.topics_swept;
        self.revisions_fetched += other.revisions_fetched;
        self.revisions_added += other.revisions_added;
        self.partial_chains += other.partial_chains;
    }
}

/// Summary of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub categories: Vec<String>,
    /// One entry per category worker, ordered by category.
    pub syncs: Vec<SyncReport>,
    pub edits: EditSweepReport,
    /// Tasks that panicked or were cancelled.
    pub failed_tasks: usize,
}

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub snapshot: CacheSnapshot,
    pub report: CycleReport,
}

/// Drives collection cycles against one forum and one cache.
///
/// Cheap to clone; clones share the API client and the cache.
#[derive(Clone)]
pub struct Collector {
    api: Arc<dyn ForumApi>,
    cache: Arc<CacheStore>,
}

impl Collector {
    #[must_use]
    pub fn new(api: Arc<dyn ForumApi>, cache: Arc<CacheStore>) -> Self {
        Self { api, cache }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Run one full cycle and return a snapshot of the cache afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Enumeration`] if the category tree cannot be
    /// listed for [`Scope::AllCategories`].
    pub async fn collect(
        &self,
        scope: &Scope,
        items: CollectItems,
    ) -> Result<CollectOutcome, CollectError> {
        let mut report = CycleReport::default();
        let sync_options = SyncOptions {
            harvest_users: items.users,
        };

        match scope {
            Scope::Topic(topic_id) => {
                report.categories = self
                    .cache
                    .find_topic(*topic_id)
                    .map(|(slug, _)| slug)
                    .into_iter()
                    .collect();

                if items.needs_topic_sync() {
                    if let Some(slug) = self.sync_single_topic(*topic_id, sync_options).await {
                        report.categories = vec![slug];
                    }
                }

                if items.edits {
                    report.edits = self.sweep_single_topic(*topic_id).await;
                }
            }
            Scope::AllCategories | Scope::Categories(_) => {
                let categories = self.resolve_categories(scope).await?;
                info!(categories = categories.len(), "Starting collection cycle");

                if items.needs_topic_sync() {
                    self.run_topic_phase(&categories, sync_options, &mut report)
                        .await;
                }

                if items.edits {
                    self.run_edit_phase(&categories, &mut report).await;
                }

                report.categories = categories;
            }
        }

        let snapshot = self.cache.snapshot();
        info!(
            categories = report.categories.len(),
            topics = snapshot.topic_count(),
            users = snapshot.users.len(),
            revisions = snapshot.revision_count(),
            failed_tasks = report.failed_tasks,
            "Collection cycle complete"
        );

        Ok(CollectOutcome { snapshot, report })
    }

    /// Turn a category scope into the list of slugs to sync.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Enumeration`] if listing categories fails.
    pub async fn resolve_categories(&self, scope: &Scope) -> Result<Vec<String>, CollectError> {
        match scope {
            Scope::Categories(slugs) => {
                let mut seen = BTreeSet::new();
                Ok(slugs
                    .iter()
                    .map(|s| s.trim().trim_matches(SUBCATEGORY_SEPARATOR))
                    .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
                    .map(ToString::to_string)
                    .collect())
            }
            Scope::AllCategories => {
                let tree = self
                    .api
                    .list_categories(true)
                    .await
                    .map_err(CollectError::Enumeration)?;
                Ok(flatten_categories(&tree))
            }
            Scope::Topic(_) => Ok(Vec::new()),
        }
    }

    async fn run_topic_phase(
        &self,
        categories: &[String],
        options: SyncOptions,
        report: &mut CycleReport,
    ) {
        let mut tasks = JoinSet::new();
        for slug in categories {
            let api = Arc::clone(&self.api);
            let cache = Arc::clone(&self.cache);
            let slug = slug.clone();
            tasks.spawn(async move { sync_category(api.as_ref(), &cache, &slug, options).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(sync) => report.syncs.push(sync),
                Err(e) => {
                    error!(error = %e, "Category sync task failed");
                    report.failed_tasks += 1;
                }
            }
        }

        report.syncs.sort_by(|a, b| a.category.cmp(&b.category));
    }

    async fn run_edit_phase(&self, categories: &[String], report: &mut CycleReport) {
        let mut tasks = JoinSet::new();
        for slug in categories {
            let api = Arc::clone(&self.api);
            let cache = Arc::clone(&self.cache);
            let slug = slug.clone();
            tasks.spawn(async move { sweep_category(api.as_ref(), &cache, &slug).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(sweep) => report.edits.absorb(sweep),
                Err(e) => {
                    error!(error = %e, "Edit sweep task failed");
                    report.failed_tasks += 1;
                }
            }
        }
    }

    /// Fetch one topic directly and file it under its category's slug.
    async fn sync_single_topic(&self, topic_id: u64, options: SyncOptions) -> Option<String> {
        let api = self.api.as_ref();

        let topic = match api.topic(topic_id).await {
            Ok(topic) => topic,
            Err(e) => {
                warn!(topic_id, error = %e, "Topic fetch failed");
                return None;
            }
        };

        let slug = match api.show_category(topic.category_id).await {
            Ok(category) => category.slug,
            Err(e) => {
                warn!(topic_id, category_id = topic.category_id, error = %e, "Category lookup failed");
                return None;
            }
        };

        let users = if options.harvest_users {
            harvest_users(api, &self.cache, &UserMap::new(), &topic).await
        } else {
            UserMap::new()
        };

        let stats = self
            .cache
            .commit_topics(&slug, TopicBucket::from([(topic.id, topic)]), users);
        debug!(topic_id, category = %slug, ?stats, "Single topic committed");

        Some(slug)
    }

    async fn sweep_single_topic(&self, topic_id: u64) -> EditSweepReport {
        let mut sweep = EditSweepReport::default();
        match self.cache.find_topic(topic_id) {
            Some((_, topic)) => {
                sweep.record(reconstruct_topic_edits(self.api.as_ref(), &self.cache, &topic).await);
            }
            None => debug!(topic_id, "Topic not cached, no edit history to sweep"),
        }
        sweep
    }
}

/// Walk every topic currently cached for `slug` through the revision chain.
async fn sweep_category(api: &dyn ForumApi, cache: &CacheStore, slug: &str) -> EditSweepReport {
    let mut sweep = EditSweepReport::default();
    for topic in cache.topic_bucket(slug).values() {
        sweep.record(reconstruct_topic_edits(api, cache, topic).await);
    }
    debug!(
        category = %slug,
        topics = sweep.topics_swept,
        added = sweep.revisions_added,
        "Edit sweep done"
    );
    sweep
}

/// Slugs of top-level categories followed by `parent/child` for each child.
#[must_use]
pub fn flatten_categories(tree: &[Category]) -> Vec<String> {
    let mut slugs = Vec::new();
    for category in tree {
        slugs.push(category.slug.clone());
        for sub in &category.subcategories {
            slugs.push(format!("{}{SUBCATEGORY_SEPARATOR}{}", category.slug, sub.slug));
        }
    }
    slugs
}
