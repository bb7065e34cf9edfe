//! Per-category topic synchronization.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::cache::{CacheStore, CommitStats, TopicBucket, UserMap};
use super::users::harvest_users;
use crate::discourse::{ForumApi, TopicSummary};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Resolve participants and post authors of every fetched topic.
    pub harvest_users: bool,
}

/// What one category worker did during a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub category: String,
    pub pages_fetched: u32,
    /// Pagination stopped because a page fetch failed.
    pub page_failed: bool,
    pub summaries_seen: usize,
    pub topics_current: usize,
    pub topics_fetched: usize,
    pub topic_failures: usize,
    pub users_harvested: usize,
    pub commit: CommitStats,
}

/// True if the cached copy is at least as recent as the feed entry.
#[must_use]
pub fn is_current(bucket: &TopicBucket, summary: &TopicSummary) -> bool {
    bucket
        .get(&summary.id)
        .is_some_and(|cached| cached.last_posted_at >= summary.last_posted_at)
}

/// Bring the cache's bucket for `slug` up to date.
///
/// Works against a copy of the bucket taken on entry; the cache is written
/// once, at the end, and only if at least one topic was fetched.
pub async fn sync_category(
    api: &dyn ForumApi,
    cache: &CacheStore,
    slug: &str,
    options: SyncOptions,
) -> SyncReport {
    let mut report = SyncReport {
        category: slug.to_string(),
        ..SyncReport::default()
    };
    let bucket = cache.topic_bucket(slug);

    let summaries = collect_summaries(api, slug, &bucket, &mut report).await;
    report.summaries_seen = summaries.len();

    let mut fetched = TopicBucket::new();
    let mut users = UserMap::new();

    for summary in &summaries {
        if is_current(&bucket, summary) {
            report.topics_current += 1;
            continue;
        }

        let topic = match api.topic(summary.id).await {
            Ok(topic) => topic,
            Err(e) => {
                warn!(category = %slug, topic_id = summary.id, error = %e, "Topic fetch failed, skipping");
                report.topic_failures += 1;
                continue;
            }
        };
        report.topics_fetched += 1;

        if options.harvest_users {
            let harvested = harvest_users(api, cache, &users, &topic).await;
            for (username, user) in harvested {
                users.entry(username).or_insert(user);
            }
        }

        fetched.insert(topic.id, topic);
    }

    report.users_harvested = users.len();
    if !fetched.is_empty() {
        report.commit = cache.commit_topics(slug, fetched, users);
    }

    info!(
        category = %slug,
        pages = report.pages_fetched,
        seen = report.summaries_seen,
        current = report.topics_current,
        fetched = report.topics_fetched,
        failed = report.topic_failures,
        users = report.users_harvested,
        "Category synced"
    );

    report
}

/// Page through the category feed until it runs dry or reaches known ground.
///
/// The feed is ordered by recency, so once the last topic of a page is
/// current in the cache no later page can hold anything newer. Duplicate ids
/// across pages are dropped.
async fn collect_summaries(
    api: &dyn ForumApi,
    slug: &str,
    bucket: &TopicBucket,
    report: &mut SyncReport,
) -> Vec<TopicSummary> {
    let mut summaries = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut page = 0u32;

    loop {
        let topics = match api.category_topics(slug, page).await {
            Ok(listing) => listing.topics,
            Err(e) => {
                warn!(category = %slug, page, error = %e, "Topic page fetch failed, stopping pagination");
                report.page_failed = true;
                break;
            }
        };
        report.pages_fetched += 1;

        let Some(last) = topics.last().cloned() else {
            debug!(category = %slug, page, "Empty topic page, end of feed");
            break;
        };

        let before = summaries.len();
        for summary in topics {
            if seen_ids.insert(summary.id) {
                summaries.push(summary);
            }
        }

        if is_current(bucket, &last) {
            debug!(category = %slug, page, topic_id = last.id, "Reached cached topics, stopping pagination");
            break;
        }
        if summaries.len() == before {
            debug!(category = %slug, page, "Page repeated known topics, stopping pagination");
            break;
        }

        page += 1;
    }

    summaries
}
