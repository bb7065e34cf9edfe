//! Participant harvesting for fetched topics.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::cache::{CacheStore, UserMap};
use crate::discourse::{ForumApi, TopicDetail};

/// Collect the users involved in `topic`.
///
/// Participants listed by the topic seed the result. Post authors that are in
/// none of the cache, `known` (users this worker already harvested) or the
/// result so far are looked up one by one; a failed lookup is logged and the
/// user is skipped.
///
/// Nothing is written to the cache here; the caller merges the returned map
/// when it commits.
pub async fn harvest_users(
    api: &dyn ForumApi,
    cache: &CacheStore,
    known: &UserMap,
    topic: &TopicDetail,
) -> UserMap {
    let mut local: UserMap = topic
        .participants
        .iter()
        .map(|user| (user.username.clone(), user.clone()))
        .collect();
    let mut failed: HashSet<&str> = HashSet::new();

    for post in &topic.posts {
        let username = post.username.as_str();
        if username.is_empty()
            || local.contains_key(username)
            || known.contains_key(username)
            || failed.contains(username)
            || cache.has_user(username)
        {
            continue;
        }

        match api.user_by_username(username).await {
            Ok(user) => {
                debug!(topic_id = topic.id, username, "Resolved post author");
                local.insert(username.to_string(), user);
            }
            Err(e) if e.is_not_found() => {
                debug!(topic_id = topic.id, username, "User no longer exists, skipping");
                failed.insert(username);
            }
            Err(e) => {
                warn!(topic_id = topic.id, username, error = %e, "User lookup failed, skipping");
                failed.insert(username);
            }
        }
    }

    local
}
