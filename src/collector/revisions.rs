//! Edit-history reconstruction by walking a post's revision chain.
//!
//! Discourse links revisions through `previous`/`next`/`first` numbers. The
//! walk starts from the latest revision and follows `previous` links until it
//! reaches the revision marked as the chain's first. Revision 1 is the
//! original post and is never fetched.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::cache::CacheStore;
use crate::discourse::{ApiResult, ForumApi, Revision, TopicDetail};

/// Lowest revision number that exists as an edit record.
pub const FIRST_EDIT_REVISION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Start,
    Next(u32),
    Done,
}

/// Finite, restartable walk over one post's revisions, newest first.
///
/// Each call to [`RevisionWalk::next`] issues at most two API calls. A failed
/// fetch is yielded once and ends the walk.
pub struct RevisionWalk<'a> {
    api: &'a dyn ForumApi,
    post_id: u64,
    state: WalkState,
    seen: HashSet<u32>,
}

impl<'a> RevisionWalk<'a> {
    #[must_use]
    pub fn new(api: &'a dyn ForumApi, post_id: u64) -> Self {
        Self {
            api,
            post_id,
            state: WalkState::Start,
            seen: HashSet::new(),
        }
    }

    #[must_use]
    pub fn post_id(&self) -> u64 {
        self.post_id
    }

    /// Start over from the latest revision.
    pub fn restart(&mut self) {
        self.state = WalkState::Start;
        self.seen.clear();
    }

    /// Fetch the next (older) revision.
    ///
    /// Returns `None` once the chain is exhausted.
    pub async fn next(&mut self) -> Option<ApiResult<Revision>> {
        let fetched = match self.state {
            WalkState::Done => return None,
            WalkState::Start => match self.api.post_revision_count(self.post_id).await {
                Ok(count) if count <= 1 => {
                    self.state = WalkState::Done;
                    return None;
                }
                Ok(_) => self.api.latest_post_revision(self.post_id).await,
                Err(e) => Err(e),
            },
            WalkState::Next(number) => self.api.post_revision(self.post_id, number).await,
        };

        let revision = match fetched {
            Ok(revision) => revision,
            Err(e) => {
                self.state = WalkState::Done;
                return Some(Err(e));
            }
        };

        if revision.number < FIRST_EDIT_REVISION {
            debug!(post_id = self.post_id, number = revision.number, "Ignoring non-edit revision");
            self.state = WalkState::Done;
            return None;
        }

        self.state = self.successor(&revision);
        Some(Ok(revision))
    }

    fn successor(&mut self, revision: &Revision) -> WalkState {
        self.seen.insert(revision.number);

        if revision.first_number == Some(revision.number) {
            return WalkState::Done;
        }

        match revision.previous_number {
            Some(previous) if previous >= FIRST_EDIT_REVISION && !self.seen.contains(&previous) => {
                WalkState::Next(previous)
            }
            previous => {
                debug!(
                    post_id = self.post_id,
                    number = revision.number,
                    previous = ?previous,
                    "Revision chain ends before its first-revision marker"
                );
                WalkState::Done
            }
        }
    }
}

/// Result of reconstructing one topic's edit history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructStats {
    pub revisions_fetched: usize,
    pub revisions_added: usize,
    /// The walk stopped on a fetch failure; whatever was fetched is still committed.
    pub partial: bool,
}

/// Walk the main post's revision chain and merge it into the cache.
pub async fn reconstruct_topic_edits(
    api: &dyn ForumApi,
    cache: &CacheStore,
    topic: &TopicDetail,
) -> ReconstructStats {
    let mut stats = ReconstructStats::default();

    let Some(main_post) = topic.main_post() else {
        debug!(topic_id = topic.id, "Topic has no posts, skipping edit history");
        return stats;
    };

    let mut walk = RevisionWalk::new(api, main_post.id);
    let mut revisions = Vec::new();

    while let Some(next) = walk.next().await {
        match next {
            Ok(revision) => revisions.push(revision),
            Err(e) => {
                warn!(
                    topic_id = topic.id,
                    post_id = main_post.id,
                    fetched = revisions.len(),
                    error = %e,
                    "Revision fetch failed, keeping partial chain"
                );
                stats.partial = true;
                break;
            }
        }
    }

    stats.revisions_fetched = revisions.len();
    if !revisions.is_empty() {
        stats.revisions_added = cache.merge_edits(topic.id, revisions);
    }

    stats
}
