//! Read-only access to a Discourse forum.
//!
//! The collector only ever talks to the forum through [`ForumApi`], so the
//! HTTP client can be swapped for a mock in tests.

mod client;
mod models;

pub use client::DiscourseClient;
pub use models::*;

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single forum API call.
///
/// None of these abort a collection cycle on their own; the affected unit
/// (page, topic, user, revision) is logged and skipped.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid forum URL: {0}")]
    InvalidUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The forum operations the collector consumes.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// List top-level categories, optionally with one level of subcategories.
    async fn list_categories(&self, include_subcategories: bool) -> ApiResult<Vec<Category>>;

    /// Fetch one page (0-based) of a category's topic feed.
    ///
    /// `slug` may be a composite `parent/child` path.
    async fn category_topics(&self, slug: &str, page: u32) -> ApiResult<CategoryTopicsPage>;

    async fn topic(&self, id: u64) -> ApiResult<TopicDetail>;

    async fn user_by_username(&self, username: &str) -> ApiResult<User>;

    async fn show_category(&self, id: u64) -> ApiResult<CategorySummary>;

    /// Number of versions of a post, counting the original as version 1.
    async fn post_revision_count(&self, post_id: u64) -> ApiResult<u32>;

    async fn latest_post_revision(&self, post_id: u64) -> ApiResult<Revision>;

    async fn post_revision(&self, post_id: u64, number: u32) -> ApiResult<Revision>;
}
