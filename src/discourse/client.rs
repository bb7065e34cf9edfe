//! `reqwest` implementation of [`ForumApi`] against the public Discourse JSON API.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use super::{
    ApiError, ApiResult, Category, CategorySummary, CategoryTopicsPage, ForumApi, Post, Revision,
    TopicDetail, TopicSummary, User,
};
use crate::constants::COLLECTOR_USER_AGENT;
use crate::rate_limiter::RateLimiter;

/// Discourse serves at most this many posts per `/t/{id}/posts.json` request.
const POST_CHUNK_SIZE: usize = 20;

/// Anonymous Discourse client. Every HTTP request waits on the shared
/// [`RateLimiter`] before it is sent.
#[derive(Debug, Clone)]
pub struct DiscourseClient {
    client: Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
}

impl DiscourseClient {
    /// Create a client for the forum at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be used as a base or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration, limiter: Arc<RateLimiter>) -> ApiResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(COLLECTOR_USER_AGENT)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            client,
            base_url,
            limiter,
        })
    }

    /// Build an endpoint URL below the base path. Segments are percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        self.limiter.acquire().await;
        trace!(url = %url, "GET");

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetch posts listed in the topic's stream but not embedded in the first response.
    async fn fetch_remaining_posts(&self, topic_id: u64, missing: &[u64]) -> ApiResult<Vec<Post>> {
        let topic_segment = topic_id.to_string();
        let mut posts = Vec::with_capacity(missing.len());

        for chunk in missing.chunks(POST_CHUNK_SIZE) {
            let mut url = self.endpoint(["t", topic_segment.as_str(), "posts.json"]);
            {
                let mut query = url.query_pairs_mut();
                for id in chunk {
                    query.append_pair("post_ids[]", &id.to_string());
                }
            }
            let batch: WirePostsResponse = self.get_json(url).await?;
            posts.extend(batch.post_stream.posts.into_iter().map(WirePost::into_post));
        }

        Ok(posts)
    }
}

#[async_trait]
impl ForumApi for DiscourseClient {
    async fn list_categories(&self, include_subcategories: bool) -> ApiResult<Vec<Category>> {
        let mut url = self.endpoint(["categories.json"]);
        if include_subcategories {
            url.query_pairs_mut()
                .append_pair("include_subcategories", "true");
        }
        let response: WireCategoriesResponse = self.get_json(url).await?;
        Ok(response
            .category_list
            .categories
            .into_iter()
            .map(WireCategory::into_category)
            .collect())
    }

    async fn category_topics(&self, slug: &str, page: u32) -> ApiResult<CategoryTopicsPage> {
        let (parents, leaf) = slug.rsplit_once('/').unwrap_or(("", slug));
        let leaf = format!("{leaf}.json");
        let mut url = self.endpoint(
            std::iter::once("c")
                .chain(parents.split('/').filter(|s| !s.is_empty()))
                .chain(std::iter::once(leaf.as_str())),
        );
        url.query_pairs_mut().append_pair("page", &page.to_string());

        let response: WireCategoryTopicsResponse = self.get_json(url).await?;
        Ok(CategoryTopicsPage {
            topics: response
                .topic_list
                .topics
                .into_iter()
                .map(|t| TopicSummary {
                    id: t.id,
                    last_posted_at: t.last_posted_at,
                })
                .collect(),
        })
    }

    async fn topic(&self, id: u64) -> ApiResult<TopicDetail> {
        let url = self.endpoint(["t", format!("{id}.json").as_str()]);
        let response: WireTopicResponse = self.get_json(url).await?;

        let mut posts: Vec<Post> = response
            .post_stream
            .posts
            .into_iter()
            .map(WirePost::into_post)
            .collect();

        let loaded: HashSet<u64> = posts.iter().map(|p| p.id).collect();
        let missing: Vec<u64> = response
            .post_stream
            .stream
            .into_iter()
            .filter(|post_id| !loaded.contains(post_id))
            .collect();
        if !missing.is_empty() {
            debug!(topic_id = id, missing = missing.len(), "Fetching remaining posts");
            posts.extend(self.fetch_remaining_posts(id, &missing).await?);
            posts.sort_by_key(|p| p.post_number);
        }

        Ok(TopicDetail {
            id: response.id,
            category_id: response.category_id,
            title: response.title,
            last_posted_at: response.last_posted_at,
            posts,
            participants: response
                .details
                .participants
                .into_iter()
                .map(WireUser::into_user)
                .collect(),
        })
    }

    async fn user_by_username(&self, username: &str) -> ApiResult<User> {
        let file = format!("{username}.json");
        let url = self.endpoint(["u", file.as_str()]);
        let response: WireUserResponse = self.get_json(url).await?;
        Ok(response.user.into_user())
    }

    async fn show_category(&self, id: u64) -> ApiResult<CategorySummary> {
        let id_segment = id.to_string();
        let url = self.endpoint(["c", id_segment.as_str(), "show.json"]);
        let response: WireShowCategoryResponse = self.get_json(url).await?;
        Ok(CategorySummary {
            id: response.category.id,
            slug: response.category.slug,
        })
    }

    async fn post_revision_count(&self, post_id: u64) -> ApiResult<u32> {
        let url = self.endpoint(["posts", format!("{post_id}.json").as_str()]);
        let response: WirePostVersion = self.get_json(url).await?;
        Ok(response.version)
    }

    async fn latest_post_revision(&self, post_id: u64) -> ApiResult<Revision> {
        let post_segment = post_id.to_string();
        let url = self.endpoint(["posts", post_segment.as_str(), "revisions", "latest.json"]);
        let response: WireRevision = self.get_json(url).await?;
        Ok(response.into_revision())
    }

    async fn post_revision(&self, post_id: u64, number: u32) -> ApiResult<Revision> {
        let post_segment = post_id.to_string();
        let file = format!("{number}.json");
        let url = self.endpoint(["posts", post_segment.as_str(), "revisions", file.as_str()]);
        let response: WireRevision = self.get_json(url).await?;
        Ok(response.into_revision())
    }
}

// Wire types: the subset of each Discourse response the collector reads.

#[derive(Debug, Deserialize)]
struct WireCategoriesResponse {
    category_list: WireCategoryList,
}

#[derive(Debug, Deserialize)]
struct WireCategoryList {
    #[serde(default)]
    categories: Vec<WireCategory>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    id: u64,
    slug: String,
    #[serde(default)]
    subcategory_list: Vec<WireCategory>,
}

impl WireCategory {
    fn into_category(self) -> Category {
        Category {
            id: self.id,
            slug: self.slug,
            subcategories: self
                .subcategory_list
                .into_iter()
                .map(Self::into_category)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCategoryTopicsResponse {
    topic_list: WireTopicList,
}

#[derive(Debug, Deserialize)]
struct WireTopicList {
    #[serde(default)]
    topics: Vec<WireTopicSummary>,
}

#[derive(Debug, Deserialize)]
struct WireTopicSummary {
    id: u64,
    last_posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireTopicResponse {
    id: u64,
    category_id: u64,
    #[serde(default)]
    title: String,
    last_posted_at: Option<DateTime<Utc>>,
    post_stream: WirePostStream,
    #[serde(default)]
    details: WireTopicDetails,
}

#[derive(Debug, Deserialize)]
struct WirePostStream {
    #[serde(default)]
    posts: Vec<WirePost>,
    #[serde(default)]
    stream: Vec<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WireTopicDetails {
    #[serde(default)]
    participants: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WirePostsResponse {
    post_stream: WirePostStream,
}

#[derive(Debug, Deserialize)]
struct WirePost {
    id: u64,
    /// Null for posts whose author account was deleted.
    #[serde(default)]
    username: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    post_number: u32,
}

impl WirePost {
    fn into_post(self) -> Post {
        Post {
            id: self.id,
            username: self.username.unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            post_number: self.post_number,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireUserResponse {
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    username: String,
    name: Option<String>,
    primary_group_name: Option<String>,
}

impl WireUser {
    fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            name: self.name.filter(|n| !n.is_empty()),
            primary_group_name: self.primary_group_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireShowCategoryResponse {
    category: WireCategorySummary,
}

#[derive(Debug, Deserialize)]
struct WireCategorySummary {
    id: u64,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct WirePostVersion {
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct WireRevision {
    created_at: DateTime<Utc>,
    username: String,
    current_revision: u32,
    previous_revision: Option<u32>,
    next_revision: Option<u32>,
    first_revision: Option<u32>,
}

impl WireRevision {
    fn into_revision(self) -> Revision {
        Revision {
            number: self.current_revision,
            created_at: self.created_at,
            editor_username: self.username,
            previous_number: self.previous_revision,
            next_number: self.next_revision,
            first_number: self.first_revision,
        }
    }
}
