//! In-memory forum used by the collector integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use discourse_collector::discourse::{
    ApiError, ApiResult, Category, CategorySummary, CategoryTopicsPage, ForumApi, Post, Revision,
    TopicDetail, TopicSummary, User,
};

/// A call made against [`MockForum`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ListCategories,
    CategoryTopics(String, u32),
    Topic(u64),
    User(String),
    ShowCategory(u64),
    RevisionCount(u64),
    LatestRevision(u64),
    Revision(u64, u32),
}

#[derive(Default)]
pub struct MockForum {
    pub categories: Vec<Category>,
    pub fail_categories: bool,
    pub pages: HashMap<String, Vec<Vec<TopicSummary>>>,
    pub failing_pages: HashSet<(String, u32)>,
    pub topics: HashMap<u64, TopicDetail>,
    pub failing_topics: HashSet<u64>,
    pub users: HashMap<String, User>,
    pub category_slugs: HashMap<u64, String>,
    /// Post id -> revisions (number 2 upwards).
    pub revisions: HashMap<u64, Vec<Revision>>,
    pub failing_revisions: HashSet<(u64, u32)>,
    calls: Mutex<Vec<Call>>,
}

impl MockForum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn topic_fetches(&self) -> usize {
        self.count(|c| matches!(c, Call::Topic(_)))
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Add a topic with a feed entry on the given page of `slug`.
    pub fn add_topic(&mut self, slug: &str, page: usize, topic: TopicDetail) {
        let pages = self.pages.entry(slug.to_string()).or_default();
        while pages.len() <= page {
            pages.push(Vec::new());
        }
        pages[page].push(TopicSummary {
            id: topic.id,
            last_posted_at: topic.last_posted_at,
        });
        self.topics.insert(topic.id, topic);
    }

    /// Give `post_id` a linear chain of revisions `2..=latest`.
    pub fn add_revision_chain(&mut self, post_id: u64, latest: u32) {
        let chain = (2..=latest)
            .map(|number| Revision {
                number,
                created_at: day(number),
                editor_username: format!("editor{number}"),
                previous_number: Some(number - 1),
                next_number: (number < latest).then_some(number + 1),
                first_number: Some(2),
            })
            .collect();
        self.revisions.insert(post_id, chain);
    }

    fn revision(&self, post_id: u64, number: u32) -> ApiResult<Revision> {
        if self.failing_revisions.contains(&(post_id, number)) {
            return Err(ApiError::Status {
                url: format!("/posts/{post_id}/revisions/{number}.json"),
                status: 500,
            });
        }
        self.revisions
            .get(&post_id)
            .and_then(|chain| chain.iter().find(|r| r.number == number))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("revision {number} of post {post_id}")))
    }
}

#[async_trait]
impl ForumApi for MockForum {
    async fn list_categories(&self, _include_subcategories: bool) -> ApiResult<Vec<Category>> {
        self.record(Call::ListCategories);
        if self.fail_categories {
            return Err(ApiError::Status {
                url: "/categories.json".to_string(),
                status: 503,
            });
        }
        Ok(self.categories.clone())
    }

    async fn category_topics(&self, slug: &str, page: u32) -> ApiResult<CategoryTopicsPage> {
        self.record(Call::CategoryTopics(slug.to_string(), page));
        if self.failing_pages.contains(&(slug.to_string(), page)) {
            return Err(ApiError::Status {
                url: format!("/c/{slug}.json?page={page}"),
                status: 502,
            });
        }
        let topics = self
            .pages
            .get(slug)
            .and_then(|pages| pages.get(page as usize))
            .cloned()
            .unwrap_or_default();
        Ok(CategoryTopicsPage { topics })
    }

    async fn topic(&self, id: u64) -> ApiResult<TopicDetail> {
        self.record(Call::Topic(id));
        if self.failing_topics.contains(&id) {
            return Err(ApiError::Status {
                url: format!("/t/{id}.json"),
                status: 500,
            });
        }
        self.topics
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("topic {id}")))
    }

    async fn user_by_username(&self, username: &str) -> ApiResult<User> {
        self.record(Call::User(username.to_string()));
        self.users
            .get(username)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {username}")))
    }

    async fn show_category(&self, id: u64) -> ApiResult<CategorySummary> {
        self.record(Call::ShowCategory(id));
        self.category_slugs
            .get(&id)
            .map(|slug| CategorySummary {
                id,
                slug: slug.clone(),
            })
            .ok_or_else(|| ApiError::NotFound(format!("category {id}")))
    }

    async fn post_revision_count(&self, post_id: u64) -> ApiResult<u32> {
        self.record(Call::RevisionCount(post_id));
        Ok(self
            .revisions
            .get(&post_id)
            .and_then(|chain| chain.iter().map(|r| r.number).max())
            .unwrap_or(1))
    }

    async fn latest_post_revision(&self, post_id: u64) -> ApiResult<Revision> {
        self.record(Call::LatestRevision(post_id));
        let latest = self
            .revisions
            .get(&post_id)
            .and_then(|chain| chain.iter().map(|r| r.number).max())
            .ok_or_else(|| ApiError::NotFound(format!("revisions of post {post_id}")))?;
        self.revision(post_id, latest)
    }

    async fn post_revision(&self, post_id: u64, number: u32) -> ApiResult<Revision> {
        self.record(Call::Revision(post_id, number));
        self.revision(post_id, number)
    }
}

pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap()
}

pub fn user(id: i64, username: &str) -> User {
    User {
        id,
        username: username.to_string(),
        name: Some(username.to_uppercase()),
        primary_group_name: None,
    }
}

pub fn post(id: u64, username: &str, post_number: u32) -> Post {
    Post {
        id,
        username: username.to_string(),
        created_at: day(1),
        updated_at: None,
        post_number,
    }
}

/// Topic `id` in category 1 whose main post is `id * 100`, authored by `author`.
pub fn topic(id: u64, last_posted_day: u32, author: &str) -> TopicDetail {
    TopicDetail {
        id,
        category_id: 1,
        title: format!("Topic {id}"),
        last_posted_at: Some(day(last_posted_day)),
        posts: vec![post(id * 100, author, 1)],
        participants: vec![],
    }
}
