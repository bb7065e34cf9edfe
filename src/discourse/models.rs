use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A category as listed by the forum, with one level of children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub slug: String,
    #[serde(default)]
    pub subcategories: Vec<Category>,
}

/// Lightweight entry from a category's topic feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub id: u64,
    pub last_posted_at: Option<DateTime<Utc>>,
}

/// One page of a category's topic feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTopicsPage {
    pub topics: Vec<TopicSummary>,
}

/// A single post within a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// 1-based position in the topic; 1 is the topic's main post.
    pub post_number: u32,
}

/// Full topic content as fetched from `/t/{id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDetail {
    pub id: u64,
    pub category_id: u64,
    #[serde(default)]
    pub title: String,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub posts: Vec<Post>,
    #[serde(default)]
    pub participants: Vec<User>,
}

impl TopicDetail {
    /// The topic's main post: the one numbered 1, else the first listed.
    #[must_use]
    pub fn main_post(&self) -> Option<&Post> {
        self.posts
            .iter()
            .find(|p| p.post_number == 1)
            .or_else(|| self.posts.first())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub primary_group_name: Option<String>,
}

/// One edit of a post. Revision 1 is the original post and never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub number: u32,
    pub created_at: DateTime<Utc>,
    pub editor_username: String,
    pub previous_number: Option<u32>,
    pub next_number: Option<u32>,
    pub first_number: Option<u32>,
}

/// Response of `/c/{id}/show.json`, reduced to what the collector needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: u64,
    pub slug: String,
}
