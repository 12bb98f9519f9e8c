use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored newsletter row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored post row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub published_date: DateTime<Utc>,
    pub is_free: bool,
    pub post_id: Option<String>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub newsletter_id: i64,
}

/// A post staged for insertion during an update check.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub published_date: DateTime<Utc>,
    pub is_free: bool,
    pub post_id: Option<String>,
    pub content: Option<String>,
}

/// Plain record describing one newly discovered post.
#[derive(Debug, Clone, Serialize)]
pub struct NewPostRecord {
    pub title: String,
    pub url: String,
    pub published_date: DateTime<Utc>,
    pub is_free: bool,
}

/// Outcome of checking a single newsletter for updates. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringResult {
    pub newsletter_name: String,
    pub newsletter_url: String,
    pub new_posts: Vec<NewPostRecord>,
    pub total_posts_found: usize,
    pub check_time: DateTime<Utc>,
}

/// Aggregated counts for a monitored newsletter.
#[derive(Debug, Clone, Serialize)]
pub struct NewsletterStats {
    pub name: String,
    pub url: String,
    pub total_posts: usize,
    pub free_posts: usize,
    pub paid_posts: usize,
    pub last_updated: DateTime<Utc>,
    pub latest_post: Option<Post>,
}
