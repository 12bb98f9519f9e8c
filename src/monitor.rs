use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::client::{Auth, NewsletterClient};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{MonitoringResult, NewPost, NewPostRecord, Newsletter, NewsletterStats};

/// How many recent posts an update check pulls from the archive.
const CHECK_FETCH_LIMIT: usize = 50;

/// Watches registered newsletters and persists discovered posts, so each
/// check can report what is new since the last one.
pub struct Monitor {
    repository: Repository,
    auth: Option<Arc<Auth>>,
}

impl Monitor {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            auth: None,
        }
    }

    /// Monitor with an authenticated session, so paywalled posts are visible
    /// when the cookies grant access.
    pub fn with_auth(repository: Repository, auth: Arc<Auth>) -> Self {
        Self {
            repository,
            auth: Some(auth),
        }
    }

    fn client_for(&self, url: &str) -> NewsletterClient {
        match &self.auth {
            Some(auth) => NewsletterClient::with_auth(url, auth),
            None => NewsletterClient::new(url),
        }
    }

    /// Register a newsletter for monitoring. Idempotent: an already
    /// registered URL returns its existing row unchanged.
    pub async fn add_newsletter(&self, url: &str, name: Option<&str>) -> Result<Newsletter> {
        if let Some(existing) = self.repository.newsletter_by_url(url).await? {
            return Ok(existing);
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => self.client_for(url).display_name(),
        };

        self.repository
            .insert_newsletter(url.to_string(), name.clone(), None, None)
            .await?;
        tracing::info!("registered newsletter {} ({})", name, url);

        self.repository
            .newsletter_by_url(url)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("newsletter {} missing after insert", url)))
    }

    /// Check one newsletter for posts that are not yet stored.
    ///
    /// Fetches up to 50 recent archive records, stages every record whose URL
    /// is absent from the store, commits the batch in one transaction, and
    /// refreshes the newsletter's `updated_at` whether or not anything was
    /// new. A fetch failure aborts the whole check.
    pub async fn check_newsletter_updates(&self, url: &str) -> Result<MonitoringResult> {
        let newsletter = self
            .repository
            .newsletter_by_url(url)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("newsletter {} is not registered; add it first", url))
            })?;

        let existing_urls = self.repository.post_urls(newsletter.id).await?;

        let client = self.client_for(url);
        let fetched = client
            .recent_posts(CHECK_FETCH_LIMIT)
            .await
            .map_err(|e| AppError::CheckFailed {
                url: url.to_string(),
                source: Box::new(e),
            })?;
        let total_posts_found = fetched.len();

        let mut staged: Vec<NewPost> = Vec::new();
        let mut staged_urls: HashSet<String> = HashSet::new();

        for record in fetched {
            let post_url = record.canonical_url.clone();
            if post_url.is_empty()
                || existing_urls.contains(&post_url)
                || staged_urls.contains(&post_url)
            {
                continue;
            }
            staged_urls.insert(post_url.clone());

            staged.push(NewPost {
                url: post_url,
                title: record.title.clone().unwrap_or_default(),
                subtitle: record.subtitle.clone(),
                published_date: record.post_date.unwrap_or_else(Utc::now),
                is_free: record.is_free(),
                post_id: record.id.map(|id| id.to_string()),
                content: None,
            });
        }

        let new_posts: Vec<NewPostRecord> = staged
            .iter()
            .map(|post| NewPostRecord {
                title: post.title.clone(),
                url: post.url.clone(),
                published_date: post.published_date,
                is_free: post.is_free,
            })
            .collect();

        if !staged.is_empty() {
            self.repository.insert_posts(newsletter.id, staged).await?;
        }
        self.repository.touch_newsletter(newsletter.id).await?;

        tracing::info!(
            "checked {}: {} new of {} fetched",
            newsletter.name,
            new_posts.len(),
            total_posts_found
        );

        Ok(MonitoringResult {
            newsletter_name: newsletter.name,
            newsletter_url: newsletter.url,
            new_posts,
            total_posts_found,
            check_time: Utc::now(),
        })
    }

    /// Check every registered newsletter in sequence. A failing newsletter is
    /// logged and reported as a zero-post result; the rest still run.
    pub async fn check_all_newsletters(&self) -> Result<Vec<MonitoringResult>> {
        let newsletters = self.repository.all_newsletters().await?;
        let mut results = Vec::with_capacity(newsletters.len());

        for newsletter in newsletters {
            match self.check_newsletter_updates(&newsletter.url).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!("error checking {}: {}", newsletter.name, e);
                    results.push(MonitoringResult {
                        newsletter_name: newsletter.name,
                        newsletter_url: newsletter.url,
                        new_posts: Vec::new(),
                        total_posts_found: 0,
                        check_time: Utc::now(),
                    });
                }
            }
        }

        Ok(results)
    }

    /// Aggregate stored-post counts for a newsletter; `None` if unregistered.
    pub async fn get_newsletter_stats(&self, url: &str) -> Result<Option<NewsletterStats>> {
        let Some(newsletter) = self.repository.newsletter_by_url(url).await? else {
            return Ok(None);
        };

        let posts = self.repository.posts_for_newsletter(newsletter.id).await?;
        let free_posts = posts.iter().filter(|p| p.is_free).count();
        let paid_posts = posts.len() - free_posts;
        let latest_post = posts.iter().max_by_key(|p| p.published_date).cloned();

        Ok(Some(NewsletterStats {
            name: newsletter.name,
            url: newsletter.url,
            total_posts: posts.len(),
            free_posts,
            paid_posts,
            last_updated: newsletter.updated_at,
            latest_post,
        }))
    }
}
