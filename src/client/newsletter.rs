use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};

use super::{default_client, Auth, PostClient, UserClient, SUBSTACK_DOMAIN};

/// The archive endpoint's default page length.
const PAGE_SIZE: usize = 15;

/// Fixed delay between archive pages to bound the request rate.
const PAGE_DELAY: Duration = Duration::from_millis(500);

/// Archive sort order accepted by the Substack API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    New,
    Top,
    Pinned,
    Community,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::New => "new",
            SortOrder::Top => "top",
            SortOrder::Pinned => "pinned",
            SortOrder::Community => "community",
        }
    }
}

/// One post record as returned by the archive endpoint. Fields the server
/// omits fall back to their defaults instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchivePost {
    #[serde(default)]
    pub id: Option<i64>,
    pub canonical_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub post_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl ArchivePost {
    /// A post is paid only when the API explicitly marks it paywalled.
    pub fn is_free(&self) -> bool {
        !matches!(self.audience.as_deref(), Some("only_paid"))
    }
}

#[derive(Debug, Deserialize)]
struct RankedAuthor {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct Recommendation {
    #[serde(rename = "recommendedPublication")]
    recommended_publication: RecommendedPublication,
}

#[derive(Debug, Deserialize)]
struct RecommendedPublication {
    subdomain: String,
    #[serde(default)]
    custom_domain: Option<String>,
}

impl RecommendedPublication {
    fn url(&self) -> String {
        match self.custom_domain.as_deref() {
            Some(domain) if !domain.is_empty() => format!("https://{}", domain),
            _ => format!("https://{}.{}", self.subdomain, SUBSTACK_DOMAIN),
        }
    }
}

/// Client for a single Substack publication.
pub struct NewsletterClient {
    url: String,
    http: Client,
    authenticated: bool,
}

impl NewsletterClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: normalize_url(url.into()),
            http: default_client(),
            authenticated: false,
        }
    }

    /// Build a client that reuses an authenticated session, so paywalled
    /// archive entries are visible when the cookies grant access.
    pub fn with_auth(url: impl Into<String>, auth: &Auth) -> Self {
        Self {
            url: normalize_url(url.into()),
            http: auth.client().clone(),
            authenticated: auth.is_authenticated(),
        }
    }

    fn like(&self, url: String) -> Self {
        Self {
            url: normalize_url(url),
            http: self.http.clone(),
            authenticated: self.authenticated,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Best-effort display name: the first label of the publication's host.
    pub fn display_name(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .host_str()
                    .and_then(|host| host.split('.').next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.url.clone())
    }

    /// Walk the archive endpoint page by page, collecting records in server
    /// order. Stops on an empty page, a short page, or once `limit` records
    /// have been collected (truncating to exactly `limit`). Any non-2xx
    /// response aborts the whole fetch; there is no partial result.
    async fn fetch_paginated_posts(
        &self,
        params: &[(&str, &str)],
        limit: Option<usize>,
        page_size: usize,
    ) -> Result<Vec<ArchivePost>> {
        let endpoint = format!("{}/api/v1/archive", self.url);
        let mut results: Vec<ArchivePost> = Vec::new();
        let mut offset = 0usize;

        loop {
            let response = self
                .http
                .get(&endpoint)
                .query(params)
                .query(&[
                    ("offset", offset.to_string()),
                    ("limit", page_size.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Api(format!(
                    "GET {} returned {}",
                    endpoint, status
                )));
            }

            let items: Vec<ArchivePost> = response.json().await?;
            if items.is_empty() {
                break;
            }

            let page_len = items.len();
            results.extend(items);
            offset += page_size;

            if let Some(limit) = limit {
                if results.len() >= limit {
                    results.truncate(limit);
                    break;
                }
            }

            if page_len < page_size {
                break;
            }

            // Be nice to the API between pages.
            tokio::time::sleep(PAGE_DELAY).await;
        }

        Ok(results)
    }

    /// The newest posts as raw archive records, up to `limit`.
    pub async fn recent_posts(&self, limit: usize) -> Result<Vec<ArchivePost>> {
        self.fetch_paginated_posts(&[("sort", SortOrder::New.as_str())], Some(limit), PAGE_SIZE)
            .await
    }

    /// Posts in the requested order, as lazily loading post clients.
    pub async fn posts(&self, sort: SortOrder, limit: Option<usize>) -> Result<Vec<PostClient>> {
        let records = self
            .fetch_paginated_posts(&[("sort", sort.as_str())], limit, PAGE_SIZE)
            .await?;
        self.into_post_clients(records)
    }

    /// Posts matching a search query, newest first.
    pub async fn search_posts(&self, query: &str, limit: Option<usize>) -> Result<Vec<PostClient>> {
        let records = self
            .fetch_paginated_posts(
                &[("sort", SortOrder::New.as_str()), ("search", query)],
                limit,
                PAGE_SIZE,
            )
            .await?;
        self.into_post_clients(records)
    }

    /// Podcast episodes, newest first.
    pub async fn podcasts(&self, limit: Option<usize>) -> Result<Vec<PostClient>> {
        let records = self
            .fetch_paginated_posts(
                &[("sort", SortOrder::New.as_str()), ("type", "podcast")],
                limit,
                PAGE_SIZE,
            )
            .await?;
        self.into_post_clients(records)
    }

    fn into_post_clients(&self, records: Vec<ArchivePost>) -> Result<Vec<PostClient>> {
        records
            .into_iter()
            .map(|record| {
                PostClient::with_client(
                    &record.canonical_url,
                    self.http.clone(),
                    self.authenticated,
                )
            })
            .collect()
    }

    /// The publication's ranked public authors.
    pub async fn authors(&self) -> Result<Vec<UserClient>> {
        let endpoint = format!("{}/api/v1/publication/users/ranked", self.url);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("public", "true")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Api(format!(
                "GET {} returned {}",
                endpoint, status
            )));
        }

        let authors: Vec<RankedAuthor> = response.json().await?;
        Ok(authors
            .into_iter()
            .map(|author| UserClient::new(author.handle))
            .collect())
    }

    /// Publications this newsletter recommends. The publication id comes from
    /// the newest post's metadata, so a newsletter with no posts recommends
    /// nothing.
    pub async fn recommendations(&self) -> Result<Vec<NewsletterClient>> {
        let mut posts = self.posts(SortOrder::New, Some(1)).await?;
        let Some(first) = posts.first_mut() else {
            return Ok(Vec::new());
        };

        let metadata = first.metadata(false).await?;
        let Some(publication_id) = metadata.publication_id else {
            return Ok(Vec::new());
        };

        let endpoint = format!(
            "{}/api/v1/recommendations/from/{}",
            self.url, publication_id
        );
        let response = self.http.get(&endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Api(format!(
                "GET {} returned {}",
                endpoint, status
            )));
        }

        let recommendations: Vec<Recommendation> = response.json().await?;
        Ok(recommendations
            .into_iter()
            .map(|rec| self.like(rec.recommended_publication.url()))
            .collect())
    }
}

fn normalize_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
