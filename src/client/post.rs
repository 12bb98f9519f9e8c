use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};

use super::{default_client, Auth, Cache};

/// Post metadata from the single-post-by-slug endpoint. Absent fields
/// default rather than failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct PostMetadata {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub post_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub publication_id: Option<i64>,
}

/// Client for a single post, addressed by its canonical URL.
///
/// Metadata is fetched lazily on first access and cached until an explicit
/// refresh.
pub struct PostClient {
    url: String,
    endpoint: String,
    http: Client,
    authenticated: bool,
    cache: Cache<PostMetadata>,
}

impl PostClient {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_client(url, default_client(), false)
    }

    pub fn with_auth(url: &str, auth: &Auth) -> Result<Self> {
        Self::with_client(url, auth.client().clone(), auth.is_authenticated())
    }

    pub(crate) fn with_client(url: &str, http: Client, authenticated: bool) -> Result<Self> {
        let parsed = Url::parse(url)?;
        let base_url = parsed.origin().ascii_serialization();

        // The slug is the last path segment of a Substack post URL.
        let slug = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            url: url.to_string(),
            endpoint: format!("{}/api/v1/posts/{}", base_url, slug),
            http,
            authenticated,
            cache: Cache::Unloaded,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn metadata(&mut self, force_refresh: bool) -> Result<PostMetadata> {
        if !force_refresh {
            if let Some(data) = self.cache.get() {
                return Ok(data.clone());
            }
        }

        let response = self.http.get(&self.endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Api(format!(
                "GET {} returned {}",
                self.endpoint, status
            )));
        }

        let data: PostMetadata = response.json().await?;
        Ok(self.cache.fill(data).clone())
    }

    pub async fn is_paywalled(&mut self) -> Result<bool> {
        let data = self.metadata(false).await?;
        Ok(data.audience.as_deref() == Some("only_paid"))
    }

    /// The raw post body as served by the API, if any.
    pub async fn body_html(&mut self, force_refresh: bool) -> Result<Option<String>> {
        let data = self.metadata(force_refresh).await?;
        Ok(data.body_html)
    }

    /// The post body as normalized plain text.
    ///
    /// A paywalled post read without authentication has no body; that is
    /// reported as `None` with a logged advisory, not as an error.
    pub async fn content(&mut self, force_refresh: bool) -> Result<Option<String>> {
        let data = self.metadata(force_refresh).await?;

        let Some(html) = data.body_html else {
            if data.audience.as_deref() == Some("only_paid") && !self.authenticated {
                tracing::warn!(
                    "post {} is paywalled; provide authentication to access full content",
                    self.url
                );
            }
            return Ok(None);
        };

        Ok(clean_html(&html))
    }
}

/// Convert HTML to plain text and collapse it to blank-free trimmed lines.
fn clean_html(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), 80) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("failed to convert HTML to text: {}", e);
            return None;
        }
    };

    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn endpoint_is_built_from_the_url_slug() {
        let client = PostClient::new("https://example.substack.com/p/my-first-post").unwrap();
        assert_eq!(
            client.endpoint,
            "https://example.substack.com/api/v1/posts/my-first-post"
        );
    }

    #[tokio::test]
    async fn metadata_is_cached_until_refreshed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/posts/cached"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "title": "Cached post" })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let url = format!("{}/p/cached", server.uri());
        let mut client = PostClient::new(&url).unwrap();

        client.metadata(false).await.unwrap();
        client.metadata(false).await.unwrap();
        // Only the forced refresh reaches the server again.
        client.metadata(true).await.unwrap();
    }

    #[tokio::test]
    async fn paywalled_post_without_auth_has_no_content() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/posts/locked"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "audience": "only_paid" })),
            )
            .mount(&server)
            .await;

        let url = format!("{}/p/locked", server.uri());
        let mut client = PostClient::new(&url).unwrap();

        assert!(client.is_paywalled().await.unwrap());
        assert_eq!(client.content(false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn content_is_normalized_plain_text() {
        let server = MockServer::start().await;

        let body = "<script>var tracked = true;</script><p>First paragraph.</p>\
                    <p></p><p>  Second paragraph.  </p>";
        Mock::given(method("GET"))
            .and(path("/api/v1/posts/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audience": "everyone",
                "body_html": body
            })))
            .mount(&server)
            .await;

        let url = format!("{}/p/plain", server.uri());
        let mut client = PostClient::new(&url).unwrap();

        let content = client.content(false).await.unwrap().unwrap();
        assert!(content.contains("First paragraph."));
        assert!(content.contains("Second paragraph."));
        assert!(!content.contains("tracked"));
        assert!(!content.contains("\n\n"));
    }
}
