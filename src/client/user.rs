use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{AppError, Result};

use super::{default_client, Cache, SUBSTACK_BASE_URL, SUBSTACK_DOMAIN};

/// Public profile data for a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub profile_set_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub publication: PublicationRef,
    #[serde(default)]
    pub membership_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicationRef {
    pub id: i64,
    pub name: String,
    pub subdomain: String,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

/// A publication the user subscribes to, with its resolved domain.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    pub publication_id: i64,
    pub publication_name: String,
    pub domain: String,
    pub membership_state: Option<String>,
}

/// Resolve a possibly renamed handle by following the public profile page
/// through HTTP redirects and reading the handle off the final URL path.
///
/// Returns `None` when there is no redirect, the handle is unchanged, or the
/// request fails; resolution errors never propagate.
pub async fn resolve_handle_redirect(handle: &str) -> Option<String> {
    resolve_handle_redirect_at(SUBSTACK_BASE_URL, handle, &default_client()).await
}

async fn resolve_handle_redirect_at(
    base_url: &str,
    handle: &str,
    http: &Client,
) -> Option<String> {
    let url = format!("{}/@{}", base_url, handle);
    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("error resolving handle redirect for {}: {}", handle, e);
            return None;
        }
    };

    if !response.status().is_success() {
        return None;
    }

    let final_url = response.url().clone();
    let first_segment = final_url.path_segments()?.find(|s| !s.is_empty())?;
    let new_handle = first_segment.strip_prefix('@')?;

    if !new_handle.is_empty() && new_handle != handle {
        tracing::info!("handle redirect detected: {} -> {}", handle, new_handle);
        Some(new_handle.to_string())
    } else {
        None
    }
}

/// Client for a user's public profile, addressed by handle.
///
/// Handles are subject to renaming. A "not found" response triggers at most
/// one redirect-resolution pass per instance; a second failure propagates.
pub struct UserClient {
    handle: String,
    original_handle: String,
    base_url: String,
    follow_redirects: bool,
    redirect_attempted: bool,
    http: Client,
    cache: Cache<UserProfile>,
}

impl UserClient {
    pub fn new(handle: impl Into<String>) -> Self {
        Self::with_base(handle, SUBSTACK_BASE_URL)
    }

    fn with_base(handle: impl Into<String>, base_url: impl Into<String>) -> Self {
        let handle = handle.into();
        Self {
            original_handle: handle.clone(),
            handle,
            base_url: base_url.into(),
            follow_redirects: true,
            redirect_attempted: false,
            http: default_client(),
            cache: Cache::Unloaded,
        }
    }

    /// Disable the redirect-resolution pass; a renamed handle then surfaces
    /// as a plain not-found error.
    pub fn follow_redirects(mut self, enabled: bool) -> Self {
        self.follow_redirects = enabled;
        self
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// True once a redirect resolution has replaced the original handle.
    pub fn was_redirected(&self) -> bool {
        self.handle != self.original_handle
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/user/{}/public_profile",
            self.base_url, self.handle
        )
    }

    pub async fn profile(&mut self, force_refresh: bool) -> Result<UserProfile> {
        if !force_refresh {
            if let Some(data) = self.cache.get() {
                return Ok(data.clone());
            }
        }

        let endpoint = self.endpoint();
        let response = self.http.get(&endpoint).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND && self.follow_redirects && !self.redirect_attempted {
            // One pass per instance, even if the retry fails too.
            self.redirect_attempted = true;

            if let Some(new_handle) =
                resolve_handle_redirect_at(&self.base_url, &self.handle, &self.http).await
            {
                self.handle = new_handle;
                return self.fetch_once().await;
            }

            tracing::debug!(
                "no redirect found for {}, user may be deleted",
                self.handle
            );
        }

        if !status.is_success() {
            return Err(AppError::Api(format!(
                "GET {} returned {}",
                endpoint, status
            )));
        }

        let data: UserProfile = response.json().await?;
        Ok(self.cache.fill(data).clone())
    }

    async fn fetch_once(&mut self) -> Result<UserProfile> {
        let endpoint = self.endpoint();
        let response = self.http.get(&endpoint).send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::error!(
                "failed to fetch user data even after redirect to {}",
                self.handle
            );
            return Err(AppError::Api(format!(
                "GET {} returned {}",
                endpoint, status
            )));
        }

        let data: UserProfile = response.json().await?;
        Ok(self.cache.fill(data).clone())
    }

    /// Newsletters the user subscribes to.
    pub async fn subscriptions(&mut self) -> Result<Vec<SubscriptionInfo>> {
        let profile = self.profile(false).await?;

        Ok(profile
            .subscriptions
            .into_iter()
            .map(|sub| {
                let publication = sub.publication;
                let domain = publication
                    .custom_domain
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| {
                        format!("{}.{}", publication.subdomain, SUBSTACK_DOMAIN)
                    });
                SubscriptionInfo {
                    publication_id: publication.id,
                    publication_name: publication.name,
                    domain,
                    membership_state: sub.membership_state,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn profile_json() -> serde_json::Value {
        json!({ "id": 42, "name": "Renamed Writer" })
    }

    #[tokio::test]
    async fn renamed_handle_is_resolved_and_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/old/public_profile"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/@old"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/@new", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/@new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/new/public_profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_json()))
            .mount(&server)
            .await;

        let mut user = UserClient::with_base("old", server.uri());
        let profile = user.profile(false).await.unwrap();

        assert_eq!(profile.name, "Renamed Writer");
        assert_eq!(user.handle(), "new");
        assert!(user.was_redirected());
    }

    #[tokio::test]
    async fn redirect_resolution_runs_at_most_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/old/public_profile"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        // Resolution succeeds, but the new handle is missing too.
        Mock::given(method("GET"))
            .and(path("/@old"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/@new", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/@new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/new/public_profile"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut user = UserClient::with_base("old", server.uri());
        assert!(user.profile(false).await.is_err());

        // A later call must fail directly instead of resolving again.
        assert!(user.profile(false).await.is_err());
    }

    #[tokio::test]
    async fn missing_user_without_redirect_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/gone/public_profile"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        // Profile page 404s as well: no redirect to follow.
        Mock::given(method("GET"))
            .and(path("/@gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut user = UserClient::with_base("gone", server.uri());
        let result = user.profile(false).await;

        assert!(matches!(result, Err(AppError::Api(_))));
        assert!(!user.was_redirected());
    }

    #[tokio::test]
    async fn subscriptions_resolve_custom_domains() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/reader/public_profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7,
                "name": "Reader",
                "subscriptions": [
                    {
                        "publication": {
                            "id": 1,
                            "name": "Custom",
                            "subdomain": "custom",
                            "custom_domain": "news.example.org"
                        },
                        "membership_state": "subscribed"
                    },
                    {
                        "publication": {
                            "id": 2,
                            "name": "Plain",
                            "subdomain": "plain"
                        }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let mut user = UserClient::with_base("reader", server.uri());
        let subs = user.subscriptions().await.unwrap();

        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].domain, "news.example.org");
        assert_eq!(subs[1].domain, "plain.substack.com");
    }
}
