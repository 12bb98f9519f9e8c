use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};

use super::{default_client, Cache, NewsletterClient, SUBSTACK_BASE_URL};

/// The member-publications endpoint never serves more than 21 pages; stop
/// there no matter what the server's `more` flag claims.
const MAX_CATEGORY_PAGES: usize = 21;

/// One entry from the category listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub id: i64,
}

/// A publication as listed under a category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPublication {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryPage {
    publications: Vec<CategoryPublication>,
    #[serde(default)]
    more: bool,
}

/// All top-level categories as (name, id) pairs.
pub async fn list_all_categories() -> Result<Vec<CategoryEntry>> {
    list_categories_at(SUBSTACK_BASE_URL, &default_client()).await
}

async fn list_categories_at(base_url: &str, http: &Client) -> Result<Vec<CategoryEntry>> {
    let endpoint = format!("{}/api/v1/categories", base_url);
    let response = http.get(&endpoint).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Api(format!(
            "GET {} returned {}",
            endpoint, status
        )));
    }

    Ok(response.json().await?)
}

/// A top-level newsletter category, resolved by name or id against the
/// category listing at construction time.
pub struct Category {
    name: String,
    id: i64,
    base_url: String,
    http: Client,
    cache: Cache<Vec<CategoryPublication>>,
}

impl Category {
    pub async fn by_name(name: &str) -> Result<Self> {
        Self::resolve_at(SUBSTACK_BASE_URL, Some(name), None).await
    }

    pub async fn by_id(id: i64) -> Result<Self> {
        Self::resolve_at(SUBSTACK_BASE_URL, None, Some(id)).await
    }

    async fn resolve_at(base_url: &str, name: Option<&str>, id: Option<i64>) -> Result<Self> {
        let http = default_client();
        let categories = list_categories_at(base_url, &http).await?;

        let entry = match (name, id) {
            (Some(name), _) => categories
                .into_iter()
                .find(|c| c.name == name)
                .ok_or_else(|| AppError::NotFound(format!("category name '{}' not found", name)))?,
            (None, Some(id)) => categories
                .into_iter()
                .find(|c| c.id == id)
                .ok_or_else(|| AppError::NotFound(format!("category ID {} not found", id)))?,
            (None, None) => {
                return Err(AppError::NotFound(
                    "either a category name or an id must be provided".to_string(),
                ))
            }
        };

        Ok(Self {
            name: entry.name,
            id: entry.id,
            base_url: base_url.to_string(),
            http,
            cache: Cache::Unloaded,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    async fn fetch_newsletters_data(
        &mut self,
        force_refresh: bool,
    ) -> Result<Vec<CategoryPublication>> {
        if !force_refresh {
            if let Some(data) = self.cache.get() {
                return Ok(data.clone());
            }
        }

        let endpoint = format!("{}/api/v1/category/public/{}/all", self.base_url, self.id);
        let mut all_publications = Vec::new();
        let mut page_num = 0usize;

        loop {
            let response = self
                .http
                .get(&endpoint)
                .query(&[("page", page_num.to_string())])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Api(format!(
                    "GET {} page {} returned {}",
                    endpoint, page_num, status
                )));
            }

            let page: CategoryPage = response.json().await?;
            all_publications.extend(page.publications);
            page_num += 1;

            if !page.more || page_num >= MAX_CATEGORY_PAGES {
                break;
            }
        }

        Ok(self.cache.fill(all_publications).clone())
    }

    /// Full metadata for the category's member publications.
    pub async fn newsletter_metadata(&mut self) -> Result<Vec<CategoryPublication>> {
        self.fetch_newsletters_data(false).await
    }

    /// Just the member publication URLs.
    pub async fn newsletter_urls(&mut self) -> Result<Vec<String>> {
        let data = self.fetch_newsletters_data(false).await?;
        Ok(data.into_iter().map(|p| p.base_url).collect())
    }

    /// Clients for every member publication.
    pub async fn newsletters(&mut self) -> Result<Vec<NewsletterClient>> {
        let urls = self.newsletter_urls().await?;
        Ok(urls.into_iter().map(NewsletterClient::new).collect())
    }

    /// Drop the cached member list and refetch it.
    pub async fn refresh(&mut self) -> Result<()> {
        self.fetch_newsletters_data(true).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn mount_categories(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "Technology", "id": 4 },
                { "name": "Culture", "id": 96 }
            ])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn resolves_id_from_name_and_name_from_id() {
        let server = MockServer::start().await;
        mount_categories(&server).await;

        let by_name = Category::resolve_at(&server.uri(), Some("Technology"), None)
            .await
            .unwrap();
        assert_eq!(by_name.id(), 4);

        let by_id = Category::resolve_at(&server.uri(), None, Some(96))
            .await
            .unwrap();
        assert_eq!(by_id.name(), "Culture");
    }

    #[tokio::test]
    async fn unknown_category_name_is_not_found() {
        let server = MockServer::start().await;
        mount_categories(&server).await;

        let result = Category::resolve_at(&server.uri(), Some("Gardening"), None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn member_pagination_stops_at_the_page_cap() {
        let server = MockServer::start().await;
        mount_categories(&server).await;

        // A server that always claims there is more.
        Mock::given(method("GET"))
            .and(path("/api/v1/category/public/4/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "publications": [
                    { "id": 1, "name": "One", "base_url": "https://one.substack.com" },
                    { "id": 2, "name": "Two", "base_url": "https://two.substack.com" }
                ],
                "more": true
            })))
            .expect(21)
            .mount(&server)
            .await;

        let mut category = Category::resolve_at(&server.uri(), Some("Technology"), None)
            .await
            .unwrap();

        let urls = category.newsletter_urls().await.unwrap();
        assert_eq!(urls.len(), 21 * 2);

        // Second read comes from the cache; the expect(21) above verifies it.
        let again = category.newsletter_urls().await.unwrap();
        assert_eq!(again.len(), 42);
    }

    #[tokio::test]
    async fn short_member_listing_stops_on_more_flag() {
        let server = MockServer::start().await;
        mount_categories(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/category/public/96/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "publications": [
                    { "id": 3, "name": "Three", "base_url": "https://three.substack.com" }
                ],
                "more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut category = Category::resolve_at(&server.uri(), None, Some(96))
            .await
            .unwrap();

        let urls = category.newsletter_urls().await.unwrap();
        assert_eq!(urls, vec!["https://three.substack.com"]);
    }
}
