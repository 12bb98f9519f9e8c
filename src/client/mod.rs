use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;

mod auth;
mod category;
mod newsletter;
mod post;
mod user;

pub use auth::Auth;
pub use category::{list_all_categories, Category, CategoryEntry, CategoryPublication};
pub use newsletter::{ArchivePost, NewsletterClient, SortOrder};
pub use post::{PostClient, PostMetadata};
pub use user::{
    resolve_handle_redirect, PublicationRef, Subscription, SubscriptionInfo, UserClient,
    UserProfile,
};

pub(crate) const SUBSTACK_BASE_URL: &str = "https://substack.com";
pub(crate) const SUBSTACK_DOMAIN: &str = "substack.com";

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared client for unauthenticated requests.
pub(crate) fn default_client() -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(USER_AGENT_STRING)
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// Lazily fetched metadata. Distinguishes "not fetched yet" from data the
/// server genuinely omitted, and is only invalidated by an explicit refresh.
#[derive(Debug, Clone)]
pub(crate) enum Cache<T> {
    Unloaded,
    Loaded(T),
}

impl<T> Cache<T> {
    pub(crate) fn get(&self) -> Option<&T> {
        match self {
            Cache::Unloaded => None,
            Cache::Loaded(value) => Some(value),
        }
    }

    pub(crate) fn fill(&mut self, value: T) -> &T {
        *self = Cache::Loaded(value);
        match self {
            Cache::Loaded(value) => value,
            Cache::Unloaded => unreachable!(),
        }
    }
}
