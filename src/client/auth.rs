use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use serde::Deserialize;

use crate::error::Result;

use super::{DEFAULT_TIMEOUT, SUBSTACK_DOMAIN, USER_AGENT_STRING};

/// One entry in the cookie file: a JSON array of these records.
#[derive(Debug, Deserialize)]
struct CookieEntry {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default = "default_cookie_path")]
    path: String,
    #[serde(default)]
    secure: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Cookie-backed Substack session.
///
/// Loads session cookies from a file at construction time. A missing file is
/// not an error: the session simply stays unauthenticated and only public
/// content is reachable. There is no refresh or expiry detection; expired
/// cookies surface as HTTP errors from the API.
pub struct Auth {
    cookies_path: PathBuf,
    client: Client,
    authenticated: bool,
}

impl Auth {
    pub fn from_cookie_file(cookies_path: impl Into<PathBuf>) -> Self {
        let cookies_path = cookies_path.into();
        let jar = Arc::new(Jar::default());

        let authenticated = if cookies_path.exists() {
            match load_cookies(&cookies_path, &jar) {
                Ok(count) => {
                    tracing::debug!("loaded {} cookies from {}", count, cookies_path.display());
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to load cookies from {}: {}",
                        cookies_path.display(),
                        e
                    );
                    false
                }
            }
        } else {
            tracing::warn!(
                "cookie file not found at {}, continuing unauthenticated",
                cookies_path.display()
            );
            false
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT_STRING)
            .default_headers(headers)
            .cookie_provider(jar)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            cookies_path,
            client,
            authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn cookies_path(&self) -> &Path {
        &self.cookies_path
    }

    /// The underlying client; cookies persist across all requests made with it.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        Ok(self.client.get(url).send().await?)
    }

    pub async fn post(&self, url: &str) -> Result<Response> {
        Ok(self.client.post(url).send().await?)
    }
}

fn load_cookies(path: &Path, jar: &Jar) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let entries: Vec<CookieEntry> = serde_json::from_str(&content)?;
    let count = entries.len();

    for entry in entries {
        let domain = entry
            .domain
            .as_deref()
            .map(|d| d.trim_start_matches('.').to_string())
            .unwrap_or_else(|| SUBSTACK_DOMAIN.to_string());
        let origin: Url = format!("https://{}/", domain).parse()?;

        let mut cookie = format!(
            "{}={}; Domain={}; Path={}",
            entry.name, entry.value, domain, entry.path
        );
        if entry.secure {
            cookie.push_str("; Secure");
        }
        jar.add_cookie_str(&cookie, &origin);
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_cookie_file_leaves_session_unauthenticated() {
        let auth = Auth::from_cookie_file("/nonexistent/cookies.json");
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn cookie_file_marks_session_authenticated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "substack.sid", "value": "abc123", "domain": ".substack.com", "secure": true}}]"#
        )
        .unwrap();

        let auth = Auth::from_cookie_file(file.path());
        assert!(auth.is_authenticated());
    }

    #[test]
    fn malformed_cookie_file_leaves_session_unauthenticated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let auth = Auth::from_cookie_file(file.path());
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn cookie_entries_default_path_and_secure() {
        let entry: CookieEntry =
            serde_json::from_str(r#"{"name": "a", "value": "b"}"#).unwrap();
        assert_eq!(entry.path, "/");
        assert!(!entry.secure);
        assert!(entry.domain.is_none());
    }
}
