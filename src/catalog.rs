//! Remote catalog access.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::item::{Item, SearchFilter, SearchOptions, Tag};

/// The remote post and tag catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches one page of posts matching `filter`.
    async fn search_items(
        &self,
        filter: &SearchFilter,
        options: SearchOptions,
    ) -> Result<Vec<Item>>;

    /// Fetches tag records by name. Callers keep `names` to at most 100 entries.
    async fn fetch_tags_by_names(&self, names: &[String]) -> Result<Vec<Tag>>;
}

/// Post record as returned by `/posts.json`.
#[derive(Debug, Deserialize)]
struct RemotePost {
    id: u64,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    tag_string: String,
}

impl From<RemotePost> for Item {
    fn from(post: RemotePost) -> Self {
        Self {
            id: post.id,
            file_url: post.file_url,
            tags: post.tag_string.split_whitespace().map(str::to_string).collect(),
            downloaded: false,
            blacklisted: false,
            downloaded_at: None,
        }
    }
}

/// Catalog client for a Danbooru-style JSON API.
pub struct HttpCatalog {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds an HTTP client with a bounded per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(concat!("booru-dl/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("{url} returned {status}")));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn search_items(
        &self,
        filter: &SearchFilter,
        options: SearchOptions,
    ) -> Result<Vec<Item>> {
        // The API numbers pages from 1.
        let body = self
            .get_json(
                "posts.json",
                &[
                    ("tags", filter.query()),
                    ("page", (options.page + 1).to_string()),
                    ("limit", options.limit.to_string()),
                ],
            )
            .await?;
        parse_posts(&body)
    }

    async fn fetch_tags_by_names(&self, names: &[String]) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .get_json(
                "tags.json",
                &[
                    ("search[name_comma]", names.join(",")),
                    ("limit", names.len().to_string()),
                ],
            )
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn parse_posts(body: &str) -> Result<Vec<Item>> {
    let posts: Vec<RemotePost> = serde_json::from_str(body)?;
    Ok(posts.into_iter().map(Item::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_posts_and_splits_tags() {
        let body = r#"[
            {"id": 11, "file_url": "https://cdn.test/a.jpg", "tag_string": "sky  cloud", "score": 4},
            {"id": 12, "tag_string": "hidden"}
        ]"#;
        let items = parse_posts(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 11);
        assert_eq!(items[0].tags, vec!["sky".to_string(), "cloud".to_string()]);
        assert!(!items[0].downloaded);
        assert_eq!(items[1].file_url, None);
    }

    #[test]
    fn empty_page_parses_to_no_items() {
        assert!(parse_posts("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_page_is_an_error() {
        assert!(matches!(parse_posts("{\"success\": false}"), Err(Error::Json(_))));
    }

    #[test]
    fn tags_deserialize_with_extra_fields() {
        let body = r#"[{"id": 3, "name": "sky", "category": 0, "post_count": 120, "is_deprecated": false}]"#;
        let tags: Vec<Tag> = serde_json::from_str(body).unwrap();
        assert_eq!(tags[0].name, "sky");
        assert_eq!(tags[0].post_count, 120);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let catalog = HttpCatalog::new(reqwest::Client::new(), "https://example.test/");
        assert_eq!(catalog.base_url, "https://example.test");
    }
}
