//! Catalog records: posts, tags and search filters.

use serde::{Deserialize, Serialize};

/// A downloadable post with its local state flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    /// Remote file location; hidden posts come back without one.
    pub file_url: Option<String>,
    pub tags: Vec<String>,
    pub downloaded: bool,
    pub blacklisted: bool,
    /// Epoch milliseconds of the last successful download.
    pub downloaded_at: Option<i64>,
}

impl Item {
    /// Creates a not-yet-downloaded item.
    #[must_use]
    pub fn new(id: u64, file_url: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id,
            file_url: Some(file_url.into()),
            tags,
            downloaded: false,
            blacklisted: false,
            downloaded_at: None,
        }
    }

    /// Returns a copy flagged as downloaded at `now`.
    #[must_use]
    pub fn mark_downloaded(&self, now: i64) -> Self {
        Self {
            downloaded: true,
            blacklisted: false,
            downloaded_at: Some(now),
            ..self.clone()
        }
    }

    /// Returns a copy with the download flags cleared.
    #[must_use]
    pub fn reset_download(&self) -> Self {
        Self {
            downloaded: false,
            downloaded_at: None,
            ..self.clone()
        }
    }
}

/// Cached tag metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: u8,
    #[serde(default)]
    pub post_count: u64,
}

/// Content rating used to narrow a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    General,
    Sensitive,
    Questionable,
    Explicit,
}

impl Rating {
    /// Parses the one-letter or full rating name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "g" | "general" => Some(Self::General),
            "s" | "sensitive" => Some(Self::Sensitive),
            "q" | "questionable" => Some(Self::Questionable),
            "e" | "explicit" => Some(Self::Explicit),
            _ => None,
        }
    }

    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::General => 'g',
            Self::Sensitive => 's',
            Self::Questionable => 'q',
            Self::Explicit => 'e',
        }
    }
}

/// The active search: wanted tags, excluded tags and an optional rating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub tags: Vec<String>,
    pub excluded_tags: Vec<String>,
    pub rating: Option<Rating>,
}

impl SearchFilter {
    /// Builds the space-separated query string understood by the catalog.
    #[must_use]
    pub fn query(&self) -> String {
        let wanted = self.tags.iter().cloned();
        let excluded = self.excluded_tags.iter().map(|t| format!("-{t}"));
        let rating = self.rating.map(|r| format!("rating:{}", r.letter()));

        wanted
            .chain(excluded)
            .chain(rating)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Paging options for one search request. Pages are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub page: u32,
    pub limit: u32,
}
