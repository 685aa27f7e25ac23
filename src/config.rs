//! Configuration types for task orchestration, storage paths and the catalog.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the batch loop runs the downloads it dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each item download finishes before the loop paces and moves on.
    Sequential,
    /// Downloads run alongside the loop, at most `limit` in flight.
    Concurrent {
        /// Maximum number of in-flight item downloads.
        limit: usize,
    },
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Concurrent { limit: 4 }
    }
}

impl DispatchMode {
    /// Number of downloads allowed in flight at once.
    #[must_use]
    pub fn in_flight_limit(self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Concurrent { limit } => limit.max(1),
        }
    }
}

/// Pacing and batching knobs for the download task manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Delay between two items of a batch, in milliseconds.
    pub pacing_delay_ms: u64,
    /// Number of posts requested per search page.
    pub page_size: u32,
    /// Delay between two search page requests, in milliseconds.
    pub page_delay_ms: u64,
    /// Maximum number of tag names per remote tag lookup.
    pub tag_chunk_size: usize,
    /// Delay after each remote tag lookup, in milliseconds.
    pub tag_chunk_delay_ms: u64,
    /// How item downloads are dispatched.
    pub dispatch: DispatchMode,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            pacing_delay_ms: 500,
            page_size: 100,
            page_delay_ms: 2000,
            tag_chunk_size: 100,
            tag_chunk_delay_ms: 2000,
            dispatch: DispatchMode::default(),
        }
    }
}

impl TaskConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay between batch items.
    #[must_use]
    pub const fn with_pacing_delay_ms(mut self, ms: u64) -> Self {
        self.pacing_delay_ms = ms;
        self
    }

    /// Sets the search page size.
    #[must_use]
    pub const fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the delay between search page requests.
    #[must_use]
    pub const fn with_page_delay_ms(mut self, ms: u64) -> Self {
        self.page_delay_ms = ms;
        self
    }

    /// Sets the maximum number of names per tag lookup.
    #[must_use]
    pub const fn with_tag_chunk_size(mut self, size: usize) -> Self {
        self.tag_chunk_size = size;
        self
    }

    /// Sets the delay after each tag lookup.
    #[must_use]
    pub const fn with_tag_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.tag_chunk_delay_ms = ms;
        self
    }

    /// Sets the dispatch mode.
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    #[must_use]
    pub const fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    #[must_use]
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    #[must_use]
    pub const fn tag_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.tag_chunk_delay_ms)
    }

    /// Rejects values that would stall pagination or tag backfill.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the page size or tag chunk size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.tag_chunk_size == 0 {
            return Err(Error::Config("tag_chunk_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Where persisted records and downloaded media live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding task, item and tag records.
    pub data_dir: PathBuf,
    /// Directory where downloaded media files are saved.
    pub media_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("booru-dl");

        Self {
            media_dir: data_dir.join("media"),
            data_dir,
        }
    }
}

/// Remote catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the Danbooru-style JSON API.
    pub base_url: String,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://danbooru.donmai.us".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tasks: TaskConfig,
    pub paths: PathConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("booru-dl")
            .join("config.toml")
    }

    /// Loads configuration from the default location, falling back to defaults
    /// when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.tasks.validate()?;
        Ok(config)
    }
}
