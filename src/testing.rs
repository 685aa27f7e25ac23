//! In-memory collaborators shared by the orchestration tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::TaskConfig;
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::item::{Item, SearchFilter, SearchOptions, Tag};
use crate::media::MediaStore;
use crate::registry::TaskRegistry;
use crate::storage::MemoryStorage;

pub fn post(id: u64, tags: &[&str]) -> Item {
    Item::new(
        id,
        format!("https://cdn.test/{id}.png"),
        tags.iter().map(|t| (*t).to_string()).collect(),
    )
}

pub fn downloaded_post(id: u64, tags: &[&str]) -> Item {
    post(id, tags).mark_downloaded(1)
}

/// Catalog serving canned search pages and echoing requested tags.
#[derive(Default)]
pub struct MockCatalog {
    pages: Vec<Vec<Item>>,
    fail_on_page: Option<u32>,
    pub searches: Mutex<Vec<SearchOptions>>,
    pub tag_lookups: Mutex<Vec<Vec<String>>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<Vec<Item>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn failing_on_page(mut self, page: u32) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }

    pub fn lookup_sizes(&self) -> Vec<usize> {
        self.tag_lookups.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn search_items(
        &self,
        _filter: &SearchFilter,
        options: SearchOptions,
    ) -> Result<Vec<Item>> {
        self.searches.lock().unwrap().push(options);
        if self.fail_on_page == Some(options.page) {
            return Err(Error::Remote(format!("page {} unavailable", options.page)));
        }
        Ok(self
            .pages
            .get(options.page as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_tags_by_names(&self, names: &[String]) -> Result<Vec<Tag>> {
        self.tag_lookups.lock().unwrap().push(names.to_vec());
        Ok(names
            .iter()
            .zip(1u64..)
            .map(|(name, id)| Tag {
                id,
                name: name.clone(),
                category: 0,
                post_count: 1,
            })
            .collect())
    }
}

/// Media store that records calls, with optional latency and failures.
#[derive(Default)]
pub struct MockMedia {
    delay: Duration,
    fail_ids: HashSet<u64>,
    pub written: Mutex<Vec<u64>>,
    pub deleted: Mutex<Vec<u64>>,
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, ids: &[u64]) -> Self {
        self.fail_ids.extend(ids);
        self
    }

    pub fn written(&self) -> Vec<u64> {
        self.written.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for MockMedia {
    async fn write_media(&self, item: &Item, cancel: &CancellationToken) -> Result<()> {
        self.written.lock().unwrap().push(item.id);
        if !self.delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
        if self.fail_ids.contains(&item.id) {
            return Err(Error::Remote(format!("post {} unavailable", item.id)));
        }
        Ok(())
    }

    async fn delete_media(&self, item: &Item) -> Result<()> {
        self.deleted.lock().unwrap().push(item.id);
        Ok(())
    }
}

/// A downloader wired to in-memory collaborators.
pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub catalog: Arc<MockCatalog>,
    pub media: Arc<MockMedia>,
    pub registry: Arc<TaskRegistry>,
    pub downloader: Downloader,
}

impl Harness {
    pub fn new(catalog: MockCatalog, media: MockMedia, config: TaskConfig) -> Self {
        Self::with_storage(MemoryStorage::new(), catalog, media, config)
    }

    pub fn with_storage(
        storage: MemoryStorage,
        catalog: MockCatalog,
        media: MockMedia,
        config: TaskConfig,
    ) -> Self {
        let storage = Arc::new(storage);
        let catalog = Arc::new(catalog);
        let media = Arc::new(media);
        let registry = Arc::new(TaskRegistry::new());
        let downloader = Downloader::new(
            storage.clone(),
            catalog.clone(),
            media.clone(),
            registry.clone(),
            config,
        );
        Self {
            storage,
            catalog,
            media,
            registry,
            downloader,
        }
    }

    /// Waits until the media store has seen `count` writes.
    pub async fn wait_for_writes(&self, count: usize) {
        while self.media.written().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
