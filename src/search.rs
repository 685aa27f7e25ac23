//! Downloading every post of a search.

use std::collections::HashSet;

use tokio::sync::oneshot;

use crate::download::{BatchReport, Downloader};
use crate::error::Result;
use crate::item::{Item, SearchFilter, SearchOptions};

impl Downloader {
    /// Pages through the catalog until a page comes back empty.
    ///
    /// A post that shows up again on a later page is kept once, at its first
    /// position. Any failed request aborts the whole accumulation; nothing is
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns the first catalog error.
    pub async fn collect_search(&self, filter: &SearchFilter) -> Result<Vec<Item>> {
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 0;

        loop {
            let options = SearchOptions {
                page,
                limit: self.config.page_size,
            };
            let items = self.catalog.search_items(filter, options).await?;
            log::debug!("Search page {page}: {} posts", items.len());
            if items.is_empty() {
                break;
            }
            collected.extend(items.into_iter().filter(|item| seen.insert(item.id)));
            page += 1;
            tokio::time::sleep(self.config.page_delay()).await;
        }

        log::info!(
            "Search \"{}\" matched {} posts over {page} pages",
            filter.query(),
            collected.len()
        );
        Ok(collected)
    }

    /// Carries over local download state for posts the store already knows.
    async fn merge_local_state(&self, items: Vec<Item>) -> Result<Vec<Item>> {
        let mut merged = Vec::with_capacity(items.len());
        for item in items {
            let merged_item = match self.storage.get_item(item.id).await? {
                Some(local) => Item {
                    downloaded: local.downloaded,
                    blacklisted: local.blacklisted,
                    downloaded_at: local.downloaded_at,
                    ..item
                },
                None => item,
            };
            merged.push(merged_item);
        }
        Ok(merged)
    }

    /// Downloads every post matching `filter` as a single task.
    ///
    /// # Errors
    ///
    /// Returns the first catalog or storage error met while collecting, in
    /// which case no task is created, or [`crate::Error::NoPostsToDownload`]
    /// if the search matched nothing.
    pub async fn download_whole_search(&self, filter: &SearchFilter) -> Result<BatchReport> {
        let items = self.prepare_search(filter).await?;
        self.download_all(items).await
    }

    /// Like [`Self::download_whole_search`], but sends the task id on
    /// `started` once the task exists.
    ///
    /// `started` is dropped without a value if no task is created.
    ///
    /// # Errors
    ///
    /// Same as [`Self::download_whole_search`].
    pub async fn download_whole_search_notifying(
        &self,
        filter: &SearchFilter,
        started: oneshot::Sender<u64>,
    ) -> Result<BatchReport> {
        let items = self.prepare_search(filter).await?;
        self.download_all_notifying(items, started).await
    }

    async fn prepare_search(&self, filter: &SearchFilter) -> Result<Vec<Item>> {
        let collected = self.collect_search(filter).await?;
        let items = self.merge_local_state(collected).await?;
        self.storage.bulk_save_items(&items).await?;
        Ok(items)
    }
}
