//! Tag cache backfill.

use std::collections::BTreeSet;

use crate::download::Downloader;
use crate::error::Result;
use crate::item::Tag;

impl Downloader {
    /// Fetches and caches metadata for every tag not yet in the local cache.
    ///
    /// Names are deduplicated, checked against the cache, and looked up
    /// remotely in chunks of `tag_chunk_size` with `tag_chunk_delay` after
    /// each lookup. Running it twice with the same names performs no remote
    /// lookups the second time.
    ///
    /// # Errors
    ///
    /// Returns the first storage or catalog error; chunks stored before the
    /// error stay cached.
    pub async fn update_tag_cache(&self, names: Vec<String>) -> Result<Vec<Tag>> {
        let distinct: BTreeSet<String> = names.into_iter().collect();

        let mut missing = Vec::new();
        for name in distinct {
            if !self.storage.tag_exists(&name).await? {
                missing.push(name);
            }
        }
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        log::info!("Backfilling {} uncached tags", missing.len());
        let mut fetched = Vec::with_capacity(missing.len());
        for chunk in missing.chunks(self.config.tag_chunk_size.max(1)) {
            let tags = self.catalog.fetch_tags_by_names(chunk).await?;
            log::debug!("Fetched {} of {} requested tags", tags.len(), chunk.len());
            tokio::time::sleep(self.config.tag_chunk_delay()).await;
            self.storage.bulk_insert_tags(&tags).await?;
            fetched.extend(tags);
        }
        Ok(fetched)
    }
}
