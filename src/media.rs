//! Local media files: writing downloaded posts to disk and removing them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::item::Item;

/// Where and how post media is stored locally.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Downloads the post's media to local storage.
    ///
    /// Implementations return [`Error::Cancelled`] when `cancel` fires
    /// before the write finished.
    async fn write_media(&self, item: &Item, cancel: &CancellationToken) -> Result<()>;

    /// Removes the post's media. A missing file is not an error.
    async fn delete_media(&self, item: &Item) -> Result<()>;
}

/// Returns the `.part` file path for a given final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// File name for a post: its id plus the extension of the remote file.
fn media_file_name(item: &Item) -> String {
    let ext = item
        .file_url
        .as_deref()
        .and_then(|url| url.split(['?', '#']).next())
        .and_then(|url| url.rsplit('/').next())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(char::is_alphanumeric))
        .unwrap_or("bin");
    format!("{}.{ext}", item.id)
}

/// Media store that fetches files over HTTP into one directory.
///
/// Files are written to `<name>.part` and renamed on success, so an existing
/// final file always means a complete download and re-downloads are no-ops.
pub struct HttpMediaStore<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    dir: PathBuf,
    fs: F,
}

impl HttpMediaStore<TokioFileSystem> {
    /// Creates a media store with the default file system.
    #[must_use]
    pub fn new(http: reqwest::Client, dir: impl Into<PathBuf>) -> Self {
        Self::with_fs(http, dir, TokioFileSystem)
    }
}

impl<F: FileSystem> HttpMediaStore<F> {
    /// Creates a media store with a custom file system implementation.
    #[must_use]
    pub fn with_fs(http: reqwest::Client, dir: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            http,
            dir: dir.into(),
            fs,
        }
    }

    /// Local path of a post's media file.
    #[must_use]
    pub fn media_path(&self, item: &Item) -> PathBuf {
        self.dir.join(media_file_name(item))
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<()> {
        let mut response = self.http.get(url).send().await?.error_for_status()?;
        let mut file = self.fs.create_file(path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<F: FileSystem> MediaStore for HttpMediaStore<F> {
    async fn write_media(&self, item: &Item, cancel: &CancellationToken) -> Result<()> {
        let url = item
            .file_url
            .as_deref()
            .ok_or(Error::MissingLocator { id: item.id })?;
        let path = self.media_path(item);
        if self.fs.file_exists(&path).await {
            log::debug!("Post {} already on disk at {}", item.id, path.display());
            return Ok(());
        }

        self.fs.create_dir_all(&self.dir).await?;
        let pp = part_path(&path);

        let result = tokio::select! {
            res = self.fetch_to(url, &pp) => res,
            () = cancel.cancelled() => Err(Error::Cancelled),
        };

        match result {
            Ok(()) => {
                self.fs.rename_file(&pp, &path).await?;
                Ok(())
            }
            Err(e) => {
                let _ = self.fs.remove_file(&pp).await;
                Err(e)
            }
        }
    }

    async fn delete_media(&self, item: &Item) -> Result<()> {
        let path = self.media_path(item);
        for candidate in [part_path(&path), path] {
            match self.fs.remove_file(&candidate).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }
}
