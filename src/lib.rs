//! booru-dl - tracked, cancellable batch downloads from a booru-style catalog.
//!
//! The library turns a set of posts into a download task, runs it with
//! pacing and cancellation, rolls back on cancel, backfills the tag cache,
//! and persists the task's terminal state. Storage, the remote catalog and
//! local media are abstracted behind traits so any UI can drive it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use booru_dl::{
//!     Downloader, FileStorage, HttpCatalog, HttpMediaStore, SearchFilter, TaskConfig,
//!     TaskRegistry,
//! };
//!
//! # async fn example() -> booru_dl::Result<()> {
//! let storage = Arc::new(FileStorage::open("data").await?);
//! let registry = Arc::new(TaskRegistry::rehydrate(&*storage).await?);
//!
//! let http = HttpCatalog::build_http_client(Duration::from_secs(30))?;
//! let catalog = Arc::new(HttpCatalog::new(http.clone(), "https://danbooru.donmai.us"));
//! let media = Arc::new(HttpMediaStore::new(http, "media"));
//!
//! let downloader = Downloader::new(storage, catalog, media, registry, TaskConfig::default());
//!
//! let filter = SearchFilter {
//!     tags: vec!["landscape".to_string()],
//!     ..SearchFilter::default()
//! };
//! let report = downloader.download_whole_search(&filter).await?;
//! println!("Task #{} downloaded {} posts", report.outcome.task_id, report.outcome.downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod item;
pub mod media;
pub mod persist;
pub mod registry;
pub mod search;
pub mod storage;
pub mod tags;
pub mod task;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use catalog::{Catalog, HttpCatalog};
pub use config::{AppConfig, CatalogConfig, DispatchMode, PathConfig, TaskConfig};
pub use download::{BatchReport, Downloader};
pub use error::{Error, Result};
pub use format::{format_duration, format_task};
pub use fs::{FileSystem, TokioFileSystem};
pub use item::{Item, Rating, SearchFilter, SearchOptions, Tag};
pub use media::{HttpMediaStore, MediaStore};
pub use registry::TaskRegistry;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use task::{Task, TaskOutcome, TaskState};
