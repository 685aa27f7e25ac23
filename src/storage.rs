//! Durable storage for tasks, items and the tag cache.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::{Item, Tag};
use crate::task::Task;

/// Key-value persistence used by the task manager.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save_task(&self, task: &Task) -> Result<()>;

    async fn get_all_tasks(&self) -> Result<Vec<Task>>;

    async fn remove_task(&self, id: u64) -> Result<()>;

    async fn tag_exists(&self, name: &str) -> Result<bool>;

    async fn bulk_insert_tags(&self, tags: &[Tag]) -> Result<()>;

    /// Looks up the locally stored copy of a post.
    async fn get_item(&self, id: u64) -> Result<Option<Item>>;

    async fn update_item(&self, item: &Item) -> Result<()>;

    async fn bulk_save_items(&self, items: &[Item]) -> Result<()>;
}

/// Writes `contents` to a temporary sibling and renames it over `path`.
async fn write_atomic(path: &Path, contents: String) -> Result<()> {
    let tmp_path = path.with_extension("toml.tmp");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagFile {
    #[serde(default)]
    tags: Vec<Tag>,
}

/// Storage backed by TOML files under one directory.
///
/// Layout: `tasks/<id>.toml`, `items/<id>.toml` and a single `tags.toml`.
/// The tag cache is kept in memory and rewritten on each insert.
pub struct FileStorage {
    root: PathBuf,
    tags: tokio::sync::Mutex<BTreeMap<String, Tag>>,
}

impl FileStorage {
    /// Opens (creating if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or an existing
    /// tag cache cannot be parsed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("tasks")).await?;
        tokio::fs::create_dir_all(root.join("items")).await?;

        let tag_path = root.join("tags.toml");
        let tags = match tokio::fs::read_to_string(&tag_path).await {
            Ok(contents) => toml::from_str::<TagFile>(&contents)?
                .tags
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root,
            tags: tokio::sync::Mutex::new(tags),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, id: u64) -> PathBuf {
        self.root.join("tasks").join(format!("{id}.toml"))
    }

    fn item_path(&self, id: u64) -> PathBuf {
        self.root.join("items").join(format!("{id}.toml"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save_task(&self, task: &Task) -> Result<()> {
        write_atomic(&self.task_path(task.id), toml::to_string(task)?).await
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let mut read_dir = tokio::fs::read_dir(self.root.join("tasks")).await?;
        let mut tasks = Vec::new();

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            match toml::from_str::<Task>(&contents) {
                Ok(task) => tasks.push(task),
                Err(e) => log::warn!("Ignoring unreadable task record {}: {e}", path.display()),
            }
        }

        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn remove_task(&self, id: u64) -> Result<()> {
        match tokio::fs::remove_file(self.task_path(id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn tag_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tags.lock().await.contains_key(name))
    }

    async fn bulk_insert_tags(&self, tags: &[Tag]) -> Result<()> {
        let mut cache = self.tags.lock().await;
        for tag in tags {
            cache.insert(tag.name.clone(), tag.clone());
        }
        let file = TagFile {
            tags: cache.values().cloned().collect(),
        };
        write_atomic(&self.root.join("tags.toml"), toml::to_string(&file)?).await
    }

    async fn get_item(&self, id: u64) -> Result<Option<Item>> {
        match tokio::fs::read_to_string(self.item_path(id)).await {
            Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_item(&self, item: &Item) -> Result<()> {
        write_atomic(&self.item_path(item.id), toml::to_string(item)?).await
    }

    async fn bulk_save_items(&self, items: &[Item]) -> Result<()> {
        for item in items {
            self.update_item(item).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    tasks: BTreeMap<u64, Task>,
    tags: HashMap<String, Tag>,
    items: HashMap<u64, Item>,
}

/// Non-durable storage, for embedding and tests.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with already persisted tasks.
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let storage = Self::default();
        storage
            .lock()
            .tasks
            .extend(tasks.into_iter().map(|t| (t.id, t)));
        storage
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn task(&self, id: u64) -> Option<Task> {
        self.lock().tasks.get(&id).cloned()
    }

    #[must_use]
    pub fn item(&self, id: u64) -> Option<Item> {
        self.lock().items.get(&id).cloned()
    }

    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.lock().tags.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_task(&self, task: &Task) -> Result<()> {
        self.lock().tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.lock().tasks.values().cloned().collect())
    }

    async fn remove_task(&self, id: u64) -> Result<()> {
        self.lock().tasks.remove(&id);
        Ok(())
    }

    async fn tag_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().tags.contains_key(name))
    }

    async fn bulk_insert_tags(&self, tags: &[Tag]) -> Result<()> {
        let mut inner = self.lock();
        for tag in tags {
            inner.tags.insert(tag.name.clone(), tag.clone());
        }
        Ok(())
    }

    async fn get_item(&self, id: u64) -> Result<Option<Item>> {
        Ok(self.lock().items.get(&id).cloned())
    }

    async fn update_item(&self, item: &Item) -> Result<()> {
        self.lock().items.insert(item.id, item.clone());
        Ok(())
    }

    async fn bulk_save_items(&self, items: &[Item]) -> Result<()> {
        let mut inner = self.lock();
        for item in items {
            inner.items.insert(item.id, item.clone());
        }
        Ok(())
    }
}
