use crate::error::StorageError;
use crate::lists::{AddOutcome, ListKind, ListStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMovie {
    /// TMDb id, the identity used for duplicate detection.
    pub id: u64,
    #[serde(default)]
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: String,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChatLists {
    #[serde(default)]
    watchlist: Vec<StoredMovie>,
    #[serde(default)]
    watched: Vec<StoredMovie>,
}

impl ChatLists {
    fn list_mut(&mut self, kind: ListKind) -> &mut Vec<StoredMovie> {
        match kind {
            ListKind::WatchList => &mut self.watchlist,
            ListKind::Watched => &mut self.watched,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FileState {
    version: u32,
    // chat_id -> lists
    chats: HashMap<i64, ChatLists>,
}

/// Per-chat watch lists kept in memory and snapshotted to a JSON file on every change.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<RwLock<FileState>>,
    // one snapshot-write-rename at a time; they share the tmp path
    flush_lock: Arc<Mutex<()>>,
    path: PathBuf,
}

impl Storage {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let state = if fs::try_exists(&path).await.unwrap_or(false) {
            let data = fs::read(&path).await?;
            match serde_json::from_slice::<FileState>(&data) {
                Ok(mut s) => {
                    if s.version == 0 {
                        s.version = SNAPSHOT_VERSION;
                    }
                    s
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable store snapshot, starting empty");
                    FileState { version: SNAPSHOT_VERSION, ..Default::default() }
                }
            }
        } else {
            FileState { version: SNAPSHOT_VERSION, ..Default::default() }
        };
        Ok(Self { inner: Arc::new(RwLock::new(state)), flush_lock: Arc::new(Mutex::new(())), path })
    }

    async fn list(&self, chat_id: i64, kind: ListKind) -> Vec<StoredMovie> {
        let guard = self.inner.read().await;
        guard
            .chats
            .get(&chat_id)
            .map(|c| match kind {
                ListKind::WatchList => c.watchlist.clone(),
                ListKind::Watched => c.watched.clone(),
            })
            .unwrap_or_default()
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let _guard = self.flush_lock.lock().await;
        // snapshot taken after the flush lock, so the last writer always persists the newest state
        let snapshot = {
            let guard = self.inner.read().await;
            serde_json::to_vec_pretty(&*guard)?
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &snapshot).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ListStore for Storage {
    async fn watchlist(&self, chat_id: i64) -> Vec<StoredMovie> {
        self.list(chat_id, ListKind::WatchList).await
    }

    async fn watched(&self, chat_id: i64) -> Vec<StoredMovie> {
        self.list(chat_id, ListKind::Watched).await
    }

    async fn add(&self, chat_id: i64, kind: ListKind, movie: StoredMovie) -> Result<AddOutcome, StorageError> {
        let outcome = {
            let mut guard = self.inner.write().await;
            let lists = guard.chats.entry(chat_id).or_default();
            if lists.list_mut(kind).iter().any(|m| m.id == movie.id) {
                AddOutcome::AlreadyPresent
            } else {
                let other = lists.list_mut(kind.other());
                let before = other.len();
                other.retain(|m| m.id != movie.id);
                let moved = other.len() < before;
                lists.list_mut(kind).push(movie);
                if moved {
                    AddOutcome::Moved { from: kind.other() }
                } else {
                    AddOutcome::Added
                }
            }
        };
        if outcome != AddOutcome::AlreadyPresent {
            self.flush().await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn movie(id: u64, title: &str) -> StoredMovie {
        StoredMovie {
            id,
            imdb_id: None,
            title: title.to_string(),
            original_title: title.to_string(),
            release_date: Some("1999-03-31".to_string()),
        }
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path().join("s.json")).await.unwrap();

        let first = store.add(1, ListKind::WatchList, movie(603, "The Matrix")).await.unwrap();
        let second = store.add(1, ListKind::WatchList, movie(603, "The Matrix")).await.unwrap();

        assert_eq!(first, AddOutcome::Added);
        assert_eq!(second, AddOutcome::AlreadyPresent);
        assert_eq!(store.watchlist(1).await.len(), 1);
    }

    #[tokio::test]
    async fn adding_to_other_list_moves_movie() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path().join("s.json")).await.unwrap();

        store.add(1, ListKind::WatchList, movie(603, "The Matrix")).await.unwrap();
        store.add(1, ListKind::WatchList, movie(949, "Heat")).await.unwrap();
        let outcome = store.add(1, ListKind::Watched, movie(603, "The Matrix")).await.unwrap();

        assert_eq!(outcome, AddOutcome::Moved { from: ListKind::WatchList });
        assert_eq!(store.watchlist(1).await, vec![movie(949, "Heat")]);
        assert_eq!(store.watched(1).await, vec![movie(603, "The Matrix")]);
    }

    #[tokio::test]
    async fn lists_are_per_chat() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path().join("s.json")).await.unwrap();

        store.add(1, ListKind::Watched, movie(603, "The Matrix")).await.unwrap();

        assert!(store.watched(2).await.is_empty());
        assert!(store.watchlist(1).await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        {
            let store = Storage::new(&path).await.unwrap();
            store.add(-100, ListKind::WatchList, movie(949, "Heat")).await.unwrap();
        }
        let reopened = Storage::new(&path).await.unwrap();
        assert_eq!(reopened.watchlist(-100).await, vec![movie(949, "Heat")]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_adds_from_many_chats_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let store = Storage::new(&path).await.unwrap();

        let handles: Vec<_> = (0..64i64)
            .map(|chat| {
                let store = store.clone();
                tokio::spawn(async move { store.add(chat, ListKind::WatchList, movie(chat as u64, "Heat")).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), AddOutcome::Added);
        }

        let reopened = Storage::new(&path).await.unwrap();
        for chat in 0..64i64 {
            assert_eq!(reopened.watchlist(chat).await.len(), 1, "chat {chat}");
        }
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = Storage::new(&path).await.unwrap();
        assert!(store.watchlist(1).await.is_empty());
    }
}
