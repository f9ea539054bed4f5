use crate::error::StorageError;
use crate::format::{html_escape, stored_title};
use crate::storage::StoredMovie;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    WatchList,
    Watched,
}

impl ListKind {
    pub fn other(self) -> Self {
        match self {
            ListKind::WatchList => ListKind::Watched,
            ListKind::Watched => ListKind::WatchList,
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            ListKind::WatchList => "Watch List",
            ListKind::Watched => "Watched",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            ListKind::WatchList => "watchlist",
            ListKind::Watched => "watched",
        }
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        match s {
            "watchlist" => Some(ListKind::WatchList),
            "watched" => Some(ListKind::Watched),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    /// The movie was on `from` and now lives on the requested list only.
    Moved { from: ListKind },
}

/// Per-chat watch list / watched list persistence.
#[async_trait]
pub trait ListStore: Send + Sync {
    async fn watchlist(&self, chat_id: i64) -> Vec<StoredMovie>;
    async fn watched(&self, chat_id: i64) -> Vec<StoredMovie>;
    async fn add(&self, chat_id: i64, kind: ListKind, movie: StoredMovie) -> Result<AddOutcome, StorageError>;
}

pub async fn list_watchlist(store: &dyn ListStore, chat_id: i64) -> String {
    render(ListKind::WatchList, &store.watchlist(chat_id).await)
}

pub async fn list_watched(store: &dyn ListStore, chat_id: i64) -> String {
    render(ListKind::Watched, &store.watched(chat_id).await)
}

// stays under Telegram's 4096 character message limit with room for the tail line
const RENDER_LIMIT: usize = 3500;

fn render(kind: ListKind, movies: &[StoredMovie]) -> String {
    if movies.is_empty() {
        return format!("{} is empty.", kind.heading());
    }
    let mut out = format!("<b>{} ({}):</b>", kind.heading(), movies.len());
    let mut used = out.chars().count();
    for (i, m) in movies.iter().enumerate() {
        let line = format!("\n{}. {}", i + 1, html_escape(&stored_title(m)));
        let len = line.chars().count();
        if used + len > RENDER_LIMIT {
            out.push_str(&format!("\n… and {} more", movies.len() - i));
            break;
        }
        out.push_str(&line);
        used += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::movie;
    use crate::storage::Storage;

    #[tokio::test]
    async fn empty_lists_say_so() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path().join("s.json")).await.unwrap();

        assert_eq!(list_watchlist(&store, 7).await, "Watch List is empty.");
        assert_eq!(list_watched(&store, 7).await, "Watched is empty.");
    }

    #[tokio::test]
    async fn entries_are_numbered_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path().join("s.json")).await.unwrap();
        store.add(7, ListKind::WatchList, movie(949, "Heat")).await.unwrap();
        store.add(7, ListKind::WatchList, movie(1, "Tom & Jerry")).await.unwrap();

        let text = list_watchlist(&store, 7).await;
        assert_eq!(
            text,
            "<b>Watch List (2):</b>\n1. Heat (1999)\n2. Tom &amp; Jerry (1999)"
        );
    }

    #[tokio::test]
    async fn long_lists_are_cut_to_fit_one_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path().join("s.json")).await.unwrap();
        for id in 0..150 {
            store
                .add(7, ListKind::WatchList, movie(id, "Eternal Sunshine of the Spotless Mind"))
                .await
                .unwrap();
        }

        let text = list_watchlist(&store, 7).await;
        assert!(text.chars().count() <= 4096, "{} chars", text.chars().count());
        assert!(text.starts_with("<b>Watch List (150):</b>\n1. Eternal Sunshine"));
        let shown = text.lines().filter(|l| l.contains(". Eternal Sunshine")).count();
        assert!(text.ends_with(&format!("… and {} more", 150 - shown)));
    }

    #[test]
    fn slugs_round_trip() {
        for kind in [ListKind::WatchList, ListKind::Watched] {
            assert_eq!(ListKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(ListKind::from_slug("seen"), None);
    }
}
