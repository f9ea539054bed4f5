use crate::storage::StoredMovie;
use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

/// Result of a movie lookup, ready to be sent to the chat.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieCard {
    /// HTML summary.
    pub text: String,
    /// `None` when the lookup found nothing or failed.
    pub movie: Option<StoredMovie>,
}

impl MovieCard {
    pub fn not_found(identifier: &str) -> Self {
        Self {
            text: format!("Nothing found for <i>{}</i> 😕", html_escape(identifier)),
            movie: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            text: "Movie lookup failed, try again later.".to_string(),
            movie: None,
        }
    }
}

/// Turns whatever the user sent (IMDb id, TMDb id or a title) into a summary message.
/// Never fails: lookup problems are reported inside the card.
#[async_trait]
pub trait MessageFormatter: Send + Sync {
    async fn create_message(&self, identifier: &str) -> MovieCard;
}

pub fn one_line_title(title: &str, release_date: Option<&str>) -> String {
    match release_date.and_then(|d| d.get(..4)) {
        Some(y) => format!("{} ({})", title, y),
        None => title.to_string(),
    }
}

pub fn stored_title(m: &StoredMovie) -> String {
    one_line_title(&m.title, m.release_date.as_deref())
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Cuts `s` to at most `max` user-perceived characters.
pub fn clip(s: &str, max: usize) -> String {
    let mut graphemes = s.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        head + "…"
    } else {
        head
    }
}
