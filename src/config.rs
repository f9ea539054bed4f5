use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_TMDB_URL: &str = "https://api.themoviedb.org";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_STORE_PATH: &str = "movie_list_state.json";

/// Which entry trigger and keyboard layout the conversation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueMode {
    /// Search through inline mode; movie messages posted via the bot start the lookup.
    Inline,
    /// Any plain text message is treated as a lookup.
    Text,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_language: String,
    pub store_path: PathBuf,
    pub mode: DialogueMode,
    /// Empty means "use the bot's own username".
    pub inline_bot_usernames: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = non_empty("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;
        let tmdb_api_key = non_empty("TMDB_API_KEY").ok_or(ConfigError::Missing("TMDB_API_KEY"))?;
        let tmdb_base_url = non_empty("TMDB_API_URL")
            .unwrap_or_else(|| DEFAULT_TMDB_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let tmdb_language = non_empty("TMDB_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let store_path = non_empty("STORE_PATH")
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string())
            .into();

        let mode = match non_empty("DIALOGUE_MODE").as_deref().map(str::to_ascii_lowercase) {
            None => DialogueMode::Inline,
            Some(m) if m == "inline" => DialogueMode::Inline,
            Some(m) if m == "text" => DialogueMode::Text,
            Some(m) => {
                return Err(ConfigError::Invalid {
                    key: "DIALOGUE_MODE",
                    value: m,
                    reason: "expected `inline` or `text`",
                })
            }
        };

        let inline_bot_usernames = non_empty("INLINE_BOT_USERNAMES")
            .map(|raw| {
                raw.split(',')
                    .map(|u| u.trim().trim_start_matches('@').to_string())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bot_token,
            tmdb_api_key,
            tmdb_base_url,
            tmdb_language,
            store_path,
            mode,
            inline_bot_usernames,
        })
    }
}
