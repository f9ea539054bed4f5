use teloxide::dispatching::dialogue::InMemStorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is missing")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("store snapshot encoding: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("tmdb request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tmdb answered with status {0}")]
    Status(reqwest::StatusCode),
}

/// Everything a dispatcher endpoint can fail with.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
    #[error("dialogue storage: {0}")]
    Dialogue(#[from] InMemStorageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type HandlerResult = Result<(), BotError>;
