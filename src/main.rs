mod config;
mod dialogue;
mod error;
mod format;
mod keyboard;
mod lists;
mod storage;
mod tg;
mod tmdb;

use config::{Config, DialogueMode};
use dialogue::Conversation;
use dotenvy::dotenv;
use keyboard::DialogueConfig;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("movie_list_bot=info,teloxide=warn")),
        )
        .init();

    let cfg = Config::from_env()?;
    let bot = Bot::new(cfg.bot_token.clone());
    let tmdb = tmdb::TmdbClient::from_config(&cfg)?;
    let storage = storage::Storage::new(&cfg.store_path).await?;

    let dialogue_config = match cfg.mode {
        DialogueMode::Text => DialogueConfig::plain_text(),
        DialogueMode::Inline => {
            let usernames = if cfg.inline_bot_usernames.is_empty() {
                let me = bot.get_me().await?;
                vec![me.username().to_string()]
            } else {
                cfg.inline_bot_usernames.clone()
            };
            info!(?usernames, "lookups accepted from inline results of");
            DialogueConfig::inline(usernames)
        }
    };
    info!(mode = ?cfg.mode, store = %cfg.store_path.display(), "starting movie list bot");

    let conversation = Conversation::new(dialogue_config, Arc::new(tmdb.clone()), Arc::new(storage));
    tg::run(bot, conversation, tmdb).await;
    Ok(())
}
