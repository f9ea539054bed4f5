use crate::dialogue::{Conversation, Event, MovieDialogue, Next, Outcome, Outgoing, State};
use crate::error::HandlerResult;
use crate::format::{clip, one_line_title};
use crate::keyboard::{ButtonKind, Keyboard};
use crate::tmdb::TmdbClient;
use std::sync::Arc;
use teloxide::{
    dispatching::{dialogue::InMemStorage, Dispatcher, UpdateFilterExt},
    prelude::*,
    types::{
        CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InlineQuery, InlineQueryResult,
        InlineQueryResultArticle, InputMessageContent, InputMessageContentText, MessageId, ParseMode,
    },
    utils::command::BotCommands,
};
use tracing::{debug, info, warn};

const INLINE_RESULTS: usize = 10;

/* ====== Commands ====== */
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    /// start over with the search / lists menu
    #[command(description = "start over")]
    Start,
    /// jump straight to the lists
    #[command(description = "show the watch list / watched menu")]
    List,
    #[command(description = "help")]
    Help,
}

pub async fn run(bot: Bot, conversation: Conversation, tmdb: TmdbClient) {
    let sessions = InMemStorage::<State>::new();
    info!(list_command = conversation.config().list_command, "starting dispatcher");

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint({
                            let conversation = conversation.clone();
                            let sessions = sessions.clone();
                            move |bot: Bot, msg: Message, cmd: Command| {
                                let conversation = conversation.clone();
                                let sessions = sessions.clone();
                                async move { on_command(bot, msg, cmd, &conversation, sessions).await }
                            }
                        }),
                )
                .branch({
                    let conversation = conversation.clone();
                    let sessions = sessions.clone();
                    dptree::endpoint(move |bot: Bot, msg: Message| {
                        let conversation = conversation.clone();
                        let sessions = sessions.clone();
                        async move { on_text(bot, msg, &conversation, sessions).await }
                    })
                }),
        )
        .branch(Update::filter_callback_query().endpoint({
            let conversation = conversation.clone();
            let sessions = sessions.clone();
            move |bot: Bot, q: CallbackQuery| {
                let conversation = conversation.clone();
                let sessions = sessions.clone();
                async move { on_callback(bot, q, &conversation, sessions).await }
            }
        }))
        .branch(Update::filter_inline_query().endpoint({
            let tmdb = tmdb.clone();
            move |bot: Bot, q: InlineQuery| {
                let tmdb = tmdb.clone();
                async move { on_inline_query(bot, q, &tmdb).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    conversation: &Conversation,
    sessions: Arc<InMemStorage<State>>,
) -> HandlerResult {
    if cmd == Command::Help {
        bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        return Ok(());
    }
    drive(&bot, conversation, sessions, msg.chat.id, Event::Command(cmd)).await
}

async fn on_text(bot: Bot, msg: Message, conversation: &Conversation, sessions: Arc<InMemStorage<State>>) -> HandlerResult {
    let Some(text) = msg.text() else { return Ok(()); };
    let via_bot = msg.via_bot.as_ref().and_then(|u| u.username.clone());
    let event = Event::Text { text: text.to_string(), via_bot };
    drive(&bot, conversation, sessions, msg.chat.id, event).await
}

async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    conversation: &Conversation,
    sessions: Arc<InMemStorage<State>>,
) -> HandlerResult {
    let Some(data) = q.data.clone() else { return Ok(()); };
    let Some(origin) = q.message.as_ref() else {
        debug!(token = %data, "callback without a chat message");
        return Ok(());
    };
    let (chat_id, message_id) = (origin.chat().id, origin.id());

    let dialogue = MovieDialogue::new(sessions, chat_id);
    let state = dialogue.get().await?.unwrap_or_default();
    let outcome = conversation.handle(chat_id.0, &state, Event::Callback(data)).await?;
    if !outcome.is_ignored() {
        bot.answer_callback_query(q.id.clone()).await?;
    }
    apply(&bot, &dialogue, chat_id, Some(message_id), outcome).await
}

/// Runs a message event through the conversation for `chat_id` and applies the result.
async fn drive(
    bot: &Bot,
    conversation: &Conversation,
    sessions: Arc<InMemStorage<State>>,
    chat_id: ChatId,
    event: Event,
) -> HandlerResult {
    let dialogue = MovieDialogue::new(sessions, chat_id);
    let state = dialogue.get().await?.unwrap_or_default();
    let outcome = conversation.handle(chat_id.0, &state, event).await?;
    apply(bot, &dialogue, chat_id, None, outcome).await
}

async fn apply(
    bot: &Bot,
    dialogue: &MovieDialogue,
    chat_id: ChatId,
    origin: Option<MessageId>,
    outcome: Outcome,
) -> HandlerResult {
    let sent = send_all(bot, chat_id, origin, outcome.outgoing).await;
    if let Err(e) = &sent {
        warn!(chat_id = chat_id.0, error = %e, "reply failed, moving the conversation on anyway");
    }
    // a failed reply must not leave the chat stuck in the old state
    match outcome.next {
        Next::Stay => {}
        Next::Enter(state) => dialogue.update(state).await?,
        Next::End => dialogue.exit().await?,
    }
    sent
}

async fn send_all(bot: &Bot, chat_id: ChatId, origin: Option<MessageId>, outgoing: Vec<Outgoing>) -> HandlerResult {
    for out in outgoing {
        match (out, origin) {
            (Outgoing::Send { text, keyboard }, _) => {
                let mut req = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
                if let Some(kb) = keyboard {
                    req = req.reply_markup(render_keyboard(&kb));
                }
                req.await?;
            }
            (Outgoing::EditOrigin { text }, Some(message_id)) => {
                bot.edit_message_text(chat_id, message_id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            (Outgoing::EditOrigin { text }, None) => {
                bot.send_message(chat_id, text).parse_mode(ParseMode::Html).await?;
            }
        }
    }
    Ok(())
}

/* ====== Inline mode search ======
   each result posts `tmdb:<id>` via the bot, which the inline dialogue picks up as a lookup */
async fn on_inline_query(bot: Bot, q: InlineQuery, tmdb: &TmdbClient) -> HandlerResult {
    let query = q.query.trim();
    let movies = if query.is_empty() {
        Vec::new()
    } else {
        match tmdb.search_movies(query, INLINE_RESULTS).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%query, error = %e, "inline search failed");
                Vec::new()
            }
        }
    };

    let results: Vec<InlineQueryResult> = movies
        .iter()
        .map(|m| {
            let content = InputMessageContent::Text(InputMessageContentText::new(format!("tmdb:{}", m.id)));
            let mut article = InlineQueryResultArticle::new(
                m.id.to_string(),
                one_line_title(&m.title, m.release_date.as_deref()),
                content,
            );
            if !m.overview.trim().is_empty() {
                article = article.description(clip(m.overview.trim(), 200));
            }
            InlineQueryResult::Article(article)
        })
        .collect();

    bot.answer_inline_query(q.id.clone(), results).cache_time(60).await?;
    Ok(())
}

/* ====== Buttons ====== */

fn render_keyboard(kb: &Keyboard) -> InlineKeyboardMarkup {
    let rows = kb.rows.iter().map(|row| {
        row.iter()
            .map(|b| match &b.kind {
                ButtonKind::Callback(token) => InlineKeyboardButton::callback(b.label.clone(), token.to_string()),
                ButtonKind::SwitchInlineCurrentChat => {
                    InlineKeyboardButton::switch_inline_query_current_chat(b.label.clone(), "")
                }
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::DialogueConfig;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn inline_start_keyboard_renders_switch_and_callbacks() {
        let cfg = DialogueConfig::inline(["movie_list_bot"]);
        let markup = render_keyboard(&cfg.start_keyboard);

        assert_eq!(markup.inline_keyboard.len(), 2);
        assert!(matches!(
            &markup.inline_keyboard[0][0].kind,
            InlineKeyboardButtonKind::SwitchInlineQueryCurrentChat(q) if q.is_empty()
        ));
        let data: Vec<String> = markup.inline_keyboard[1]
            .iter()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(d) => Some(d.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(data, vec!["first:show:watchlist", "first:show:watched"]);
    }

    #[test]
    fn command_names_are_lowercase() {
        assert_eq!(Command::parse("/start", "movie_list_bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/list", "movie_list_bot").ok(), Some(Command::List));
        assert!(Command::parse("/vote", "movie_list_bot").is_err());
    }

    #[test]
    fn callback_data_fits_telegram_limit() {
        for cfg in [DialogueConfig::inline(["b"]), DialogueConfig::plain_text()] {
            for kb in [&cfg.start_keyboard, &cfg.list_keyboard, &cfg.second_keyboard] {
                assert!(kb.tokens().iter().all(|t| t.to_string().len() <= 64));
            }
        }
    }
}
