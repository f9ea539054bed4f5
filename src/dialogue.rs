//! Conversation state machine.
//!
//! `Conversation::handle` maps (state, event) to the next state plus the messages to send.
//! It never talks to Telegram itself; `tg` applies the returned `Outcome`.

use crate::error::BotError;
use crate::format::{html_escape, stored_title, MessageFormatter};
use crate::keyboard::{DialogueConfig, Keyboard};
use crate::lists::{list_watched, list_watchlist, AddOutcome, ListKind, ListStore};
use crate::storage::StoredMovie;
use crate::tg::Command;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use tracing::{debug, info};

pub const CHOOSE: &str = "Choose:";
pub const ADD_TO: &str = "Add to:";
pub const FINISHED: &str = "Finished";
pub const SEARCH_PROMPT: &str = "Send me a movie title or an IMDb id (like tt0133093) to look it up.";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum State {
    /// No conversation running; also where every conversation ends.
    #[default]
    Idle,
    /// List menu is showing.
    First,
    /// A looked-up movie is waiting to be filed.
    Second { movie: Option<StoredMovie> },
}

impl State {
    fn stage(&self) -> Option<Stage> {
        match self {
            State::Idle => None,
            State::First => Some(Stage::First),
            State::Second { .. } => Some(Stage::Second),
        }
    }
}

pub type MovieDialogue = Dialogue<State, InMemStorage<State>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Search,
    Show(ListKind),
    Add(ListKind),
    Cancel,
}

/// Button payload: `<stage>:<action>`, e.g. `first:show:watchlist` or `second:cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken {
    pub stage: Stage,
    pub action: Action,
}

impl CallbackToken {
    pub fn parse(data: &str) -> Option<Self> {
        let (stage, action) = data.split_once(':')?;
        let stage = match stage {
            "first" => Stage::First,
            "second" => Stage::Second,
            _ => return None,
        };
        let action = match action.split_once(':') {
            None if action == "search" => Action::Search,
            None if action == "cancel" => Action::Cancel,
            Some(("show", list)) => Action::Show(ListKind::from_slug(list)?),
            Some(("add", list)) => Action::Add(ListKind::from_slug(list)?),
            _ => return None,
        };
        let token = Self { stage, action };
        token.is_valid().then_some(token)
    }

    /// Show/search only make sense on the list menu, add only on a looked-up movie.
    fn is_valid(&self) -> bool {
        matches!(
            (self.stage, self.action),
            (Stage::First, Action::Search | Action::Show(_) | Action::Cancel)
                | (Stage::Second, Action::Add(_) | Action::Cancel)
        )
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            Stage::First => "first",
            Stage::Second => "second",
        };
        match self.action {
            Action::Search => write!(f, "{stage}:search"),
            Action::Cancel => write!(f, "{stage}:cancel"),
            Action::Show(list) => write!(f, "{stage}:show:{}", list.slug()),
            Action::Add(list) => write!(f, "{stage}:add:{}", list.slug()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    Text { text: String, via_bot: Option<String> },
    Callback(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// New message in the chat, optionally with buttons. Text is HTML.
    Send { text: String, keyboard: Option<Keyboard> },
    /// Replace the text of the message whose button was pressed, dropping its keyboard.
    EditOrigin { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    Stay,
    Enter(State),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub next: Next,
    pub outgoing: Vec<Outgoing>,
}

impl Outcome {
    pub fn ignored() -> Self {
        Self { next: Next::Stay, outgoing: Vec::new() }
    }

    fn enter(state: State, outgoing: Vec<Outgoing>) -> Self {
        Self { next: Next::Enter(state), outgoing }
    }

    fn end(text: String) -> Self {
        Self { next: Next::End, outgoing: vec![Outgoing::EditOrigin { text }] }
    }

    pub fn is_ignored(&self) -> bool {
        self.next == Next::Stay && self.outgoing.is_empty()
    }
}

/// The movie list conversation, with its collaborators injected.
#[derive(Clone)]
pub struct Conversation {
    config: Arc<DialogueConfig>,
    formatter: Arc<dyn MessageFormatter>,
    lists: Arc<dyn ListStore>,
}

impl Conversation {
    pub fn new(config: DialogueConfig, formatter: Arc<dyn MessageFormatter>, lists: Arc<dyn ListStore>) -> Self {
        Self { config: Arc::new(config), formatter, lists }
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    pub async fn handle(&self, chat_id: i64, state: &State, event: Event) -> Result<Outcome, BotError> {
        match event {
            Event::Command(cmd) => Ok(self.on_command(chat_id, cmd)),
            Event::Text { text, via_bot } => {
                if !self.config.trigger.matches(&text, via_bot.as_deref()) {
                    debug!(chat_id, "text is not a lookup trigger");
                    return Ok(Outcome::ignored());
                }
                Ok(self.on_lookup(chat_id, text.trim()).await)
            }
            Event::Callback(data) => self.on_callback(chat_id, state, &data).await,
        }
    }

    fn on_command(&self, chat_id: i64, cmd: Command) -> Outcome {
        let keyboard = match cmd {
            Command::Start => &self.config.start_keyboard,
            Command::List if self.config.list_command => &self.config.list_keyboard,
            _ => {
                debug!(chat_id, ?cmd, "command does not start a conversation");
                return Outcome::ignored();
            }
        };
        info!(chat_id, ?cmd, "conversation started");
        Outcome::enter(
            State::First,
            vec![Outgoing::Send { text: CHOOSE.to_string(), keyboard: Some(keyboard.clone()) }],
        )
    }

    async fn on_lookup(&self, chat_id: i64, identifier: &str) -> Outcome {
        let card = self.formatter.create_message(identifier).await;
        info!(chat_id, %identifier, found = card.movie.is_some(), "movie looked up");
        Outcome::enter(
            State::Second { movie: card.movie },
            vec![
                Outgoing::Send { text: card.text, keyboard: None },
                Outgoing::Send {
                    text: ADD_TO.to_string(),
                    keyboard: Some(self.config.second_keyboard.clone()),
                },
            ],
        )
    }

    async fn on_callback(&self, chat_id: i64, state: &State, data: &str) -> Result<Outcome, BotError> {
        let Some(token) = CallbackToken::parse(data) else {
            debug!(chat_id, token = %data, "unknown callback token dropped");
            return Ok(Outcome::ignored());
        };
        if state.stage() != Some(token.stage) {
            debug!(chat_id, %token, ?state, "callback token for another stage dropped");
            return Ok(Outcome::ignored());
        }

        let text = match (state, token.action) {
            (_, Action::Cancel) => FINISHED.to_string(),
            (State::First, Action::Search) => SEARCH_PROMPT.to_string(),
            (State::First, Action::Show(ListKind::WatchList)) => list_watchlist(self.lists.as_ref(), chat_id).await,
            (State::First, Action::Show(ListKind::Watched)) => list_watched(self.lists.as_ref(), chat_id).await,
            (State::Second { movie }, Action::Add(kind)) => self.add_to(chat_id, kind, movie.clone()).await?,
            _ => return Ok(Outcome::ignored()),
        };
        info!(chat_id, %token, "conversation finished");
        Ok(Outcome::end(text))
    }

    async fn add_to(&self, chat_id: i64, kind: ListKind, movie: Option<StoredMovie>) -> Result<String, BotError> {
        let Some(movie) = movie else {
            return Ok("Nothing to add: the movie was not found.".to_string());
        };
        let title = html_escape(&stored_title(&movie));
        let list = kind.heading();
        let text = match self.lists.add(chat_id, kind, movie).await? {
            AddOutcome::Added => format!("Added <b>{title}</b> to {list}."),
            AddOutcome::AlreadyPresent => format!("<b>{title}</b> is already on {list}."),
            AddOutcome::Moved { from } => format!("Moved <b>{title}</b> from {} to {list}.", from.heading()),
        };
        Ok(text)
    }
}
