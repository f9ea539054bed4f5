//! Dialogue configuration: which messages start a lookup and which buttons each state shows.

use crate::dialogue::{Action, CallbackToken, Stage};
use crate::lists::ListKind;
use std::collections::HashSet;

pub const SEARCH: &str = "🔍 Search";
pub const WATCHED: &str = "👀 Watched";
pub const WATCH_LIST: &str = "🎬 Watch List";
pub const CANCEL: &str = "❌ Cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonKind {
    Callback(CallbackToken),
    /// Opens inline mode in the current chat with an empty query.
    SwitchInlineCurrentChat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub kind: ButtonKind,
}

impl Button {
    pub fn callback(label: &str, stage: Stage, action: Action) -> Self {
        Self { label: label.to_string(), kind: ButtonKind::Callback(CallbackToken { stage, action }) }
    }

    pub fn inline_search(label: &str) -> Self {
        Self { label: label.to_string(), kind: ButtonKind::SwitchInlineCurrentChat }
    }
}

/// Rows of buttons, transport-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    #[cfg(test)]
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    #[cfg(test)]
    pub fn labels(&self) -> Vec<&str> {
        self.buttons().map(|b| b.label.as_str()).collect()
    }

    #[cfg(test)]
    pub fn tokens(&self) -> Vec<CallbackToken> {
        self.buttons()
            .filter_map(|b| match &b.kind {
                ButtonKind::Callback(t) => Some(*t),
                ButtonKind::SwitchInlineCurrentChat => None,
            })
            .collect()
    }
}

/// Which inbound text counts as a movie to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Text posted through inline mode of one of these bots (usernames without `@`).
    ViaBot(HashSet<String>),
    /// Any text that is not a command.
    PlainText,
}

impl Trigger {
    pub fn matches(&self, text: &str, via_bot: Option<&str>) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        match self {
            Trigger::ViaBot(names) => via_bot.is_some_and(|u| names.iter().any(|n| n.eq_ignore_ascii_case(u))),
            Trigger::PlainText => !text.starts_with('/'),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialogueConfig {
    pub trigger: Trigger,
    /// Whether `/list` opens the list menu.
    pub list_command: bool,
    pub start_keyboard: Keyboard,
    pub list_keyboard: Keyboard,
    pub second_keyboard: Keyboard,
}

impl DialogueConfig {
    /// Search happens in inline mode; the chosen result is posted via the bot and picked up here.
    pub fn inline<I, S>(bot_usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let usernames = bot_usernames.into_iter().map(Into::into).collect();
        Self {
            trigger: Trigger::ViaBot(usernames),
            list_command: true,
            start_keyboard: Keyboard::new(vec![
                vec![Button::inline_search(SEARCH)],
                vec![
                    Button::callback(WATCH_LIST, Stage::First, Action::Show(ListKind::WatchList)),
                    Button::callback(WATCHED, Stage::First, Action::Show(ListKind::Watched)),
                ],
            ]),
            list_keyboard: Keyboard::new(vec![
                vec![
                    Button::callback(WATCH_LIST, Stage::First, Action::Show(ListKind::WatchList)),
                    Button::callback(WATCHED, Stage::First, Action::Show(ListKind::Watched)),
                ],
                vec![Button::callback(CANCEL, Stage::First, Action::Cancel)],
            ]),
            second_keyboard: second_keyboard(),
        }
    }

    /// Every non-command text message is a lookup.
    pub fn plain_text() -> Self {
        Self {
            trigger: Trigger::PlainText,
            list_command: false,
            start_keyboard: Keyboard::new(vec![
                vec![Button::callback(SEARCH, Stage::First, Action::Search)],
                vec![
                    Button::callback(WATCHED, Stage::First, Action::Show(ListKind::Watched)),
                    Button::callback(WATCH_LIST, Stage::First, Action::Show(ListKind::WatchList)),
                ],
            ]),
            list_keyboard: Keyboard::default(),
            second_keyboard: second_keyboard(),
        }
    }
}

fn second_keyboard() -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::callback(WATCH_LIST, Stage::Second, Action::Add(ListKind::WatchList)),
            Button::callback(WATCHED, Stage::Second, Action::Add(ListKind::Watched)),
        ],
        vec![Button::callback(CANCEL, Stage::Second, Action::Cancel)],
    ])
}
