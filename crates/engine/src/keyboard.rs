//! Inline keyboard data. The serialized shape is exactly Telegram's
//! `InlineKeyboardMarkup`, so the notifier can pass it through untouched.

use serde::{Deserialize, Serialize};

use goldie_common::types::{ChatId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub inline_keyboard: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self {
            inline_keyboard: rows,
        }
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.inline_keyboard
    }

    /// Every button, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.inline_keyboard.iter().flatten()
    }
}

/// Rendered text plus optional keyboard, ready to be sent or edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

/// A button press as seen by the protocols: who pressed what on which message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub id: String,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub data: String,
}
