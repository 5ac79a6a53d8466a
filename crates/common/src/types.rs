//! Canonical event model shared by the transport, dispatcher, and plugins.

use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::Error;

// ── EventKind ───────────────────────────────────────────────────────────────

/// Kinds of events a subscription can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    EditedMessage,
    CallbackQuery,
    InlineQuery,
    NewChatMember,
    LeftChatMember,
    NewChatTitle,
    NewChatPhoto,
    DeleteChatPhoto,
    GroupChatCreated,
    /// Anything the normalizer could not classify.
    Raw,
}

impl EventKind {
    /// All variants, for iteration.
    pub const ALL: &'static [EventKind] = &[
        Self::Message,
        Self::EditedMessage,
        Self::CallbackQuery,
        Self::InlineQuery,
        Self::NewChatMember,
        Self::LeftChatMember,
        Self::NewChatTitle,
        Self::NewChatPhoto,
        Self::DeleteChatPhoto,
        Self::GroupChatCreated,
        Self::Raw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::CallbackQuery => "callback_query",
            Self::InlineQuery => "inline_query",
            Self::NewChatMember => "new_chat_member",
            Self::LeftChatMember => "left_chat_member",
            Self::NewChatTitle => "new_chat_title",
            Self::NewChatPhoto => "new_chat_photo",
            Self::DeleteChatPhoto => "delete_chat_photo",
            Self::GroupChatCreated => "group_chat_created",
            Self::Raw => "raw",
        }
    }

    /// Whether events of this kind originate from a user action that counts
    /// against per-user rate limits.
    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::Message | Self::CallbackQuery | Self::InlineQuery
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::unknown_variant("event kind", s))
    }
}

// ── ChatKind / Direction ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        };
        f.write_str(s)
    }
}

impl FromStr for ChatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            "supergroup" => Ok(Self::Supergroup),
            "channel" => Ok(Self::Channel),
            other => Err(Error::unknown_variant("chat type", other)),
        }
    }
}

/// Whether the account itself sent the message or received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Incoming,
    Outgoing,
}

// ── RawEvent ────────────────────────────────────────────────────────────────

/// An update exactly as the transport delivered it, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub payload: Value,
}

impl RawEvent {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

impl From<Value> for RawEvent {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

// ── Event ───────────────────────────────────────────────────────────────────

/// A normalized event, the only shape handlers and middleware ever see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_kind: Option<ChatKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub direction: Direction,
    /// The original transport payload.
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            text: None,
            chat_id: None,
            chat_kind: None,
            user_id: None,
            direction: Direction::Incoming,
            payload: Value::Null,
        }
    }

    /// Incoming text message, the most common event in tests and plugins.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(EventKind::Message).with_text(text)
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_chat(mut self, chat_id: i64, chat_kind: ChatKind) -> Self {
        self.chat_id = Some(chat_id);
        self.chat_kind = Some(chat_kind);
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }
}
