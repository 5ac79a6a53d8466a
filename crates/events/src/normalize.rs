//! Turning transport payloads into canonical events.

use {
    selfbot_common::{ChatKind, Direction, Event, EventKind, RawEvent},
    serde_json::Value,
};

/// Classifies a raw transport payload.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &RawEvent) -> Event;
}

/// Understands Telegram-style update objects and flat event descriptors.
///
/// An update carries exactly one of `message`, `edited_message`,
/// `channel_post`, `callback_query` or `inline_query`. A flat descriptor has an
/// `eventType` key plus optional `text`, `userId`, `chatId`, `chatType` and
/// `outgoing`. Anything else becomes [`EventKind::Raw`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonNormalizer;

/// Service-message keys, checked in order.
const SERVICE_KEYS: &[(&str, EventKind)] = &[
    ("new_chat_members", EventKind::NewChatMember),
    ("left_chat_member", EventKind::LeftChatMember),
    ("new_chat_title", EventKind::NewChatTitle),
    ("new_chat_photo", EventKind::NewChatPhoto),
    ("delete_chat_photo", EventKind::DeleteChatPhoto),
    ("group_chat_created", EventKind::GroupChatCreated),
];

impl Normalizer for JsonNormalizer {
    fn normalize(&self, raw: &RawEvent) -> Event {
        let payload = &raw.payload;
        let event = if let Some(kind) = payload.get("eventType").and_then(Value::as_str) {
            flat(kind, payload)
        } else if let Some(msg) = payload.get("message").or_else(|| payload.get("channel_post")) {
            Some(message(msg, false))
        } else if let Some(msg) = payload.get("edited_message") {
            Some(message(msg, true))
        } else if let Some(query) = payload.get("callback_query") {
            Some(callback_query(query))
        } else {
            payload.get("inline_query").map(inline_query)
        };

        event
            .unwrap_or_else(|| Event::new(EventKind::Raw))
            .with_payload(payload.clone())
    }
}

fn flat(kind: &str, payload: &Value) -> Option<Event> {
    let kind = kind.parse::<EventKind>().ok()?;
    let mut event = Event::new(kind);
    event.text = str_field(payload, "text");
    event.user_id = payload.get("userId").and_then(Value::as_i64);
    event.chat_id = payload.get("chatId").and_then(Value::as_i64);
    event.chat_kind = payload
        .get("chatType")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok());
    event.direction = direction(payload);
    Some(event)
}

fn message(msg: &Value, edited: bool) -> Event {
    let kind = if edited {
        EventKind::EditedMessage
    } else {
        SERVICE_KEYS
            .iter()
            .find(|(key, _)| {
                msg.get(*key)
                    .is_some_and(|v| !v.is_null() && v != &Value::Bool(false))
            })
            .map_or(EventKind::Message, |(_, kind)| *kind)
    };

    let mut event = Event::new(kind);
    event.text = str_field(msg, "text").or_else(|| str_field(msg, "caption"));
    event.user_id = sender(msg);
    apply_chat(&mut event, msg.get("chat"));
    event.direction = direction(msg);
    event
}

fn callback_query(query: &Value) -> Event {
    let mut event = Event::new(EventKind::CallbackQuery);
    event.text = str_field(query, "data");
    event.user_id = sender(query);
    apply_chat(&mut event, query.get("message").and_then(|m| m.get("chat")));
    event
}

fn inline_query(query: &Value) -> Event {
    let mut event = Event::new(EventKind::InlineQuery);
    event.text = str_field(query, "query");
    event.user_id = sender(query);
    event
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn sender(v: &Value) -> Option<i64> {
    v.get("from").and_then(|f| f.get("id")).and_then(Value::as_i64)
}

fn apply_chat(event: &mut Event, chat: Option<&Value>) {
    let Some(chat) = chat else {
        return;
    };
    event.chat_id = chat.get("id").and_then(Value::as_i64);
    event.chat_kind = chat
        .get("type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<ChatKind>().ok());
}

fn direction(v: &Value) -> Direction {
    if v.get("outgoing").and_then(Value::as_bool).unwrap_or(false) {
        Direction::Outgoing
    } else {
        Direction::Incoming
    }
}
