//! Structured subscription predicates.

use {
    selfbot_common::{ChatKind, Event},
    serde::{Deserialize, Deserializer, Serialize},
};

/// A conjunctive predicate over a normalized [`Event`].
///
/// Every key that is present must hold. `incoming: false` and
/// `outgoing: false` impose no constraint. Single values are accepted
/// wherever a list is expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub text_starts_with: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<ChatKind>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<bool>,
}

impl EventFilter {
    /// A filter that matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text_is(mut self, text: impl Into<String>) -> Self {
        self.text.get_or_insert_with(Vec::new).push(text.into());
        self
    }

    #[must_use]
    pub fn text_starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.text_starts_with
            .get_or_insert_with(Vec::new)
            .push(prefix.into());
        self
    }

    #[must_use]
    pub fn chat_type(mut self, kind: ChatKind) -> Self {
        self.chat_type = Some(kind);
        self
    }

    #[must_use]
    pub fn from_user(mut self, user_id: i64) -> Self {
        self.user_id.get_or_insert_with(Vec::new).push(user_id);
        self
    }

    #[must_use]
    pub fn in_chat(mut self, chat_id: i64) -> Self {
        self.chat_id.get_or_insert_with(Vec::new).push(chat_id);
        self
    }

    #[must_use]
    pub fn incoming(mut self) -> Self {
        self.incoming = Some(true);
        self
    }

    #[must_use]
    pub fn outgoing(mut self) -> Self {
        self.outgoing = Some(true);
        self
    }

    /// Evaluate the predicate.
    pub fn matches(&self, event: &Event) -> bool {
        let text = event.text.as_deref();

        if let Some(wanted) = &self.text
            && !text.is_some_and(|t| wanted.iter().any(|w| w == t))
        {
            return false;
        }
        if let Some(prefixes) = &self.text_starts_with
            && !text.is_some_and(|t| prefixes.iter().any(|p| t.starts_with(p.as_str())))
        {
            return false;
        }
        if let Some(kind) = self.chat_type
            && event.chat_kind != Some(kind)
        {
            return false;
        }
        if let Some(users) = &self.user_id
            && !event.user_id.is_some_and(|u| users.contains(&u))
        {
            return false;
        }
        if let Some(chats) = &self.chat_id
            && !event.chat_id.is_some_and(|c| chats.contains(&c))
        {
            return false;
        }
        if self.incoming == Some(true) && event.is_outgoing() {
            return false;
        }
        if self.outgoing == Some(true) && !event.is_outgoing() {
            return false;
        }
        true
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(
        Option::<OneOrMany<T>>::deserialize(deserializer)?.map(|v| match v {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }),
    )
}
