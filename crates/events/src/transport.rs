//! The chat transport seam.
//!
//! The runtime never talks to a chat network directly. A transport delivers
//! raw updates through a [`RawEventSink`] and sends text on request.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    selfbot_common::RawEvent,
    serde::{Deserialize, Serialize},
};

/// Callback receiving every inbound update.
pub type RawEventSink = Arc<dyn Fn(RawEvent) + Send + Sync>;

/// Optional delivery parameters for [`TransportAdapter::send_message`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

impl SendOptions {
    pub fn reply_to(message_id: i64) -> Self {
        Self {
            reply_to: Some(message_id),
            ..Default::default()
        }
    }
}

/// A chat network connection.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> anyhow::Result<()>;

    async fn disconnect(&self) -> anyhow::Result<()>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> anyhow::Result<()>;

    /// Install the sink for inbound updates, replacing any previous one.
    fn on_raw_event(&self, sink: RawEventSink);
}

// ── MemoryTransport ─────────────────────────────────────────────────────────

/// A message recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub options: SendOptions,
}

/// In-process transport: records sends and lets callers inject updates.
#[derive(Default)]
pub struct MemoryTransport {
    sink: Mutex<Option<RawEventSink>>,
    sent: Mutex<Vec<SentMessage>>,
    connected: Mutex<bool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an update to the installed sink. Returns false without one.
    pub fn inject(&self, raw: RawEvent) -> bool {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match sink {
            Some(sink) => {
                sink(raw);
                true
            },
            None => false,
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TransportAdapter for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> anyhow::Result<()> {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner()) = false;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                chat_id,
                text: text.to_string(),
                options,
            });
        Ok(())
    }

    fn on_raw_event(&self, sink: RawEventSink) {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }
}
