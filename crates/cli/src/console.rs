//! Stdin/stdout transport for running the runtime locally.

use std::sync::Mutex;

use {
    async_trait::async_trait,
    selfbot_common::RawEvent,
    selfbot_events::{RawEventSink, SendOptions, TransportAdapter},
    serde_json::json,
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

/// Chat id used for every console message.
pub const CONSOLE_CHAT_ID: i64 = 0;

/// Every stdin line becomes an incoming private message; sends are printed.
#[derive(Default)]
pub struct ConsoleTransport {
    sink: Mutex<Option<RawEventSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The update a console line is delivered as. Blank lines yield nothing.
pub fn line_event(line: &str) -> Option<RawEvent> {
    let text = line.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return None;
    }
    Some(RawEvent::new(json!({
        "eventType": "message",
        "text": text,
        "chatId": CONSOLE_CHAT_ID,
        "chatType": "private",
    })))
}

#[async_trait]
impl TransportAdapter for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let Some(sink) = self.sink.lock().unwrap_or_else(|e| e.into_inner()).clone() else {
            anyhow::bail!("console transport connected before a sink was installed");
        };
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(raw) = line_event(&line) {
                            sink(raw);
                        }
                    },
                    Ok(None) => {
                        debug!("console input closed");
                        break;
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to read console input");
                        break;
                    },
                }
            }
        });
        if let Some(old) = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            old.abort();
        }
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _options: SendOptions,
    ) -> anyhow::Result<()> {
        println!("[chat {chat_id}] {text}");
        Ok(())
    }

    fn on_raw_event(&self, sink: RawEventSink) {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }
}
