//! Event handler trait.

use std::{future::Future, sync::Arc};

use {async_trait::async_trait, selfbot_common::Event, serde_json::Value};

/// Receives events selected by a subscription.
///
/// The returned value is passed through every middleware's `after_event`.
/// Errors are logged by the dispatcher and turned into "no result".
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<Option<Value>>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send,
{
    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<Option<Value>> {
        (self.f)(event).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
