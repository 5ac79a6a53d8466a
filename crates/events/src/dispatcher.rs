//! Subscription registry and event fan-out.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    futures::FutureExt,
    selfbot_common::{Event, EventKind, RawEvent},
    serde_json::Value,
    tokio::task::JoinHandle,
    tracing::{debug, error, info, warn},
};

use crate::{
    filter::EventFilter,
    handler::EventHandler,
    middleware::Middleware,
    normalize::{JsonNormalizer, Normalizer},
    transport::{RawEventSink, TransportAdapter},
};

pub type SubscriptionId = u64;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
    owner: Option<String>,
}

/// Read-only view of a registered subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub kind: EventKind,
    pub filter: EventFilter,
    pub owner: Option<String>,
}

/// How a single handler invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A middleware returned `false` from `before_event`.
    Vetoed { middleware: String },
    /// The handler ran; this is its result after every `after_event`.
    Completed(Option<Value>),
    /// The invocation panicked or was cancelled.
    Panicked,
}

/// Handler invocations spawned by one dispatch.
///
/// Dropping this detaches the invocations; they still run to completion.
pub struct Dispatched {
    event: Arc<Event>,
    handles: Vec<JoinHandle<Outcome>>,
}

impl Dispatched {
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Number of subscriptions the event matched.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every invocation, in subscription order.
    pub async fn join(self) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            outcomes.push(handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "handler task did not complete");
                Outcome::Panicked
            }));
        }
        outcomes
    }
}

/// Routes normalized events to matching subscriptions through the global
/// middleware chain.
pub struct EventDispatcher {
    normalizer: Arc<dyn Normalizer>,
    subscriptions: RwLock<Vec<Subscription>>,
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
    next_id: AtomicU64,
    transport: RwLock<Option<Arc<dyn TransportAdapter>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::with_normalizer(Arc::new(JsonNormalizer))
    }

    pub fn with_normalizer(normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            normalizer,
            subscriptions: RwLock::new(Vec::new()),
            middlewares: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            transport: RwLock::new(None),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Register a handler for `kind` events that satisfy `filter`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
        filter: EventFilter,
        owner: Option<&str>,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription {
                id,
                kind,
                filter,
                handler,
                owner: owner.map(str::to_string),
            });
        debug!(id, kind = %kind, owner = ?owner, "subscription added");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }

    /// Drop every subscription owned by `owner`.
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.owner.as_deref() != Some(owner));
        let removed = before - subs.len();
        if removed > 0 {
            debug!(owner, removed, "owner subscriptions removed");
        }
        removed
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| SubscriptionInfo {
                id: s.id,
                kind: s.kind,
                filter: s.filter.clone(),
                owner: s.owner.clone(),
            })
            .collect()
    }

    // ── Middleware ──────────────────────────────────────────────────────

    pub fn register_middleware(&self, middleware: Arc<dyn Middleware>) {
        info!(middleware = middleware.name(), "middleware registered");
        self.middlewares
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(middleware);
    }

    /// Remove a middleware by identity, keeping the order of the rest.
    pub fn remove_middleware(&self, middleware: &Arc<dyn Middleware>) -> bool {
        let mut mws = self.middlewares.write().unwrap_or_else(|e| e.into_inner());
        match mws.iter().position(|m| Arc::ptr_eq(m, middleware)) {
            Some(idx) => {
                mws.remove(idx);
                true
            },
            None => false,
        }
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middlewares
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    // ── Transport ───────────────────────────────────────────────────────

    /// Bind a transport: every raw update it delivers is dispatched.
    ///
    /// Subscriptions made before this call are unaffected.
    pub fn attach_transport(self: &Arc<Self>, transport: Arc<dyn TransportAdapter>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let sink: RawEventSink = Arc::new(move |raw| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.dispatch(raw);
            }
        });
        transport.on_raw_event(sink);
        info!(transport = transport.name(), "transport attached");
        *self.transport.write().unwrap_or_else(|e| e.into_inner()) = Some(transport);
    }

    pub fn transport(&self) -> Option<Arc<dyn TransportAdapter>> {
        self.transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    /// Normalize and dispatch a raw transport update.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, raw: RawEvent) -> Dispatched {
        let event = self.normalizer.normalize(&raw);
        self.dispatch_event(event)
    }

    /// Spawn one invocation per matching subscription.
    pub fn dispatch_event(&self, event: Event) -> Dispatched {
        let event = Arc::new(event);
        let matched: Vec<Subscription> = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.kind == event.kind && s.filter.matches(&event))
            .cloned()
            .collect();
        let middlewares: Arc<[Arc<dyn Middleware>]> = self
            .middlewares
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();

        debug!(kind = %event.kind, matched = matched.len(), "dispatching event");

        let handles = matched
            .into_iter()
            .map(|sub| {
                let event = Arc::clone(&event);
                let middlewares = Arc::clone(&middlewares);
                tokio::spawn(async move {
                    let id = sub.id;
                    match AssertUnwindSafe(invoke(sub, event, &middlewares))
                        .catch_unwind()
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            error!(subscription = id, "event handler panicked");
                            Outcome::Panicked
                        },
                    }
                })
            })
            .collect();

        Dispatched { event, handles }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn invoke(
    sub: Subscription,
    event: Arc<Event>,
    middlewares: &[Arc<dyn Middleware>],
) -> Outcome {
    for mw in middlewares {
        match mw.before_event(&event).await {
            Ok(true) => {},
            Ok(false) => {
                debug!(
                    middleware = mw.name(),
                    subscription = sub.id,
                    kind = %event.kind,
                    "event vetoed by middleware"
                );
                return Outcome::Vetoed {
                    middleware: mw.name().to_string(),
                };
            },
            Err(e) => {
                warn!(middleware = mw.name(), error = %e, "before_event failed, continuing");
            },
        }
    }

    let mut result = match sub.handler.handle(Arc::clone(&event)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(
                subscription = sub.id,
                owner = ?sub.owner,
                kind = %event.kind,
                error = %e,
                "event handler failed"
            );
            None
        },
    };

    for mw in middlewares.iter().rev() {
        match mw.after_event(&event, result.clone()).await {
            Ok(next) => result = next,
            Err(e) => {
                warn!(middleware = mw.name(), error = %e, "after_event failed, keeping result");
            },
        }
    }

    Outcome::Completed(result)
}
