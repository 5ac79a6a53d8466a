//! Event dispatch: normalization, filtered subscriptions, and middleware.
//!
//! The dispatcher owns every subscription unconditionally. A transport is
//! bound later with [`EventDispatcher::attach_transport`]; until then events
//! can still be injected with [`EventDispatcher::dispatch_event`].

pub mod dispatcher;
pub mod filter;
pub mod handler;
pub mod middleware;
pub mod normalize;
pub mod transport;

pub use {
    dispatcher::{Dispatched, EventDispatcher, Outcome, SubscriptionId, SubscriptionInfo},
    filter::EventFilter,
    handler::{EventHandler, FnHandler, handler_fn},
    middleware::{LoggingMiddleware, Middleware, RateLimitMiddleware},
    normalize::{JsonNormalizer, Normalizer},
    transport::{MemoryTransport, RawEventSink, SendOptions, SentMessage, TransportAdapter},
};
