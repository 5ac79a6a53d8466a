//! Global middleware run around every handler invocation.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    selfbot_common::Event,
    serde_json::Value,
    tracing::{debug, info, warn},
};

// ── Middleware trait ────────────────────────────────────────────────────────

/// Hooks that wrap each handler invocation.
///
/// `before_event` runs in registration order; returning `false` vetoes the
/// invocation, skipping both the handler and every `after_event`. Errors from
/// either hook are logged and ignored.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn before_event(&self, _event: &Event) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Runs in reverse registration order and may replace the result.
    async fn after_event(
        &self,
        _event: &Event,
        result: Option<Value>,
    ) -> anyhow::Result<Option<Value>> {
        Ok(result)
    }
}

// ── RateLimitMiddleware ─────────────────────────────────────────────────────

const CLEANUP_EVERY_EVENTS: u64 = 512;

/// Per-user sliding-window limiter for user-initiated events.
///
/// Events without a sender and non-interactive kinds always pass. Rejected
/// events do not count against the window. Users whose window has emptied
/// are dropped every few hundred events.
pub struct RateLimitMiddleware {
    max_events: usize,
    window: Duration,
    hits: Mutex<HashMap<i64, VecDeque<Instant>>>,
    events_seen: AtomicU64,
}

impl RateLimitMiddleware {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            hits: Mutex::new(HashMap::new()),
            events_seen: AtomicU64::new(0),
        }
    }

    fn admit(&self, user_id: i64, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        self.cleanup_if_needed(&mut hits, now);

        let window = hits.entry(user_id).or_default();
        while let Some(&oldest) = window.front()
            && now.saturating_duration_since(oldest) >= self.window
        {
            window.pop_front();
        }
        if window.len() >= self.max_events {
            if window.is_empty() {
                hits.remove(&user_id);
            }
            return false;
        }
        window.push_back(now);
        true
    }

    fn cleanup_if_needed(&self, hits: &mut HashMap<i64, VecDeque<Instant>>, now: Instant) {
        let seen = self.events_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(CLEANUP_EVERY_EVENTS) {
            return;
        }
        let before = hits.len();
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < self.window)
        });
        let dropped = before - hits.len();
        if dropped > 0 {
            debug!(dropped, tracked = hits.len(), "rate limit windows expired");
        }
    }

    /// Number of users with a live window.
    pub fn tracked_users(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for RateLimitMiddleware {
    /// Five events per three seconds.
    fn default() -> Self {
        Self::new(5, Duration::from_secs(3))
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn before_event(&self, event: &Event) -> anyhow::Result<bool> {
        if !event.kind.is_user_initiated() {
            return Ok(true);
        }
        let Some(user_id) = event.user_id else {
            return Ok(true);
        };
        let admitted = self.admit(user_id, Instant::now());
        if !admitted {
            warn!(user_id, kind = %event.kind, "rate limit exceeded, dropping event");
        }
        Ok(admitted)
    }
}

// ── LoggingMiddleware ───────────────────────────────────────────────────────

/// Logs receipt and completion of every event.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_event(&self, event: &Event) -> anyhow::Result<bool> {
        info!(
            kind = %event.kind,
            user_id = ?event.user_id,
            chat_id = ?event.chat_id,
            "event received"
        );
        Ok(true)
    }

    async fn after_event(
        &self,
        event: &Event,
        result: Option<Value>,
    ) -> anyhow::Result<Option<Value>> {
        info!(kind = %event.kind, has_result = result.is_some(), "event processed");
        Ok(result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        selfbot_common::EventKind,
        serde_json::json,
    };

    #[test]
    fn admits_up_to_limit_within_window() {
        let mw = RateLimitMiddleware::new(3, Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(mw.admit(1, t0));
        assert!(mw.admit(1, t0 + Duration::from_millis(500)));
        assert!(mw.admit(1, t0 + Duration::from_secs(1)));
        assert!(!mw.admit(1, t0 + Duration::from_secs(2)));
        // Other users have their own window.
        assert!(mw.admit(2, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn window_slides() {
        let mw = RateLimitMiddleware::new(2, Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(mw.admit(1, t0));
        assert!(mw.admit(1, t0 + Duration::from_secs(1)));
        assert!(!mw.admit(1, t0 + Duration::from_secs(2)));
        // The first hit has aged out; the rejected one never counted.
        assert!(mw.admit(1, t0 + Duration::from_secs(3)));
        assert!(!mw.admit(1, t0 + Duration::from_millis(3_500)));
        assert!(mw.admit(1, t0 + Duration::from_secs(4)));
    }

    #[test]
    fn idle_users_are_forgotten() {
        let mw = RateLimitMiddleware::new(usize::MAX, Duration::from_secs(3));
        let t0 = Instant::now();
        for user in 1..=100 {
            assert!(mw.admit(user, t0));
        }
        assert_eq!(mw.tracked_users(), 100);

        let later = t0 + Duration::from_secs(10);
        for _ in 0..CLEANUP_EVERY_EVENTS {
            assert!(mw.admit(500, later));
        }
        assert_eq!(mw.tracked_users(), 1);
    }

    #[test]
    fn zero_limit_keeps_no_state() {
        let mw = RateLimitMiddleware::new(0, Duration::from_secs(3));
        assert!(!mw.admit(1, Instant::now()));
        assert_eq!(mw.tracked_users(), 0);
    }

    #[tokio::test]
    async fn only_user_initiated_kinds_are_limited() {
        let mw = RateLimitMiddleware::new(1, Duration::from_secs(60));
        let msg = Event::message("hi").with_user(9);
        assert!(mw.before_event(&msg).await.unwrap());
        assert!(!mw.before_event(&msg).await.unwrap());

        let callback = Event::new(EventKind::CallbackQuery).with_user(9);
        assert!(!mw.before_event(&callback).await.unwrap());

        let edit = Event::new(EventKind::EditedMessage).with_user(9);
        assert!(mw.before_event(&edit).await.unwrap());
        let anonymous = Event::message("hi");
        assert!(mw.before_event(&anonymous).await.unwrap());
    }

    #[tokio::test]
    async fn logging_passes_result_through() {
        let mw = LoggingMiddleware;
        let event = Event::message("hi");
        assert!(mw.before_event(&event).await.unwrap());
        let out = mw.after_event(&event, Some(json!(1))).await.unwrap();
        assert_eq!(out, Some(json!(1)));
    }
}
