// =============================================================================
// Alert Dispatch — rate-limited notification plumbing (C12)
// =============================================================================
//
// The concrete notification channels (Telegram formatting, etc.) are out of
// scope per spec.md §1 — only the dispatch interface the rest of the core
// talks to is specified here, grounded on the shape of the original
// `core/notification/notifier.py::BaseNotifier` (level filtering, a
// min-interval between sends of the same kind, a result the engine can log).
//
// An `AlertSink` is anything that can receive an `Alert`; `AlertDispatcher`
// wraps one sink with rate limiting so a storm of identical signals (e.g. a
// stop-loss re-evaluated every monitor tick) doesn't spam the channel.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

/// Severity of an alert, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

/// A single alert event. `kind` is a stable dedup/rate-limit key (e.g.
/// `"stop_loss:005930"`); `message` is the human-readable body.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub kind: String,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Anything that can receive a dispatched alert. Implementations for
/// Telegram/Slack/etc. live outside the core; tests use `LoggingSink`.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// A sink that just logs through `tracing` at a level matching the alert's
/// severity. Useful as the default sink and in tests.
pub struct LoggingSink;

impl AlertSink for LoggingSink {
    fn notify(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Info => debug!(kind = %alert.kind, "{}", alert.message),
            AlertLevel::Warning => warn!(kind = %alert.kind, "{}", alert.message),
            AlertLevel::Error | AlertLevel::Critical => {
                tracing::error!(kind = %alert.kind, "{}", alert.message)
            }
        }
    }
}

/// Dispatches alerts to a sink, suppressing repeats of the same `kind`
/// within `min_interval`. Held behind `Arc` by callers that need to share
/// one dispatcher across the sell engine, the monitor, and the REST client.
pub struct AlertDispatcher {
    sink: Box<dyn AlertSink>,
    min_interval: Duration,
    min_level: AlertLevel,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl AlertDispatcher {
    pub fn new(sink: Box<dyn AlertSink>, min_interval: Duration, min_level: AlertLevel) -> Self {
        Self {
            sink,
            min_interval,
            min_level,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch `alert`, dropping it silently if below `min_level` or if an
    /// alert with the same `kind` was sent within `min_interval`. Returns
    /// `true` if it was actually forwarded to the sink.
    pub fn dispatch(&self, alert: Alert) -> bool {
        if alert.level < self.min_level {
            return false;
        }

        let now = Instant::now();
        let mut last_sent = self.last_sent.lock();
        if let Some(last) = last_sent.get(&alert.kind) {
            if now.duration_since(*last) < self.min_interval {
                return false;
            }
        }
        last_sent.insert(alert.kind.clone(), now);
        drop(last_sent);

        self.sink.notify(&alert);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);
    impl AlertSink for CountingSink {
        fn notify(&self, _alert: &Alert) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn suppresses_repeats_within_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(
            Box::new(CountingSink(count.clone())),
            Duration::from_secs(60),
            AlertLevel::Info,
        );

        assert!(dispatcher.dispatch(Alert::new(AlertLevel::Warning, "stop_loss:005930", "a")));
        assert!(!dispatcher.dispatch(Alert::new(AlertLevel::Warning, "stop_loss:005930", "b")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_kinds_are_independent() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(
            Box::new(CountingSink(count.clone())),
            Duration::from_secs(60),
            AlertLevel::Info,
        );

        assert!(dispatcher.dispatch(Alert::new(AlertLevel::Info, "stop_loss:005930", "a")));
        assert!(dispatcher.dispatch(Alert::new(AlertLevel::Info, "stop_loss:000660", "b")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn below_min_level_is_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(
            Box::new(CountingSink(count.clone())),
            Duration::from_secs(60),
            AlertLevel::Error,
        );

        assert!(!dispatcher.dispatch(Alert::new(AlertLevel::Info, "x", "y")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
