// =============================================================================
// Sliding-Window Rate Limiter (C2)
// =============================================================================
//
// Every outbound broker call goes through this limiter before it touches the
// network. Capacity is N admissions per rolling 1-second window; paper
// trading defaults to N=5, live to N=20 (spec.md §4.2). Unlike the teacher's
// `binance::rate_limit::RateLimitTracker`, which tracks usage from response
// headers after the fact, this limiter gates admission *before* the request
// is sent — there is no header to read, so the broker gives us no signal
// short of the `EGW00201` rate-limit error code itself.
//
// The window (a deque of admission timestamps) lives behind a
// `parking_lot::Mutex` that is held only long enough to evict stale entries
// and decide whether to wait — never across the sleep itself, so a slow
// waiter never blocks others from checking in. FIFO ordering among waiters
// is provided by a ticket counter: each caller draws a ticket under the same
// lock it uses to inspect the window, and only proceeds once its ticket is
// the oldest outstanding one.
// =============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Minimum gap enforced between any two consecutive admissions, on top of
/// the window capacity check, so N events don't all land in the first
/// instant of a window and then stall for the rest of it.
fn min_spacing(capacity: usize) -> Duration {
    Duration::from_secs_f64(1.0 / capacity as f64)
}

struct Window {
    timestamps: VecDeque<Instant>,
    next_ticket: u64,
    next_to_serve: u64,
}

/// Sliding-window admission limiter, safe to share across tasks via `Arc`.
pub struct RateLimiter {
    capacity: usize,
    window: Mutex<Window>,
    turn: Notify,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rate limiter capacity must be positive");
        Self {
            capacity,
            window: Mutex::new(Window {
                timestamps: VecDeque::with_capacity(capacity),
                next_ticket: 0,
                next_to_serve: 0,
            }),
            turn: Notify::new(),
        }
    }

    /// Configured admission capacity (N per rolling 1-second window).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until admission is granted, enforcing both the sliding-window
    /// capacity and the minimum inter-admission spacing. FIFO among
    /// concurrent callers: whoever calls first is admitted first.
    pub async fn acquire(&self) {
        let ticket = {
            let mut w = self.window.lock();
            let t = w.next_ticket;
            w.next_ticket += 1;
            t
        };

        loop {
            {
                let w = self.window.lock();
                if w.next_to_serve == ticket {
                    break;
                }
            }
            self.turn.notified().await;
        }

        loop {
            let wait = {
                let mut w = self.window.lock();
                let now = Instant::now();
                evict_stale(&mut w.timestamps, now);

                if w.timestamps.len() < self.capacity {
                    let spacing_wait = w
                        .timestamps
                        .back()
                        .map(|last| min_spacing(self.capacity).saturating_sub(now.saturating_duration_since(*last)))
                        .unwrap_or_default();

                    if spacing_wait.is_zero() {
                        w.timestamps.push_back(now);
                        w.next_to_serve += 1;
                        trace!(window_len = w.timestamps.len(), "rate limiter admitted");
                        drop(w);
                        self.turn.notify_waiters();
                        return;
                    }
                    spacing_wait
                } else {
                    let oldest = *w.timestamps.front().expect("len >= capacity > 0");
                    let elapsed_since_oldest = now.saturating_duration_since(oldest);
                    Duration::from_secs_f64(1.0) - elapsed_since_oldest + Duration::from_millis(50)
                }
            };

            sleep(wait).await;
        }
    }
}

fn evict_stale(timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = timestamps.front() {
        if now.saturating_duration_since(*front) > Duration::from_secs_f64(1.0) {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_capacity_immediately() {
        let limiter = Arc::new(RateLimiter::new(5));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        // Spacing (1/5s = 200ms) is still enforced between each admission,
        // so 5 admissions span 4 gaps of ~200ms, not zero time.
        assert!(Instant::now() - start >= Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_admission_waits_for_window_to_roll() {
        let limiter = Arc::new(RateLimiter::new(5));
        for _ in 0..5 {
            limiter.acquire().await;
        }
        let before = Instant::now();
        limiter.acquire().await;
        let elapsed = Instant::now() - before;
        assert!(elapsed >= Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_capacity_in_any_one_second_window() {
        let limiter = Arc::new(RateLimiter::new(5));
        let mut admissions = Vec::new();
        for _ in 0..20 {
            limiter.acquire().await;
            admissions.push(Instant::now());
        }

        for i in 0..admissions.len() {
            let window_start = admissions[i];
            let count = admissions
                .iter()
                .filter(|&&t| t >= window_start && t < window_start + Duration::from_secs_f64(1.0))
                .count();
            assert!(count <= 5, "window starting at admission {i} had {count} admissions");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_order_among_concurrent_waiters() {
        let limiter = Arc::new(RateLimiter::new(1));
        limiter.acquire().await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().push(i);
            }));
        }
        // Give each task a chance to register its ticket before advancing time.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
