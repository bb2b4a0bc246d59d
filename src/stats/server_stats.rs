//! Per-server rolling statistics and circuit-breaker state.
//!
//! # Responsibilities
//! - Count dispatched and in-flight requests (atomics only)
//! - Record response times into a window and a lifetime distribution
//! - Track successive connection failures and derive the blackout window
//!
//! # Design Decisions
//! - The active count is clamped at zero and forced to zero when stale
//! - The blackout deadline is derived on every read, never stored
//! - Dispatch hands out an RAII guard so dropped futures cannot leak the active count

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::blackout_duration;
use crate::stats::distribution::{DataBuffer, Distribution, MeasuredRate};
use crate::stats::now_millis;

/// Bucket size for the requests-in-window rate.
const REQUEST_RATE_WINDOW_MS: u64 = 5 * 60 * 1000;

#[derive(Debug)]
struct ResponseTimes {
    window: DataBuffer,
    lifetime: Distribution,
}

/// Statistics for one server, shared by every submission that targets it.
#[derive(Debug)]
pub struct ServerStats {
    server_id: String,
    config: Arc<CircuitBreakerConfig>,

    total_requests: AtomicU64,
    active_requests: AtomicU64,
    last_active_change_ms: AtomicU64,
    first_connection_ms: AtomicU64,
    last_accessed_ms: AtomicU64,

    successive_connection_failures: AtomicU32,
    last_connection_failure_ms: AtomicU64,
    failure_count: AtomicU64,

    requests_in_window: MeasuredRate,
    response_times: Mutex<ResponseTimes>,
}

impl ServerStats {
    pub fn new(
        server_id: impl Into<String>,
        config: Arc<CircuitBreakerConfig>,
        window_size: usize,
    ) -> Self {
        let now = now_millis();
        Self {
            server_id: server_id.into(),
            config,
            total_requests: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
            last_active_change_ms: AtomicU64::new(now),
            first_connection_ms: AtomicU64::new(0),
            last_accessed_ms: AtomicU64::new(now),
            successive_connection_failures: AtomicU32::new(0),
            last_connection_failure_ms: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            requests_in_window: MeasuredRate::new(REQUEST_RATE_WINDOW_MS, now),
            response_times: Mutex::new(ResponseTimes {
                window: DataBuffer::new(window_size),
                lifetime: Distribution::new(),
            }),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    // --- Request accounting ---

    /// Count a dispatch and return a guard that ends it exactly once.
    pub fn begin_request(self: &Arc<Self>) -> ActiveRequestGuard {
        self.increment_active_requests();
        ActiveRequestGuard {
            stats: Some(self.clone()),
            started: Instant::now(),
        }
    }

    pub fn increment_active_requests(&self) {
        let now = now_millis();
        self.active_requests.fetch_add(1, Ordering::AcqRel);
        self.last_active_change_ms.store(now, Ordering::Release);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.requests_in_window.increment(now);
        let _ = self.first_connection_ms.compare_exchange(
            0,
            now,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
        self.touch(now);
    }

    /// Decrement, clamping at zero.
    pub fn decrement_active_requests(&self) {
        let _ = self
            .active_requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)));
        self.last_active_change_ms.store(now_millis(), Ordering::Release);
    }

    /// In-flight requests; zero once the counter has been idle past the timeout.
    pub fn active_requests_count(&self, now_ms: u64) -> u64 {
        let count = self.active_requests.load(Ordering::Acquire);
        if count == 0 {
            return 0;
        }
        let last_change = self.last_active_change_ms.load(Ordering::Acquire);
        let timeout_ms = self.config.active_requests_count_timeout().as_millis() as u64;
        if now_ms.saturating_sub(last_change) > timeout_ms {
            return self.reset_stale_active_requests(count);
        }
        count
    }

    /// Clear the counter only if it still holds the stale value that was read.
    fn reset_stale_active_requests(&self, stale: u64) -> u64 {
        match self
            .active_requests
            .compare_exchange(stale, 0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::debug!(server = %self.server_id, stale, "Resetting stale active request count");
                0
            }
            // A dispatch began or ended since the read; that count is fresh.
            Err(current) => current,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn requests_in_window(&self, now_ms: u64) -> u64 {
        self.requests_in_window.count(now_ms)
    }

    // --- Response times ---

    pub fn note_response_time(&self, millis: f64) {
        if let Ok(mut rt) = self.response_times.lock() {
            rt.window.push(millis);
            rt.lifetime.note_value(millis);
        }
    }

    // --- Failures and circuit breaker ---

    /// Count a failure of any kind.
    pub fn note_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a circuit-relevant failure, returning the new successive count.
    pub fn note_successive_failure(&self) -> u32 {
        self.last_connection_failure_ms
            .store(now_millis(), Ordering::Release);
        self.successive_connection_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    pub fn clear_successive_failures(&self) {
        self.successive_connection_failures.store(0, Ordering::Release);
    }

    pub fn successive_failures(&self) -> u32 {
        self.successive_connection_failures.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Current blackout window derived from the successive failure count.
    pub fn blackout_period(&self) -> Duration {
        blackout_duration(self.successive_failures(), &self.config)
    }

    /// Epoch millis until which the circuit stays tripped, 0 when not tripped.
    pub fn circuit_breaker_timeout_ms(&self) -> u64 {
        let blackout = self.blackout_period();
        if blackout.is_zero() {
            return 0;
        }
        self.last_connection_failure_ms
            .load(Ordering::Acquire)
            .saturating_add(blackout.as_millis() as u64)
    }

    pub fn is_circuit_breaker_tripped_at(&self, now_ms: u64) -> bool {
        let timeout = self.circuit_breaker_timeout_ms();
        timeout > 0 && now_ms < timeout
    }

    pub fn is_circuit_breaker_tripped(&self) -> bool {
        self.is_circuit_breaker_tripped_at(now_millis())
    }

    // --- Bookkeeping ---

    pub fn last_accessed_ms(&self) -> u64 {
        self.last_accessed_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self, now_ms: u64) {
        self.last_accessed_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Serializable point-in-time view.
    pub fn view(&self, now_ms: u64) -> ServerStatsView {
        let tripped_until = self.circuit_breaker_timeout_ms();
        let response_time = match self.response_times.lock() {
            Ok(rt) => ResponseTimeView {
                samples: rt.lifetime.count(),
                mean_ms: rt.lifetime.mean(),
                min_ms: rt.lifetime.min(),
                max_ms: rt.lifetime.max(),
                std_dev_ms: rt.lifetime.std_dev(),
                window_samples: rt.window.len(),
                percentiles_ms: rt
                    .window
                    .percentiles()
                    .into_iter()
                    .map(|(p, v)| (format!("p{}", p), v))
                    .collect(),
            },
            Err(_) => ResponseTimeView::default(),
        };

        ServerStatsView {
            server: self.server_id.clone(),
            total_requests: self.total_requests(),
            active_requests: self.active_requests_count(now_ms),
            requests_in_window: self.requests_in_window(now_ms),
            failure_count: self.failure_count(),
            successive_connection_failures: self.successive_failures(),
            circuit_tripped: self.is_circuit_breaker_tripped_at(now_ms),
            blackout_remaining_ms: tripped_until.saturating_sub(now_ms),
            first_connection_ms: self.first_connection_ms.load(Ordering::Relaxed),
            response_time,
        }
    }
}

/// Ends one dispatch: records the outcome and decrements the active count once.
///
/// Dropping the guard without recording (e.g. a cancelled future) still decrements.
#[derive(Debug)]
pub struct ActiveRequestGuard {
    stats: Option<Arc<ServerStats>>,
    started: Instant,
}

impl ActiveRequestGuard {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Successful completion: note timing, release, clear failures.
    pub fn record_success(mut self) -> Duration {
        let elapsed = self.elapsed();
        if let Some(stats) = self.release() {
            stats.note_response_time(elapsed.as_secs_f64() * 1000.0);
            stats.decrement_active_requests();
            stats.clear_successive_failures();
        }
        elapsed
    }

    /// Failed completion. Circuit-relevant failures extend the successive
    /// failure streak; any other failure resets it.
    pub fn record_failure(mut self, circuit_tripping: bool) -> (Duration, u32) {
        let elapsed = self.elapsed();
        let mut successive = 0;
        if let Some(stats) = self.release() {
            stats.note_response_time(elapsed.as_secs_f64() * 1000.0);
            stats.decrement_active_requests();
            stats.note_failure();
            if circuit_tripping {
                successive = stats.note_successive_failure();
            } else {
                stats.clear_successive_failures();
            }
        }
        (elapsed, successive)
    }

    fn release(&mut self) -> Option<Arc<ServerStats>> {
        self.stats.take()
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        if let Some(stats) = self.release() {
            stats.decrement_active_requests();
        }
    }
}

/// Response-time summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseTimeView {
    pub samples: u64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub window_samples: usize,
    pub percentiles_ms: BTreeMap<String, f64>,
}

/// Server statistics as exposed upward (`Stats(server)`).
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatsView {
    pub server: String,
    pub total_requests: u64,
    pub active_requests: u64,
    pub requests_in_window: u64,
    pub failure_count: u64,
    pub successive_connection_failures: u32,
    pub circuit_tripped: bool,
    pub blackout_remaining_ms: u64,
    pub first_connection_ms: u64,
    pub response_time: ResponseTimeView,
}
