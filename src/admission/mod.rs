//! Request admission control for the upstream Gemini API
//!
//! Every call to the generative model passes through a single process-wide
//! [`AdmissionGate`] before any network traffic happens. The gate enforces
//! two ceilings that mirror the Gemini free tier:
//!
//! - **Sliding minute window**: at most 15 admissions within any trailing
//!   60-second window, tracked as a list of admission timestamps.
//! - **Daily counter**: at most 1500 admissions per 24-hour period, rolling
//!   over 24 hours after first use rather than at midnight.
//!
//! A denial is a normal outcome, not an error: callers translate it into a
//! 503 response and must not retry within the same request. State lives only
//! in process memory; restarting the service resets both counters, which is
//! acceptable for a courtesy throttle.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum admissions within any trailing 60-second window.
pub const REQUESTS_PER_MINUTE: u32 = 15;

/// Maximum admissions per 24-hour accounting period.
pub const REQUESTS_PER_DAY: u32 = 1500;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Why an admission attempt was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The daily counter has reached its ceiling
    DailyLimitReached,
    /// The trailing 60-second window is full
    PerMinuteLimitReached,
}

impl DenyReason {
    /// User-facing message surfaced unchanged in the HTTP error body
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::DailyLimitReached => {
                "Daily API limit reached. Please try again tomorrow."
            }
            DenyReason::PerMinuteLimitReached => "Rate limit exceeded. Please wait a minute.",
        }
    }
}

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The call may proceed; the gate has already counted it
    Admitted,
    /// The call must not proceed; no state was mutated
    Denied(DenyReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted)
    }
}

/// Current usage as reported by `GET /rate-limit`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Admissions within the trailing 60-second window
    pub requests_per_minute_used: u32,
    /// Per-minute ceiling
    pub requests_per_minute_limit: u32,
    /// Admissions since the current daily period started
    pub daily_requests_used: u32,
    /// Daily ceiling
    pub daily_requests_limit: u32,
    /// Whether a call made right now would be admitted
    pub can_make_request: bool,
}

/// Mutable gate state, always accessed under the mutex
struct GateState {
    /// Admission instants within the trailing minute, oldest first
    request_times: VecDeque<Instant>,
    /// Admissions since `window_start`
    daily_count: u32,
    /// Start of the current 24-hour accounting period
    window_start: Instant,
}

impl GateState {
    fn new(now: Instant) -> Self {
        Self {
            request_times: VecDeque::new(),
            daily_count: 0,
            window_start: now,
        }
    }

    /// Lazily reset the daily counter once 24 hours have elapsed
    fn roll_over_daily(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) >= DAILY_WINDOW {
            debug!(
                admitted_last_period = self.daily_count,
                "daily accounting window rolled over"
            );
            self.daily_count = 0;
            self.window_start = now;
        }
    }

    /// Drop minute-window entries that are 60 seconds old or older
    fn prune_minute_window(&mut self, now: Instant) {
        while let Some(oldest) = self.request_times.front() {
            if now.saturating_duration_since(*oldest) >= MINUTE_WINDOW {
                self.request_times.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Process-wide admission gate for upstream model calls
///
/// Constructed once at startup and shared across request handlers via
/// `Arc`. All operations are in-memory and never block on I/O, so the
/// internal mutex is held only briefly.
pub struct AdmissionGate {
    per_minute_limit: u32,
    per_day_limit: u32,
    state: Mutex<GateState>,
}

impl AdmissionGate {
    /// Create a gate with the standard free-tier ceilings
    pub fn new() -> Self {
        Self::with_limits(REQUESTS_PER_MINUTE, REQUESTS_PER_DAY)
    }

    fn with_limits(per_minute_limit: u32, per_day_limit: u32) -> Self {
        Self {
            per_minute_limit,
            per_day_limit,
            state: Mutex::new(GateState::new(Instant::now())),
        }
    }

    /// Decide whether one upstream call may proceed and, if so, record it
    ///
    /// The read-modify-write sequence is atomic under the state mutex: two
    /// concurrent calls competing for the last slot can never both be
    /// admitted. The daily ceiling is checked strictly before the per-minute
    /// ceiling, so a caller exhausted on the daily budget always sees the
    /// daily reason. Denial leaves the state untouched.
    pub fn check_and_reserve(&self) -> AdmissionDecision {
        self.check_and_reserve_at(Instant::now())
    }

    fn check_and_reserve_at(&self, now: Instant) -> AdmissionDecision {
        let mut state = self.lock_state();

        state.roll_over_daily(now);

        if state.daily_count >= self.per_day_limit {
            warn!(
                daily_used = state.daily_count,
                daily_limit = self.per_day_limit,
                "admission denied: daily limit reached"
            );
            return AdmissionDecision::Denied(DenyReason::DailyLimitReached);
        }

        state.prune_minute_window(now);

        if state.request_times.len() as u32 >= self.per_minute_limit {
            warn!(
                minute_used = state.request_times.len(),
                minute_limit = self.per_minute_limit,
                "admission denied: per-minute limit reached"
            );
            return AdmissionDecision::Denied(DenyReason::PerMinuteLimitReached);
        }

        state.request_times.push_back(now);
        state.daily_count += 1;

        debug!(
            minute_used = state.request_times.len(),
            daily_used = state.daily_count,
            "request admitted"
        );

        AdmissionDecision::Admitted
    }

    /// Report current usage without reserving anything
    ///
    /// Takes the same mutex as [`check_and_reserve`](Self::check_and_reserve)
    /// and applies the same rollover and pruning rules, so a caller polling
    /// status sees numbers consistent with an immediately following check.
    pub fn status_snapshot(&self) -> RateLimitStatus {
        self.status_snapshot_at(Instant::now())
    }

    fn status_snapshot_at(&self, now: Instant) -> RateLimitStatus {
        let mut state = self.lock_state();

        state.roll_over_daily(now);
        state.prune_minute_window(now);

        let minute_used = state.request_times.len() as u32;
        RateLimitStatus {
            requests_per_minute_used: minute_used,
            requests_per_minute_limit: self.per_minute_limit,
            daily_requests_used: state.daily_count,
            daily_requests_limit: self.per_day_limit,
            can_make_request: minute_used < self.per_minute_limit
                && state.daily_count < self.per_day_limit,
        }
    }

    /// A poisoned mutex only means another thread panicked mid-request;
    /// the counters themselves are always left consistent, so recover the
    /// guard rather than propagate the poison.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}
