//! Shared request/token budget tracking
//!
//! Holds the caller's current view of the remote service's rolling-window
//! allowance. The dispatcher is the only writer (from authoritative response
//! feedback); `admit` is the only reader-gate and the only place the run
//! sleeps outside of throttle backoff.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::ReviewError;

/// Blind wait applied when the budget looks exhausted but the service has
/// not told us when it resets
const BLIND_WAIT: Duration = Duration::from_secs(60);

/// Consecutive blind waits tolerated before the run is declared stuck
const MAX_BLIND_WAITS: u32 = 5;

/// Budget counters reported by the completion service
///
/// Every field is optional: the service may omit any header, and throttle
/// responses in particular often carry only the reset hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetFeedback {
    pub remaining_requests: Option<u64>,
    pub remaining_tokens: Option<u64>,
    pub reset_requests: Option<Duration>,
    pub reset_tokens: Option<Duration>,
}

impl BudgetFeedback {
    pub fn has_reset_hint(&self) -> bool {
        self.reset_requests.is_some() || self.reset_tokens.is_some()
    }
}

/// Mutable budget state for one review run
#[derive(Debug)]
pub struct BudgetState {
    max_requests: u64,
    max_tokens: u64,
    remaining_requests: u64,
    remaining_tokens: u64,
    requests_reset_at: Option<Instant>,
    tokens_reset_at: Option<Instant>,
    /// Consecutive blind waits since the last authoritative update
    blind_waits: u32,
}

impl BudgetState {
    pub fn new(max_requests: u64, max_tokens: u64) -> Self {
        Self {
            max_requests,
            max_tokens,
            remaining_requests: max_requests,
            remaining_tokens: max_tokens,
            requests_reset_at: None,
            tokens_reset_at: None,
            blind_waits: 0,
        }
    }

    /// Block until the next dispatch attempt is allowed
    ///
    /// Waits out any known reset time (restoring the corresponding counter
    /// to its ceiling on wake). If the budget is exhausted with no reset
    /// time known, sleeps a fixed blind interval and restores both ceilings;
    /// after `MAX_BLIND_WAITS` consecutive blind waits with no authoritative
    /// feedback in between, gives up with `BudgetExhausted`.
    pub async fn admit(&mut self) -> Result<(), ReviewError> {
        if let Some(at) = self.requests_reset_at.take() {
            let now = Instant::now();
            if at > now {
                tracing::debug!(wait_secs = (at - now).as_secs(), "waiting for request budget reset");
                tokio::time::sleep_until(at).await;
            }
            self.remaining_requests = self.max_requests;
        }
        if let Some(at) = self.tokens_reset_at.take() {
            let now = Instant::now();
            if at > now {
                tracing::debug!(wait_secs = (at - now).as_secs(), "waiting for token budget reset");
                tokio::time::sleep_until(at).await;
            }
            self.remaining_tokens = self.max_tokens;
        }

        if self.remaining_requests == 0 || self.remaining_tokens == 0 {
            self.blind_waits += 1;
            if self.blind_waits > MAX_BLIND_WAITS {
                return Err(ReviewError::BudgetExhausted {
                    blind_waits: self.blind_waits - 1,
                });
            }
            tracing::warn!(
                attempt = self.blind_waits,
                "budget exhausted with no reset hint, sleeping {}s",
                BLIND_WAIT.as_secs()
            );
            tokio::time::sleep(BLIND_WAIT).await;
            self.remaining_requests = self.max_requests;
            self.remaining_tokens = self.max_tokens;
        }

        Ok(())
    }

    /// Apply authoritative feedback from a successful response
    ///
    /// Remaining counters are always taken. Reset hints are recorded only
    /// when the matching counter is exhausted: the service attaches them to
    /// every success, and blocking on each one would serialize the run for
    /// no reason.
    pub fn apply_success(&mut self, feedback: &BudgetFeedback) {
        if let Some(r) = feedback.remaining_requests {
            self.remaining_requests = r;
        }
        if let Some(t) = feedback.remaining_tokens {
            self.remaining_tokens = t;
        }
        if self.remaining_requests == 0 {
            if let Some(d) = feedback.reset_requests {
                self.requests_reset_at = Some(Instant::now() + d);
            }
        }
        if self.remaining_tokens == 0 {
            if let Some(d) = feedback.reset_tokens {
                self.tokens_reset_at = Some(Instant::now() + d);
            }
        }
        self.blind_waits = 0;
    }

    /// Apply feedback from a throttle response
    ///
    /// Reset hints are always recorded; once known, no attempt is dispatched
    /// before they elapse.
    pub fn apply_throttle(&mut self, feedback: &BudgetFeedback) {
        if let Some(r) = feedback.remaining_requests {
            self.remaining_requests = r;
        }
        if let Some(t) = feedback.remaining_tokens {
            self.remaining_tokens = t;
        }
        if let Some(d) = feedback.reset_requests {
            self.requests_reset_at = Some(Instant::now() + d);
        }
        if let Some(d) = feedback.reset_tokens {
            self.tokens_reset_at = Some(Instant::now() + d);
        }
        self.blind_waits = 0;
    }

    #[cfg(test)]
    fn set_remaining(&mut self, requests: u64, tokens: u64) {
        self.remaining_requests = requests;
        self.remaining_tokens = tokens;
    }
}

/// Parse a duration string like `"1h30m15s"` into a `Duration`
///
/// Hour, minute, and second components are each optional but must appear in
/// that order; seconds may be fractional (`"0.5s"`). Returns `None` for
/// anything malformed rather than guessing.
pub fn parse_reset_duration(s: &str) -> Option<Duration> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = 0.0f64;
    if let Some((hours, tail)) = rest.split_once('h') {
        total += hours.parse::<f64>().ok()? * 3600.0;
        rest = tail;
    }
    if let Some((minutes, tail)) = rest.split_once('m') {
        total += minutes.parse::<f64>().ok()? * 60.0;
        rest = tail;
    }
    if !rest.is_empty() {
        let seconds = rest.strip_suffix('s')?;
        total += seconds.parse::<f64>().ok()?;
    }

    // Rejects negative, non-finite, and overflowing totals in one place; a
    // remote header must never be able to panic the run.
    Duration::try_from_secs_f64(total).ok()
}
