//! Circuit breaker guarding the price provider.
//!
//! An HTTP 403 opens the breaker at once. Any other failure counts towards a
//! threshold of consecutive failures. While open, every request is refused
//! until the cooldown (30 minutes by default) has elapsed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Why the breaker opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripReason {
    /// The provider answered 403.
    Forbidden,
    /// This many failures in a row.
    RepeatedFailures(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant, reason: TripReason },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    cooldown: Duration,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_threshold(cooldown, 3)
    }

    pub fn with_threshold(cooldown: Duration, threshold: u32) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            cooldown,
            threshold: threshold.max(1),
        }
    }

    /// 30-minute cooldown, opens after 3 consecutive failures.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, after closing an expired breaker.
    pub fn state(&self) -> BreakerState {
        let mut state = self.lock();
        if let BreakerState::Open { since, reason } = *state {
            if since.elapsed() >= self.cooldown {
                info!(?reason, "circuit breaker cooldown elapsed; closing");
                *state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
            }
        }
        *state
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.state(), BreakerState::Closed { .. })
    }

    pub fn record_success(&self) {
        *self.lock() = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        let failures = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => consecutive_failures + 1,
            BreakerState::Open { .. } => return,
        };
        *state = if failures >= self.threshold {
            warn!(failures, "provider failing repeatedly; opening circuit breaker");
            BreakerState::Open {
                since: Instant::now(),
                reason: TripReason::RepeatedFailures(failures),
            }
        } else {
            BreakerState::Closed {
                consecutive_failures: failures,
            }
        };
    }

    /// Open immediately after a 403.
    pub fn trip(&self) {
        warn!("provider refused access; opening circuit breaker");
        *self.lock() = BreakerState::Open {
            since: Instant::now(),
            reason: TripReason::Forbidden,
        };
    }

    /// Time until requests are allowed again; zero when closed.
    pub fn remaining_cooldown(&self) -> Duration {
        match self.state() {
            BreakerState::Closed { .. } => Duration::ZERO,
            BreakerState::Open { since, .. } => self.cooldown.saturating_sub(since.elapsed()),
        }
    }
}
