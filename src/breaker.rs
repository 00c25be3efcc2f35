//! Circuit breaker around the generative service.
//!
//! Closed passes calls through and counts consecutive failures; once the
//! threshold is crossed the breaker opens and every call fails fast
//! without touching the network. After the cool-down a single half-open
//! probe is allowed: success closes the breaker, failure re-opens it and
//! restarts the cool-down.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    probe_started: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                probe_started: None,
            }),
            threshold,
            cooldown,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Ask permission to make one call. `Ok(())` means go ahead; the
    /// caller must report the outcome via [`record_success`] or
    /// [`record_failure`].
    ///
    /// [`record_success`]: CircuitBreaker::record_success
    /// [`record_failure`]: CircuitBreaker::record_failure
    pub fn try_acquire(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    inner.probe_started = Some(Instant::now());
                    Ok(())
                } else {
                    let remaining = self.cooldown - elapsed;
                    Err(EngineError::CircuitOpen {
                        retry_after_secs: remaining.as_secs().max(1),
                    })
                }
            }
            BreakerState::HalfOpen => {
                // A probe whose caller never reported back (its future was
                // dropped by a timeout) must not wedge the breaker: once
                // another cool-down has passed since the probe started, the
                // next caller takes over as the probe.
                let stale = inner
                    .probe_started
                    .is_none_or(|t| t.elapsed() >= self.cooldown);
                if inner.probe_in_flight && !stale {
                    Err(EngineError::CircuitOpen {
                        retry_after_secs: self.cooldown.as_secs().max(1),
                    })
                } else {
                    inner.probe_in_flight = true;
                    inner.probe_started = Some(Instant::now());
                    Ok(())
                }
            }
        }
    }

    /// Any success resets the failure count and closes the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        inner.probe_started = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::HalfOpen => {
                // Failed probe: back to open, cool-down restarts.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.probe_started = None;
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }
}
