//! Admission control: per-identity rolling windows and concurrency
//! ceilings, plus one global concurrency ceiling for the whole engine.
//!
//! Admission is all-or-nothing. A refusal mutates no counters and names
//! the exceeded limit together with the time until it resets, so callers
//! can surface a meaningful retry-after. Concurrency slots are released
//! only when the associated job reaches a terminal state.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::job::Role;

/// Which specific limit refused an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    PerMinute,
    PerHour,
    PerDay,
    Concurrent,
    GlobalConcurrent,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::PerMinute => write!(f, "per-minute"),
            LimitKind::PerHour => write!(f, "per-hour"),
            LimitKind::PerDay => write!(f, "per-day"),
            LimitKind::Concurrent => write!(f, "concurrent-jobs"),
            LimitKind::GlobalConcurrent => write!(f, "global-concurrent-jobs"),
        }
    }
}

/// Role-derived ceilings for each window plus concurrency.
#[derive(Debug, Clone, Copy)]
pub struct RoleLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub concurrent: u32,
}

impl RoleLimits {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Free => Self {
                per_minute: 3,
                per_hour: 10,
                per_day: 25,
                concurrent: 2,
            },
            Role::Premium => Self {
                per_minute: 10,
                per_hour: 60,
                per_day: 300,
                concurrent: 5,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_start: DateTime<Utc>,
}

impl WindowCounter {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Reset the counter if the window boundary has been crossed.
    fn roll(&mut self, now: DateTime<Utc>, window: Duration) {
        if now.signed_duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn remaining_secs(&self, now: DateTime<Utc>, window: Duration) -> u64 {
        let elapsed = now.signed_duration_since(self.window_start);
        (window - elapsed).num_seconds().max(1) as u64
    }
}

/// Per-identity quota state.
#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    minute: WindowCounter,
    hour: WindowCounter,
    day: WindowCounter,
    concurrent: u32,
}

impl RateLimitRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            minute: WindowCounter::new(now),
            hour: WindowCounter::new(now),
            day: WindowCounter::new(now),
            concurrent: 0,
        }
    }
}

struct LimiterState {
    records: HashMap<String, RateLimitRecord>,
    global_running: u32,
}

pub struct RateLimiter {
    state: Mutex<LimiterState>,
    global_ceiling: u32,
}

const MINUTE: Duration = Duration::seconds(60);
const HOUR: Duration = Duration::seconds(3600);
const DAY: Duration = Duration::seconds(86400);

impl RateLimiter {
    pub fn new(global_ceiling: u32) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                records: HashMap::new(),
                global_running: 0,
            }),
            global_ceiling,
        }
    }

    /// Admit a new job for `identity`, or refuse with the specific limit
    /// that was exceeded. Counters are only mutated on admission.
    pub fn try_admit(&self, identity: &str, role: Role) -> Result<(), EngineError> {
        self.try_admit_at(identity, role, Utc::now())
    }

    fn try_admit_at(
        &self,
        identity: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let limits = RoleLimits::for_role(role);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.global_running >= self.global_ceiling {
            return Err(EngineError::QuotaExceeded {
                limit: LimitKind::GlobalConcurrent,
                retry_after_secs: 0,
            });
        }

        let record = state
            .records
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitRecord::new(now));

        record.minute.roll(now, MINUTE);
        record.hour.roll(now, HOUR);
        record.day.roll(now, DAY);

        let checks = [
            (
                LimitKind::PerMinute,
                record.minute.count,
                limits.per_minute,
                record.minute.remaining_secs(now, MINUTE),
            ),
            (
                LimitKind::PerHour,
                record.hour.count,
                limits.per_hour,
                record.hour.remaining_secs(now, HOUR),
            ),
            (
                LimitKind::PerDay,
                record.day.count,
                limits.per_day,
                record.day.remaining_secs(now, DAY),
            ),
        ];
        for (limit, count, ceiling, remaining) in checks {
            if count >= ceiling {
                return Err(EngineError::QuotaExceeded {
                    limit,
                    retry_after_secs: remaining,
                });
            }
        }

        if record.concurrent >= limits.concurrent {
            // Freed when a running job reaches a terminal state, so there
            // is no window to wait out.
            return Err(EngineError::QuotaExceeded {
                limit: LimitKind::Concurrent,
                retry_after_secs: 0,
            });
        }

        record.minute.count += 1;
        record.hour.count += 1;
        record.day.count += 1;
        record.concurrent += 1;
        state.global_running += 1;
        Ok(())
    }

    /// Release the concurrency slot for a job that reached a terminal
    /// state. Window counters are untouched; they roll over on their own.
    pub fn release(&self, identity: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.global_running = state.global_running.saturating_sub(1);
        if let Some(record) = state.records.get_mut(identity) {
            record.concurrent = record.concurrent.saturating_sub(1);
        }
    }

    /// Current number of running jobs for an identity.
    pub fn running_for(&self, identity: &str) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.records.get(identity).map(|r| r.concurrent).unwrap_or(0)
    }
}
