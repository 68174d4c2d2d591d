//! Three-state circuit breaker guarding the extraction model call.
//!
//! The breaker is a heuristic, not a correctness mechanism: staleness under
//! light races is acceptable, so plain atomics with relaxed-ish ordering are
//! enough. Constructed per service instance, never global, so tests can hold
//! isolated breakers.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

static PROCESS_START: LazyLock<Instant> = LazyLock::new(Instant::now);

fn now_ms() -> u64 {
    PROCESS_START.elapsed().as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: AtomicU8::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
        }
    }

    /// Whether a model call may proceed right now. While open, returns false
    /// until the cooldown elapses; then exactly one caller wins the
    /// half-open trial slot.
    pub fn try_acquire(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            CLOSED => true,
            HALF_OPEN => false,
            _ => {
                let opened = self.opened_at_ms.load(Ordering::Acquire);
                if now_ms().saturating_sub(opened) < self.cooldown.as_millis() as u64 {
                    return false;
                }
                // CAS so only one concurrent caller gets the trial call.
                self.state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(CLOSED, Ordering::Release);
    }

    /// A model failure or empty-result outcome.
    pub fn record_failure(&self) {
        if self.state.load(Ordering::Acquire) == HALF_OPEN {
            self.reopen();
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            self.reopen();
        }
    }

    fn reopen(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.opened_at_ms.store(now_ms(), Ordering::Release);
        self.state.store(OPEN, Ordering::Release);
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            CLOSED => BreakerState::Closed,
            OPEN => BreakerState::Open,
            _ => BreakerState::HalfOpen,
        }
    }
}
