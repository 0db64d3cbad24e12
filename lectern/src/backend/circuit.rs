//! Process-wide circuit breaker guarding every outbound backend call.
//!
//! One breaker is shared across requests on purpose: a backend failure surge
//! should protect all callers at once. State machine:
//! `CLOSED` → `OPEN` after N consecutive failures; `OPEN` → `HALF_OPEN` after
//! the reset window, letting exactly one call through as a probe. While that
//! probe is in flight, every other caller still fails fast; probe success
//! restores `CLOSED`, probe failure returns to `OPEN`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the half-open probe call is outstanding; cleared by
    /// `record_success` / `record_failure`.
    probe_in_flight: bool,
}

/// Shared breaker; interior mutability so callers hold only `&self`.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    reset: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            threshold,
            reset,
        }
    }

    /// Returns `true` when a call may proceed. Transitions `OPEN` →
    /// `HALF_OPEN` when the reset window has elapsed; that call becomes the
    /// single probe, and concurrent callers keep failing fast until the
    /// probe resolves through `record_success` / `record_failure`.
    pub fn allow(&self) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::warn!("circuit half-open: probing backend");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call: closes the circuit, resets the counter.
    pub fn record_success(&self) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.state != CircuitState::Closed {
            tracing::warn!("circuit closed: backend recovered");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Records a failed call. Opens the circuit at the threshold, and a
    /// failed half-open probe reopens it immediately.
    pub fn record_failure(&self) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.consecutive_failures += 1;
        inner.probe_in_flight = false;
        let reopen = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.threshold;
        if reopen && inner.state != CircuitState::Open {
            tracing::warn!(
                failures = inner.consecutive_failures,
                "circuit open: failing backend calls fast"
            );
        }
        if reopen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.inner.lock() {
            Ok(g) => g.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }
}
