//! Time-bounded caching of probe results.
//!
//! Checking whether the interpreter is reachable costs a process spawn, so a
//! host that reports health on every request keeps the last answer in a
//! [`TtlCache`] and re-probes only once it is stale. The cache is a plain
//! value owned by the caller; there is no global state.

use std::time::{Duration, Instant};

/// A single cached value with the time it was last checked.
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    value: Option<T>,
    last_checked: Option<Instant>,
    ttl: Duration,
}

impl<T> TtlCache<T> {
    /// Create an empty cache whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            last_checked: None,
            ttl,
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the value was last stored.
    pub fn last_checked(&self) -> Option<Instant> {
        self.last_checked
    }

    /// Whether the value must be recomputed at `now`.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        match (&self.value, self.last_checked) {
            (Some(_), Some(checked)) => now.saturating_duration_since(checked) >= self.ttl,
            _ => true,
        }
    }

    /// The cached value if it is still fresh at `now`.
    pub fn get(&self, now: Instant) -> Option<&T> {
        if self.needs_refresh(now) {
            None
        } else {
            self.value.as_ref()
        }
    }

    /// Store a freshly computed value.
    pub fn store(&mut self, value: T, now: Instant) {
        self.value = Some(value);
        self.last_checked = Some(now);
    }

    /// Forget the cached value.
    pub fn invalidate(&mut self) {
        self.value = None;
        self.last_checked = None;
    }
}
