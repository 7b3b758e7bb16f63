//! In-process counter registry: one mutex-guarded counter per key.
//!
//! The map only hands out per-key slots; all accounting happens under the
//! slot's own mutex, so unrelated keys never wait on each other.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::counter::{CounterState, Decision};
use super::key::RateLimitKey;
use super::policy::RateLimitPolicy;

#[derive(Default)]
struct Slot {
    state: CounterState,
    /// Last time a check touched this slot, Unix milliseconds
    last_seen_ms: u64,
    /// Set by the sweeper once the slot is unlinked from the map.
    /// A caller that still holds the `Arc` must look the key up again.
    retired: bool,
}

/// The per-key counter registry.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct CounterRegistry {
    slots: DashMap<RateLimitKey, Arc<Mutex<Slot>>>,
    clock: Arc<dyn Clock>,
}

impl CounterRegistry {
    /// Create an empty registry driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Count one request for `key` and decide it against `policy`.
    pub fn check_and_increment(&self, key: &RateLimitKey, policy: RateLimitPolicy) -> Decision {
        loop {
            let slot = self.slot(key);
            let mut slot = slot.lock();
            if slot.retired {
                continue;
            }

            let now = self.clock.now_ms();
            slot.last_seen_ms = now;
            let decision = slot.state.check_and_increment(policy, now);

            trace!(
                key = %key,
                count = decision.count,
                limit = decision.limit,
                "Counted request"
            );
            if !decision.allowed {
                debug!(
                    key = %key,
                    count = decision.count,
                    retry_after = ?decision.retry_after_seconds,
                    "Rate limit exceeded"
                );
            }

            return decision;
        }
    }

    /// Return `key` to the never-seen state.
    pub fn reset(&self, key: &RateLimitKey) {
        loop {
            let Some(slot) = self.slots.get(key).map(|s| Arc::clone(s.value())) else {
                return;
            };
            let mut slot = slot.lock();
            if slot.retired {
                continue;
            }
            slot.state.reset();
            debug!(key = %key, "Counter reset");
            return;
        }
    }

    /// Current count for `key`, or `None` if the key has no counter.
    pub fn counter_value(&self, key: &RateLimitKey) -> Option<u64> {
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
        let slot = slot.lock();
        Some(slot.state.count())
    }

    /// Get the number of live counters.
    pub fn counter_count(&self) -> usize {
        self.slots.len()
    }

    /// Drop every counter.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.slots.retain(|_, slot| {
            slot.lock().retired = true;
            false
        });
    }

    /// Remove counters whose window has ended and which have been idle for `idle_ttl`.
    ///
    /// A removed key behaves exactly like one never seen before. Slots that
    /// are busy are skipped and picked up by a later sweep.
    pub fn sweep_idle(&self, idle_ttl: Duration) -> usize {
        let now = self.clock.now_ms();
        let idle_ms = idle_ttl.as_millis() as u64;
        let before = self.slots.len();

        self.slots.retain(|key, slot| {
            let Some(mut slot) = slot.try_lock() else {
                return true;
            };
            let idle = now.saturating_sub(slot.last_seen_ms) >= idle_ms;
            if slot.state.is_expired(now) && idle {
                trace!(key = %key, "Reaping idle counter");
                slot.retired = true;
                false
            } else {
                true
            }
        });

        before.saturating_sub(self.slots.len())
    }

    /// Periodically sweep idle counters until the task is aborted.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        idle_ttl: Duration,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reaped = registry.sweep_idle(idle_ttl);
                if reaped > 0 {
                    debug!(
                        reaped,
                        remaining = registry.counter_count(),
                        "Swept idle counters"
                    );
                }
            }
        })
    }

    fn slot(&self, key: &RateLimitKey) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }

        let slot = self.slots.entry(key.clone()).or_insert_with(|| {
            trace!(key = %key, "Creating counter");
            Arc::new(Mutex::new(Slot::default()))
        });
        Arc::clone(slot.value())
    }
}

impl Default for CounterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
