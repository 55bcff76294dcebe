//! Per-poller cache of recently seen event ids.
//!
//! Providers redeliver events after network hiccups or slow acks. Each
//! poller owns one [`EventDeduplicator`] so the same event is never answered
//! twice. The cache is process-local and bounded both in time (TTL) and in
//! size (oldest entries evicted first).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default time an event id is remembered.
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default number of event ids remembered.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Bounded, time-limited set of seen event ids.
#[derive(Debug)]
pub struct EventDeduplicator {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<String, Instant>,
    // Insertion order, oldest first; always mirrors `seen`
    order: VecDeque<(String, Instant)>,
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl EventDeduplicator {
    /// Create a cache. A capacity of zero is treated as one.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `event_id` and report whether it is new.
    ///
    /// Returns `false` for an id already seen within the TTL. Duplicates do
    /// not refresh the original timestamp.
    pub fn observe(&mut self, event_id: &str) -> bool {
        self.observe_at(event_id, Instant::now())
    }

    /// [`observe`](Self::observe) with an explicit clock.
    pub fn observe_at(&mut self, event_id: &str, now: Instant) -> bool {
        self.evict_expired(now);

        if self.seen.contains_key(event_id) {
            return false;
        }

        while self.order.len() >= self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(event_id.to_string(), now);
        self.order.push_back((event_id.to_string(), now));
        true
    }

    /// Whether `event_id` is currently remembered.
    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((id, seen_at)) = self.order.front() {
            if now.saturating_duration_since(*seen_at) <= self.ttl {
                break;
            }
            self.seen.remove(id);
            self.order.pop_front();
        }
    }
}
