use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One cached key's slot, guarded by its own lock.
///
/// The entry lock serializes refreshes for the key: `get_or_refresh` holds it
/// exclusively for the whole recomputation, so concurrent callers for the
/// same key queue up on it while callers for other keys proceed untouched.
/// The purge sweep probes it with a non-blocking `try_write` and skips the
/// entry when a refresh is in flight.
pub(crate) struct Entry<V> {
    pub(crate) slot: RwLock<Slot<V>>,
}

/// The fields behind an entry's lock.
pub(crate) struct Slot<V> {
    /// `None` only while the entry is a placeholder (`is_set == false`).
    pub(crate) value: Option<Arc<V>>,
    /// Absolute deadline after which the entry is stale.
    pub(crate) expires_at: Instant,
    /// Whether a value has ever been written.  Distinguishes a placeholder
    /// created to claim a key from an entry holding real data.
    pub(crate) is_set: bool,
}

impl<V> Entry<V> {
    /// A claim on a key that has no value yet.  The deadline is still set so
    /// an abandoned placeholder is eventually collected by the sweep.
    pub(crate) fn placeholder(expires_at: Instant) -> Self {
        Entry {
            slot: RwLock::new(Slot {
                value: None,
                expires_at,
                is_set: false,
            }),
        }
    }

    pub(crate) fn occupied(value: Arc<V>, expires_at: Instant) -> Self {
        Entry {
            slot: RwLock::new(Slot {
                value: Some(value),
                expires_at,
                is_set: true,
            }),
        }
    }
}

impl<V> Slot<V> {
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    #[inline]
    pub(crate) fn is_valid(&self, now: Instant) -> bool {
        self.is_set && !self.is_expired(now)
    }

    /// Returns the value if the slot is valid at `now`.
    pub(crate) fn value_if_valid(&self, now: Instant) -> Option<Arc<V>> {
        if self.is_valid(now) {
            self.value.clone()
        } else {
            None
        }
    }

    /// Overwrites the slot with a freshly computed value.
    pub(crate) fn fill(&mut self, value: Arc<V>, expires_at: Instant) {
        self.value = Some(value);
        self.expires_at = expires_at;
        self.is_set = true;
    }
}
