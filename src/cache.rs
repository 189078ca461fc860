use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::builder::CacheBuilder;
use crate::entry::Entry;
use crate::error::RefreshError;
use crate::metrics::{Method, MetricsSink};
use crate::order::{ExpiryOrder, SweepAction};
use crate::sweep::{CancellationToken, SweepHandle};

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`Cache`].
///
/// Two lock levels: `shape` guards the index and the expiration-ordered list
/// (structural changes only), and each entry carries its own lock for its
/// value and deadline.  The shape lock is never held while blocking on an
/// entry lock; the refresh path may briefly take the shape lock while holding
/// an entry lock (tail-move, failure cleanup), and the purge sweep only ever
/// probes entry locks non-blockingly while walking under the shape lock.
pub(crate) struct Inner<K, V> {
    pub(crate) ttl: Duration,
    pub(crate) shape: RwLock<ExpiryOrder<K, V>>,
    pub(crate) metrics: Box<dyn MetricsSink>,
    pub(crate) cancel: CancellationToken,
    /// At most one background sweep per instance.
    pub(crate) sweep_scheduled: AtomicBool,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent in-memory cache with a fixed per-instance TTL and
/// singleflight refresh.
///
/// Concurrent [`get_or_refresh`] callers for the same key collapse into a
/// single execution of the refresh function; callers for other keys are
/// unaffected.  Expired entries are evicted by [`purge`], either called
/// manually or on an interval via [`schedule_purge`].
///
/// # Example
/// ```
/// use solo::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: solo::Cache<String, String> =
///     CacheBuilder::new(Duration::from_secs(60)).build();
/// cache.set("hello".to_string(), "world".to_string());
/// assert_eq!(
///     cache.get(&"hello".to_string()),
///     Some(std::sync::Arc::new("world".to_string()))
/// );
/// ```
///
/// [`get_or_refresh`]: Cache::get_or_refresh
/// [`purge`]: Cache::purge
/// [`schedule_purge`]: Cache::schedule_purge
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        ttl: Duration,
        metrics: Box<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> Self {
        Cache {
            inner: Arc::new(Inner {
                ttl,
                shape: RwLock::new(ExpiryOrder::new()),
                metrics,
                cancel,
                sweep_scheduled: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(ttl: Duration) -> CacheBuilder<K, V> {
        CacheBuilder::new(ttl)
    }

    #[inline]
    fn deadline(&self) -> Instant {
        Instant::now() + self.inner.ttl
    }

    // -----------------------------------------------------------------------
    // Hot-path: get
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if a valid (set and unexpired) entry
    /// exists.  Never mutates the cache.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let start = Instant::now();
        let result = self.get_inner(key);
        match result {
            Some(_) => self.inner.metrics.record_hit(Method::Get),
            None => self.inner.metrics.record_miss(Method::Get),
        }
        self.inner.metrics.observe_latency(Method::Get, start.elapsed());
        result
    }

    fn get_inner(&self, key: &K) -> Option<Arc<V>> {
        let entry = {
            let shape = self.inner.shape.read();
            Arc::clone(shape.entry(key)?)
        };
        // Non-blocking probe: an exclusively-held entry is mid-refresh and
        // therefore not valid yet, so a read must report a miss rather than
        // queue up behind the recomputation.
        let slot = entry.slot.try_read()?;
        slot.value_if_valid(Instant::now())
    }

    // -----------------------------------------------------------------------
    // Hot-path: set
    // -----------------------------------------------------------------------

    /// Unconditionally writes `value` for `key` with a fresh TTL deadline.
    pub fn set(&self, key: K, value: V) {
        let start = Instant::now();
        self.set_inner(key, value);
        self.inner.metrics.observe_latency(Method::Set, start.elapsed());
    }

    fn set_inner(&self, key: K, value: V) {
        let value = Arc::new(value);
        let expires_at = self.deadline();

        let existing = {
            let mut shape = self.inner.shape.write();
            match shape.entry(&key) {
                Some(entry) => Arc::clone(entry),
                None => {
                    shape.insert_tail(key, Arc::new(Entry::occupied(value, expires_at)));
                    return;
                }
            }
        };

        // Fill the slot without the shape lock held: a refresh in flight on
        // this key holds the entry lock, and waiting for it under the shape
        // lock would stall every other key.
        {
            let mut slot = existing.slot.write();
            slot.fill(value, expires_at);
        }

        // Fresh deadline, so the node belongs at the tail again.
        let mut shape = self.inner.shape.write();
        shape.restore_tail(key, &existing);
    }

    // -----------------------------------------------------------------------
    // Hot-path: delete
    // -----------------------------------------------------------------------

    /// Removes the entry for `key`, if present.
    ///
    /// Structural removal only; an in-flight refresh for the key is not
    /// cancelled and will re-insert it on success.
    pub fn delete(&self, key: &K) {
        let start = Instant::now();
        self.inner.shape.write().remove(key);
        self.inner
            .metrics
            .observe_latency(Method::Delete, start.elapsed());
    }

    // -----------------------------------------------------------------------
    // get_or_refresh (singleflight)
    // -----------------------------------------------------------------------

    /// Returns the cached value for `key`, or computes it with `refresh`.
    ///
    /// At most one execution of `refresh` runs per key at a time: the caller
    /// that claims the key's entry lock recomputes, everyone else for that
    /// key blocks on the lock and then reads the stored result.  Callers for
    /// other keys are never blocked.  There is no built-in timeout; a caller
    /// wanting a deadline must enforce it inside `refresh`.
    ///
    /// A refresh failure is returned as a [`RefreshError`] wrapping the
    /// original error.  If this caller had claimed a brand-new key, the claim
    /// is removed again so the next caller starts clean; a pre-existing (but
    /// expired) entry is left untouched for the next attempt.
    ///
    /// # Example
    /// ```
    /// use solo::CacheBuilder;
    /// use std::time::Duration;
    ///
    /// let cache: solo::Cache<String, String> =
    ///     CacheBuilder::new(Duration::from_secs(60)).build();
    /// let value = cache
    ///     .get_or_refresh("config".to_string(), || {
    ///         Ok::<_, std::io::Error>("loaded".to_string())
    ///     })
    ///     .unwrap();
    /// assert_eq!(&*value, "loaded");
    /// ```
    pub fn get_or_refresh<F, E>(&self, key: K, refresh: F) -> Result<Arc<V>, RefreshError<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: std::error::Error + 'static,
    {
        let start = Instant::now();
        let result = self.get_or_refresh_inner(key, refresh);
        self.inner
            .metrics
            .observe_latency(Method::GetOrRefresh, start.elapsed());
        result
    }

    fn get_or_refresh_inner<F, E>(&self, key: K, refresh: F) -> Result<Arc<V>, RefreshError<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: std::error::Error + 'static,
    {
        // Claim a handle for the key under the shape lock, then release it
        // before touching the entry lock so same-key callers serialize on the
        // entry alone while unrelated keys stream past.
        let (entry, created) = {
            let mut shape = self.inner.shape.write();
            match shape.entry(&key) {
                Some(entry) => (Arc::clone(entry), false),
                None => {
                    let entry = Arc::new(Entry::placeholder(self.deadline()));
                    shape.insert_tail(key.clone(), Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        let mut slot = entry.slot.write();

        // Another caller may have refreshed the entry while we waited for
        // its lock.
        if let Some(value) = slot.value_if_valid(Instant::now()) {
            self.inner.metrics.record_hit(Method::GetOrRefresh);
            return Ok(value);
        }
        self.inner.metrics.record_miss(Method::GetOrRefresh);

        // The entry lock stays held across the recomputation; that hold is
        // the singleflight guarantee.
        match refresh() {
            Ok(value) => {
                let value = Arc::new(value);
                slot.fill(Arc::clone(&value), self.deadline());
                let mut shape = self.inner.shape.write();
                shape.restore_tail(key, &entry);
                Ok(value)
            }
            Err(err) => {
                self.inner.metrics.record_error(Method::GetOrRefresh);
                if created {
                    // Leave no trace of the failed claim.
                    let mut shape = self.inner.shape.write();
                    shape.remove_if(&key, &entry);
                }
                Err(RefreshError::new(err))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Purge
    // -----------------------------------------------------------------------

    /// Evicts expired entries.
    ///
    /// Walks the expiration-ordered list from the head and stops at the first
    /// live entry, so the cost is proportional to the number of newly expired
    /// entries, not to the cache size.  Entries whose lock is held (a refresh
    /// in flight) are skipped rather than waited on; they stay for the next
    /// sweep.  Always safe to call manually.
    pub fn purge(&self) {
        let start = Instant::now();
        let remaining = self.purge_inner();
        self.inner.metrics.report_entry_count(remaining);
        self.inner
            .metrics
            .observe_latency(Method::Purge, start.elapsed());
    }

    fn purge_inner(&self) -> usize {
        let now = Instant::now();
        let mut skipped = 0usize;

        let mut shape = self.inner.shape.write();
        let removed = shape.sweep(|entry| match entry.slot.try_write() {
            Some(slot) if slot.is_expired(now) => SweepAction::Remove,
            Some(_) => SweepAction::Stop,
            None => {
                skipped += 1;
                SweepAction::Keep
            }
        });
        let remaining = shape.len();
        drop(shape);

        if removed > 0 || skipped > 0 {
            tracing::debug!(removed, skipped, remaining, "purge sweep finished");
        }
        remaining
    }

    // -----------------------------------------------------------------------
    // Background sweep
    // -----------------------------------------------------------------------

    /// Starts the background sweep: every `interval`, [`purge`] runs until
    /// the cache's cancellation token fires.  Returns the handle the owner
    /// joins for graceful shutdown.
    ///
    /// # Panics
    /// Panics if called a second time on the same cache instance.
    ///
    /// [`purge`]: Cache::purge
    pub fn schedule_purge(&self, interval: Duration) -> SweepHandle {
        let already = self.inner.sweep_scheduled.swap(true, Ordering::SeqCst);
        assert!(
            !already,
            "schedule_purge: a background sweep is already running for this cache"
        );

        let cache = self.clone();
        let cancel = self.inner.cancel.clone();
        let thread = std::thread::Builder::new()
            .name("solo-sweep".to_string())
            .spawn(move || {
                tracing::debug!(interval_ms = interval.as_millis() as u64, "sweep started");
                while !cancel.wait_timeout(interval) {
                    cache.purge();
                }
                tracing::debug!("sweep stopped");
            })
            .expect("failed to spawn sweep thread");

        SweepHandle { thread }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of entries currently held, including expired ones not yet
    /// purged and in-flight placeholders.
    pub fn entry_count(&self) -> usize {
        self.inner.shape.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }
}

// ---------------------------------------------------------------------------
// Structural unit tests (write order and the expiration-sorted invariant)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NopMetrics;

    fn make_cache(ttl: Duration) -> Cache<String, String> {
        Cache::new(ttl, Box::new(NopMetrics), CancellationToken::new())
    }

    fn keys_in_order(cache: &Cache<String, String>) -> Vec<String> {
        cache.inner.shape.read().keys_in_order()
    }

    fn assert_expiration_sorted(cache: &Cache<String, String>) {
        let deadlines = cache.inner.shape.read().expirations_in_order();
        assert!(
            deadlines.windows(2).all(|w| w[0] <= w[1]),
            "list must be non-decreasing in expiry from head to tail"
        );
    }

    #[test]
    fn set_of_existing_key_moves_it_to_the_tail() {
        let cache = make_cache(Duration::from_secs(1));
        cache.set("key0".to_string(), "value0".to_string());
        cache.set("key1".to_string(), "value1".to_string());
        cache.set("key2".to_string(), "value2".to_string());
        assert_eq!(keys_in_order(&cache), ["key0", "key1", "key2"]);

        cache.set("key1".to_string(), "updated1".to_string());
        assert_eq!(keys_in_order(&cache), ["key0", "key2", "key1"]);
        assert_eq!(
            cache.get(&"key1".to_string()).as_deref(),
            Some(&"updated1".to_string())
        );

        cache.set("key0".to_string(), "updated0".to_string());
        assert_eq!(keys_in_order(&cache), ["key2", "key1", "key0"]);
        assert_expiration_sorted(&cache);
    }

    #[test]
    fn delete_unlinks_from_any_position() {
        let cache = make_cache(Duration::from_secs(1));
        for i in 0..4 {
            cache.set(format!("key{i}"), format!("value{i}"));
        }

        cache.delete(&"key1".to_string()); // middle
        assert_eq!(keys_in_order(&cache), ["key0", "key2", "key3"]);

        cache.delete(&"key0".to_string()); // head
        assert_eq!(keys_in_order(&cache), ["key2", "key3"]);

        cache.delete(&"key3".to_string()); // tail
        assert_eq!(keys_in_order(&cache), ["key2"]);

        cache.delete(&"key2".to_string());
        assert!(cache.is_empty());
    }

    #[test]
    fn refresh_lands_at_the_tail() {
        let cache = make_cache(Duration::from_secs(1));
        cache.set("key0".to_string(), "value0".to_string());
        cache.set("key1".to_string(), "value1".to_string());

        let value = cache
            .get_or_refresh("key2".to_string(), || {
                Ok::<_, std::io::Error>("value2".to_string())
            })
            .unwrap();
        assert_eq!(&*value, "value2");
        assert_eq!(keys_in_order(&cache), ["key0", "key1", "key2"]);
        assert_expiration_sorted(&cache);
    }

    #[test]
    fn mixed_writes_keep_the_list_expiration_sorted() {
        let cache = make_cache(Duration::from_millis(50));
        for i in 0..8 {
            cache.set(format!("key{i}"), "v".to_string());
        }
        for i in (0..8).rev().step_by(2) {
            cache.set(format!("key{i}"), "w".to_string());
        }
        let _ = cache.get_or_refresh("key3".to_string(), || {
            Ok::<_, std::io::Error>("x".to_string())
        });
        assert_expiration_sorted(&cache);
        assert_eq!(cache.entry_count(), 8);
    }

    #[test]
    fn failed_refresh_keeps_preexisting_expired_entry() {
        let cache = make_cache(Duration::from_millis(1));
        cache.set("key0".to_string(), "stale".to_string());
        std::thread::sleep(Duration::from_millis(5));

        let err = cache
            .get_or_refresh("key0".to_string(), || {
                Err::<String, _>(std::io::Error::other("backend down"))
            })
            .unwrap_err();
        assert_eq!(err.inner().to_string(), "backend down");

        // The entry survives (invisible to get) for the next attempt.
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.get(&"key0".to_string()), None);

        let value = cache
            .get_or_refresh("key0".to_string(), || {
                Ok::<_, std::io::Error>("fresh".to_string())
            })
            .unwrap();
        assert_eq!(&*value, "fresh");
    }
}
