use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Duration;

use crate::cache::Cache;
use crate::metrics::{MetricsSink, NopMetrics};
use crate::sweep::CancellationToken;

/// Builder for configuring and constructing a [`Cache`].
///
/// The TTL is fixed for the instance's lifetime; every write and every
/// successful refresh stamps its entry with `now + ttl`.
///
/// # Example
/// ```
/// use solo::{CacheBuilder, CancellationToken};
/// use solo::metrics::RecorderMetrics;
/// use std::time::Duration;
///
/// let cancel = CancellationToken::new();
/// let cache: solo::Cache<String, String> = CacheBuilder::new(Duration::from_secs(60))
///     .metrics(RecorderMetrics::new("app_cache"))
///     .cancellation(cancel.clone())
///     .build();
/// ```
pub struct CacheBuilder<K, V> {
    ttl: Duration,
    metrics: Box<dyn MetricsSink>,
    cancel: CancellationToken,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CacheBuilder<K, V> {
    pub fn new(ttl: Duration) -> Self {
        CacheBuilder {
            ttl,
            metrics: Box::new(NopMetrics),
            cancel: CancellationToken::new(),
            _marker: PhantomData,
        }
    }

    /// Set the metrics sink.  Defaults to [`NopMetrics`].
    pub fn metrics<M: MetricsSink>(mut self, sink: M) -> Self {
        self.metrics = Box::new(sink);
        self
    }

    /// Set the cancellation token the background sweep observes.
    ///
    /// Defaults to a private token nobody cancels; pass a shared one to tie
    /// the sweep to your process shutdown.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> Cache<K, V> {
        Cache::new(self.ttl, self.metrics, self.cancel)
    }
}
