use thiserror::Error;

/// The error returned by [`Cache::get_or_refresh`] when the caller-supplied
/// refresh function fails.
///
/// The engine adds no failure kinds of its own: this is a thin wrapper that
/// keeps the original error reachable through [`std::error::Error::source`]
/// and recoverable via [`into_inner`].
///
/// [`Cache::get_or_refresh`]: crate::Cache::get_or_refresh
/// [`into_inner`]: RefreshError::into_inner
#[derive(Debug, Error)]
#[error("refresh failed: {source}")]
pub struct RefreshError<E>
where
    E: std::error::Error + 'static,
{
    #[source]
    source: E,
}

impl<E> RefreshError<E>
where
    E: std::error::Error + 'static,
{
    pub(crate) fn new(source: E) -> Self {
        RefreshError { source }
    }

    /// A reference to the original refresh error.
    pub fn inner(&self) -> &E {
        &self.source
    }

    /// Unwraps the original refresh error.
    pub fn into_inner(self) -> E {
        self.source
    }
}
