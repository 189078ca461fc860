mod builder;
mod cache;
mod entry;
mod error;
mod order;
mod sweep;
pub mod metrics;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use error::RefreshError;
pub use sweep::{CancellationToken, SweepHandle};
