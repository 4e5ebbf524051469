//! Lazily loaded, bounded dataset caches.

mod entry;
mod loader;

pub use entry::{CacheEntry, EntryStatus};
pub use loader::{CachingLoader, LoadFn, LoaderConfig};
