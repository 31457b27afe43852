//! Content cache: versioned keys, a pluggable key-value store, and the typed
//! adapter the pipeline talks to.

pub mod content;
pub mod keys;
pub mod store;

pub use content::{CachedEntry, ContentCache};
pub use keys::build_key;
pub use store::{CacheStore, MemoryStore, RedisStore};
