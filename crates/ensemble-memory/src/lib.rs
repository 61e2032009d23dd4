//! Result caching and knowledge persistence for ensemble flows.
//!
//! # Main types
//!
//! - [`TaskCache`] — Content-addressed, bounded LRU cache of task results.
//! - [`CacheConfig`] — Cache sizing loaded from configuration.
//! - [`KnowledgeStore`] — Trait for the knowledge-graph collaborator.
//! - [`InMemoryKnowledgeStore`] — Process-local knowledge store.

/// Content-addressed LRU task cache.
pub mod cache;
/// Knowledge store trait and in-memory implementation.
pub mod knowledge;

pub use cache::{cache_key, CacheConfig, CacheEntry, CacheStats, TaskCache, DEFAULT_CACHE_CAPACITY};
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeRecord, KnowledgeStore};
