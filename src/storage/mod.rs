//! Storage Module
//!
//! Holds the in-memory TTL cache that add-ons use to memoize slow lookups.
//!
//! ## Example
//!
//! ```
//! use orderbot::storage::TtlCache;
//! use std::time::Duration;
//!
//! let mut cache = TtlCache::new(Duration::from_secs(300));
//! cache.set("projects", vec!["orderbot".to_string()]);
//! assert!(cache.get("projects").is_some());
//!
//! cache.retire("projects");
//! assert!(cache.get("projects").is_none());
//! ```

pub mod cache;

pub use cache::{Cache, TtlCache};
