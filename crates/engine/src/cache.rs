//! Bounded per-uri cache of the last resolved tree.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::tree::StyleTree;

/// Capacity used when none is configured.
pub const DEFAULT_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(128).unwrap();

/// A cached tree and the content hash it was stored with.
#[derive(Debug, Clone)]
pub struct CachedTree {
	/// The tree.
	pub tree: Arc<StyleTree>,
	/// Hash supplied by the client, if any.
	pub hash: Option<String>,
}

impl CachedTree {
	/// Source text of the cached tree.
	#[must_use]
	pub fn source(&self) -> &str {
		self.tree.source()
	}
}

/// Least-recently-used map from document uri to its last tree.
#[derive(Debug)]
pub struct TreeCache {
	entries: Mutex<LruCache<String, CachedTree>>,
}

impl TreeCache {
	/// Creates a cache holding at most `capacity` documents.
	#[must_use]
	pub fn new(capacity: NonZeroUsize) -> Self {
		Self {
			entries: Mutex::new(LruCache::new(capacity)),
		}
	}

	/// Entry for `uri`, marking it recently used.
	pub fn get(&self, uri: &str) -> Option<CachedTree> {
		self.entries.lock().get(uri).cloned()
	}

	/// Stores `tree` as the latest state of `uri`, evicting the least recently
	/// used entry when full.
	pub fn add(&self, uri: impl Into<String>, tree: impl Into<Arc<StyleTree>>, hash: Option<String>) {
		let entry = CachedTree { tree: tree.into(), hash };
		self.entries.lock().put(uri.into(), entry);
	}

	/// Number of cached documents.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Whether nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for TreeCache {
	fn default() -> Self {
		Self::new(DEFAULT_CACHE_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tree(source: &str) -> StyleTree {
		StyleTree::parse(source).unwrap()
	}

	#[test]
	fn latest_add_wins() {
		let cache = TreeCache::default();
		cache.add("a.css", tree("a{x:1}"), None);
		cache.add("a.css", tree("a{x:2}"), Some("h2".into()));

		let entry = cache.get("a.css").unwrap();
		assert_eq!(entry.source(), "a{x:2}");
		assert_eq!(entry.hash.as_deref(), Some("h2"));
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn evicts_least_recently_used() {
		let cache = TreeCache::new(NonZeroUsize::new(2).unwrap());
		cache.add("a.css", tree(""), None);
		cache.add("b.css", tree(""), None);
		assert!(cache.get("a.css").is_some());
		cache.add("c.css", tree(""), None);

		assert!(cache.get("a.css").is_some());
		assert!(cache.get("b.css").is_none());
		assert!(cache.get("c.css").is_some());
	}
}
