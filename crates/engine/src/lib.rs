//! Diff/patch engine for livepatch.
//!
//! The worker talks to an engine only through [`DiffPatchEngine`]: resolve
//! source text into a [`StyleTree`], diff two trees, apply a patch set, and
//! keep the last tree per document in a [`TreeCache`]. [`CssEngine`] is the
//! one implementation, covering the `css` syntax.
//!
//! Resolution may need other files (`@import`). The engine does not fetch
//! them itself; the caller passes a [`FileLoad`] through [`ResolveOptions`]
//! and the engine awaits it.

#![warn(missing_docs)]

pub mod apply;
pub mod cache;
pub mod condense;
mod css;
pub mod diff;
pub mod error;
pub mod tree;

use async_trait::async_trait;
pub use cache::{CachedTree, DEFAULT_CACHE_CAPACITY, TreeCache};
pub use css::CssEngine;
pub use error::{PatchError, ResolveError};
use livepatch_proto::{FileRecord, Patch};
pub use tree::{Block, Declaration, Dependency, Node, Section, StyleTree};

/// Source of file contents for import resolution.
///
/// Implementations must always complete: a file that cannot be fetched is
/// simply absent from the returned list.
#[async_trait]
pub trait FileLoad: Send + Sync {
	/// Fetches `uris`, returning records for those that could be read.
	async fn load(&self, uris: Vec<String>) -> Vec<FileRecord>;
}

/// Per-call resolution context.
#[derive(Clone, Copy)]
pub struct ResolveOptions<'a> {
	/// Document being resolved, for logging.
	pub uri: &'a str,
	/// Syntax of the document.
	pub syntax: &'a str,
	/// Fetches imported files; `None` leaves imports unresolved.
	pub loader: Option<&'a dyn FileLoad>,
}

impl std::fmt::Debug for ResolveOptions<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResolveOptions")
			.field("uri", &self.uri)
			.field("syntax", &self.syntax)
			.field("loader", &self.loader.is_some())
			.finish()
	}
}

/// Source-tree engine used by the worker.
#[async_trait]
pub trait DiffPatchEngine: Send + Sync + 'static {
	/// Reads `source` into a tree, resolving imports through
	/// `options.loader` when given.
	async fn resolve(&self, source: &str, options: ResolveOptions<'_>) -> Result<StyleTree, ResolveError>;

	/// Patches turning `prev` into `cur`.
	fn diff(&self, prev: &StyleTree, cur: &StyleTree) -> Vec<Patch>;

	/// Applies `patches` in order to a copy of `tree`. The returned tree's
	/// [`StyleTree::changes`] lists only the edits made by this call.
	fn patch(&self, tree: &StyleTree, patches: &[Patch]) -> Result<StyleTree, PatchError>;

	/// Folds `patches` so each path is touched once.
	fn condense(&self, patches: &[Patch]) -> Vec<Patch>;

	/// Last tree per document.
	fn cache(&self) -> &TreeCache;

	/// Whether `syntax` can be resolved.
	fn supports(&self, syntax: &str) -> bool;

	/// All supported syntaxes.
	fn syntaxes(&self) -> Vec<String>;
}
