//! The CSS engine.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use livepatch_proto::{DEFAULT_SYNTAX, Patch};
use tracing::{debug, warn};

use crate::cache::TreeCache;
use crate::error::{PatchError, ResolveError};
use crate::tree::{Dependency, StyleTree};
use crate::{DiffPatchEngine, ResolveOptions, apply, condense, diff};

/// [`DiffPatchEngine`] for plain CSS.
#[derive(Debug, Default)]
pub struct CssEngine {
	cache: TreeCache,
}

impl CssEngine {
	/// Engine with the default cache capacity.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Engine caching at most `capacity` documents.
	#[must_use]
	pub fn with_cache_capacity(capacity: NonZeroUsize) -> Self {
		Self {
			cache: TreeCache::new(capacity),
		}
	}
}

#[async_trait]
impl DiffPatchEngine for CssEngine {
	async fn resolve(&self, source: &str, options: ResolveOptions<'_>) -> Result<StyleTree, ResolveError> {
		let mut tree = StyleTree::parse(source)?;
		let imports = tree.imports();
		let Some(loader) = options.loader.filter(|_| !imports.is_empty()) else {
			return Ok(tree);
		};

		debug!(uri = options.uri, imports = imports.len(), "engine.resolve_imports");
		let mut records = loader.load(imports.clone()).await;
		let dependencies = imports
			.into_iter()
			.map(|uri| {
				let record = records.iter().position(|r| r.uri == uri).map(|at| records.swap_remove(at));
				let tree = record.and_then(|r| match StyleTree::parse(r.content) {
					Ok(tree) => Some(tree),
					Err(error) => {
						warn!(uri = %uri, %error, "engine.dependency_unreadable");
						None
					}
				});
				Dependency { uri, tree }
			})
			.collect();
		tree.set_dependencies(dependencies);
		Ok(tree)
	}

	fn diff(&self, prev: &StyleTree, cur: &StyleTree) -> Vec<Patch> {
		diff::diff(prev, cur)
	}

	fn patch(&self, tree: &StyleTree, patches: &[Patch]) -> Result<StyleTree, PatchError> {
		let mut out = tree.clone();
		out.clear_changes();
		for patch in patches {
			apply::apply(&mut out, patch)?;
		}
		Ok(out)
	}

	fn condense(&self, patches: &[Patch]) -> Vec<Patch> {
		condense::condense(patches)
	}

	fn cache(&self) -> &TreeCache {
		&self.cache
	}

	fn supports(&self, syntax: &str) -> bool {
		syntax == DEFAULT_SYNTAX
	}

	fn syntaxes(&self) -> Vec<String> {
		vec![DEFAULT_SYNTAX.to_string()]
	}
}
