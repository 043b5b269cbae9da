//! Patch application as textual edits.
//!
//! Every edit is applied to the source, the tree is re-read, and the next
//! lookup runs against the fresh tree, so offsets never go stale between the
//! steps of one patch.

use livepatch_proto::{Patch, PatchAction, Property, SectionPath};

use crate::error::PatchError;
use crate::tree::{Block, StyleTree};

/// Applies one patch to `tree`, recording each edit in [`StyleTree::changes`].
///
/// # Errors
///
/// [`PatchError::MissingParent`] when a section must be created under a
/// parent that does not exist; [`PatchError::Reparse`] when an edit produces
/// unreadable text.
pub fn apply(tree: &mut StyleTree, patch: &Patch) -> Result<(), PatchError> {
	match patch.action {
		PatchAction::Remove => remove_section(tree, &patch.path),
		PatchAction::Add => {
			let props = if patch.all.is_empty() { &patch.update } else { &patch.all };
			if patch.path.is_root() || tree.section(&patch.path).is_some() {
				update_properties(tree, &patch.path, props, &[])
			} else {
				insert_section(tree, &patch.path, props)
			}
		}
		PatchAction::Update => {
			if !patch.path.is_root() && tree.section(&patch.path).is_none() {
				return insert_section(tree, &patch.path, &patch.update);
			}
			update_properties(tree, &patch.path, &patch.update, &patch.remove)
		}
	}
}

fn update_properties(tree: &mut StyleTree, path: &SectionPath, update: &[Property], remove: &[Property]) -> Result<(), PatchError> {
	for prop in update {
		let Some(block) = tree.block(path) else {
			break;
		};
		let edit = match block.declaration(&prop.name) {
			Some(decl) if decl.value == prop.value => None,
			Some(decl) => Some((decl.value_range.clone(), prop.value.clone())),
			None => Some(insertion(tree.source(), &block, prop)),
		};
		if let Some((range, text)) = edit {
			tree.replace(range, &text)?;
		}
	}

	for prop in remove {
		let Some(block) = tree.block(path) else {
			break;
		};
		let target = block
			.declarations()
			.filter(|decl| decl.name == prop.name)
			.max_by_key(|decl| decl.value == prop.value);
		if let Some(decl) = target {
			let start = decl.range.start;
			let end = skip_whitespace(tree.source(), decl.range.end, block.body().end);
			tree.replace(start..end, "")?;
		}
	}
	Ok(())
}

/// Where and what to insert to append `prop` to `block`.
fn insertion(source: &str, block: &Block<'_>, prop: &Property) -> (std::ops::Range<usize>, String) {
	let rendered = render_property(prop);
	match block.declarations().last() {
		Some(last) if !last.terminated => (last.range.end..last.range.end, format!(";{rendered}")),
		Some(last) => (last.range.end..last.range.end, format!(" {rendered}")),
		None => {
			let at = block.body().start;
			let text = if at == 0 && !source.is_empty() {
				format!("{rendered}\n")
			} else {
				rendered
			};
			(at..at, text)
		}
	}
}

fn insert_section(tree: &mut StyleTree, path: &SectionPath, props: &[Property]) -> Result<(), PatchError> {
	let Some((parent, last)) = path.split_last() else {
		return update_properties(tree, path, props, &[]);
	};
	let Some(block) = tree.block(&parent) else {
		return Err(PatchError::MissingParent { path: path.clone() });
	};

	let at = block.body().end;
	let body = props.iter().map(render_property).collect::<Vec<_>>().join(" ");
	let lead = match tree.source()[..at].chars().next_back() {
		None | Some('{') => "",
		Some(c) if c.is_whitespace() => "",
		Some(_) => "\n",
	};
	let text = format!("{lead}{} {{{body}}}", last.name());
	tree.replace(at..at, &text)?;
	Ok(())
}

fn remove_section(tree: &mut StyleTree, path: &SectionPath) -> Result<(), PatchError> {
	let Some((parent, _)) = path.split_last() else {
		return Ok(());
	};
	let (Some(section), Some(block)) = (tree.section(path), tree.block(&parent)) else {
		return Ok(());
	};
	let start = section.range.start;
	let end = skip_whitespace(tree.source(), section.range.end, block.body().end);
	tree.replace(start..end, "")?;
	Ok(())
}

fn render_property(prop: &Property) -> String {
	if prop.name.starts_with('@') {
		format!("{} {};", prop.name, prop.value)
	} else {
		format!("{}: {};", prop.name, prop.value)
	}
}

fn skip_whitespace(source: &str, from: usize, limit: usize) -> usize {
	let trailing = source[from..limit].len() - source[from..limit].trim_start().len();
	from + trailing
}

#[cfg(test)]
mod tests {
	use livepatch_proto::ChangeRange;
	use pretty_assertions::assert_eq;

	use super::*;

	fn a() -> SectionPath {
		SectionPath::root().child("a", 0)
	}

	fn patched(source: &str, patch: Patch) -> StyleTree {
		let mut tree = StyleTree::parse(source).unwrap();
		apply(&mut tree, &patch).unwrap();
		tree
	}

	#[test]
	fn updates_value_in_place() {
		let tree = patched("a{x:1}", Patch::update(a(), vec![Property::new("x", "2")], vec![]));
		assert_eq!(tree.source(), "a{x:2}");
		assert_eq!(tree.changes(), &[ChangeRange(4, 5, "2".into())]);
	}

	#[test]
	fn appends_missing_property() {
		let tree = patched("a{x:1}", Patch::update(a(), vec![Property::new("y", "2")], vec![]));
		assert_eq!(tree.source(), "a{x:1;y: 2;}");

		let tree = patched("a { x: 1; }", Patch::update(a(), vec![Property::new("y", "2")], vec![]));
		assert_eq!(tree.source(), "a { x: 1; y: 2; }");

		let tree = patched("a{}", Patch::update(a(), vec![Property::new("y", "2")], vec![]));
		assert_eq!(tree.source(), "a{y: 2;}");
	}

	#[test]
	fn removes_property_with_trailing_space() {
		let tree = patched("a{x:1; y:2}", Patch::update(a(), vec![], vec![Property::new("x", "1")]));
		assert_eq!(tree.source(), "a{y:2}");
	}

	#[test]
	fn adds_and_removes_sections() {
		let tree = patched("a{x:1}", Patch::add(SectionPath::root().child("b", 0), vec![Property::new("y", "2")]));
		assert_eq!(tree.source(), "a{x:1}\nb {y: 2;}");

		let tree = patched("a{x:1} b{y:2}", Patch::remove(SectionPath::root().child("b", 0)));
		assert_eq!(tree.source(), "a{x:1} ");

		let tree = patched("a{x:1}", Patch::remove(SectionPath::root().child("b", 0)));
		assert_eq!(tree.source(), "a{x:1}");
		assert!(tree.changes().is_empty());
	}

	#[test]
	fn update_of_missing_section_creates_it() {
		let tree = patched("", Patch::update(a(), vec![Property::new("x", "1")], vec![]));
		assert_eq!(tree.source(), "a {x: 1;}");
	}

	#[test]
	fn add_under_missing_parent_fails() {
		let mut tree = StyleTree::parse("a{}").unwrap();
		let path = SectionPath::root().child("@media print", 0).child("a", 0);
		assert_eq!(
			apply(&mut tree, &Patch::add(path.clone(), vec![])).unwrap_err(),
			PatchError::MissingParent { path }
		);
	}
}
