//! Structural diff between two stylesheet trees.

use livepatch_proto::{Patch, Property, SectionPath};

use crate::tree::{Block, Section, StyleTree};

/// Computes the patches that turn `prev` into `cur`.
///
/// Sections are matched by path (name plus ordinal among same-named
/// siblings). Output order follows a pre-order walk of `cur`, with removals
/// of a block's vanished sections after that block's surviving ones.
#[must_use]
pub fn diff(prev: &StyleTree, cur: &StyleTree) -> Vec<Patch> {
	let mut out = Vec::new();
	diff_blocks(&SectionPath::root(), &prev.root(), &cur.root(), &mut out);
	out
}

fn diff_blocks(path: &SectionPath, prev: &Block<'_>, cur: &Block<'_>, out: &mut Vec<Patch>) {
	let before = effective_properties(prev);
	let after = effective_properties(cur);

	let update: Vec<Property> = after
		.iter()
		.filter(|prop| !before.iter().any(|old| old.name == prop.name && old.value == prop.value))
		.cloned()
		.collect();
	let remove: Vec<Property> = before
		.iter()
		.filter(|old| !after.iter().any(|prop| prop.name == old.name))
		.cloned()
		.collect();
	if !update.is_empty() || !remove.is_empty() {
		out.push(Patch::update(path.clone(), update, remove));
	}

	let prev_sections = prev.keyed_sections();
	let cur_sections = cur.keyed_sections();

	for (seg, section) in &cur_sections {
		let child = path.child(seg.name(), seg.index());
		match prev_sections.iter().find(|(old, _)| old == seg) {
			Some((_, old)) => diff_blocks(&child, &Block::of_section(old), &Block::of_section(section), out),
			None => add_section(&child, section, out),
		}
	}

	for (seg, _) in &prev_sections {
		if !cur_sections.iter().any(|(new, _)| new == seg) {
			out.push(Patch::remove(path.child(seg.name(), seg.index())));
		}
	}
}

fn add_section(path: &SectionPath, section: &Section, out: &mut Vec<Patch>) {
	let block = Block::of_section(section);
	out.push(Patch::add(path.clone(), effective_properties(&block)));
	for (seg, nested) in block.keyed_sections() {
		add_section(&path.child(seg.name(), seg.index()), nested, out);
	}
}

/// Declarations of a block with duplicates collapsed: the last value wins,
/// the first position is kept.
fn effective_properties(block: &Block<'_>) -> Vec<Property> {
	let mut props: Vec<Property> = Vec::new();
	for decl in block.declarations() {
		match props.iter_mut().find(|prop| prop.name == decl.name) {
			Some(prop) => prop.value.clone_from(&decl.value),
			None => props.push(Property::new(decl.name.clone(), decl.value.clone())),
		}
	}
	props
}

#[cfg(test)]
mod tests {
	use livepatch_proto::PatchAction;
	use pretty_assertions::assert_eq;

	use super::*;

	fn run(prev: &str, cur: &str) -> Vec<Patch> {
		diff(&StyleTree::parse(prev).unwrap(), &StyleTree::parse(cur).unwrap())
	}

	fn path(segments: &[(&str, usize)]) -> SectionPath {
		segments.iter().map(|(name, idx)| (*name, *idx)).collect()
	}

	#[test]
	fn identical_trees_have_no_patches() {
		assert!(run("a{x:1}", "a { x: 1; }").is_empty());
	}

	#[test]
	fn changed_value_is_an_update() {
		assert_eq!(
			run("a{color:red}", "a{color:blue}"),
			vec![Patch::update(path(&[("a", 0)]), vec![Property::new("color", "blue")], vec![])]
		);
	}

	#[test]
	fn dropped_property_is_removed() {
		let patches = run("a{x:1;y:2}", "a{x:1}");
		assert_eq!(
			patches,
			vec![Patch::update(path(&[("a", 0)]), vec![], vec![Property::new("y", "2")])]
		);
	}

	#[test]
	fn new_and_vanished_sections() {
		let patches = run("a{x:1} b{y:1}", "a{x:1} c{z:1}");
		assert_eq!(patches.len(), 2);
		assert_eq!(patches[0].action, PatchAction::Add);
		assert_eq!(patches[0].path, path(&[("c", 0)]));
		assert_eq!(patches[0].all, vec![Property::new("z", "1")]);
		assert_eq!(patches[1], Patch::remove(path(&[("b", 0)])));
	}

	#[test]
	fn nested_changes_carry_full_path() {
		let patches = run("@media print{a{x:1}}", "@media print{a{x:2}}");
		assert_eq!(patches.len(), 1);
		assert_eq!(patches[0].path, path(&[("@media print", 0), ("a", 0)]));
	}

	#[test]
	fn added_section_adds_nested_sections_too() {
		let patches = run("", "@media print{a{x:1}}");
		let paths: Vec<_> = patches.iter().map(|p| (p.action, p.path.clone())).collect();
		assert_eq!(
			paths,
			vec![
				(PatchAction::Add, path(&[("@media print", 0)])),
				(PatchAction::Add, path(&[("@media print", 0), ("a", 0)])),
			]
		);
	}
}
