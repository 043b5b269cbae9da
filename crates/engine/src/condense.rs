//! Folding of patch lists so each section is touched once.

use livepatch_proto::{Patch, PatchAction, Property};

/// Merges patches that share a path, keeping the order in which paths first
/// appear.
///
/// * a later `remove` replaces whatever came before
/// * a later `add` or `update` after a `remove` re-creates the section
/// * `update`s fold into the earlier patch: newer values win, and a property
///   removed later cancels a pending update (and vice versa)
#[must_use]
pub fn condense(patches: &[Patch]) -> Vec<Patch> {
	let mut out: Vec<Patch> = Vec::new();
	for patch in patches {
		match out.iter_mut().find(|acc| acc.path == patch.path) {
			Some(acc) => fold(acc, patch),
			None => out.push(patch.clone()),
		}
	}
	out
}

fn fold(acc: &mut Patch, next: &Patch) {
	match (acc.action, next.action) {
		(_, PatchAction::Remove) => *acc = next.clone(),
		(PatchAction::Remove, PatchAction::Add | PatchAction::Update) => {
			let props = if next.all.is_empty() { &next.update } else { &next.all };
			*acc = Patch::add(next.path.clone(), props.clone());
		}
		(PatchAction::Add, _) => {
			let incoming = if next.all.is_empty() { &next.update } else { &next.all };
			for prop in incoming {
				upsert(&mut acc.all, prop);
			}
			for prop in &next.remove {
				acc.all.retain(|p| p.name != prop.name);
			}
			acc.update = acc.all.clone();
		}
		(PatchAction::Update, PatchAction::Update | PatchAction::Add) => {
			let incoming = if next.all.is_empty() { &next.update } else { &next.all };
			for prop in incoming {
				acc.remove.retain(|p| p.name != prop.name);
				upsert(&mut acc.update, prop);
			}
			for prop in &next.remove {
				acc.update.retain(|p| p.name != prop.name);
				if !acc.remove.iter().any(|p| p.name == prop.name) {
					acc.remove.push(prop.clone());
				}
			}
		}
	}
}

fn upsert(props: &mut Vec<Property>, prop: &Property) {
	match props.iter_mut().find(|p| p.name == prop.name) {
		Some(existing) => existing.value.clone_from(&prop.value),
		None => props.push(prop.clone()),
	}
}

#[cfg(test)]
mod tests {
	use livepatch_proto::SectionPath;
	use pretty_assertions::assert_eq;

	use super::*;

	fn path(name: &str) -> SectionPath {
		SectionPath::root().child(name, 0)
	}

	#[test]
	fn updates_to_one_section_merge() {
		let patches = vec![
			Patch::update(path("a"), vec![Property::new("x", "1"), Property::new("y", "1")], vec![]),
			Patch::update(path("b"), vec![Property::new("z", "1")], vec![]),
			Patch::update(path("a"), vec![Property::new("x", "2")], vec![Property::new("y", "1")]),
		];
		assert_eq!(
			condense(&patches),
			vec![
				Patch::update(path("a"), vec![Property::new("x", "2")], vec![Property::new("y", "1")]),
				Patch::update(path("b"), vec![Property::new("z", "1")], vec![]),
			]
		);
	}

	#[test]
	fn remove_wins_and_readd_recreates() {
		let patches = vec![
			Patch::update(path("a"), vec![Property::new("x", "1")], vec![]),
			Patch::remove(path("a")),
		];
		assert_eq!(condense(&patches), vec![Patch::remove(path("a"))]);

		let patches = vec![Patch::remove(path("a")), Patch::update(path("a"), vec![Property::new("x", "1")], vec![])];
		assert_eq!(condense(&patches), vec![Patch::add(path("a"), vec![Property::new("x", "1")])]);
	}

	#[test]
	fn update_onto_add_stays_add() {
		let patches = vec![
			Patch::add(path("a"), vec![Property::new("x", "1")]),
			Patch::update(path("a"), vec![Property::new("y", "2")], vec![Property::new("x", "1")]),
		];
		assert_eq!(condense(&patches), vec![Patch::add(path("a"), vec![Property::new("y", "2")])]);
	}
}
