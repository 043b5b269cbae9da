//! Structural patch operations exchanged with the client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One `name: value` pair inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
	/// Property name.
	pub name: String,
	/// Property value, trimmed.
	pub value: String,
}

impl Property {
	/// Creates a property.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// One step of a [`SectionPath`]: the section name and its 0-based ordinal
/// among siblings sharing that name.
///
/// Serialized as a two element array, e.g. `["a", 0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment(pub String, pub usize);

impl PathSegment {
	/// Creates a segment.
	pub fn new(name: impl Into<String>, index: usize) -> Self {
		Self(name.into(), index)
	}

	/// Section name.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.0
	}

	/// Ordinal among same-named siblings.
	#[must_use]
	pub const fn index(&self) -> usize {
		self.1
	}
}

/// Location of a section from the stylesheet root. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionPath(pub Vec<PathSegment>);

impl SectionPath {
	/// The stylesheet root.
	#[must_use]
	pub const fn root() -> Self {
		Self(Vec::new())
	}

	/// Returns true for the root path.
	#[must_use]
	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the path segments.
	#[must_use]
	pub fn segments(&self) -> &[PathSegment] {
		&self.0
	}

	/// Returns a new path extended by one segment.
	#[must_use]
	pub fn child(&self, name: impl Into<String>, index: usize) -> Self {
		let mut segments = self.0.clone();
		segments.push(PathSegment::new(name, index));
		Self(segments)
	}

	/// Returns the parent path and the last segment, or `None` for the root.
	#[must_use]
	pub fn split_last(&self) -> Option<(Self, &PathSegment)> {
		let (last, rest) = self.0.split_last()?;
		Some((Self(rest.to_vec()), last))
	}
}

impl fmt::Display for SectionPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return f.write_str("<root>");
		}
		for (i, seg) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(" / ")?;
			}
			write!(f, "{}[{}]", seg.0, seg.1)?;
		}
		Ok(())
	}
}

impl<S: Into<String>> FromIterator<(S, usize)> for SectionPath {
	fn from_iter<T: IntoIterator<Item = (S, usize)>>(iter: T) -> Self {
		Self(iter.into_iter().map(|(name, idx)| PathSegment::new(name, idx)).collect())
	}
}

/// Kind of structural change a [`Patch`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchAction {
	/// Create the section at the path.
	Add,
	/// Change properties of the section at the path.
	Update,
	/// Delete the section at the path.
	Remove,
}

/// A structural change to one section of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
	/// Target section.
	pub path: SectionPath,
	/// Change kind.
	pub action: PatchAction,
	/// Properties to set, in order.
	#[serde(default)]
	pub update: Vec<Property>,
	/// Properties to delete.
	#[serde(default)]
	pub remove: Vec<Property>,
	/// Full property list of an added section.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub all: Vec<Property>,
}

impl Patch {
	/// An `update` patch.
	#[must_use]
	pub fn update(path: SectionPath, update: Vec<Property>, remove: Vec<Property>) -> Self {
		Self {
			path,
			action: PatchAction::Update,
			update,
			remove,
			all: Vec::new(),
		}
	}

	/// An `add` patch carrying the section's full property list.
	#[must_use]
	pub fn add(path: SectionPath, all: Vec<Property>) -> Self {
		Self {
			path,
			action: PatchAction::Add,
			update: all.clone(),
			remove: Vec::new(),
			all,
		}
	}

	/// A `remove` patch.
	#[must_use]
	pub fn remove(path: SectionPath) -> Self {
		Self {
			path,
			action: PatchAction::Remove,
			update: Vec::new(),
			remove: Vec::new(),
			all: Vec::new(),
		}
	}
}

/// A textual edit produced by patch application: `[start, end, replacement]`.
///
/// Offsets are byte offsets into the source as it was immediately before this
/// edit; a list of ranges is meant to be replayed in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRange(pub usize, pub usize, pub String);

impl ChangeRange {
	/// Start offset.
	#[must_use]
	pub const fn start(&self) -> usize {
		self.0
	}

	/// End offset (exclusive) in the pre-edit source.
	#[must_use]
	pub const fn end(&self) -> usize {
		self.1
	}

	/// Inserted text.
	#[must_use]
	pub fn text(&self) -> &str {
		&self.2
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn patch_uses_array_path_segments() {
		let patch: Patch = serde_json::from_value(json!({
			"path": [["a", 0]],
			"action": "update",
			"update": [{"name": "x", "value": "2"}],
			"remove": []
		}))
		.unwrap();

		let expected: SectionPath = [("a", 0)].into_iter().collect();
		assert_eq!(patch.path, expected);
		assert_eq!(patch.update, vec![Property::new("x", "2")]);
		assert!(patch.all.is_empty());
	}

	#[test]
	fn update_patch_omits_all_list() {
		let value = serde_json::to_value(Patch::update(SectionPath::root().child("a", 0), vec![], vec![])).unwrap();
		assert_eq!(
			value,
			json!({"path": [["a", 0]], "action": "update", "update": [], "remove": []})
		);
	}

	#[test]
	fn path_display_is_readable() {
		let path: SectionPath = [("@media print", 0), ("a", 2)].into_iter().collect();
		assert_eq!(path.to_string(), "@media print[0] / a[2]");
		assert_eq!(SectionPath::root().to_string(), "<root>");
	}
}
