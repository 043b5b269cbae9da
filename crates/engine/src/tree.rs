//! Stylesheet tree and its reader.
//!
//! The reader keeps byte ranges for every section and declaration so patches
//! can be applied as textual edits to the source text, preserving the
//! author's formatting outside the edited spans.

use std::ops::Range;

use livepatch_proto::{ChangeRange, PathSegment, SectionPath};

use crate::error::ResolveError;

/// A `name: value` declaration or a root at-rule statement such as
/// `@import "x.css";`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
	/// Property name, or the at-keyword including `@`.
	pub name: String,
	/// Trimmed value text.
	pub value: String,
	/// Full statement span, including the `;` when present.
	pub range: Range<usize>,
	/// Span of the trimmed value.
	pub value_range: Range<usize>,
	/// Whether the statement ends with `;`.
	pub terminated: bool,
}

/// A `name { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
	/// Whitespace-normalized section name (selector or at-rule prelude).
	pub name: String,
	/// Span from the first name byte through the closing brace.
	pub range: Range<usize>,
	/// Span between the braces.
	pub body: Range<usize>,
	/// Nested statements.
	pub children: Vec<Node>,
}

/// One statement of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
	/// Nested section.
	Section(Section),
	/// Property or at-rule statement.
	Declaration(Declaration),
}

/// A file referenced by `@import`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
	/// Referenced uri.
	pub uri: String,
	/// Parsed dependency, or `None` when it could not be fetched or read.
	pub tree: Option<StyleTree>,
}

/// Parsed stylesheet together with the edits applied to it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleTree {
	source: String,
	nodes: Vec<Node>,
	changes: Vec<ChangeRange>,
	dependencies: Vec<Dependency>,
}

impl StyleTree {
	/// Reads `source` into a tree.
	///
	/// # Errors
	///
	/// Returns a [`ResolveError`] for unbalanced braces, unterminated strings
	/// or comments, and statements that are not declarations.
	pub fn parse(source: impl Into<String>) -> Result<Self, ResolveError> {
		let source = source.into();
		let nodes = Parser::new(&source).block(None)?;
		Ok(Self {
			source,
			nodes,
			changes: Vec::new(),
			dependencies: Vec::new(),
		})
	}

	/// Current source text.
	#[must_use]
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Root statements.
	#[must_use]
	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	/// Edits applied since the tree was read, in application order.
	#[must_use]
	pub fn changes(&self) -> &[ChangeRange] {
		&self.changes
	}

	/// Imported files, in import order.
	#[must_use]
	pub fn dependencies(&self) -> &[Dependency] {
		&self.dependencies
	}

	pub(crate) fn set_dependencies(&mut self, dependencies: Vec<Dependency>) {
		self.dependencies = dependencies;
	}

	pub(crate) fn clear_changes(&mut self) {
		self.changes.clear();
	}

	/// The root block.
	#[must_use]
	pub fn root(&self) -> Block<'_> {
		Block {
			children: &self.nodes,
			body: 0..self.source.len(),
		}
	}

	/// Block addressed by `path`, or `None` when a segment does not exist.
	#[must_use]
	pub fn block(&self, path: &SectionPath) -> Option<Block<'_>> {
		let mut block = self.root();
		for seg in path.segments() {
			block = Block::of_section(block.section(seg)?);
		}
		Some(block)
	}

	/// Section addressed by `path`; `None` for the root or a missing section.
	#[must_use]
	pub fn section(&self, path: &SectionPath) -> Option<&Section> {
		let (parent, last) = path.split_last()?;
		self.block(&parent)?.section(last)
	}

	/// Uris referenced by root `@import` statements.
	#[must_use]
	pub fn imports(&self) -> Vec<String> {
		self.root()
			.declarations()
			.filter(|decl| decl.name.eq_ignore_ascii_case("@import"))
			.filter_map(|decl| import_target(&decl.value))
			.collect()
	}

	/// Replaces `range` of the source with `text`, re-reads the tree and
	/// records the edit.
	pub(crate) fn replace(&mut self, range: Range<usize>, text: &str) -> Result<(), ResolveError> {
		let mut source = self.source.clone();
		source.replace_range(range.clone(), text);
		let nodes = Parser::new(&source).block(None)?;
		self.source = source;
		self.nodes = nodes;
		self.changes.push(ChangeRange(range.start, range.end, text.to_string()));
		Ok(())
	}
}

/// Borrowed view of the statements inside the root or one section.
#[derive(Debug, Clone)]
pub struct Block<'a> {
	children: &'a [Node],
	body: Range<usize>,
}

impl<'a> Block<'a> {
	/// Body of `section`.
	#[must_use]
	pub fn of_section(section: &'a Section) -> Self {
		Self {
			children: &section.children,
			body: section.body.clone(),
		}
	}

	/// Statements of the block.
	#[must_use]
	pub const fn children(&self) -> &'a [Node] {
		self.children
	}

	/// Span between the braces (the whole source for the root).
	#[must_use]
	pub fn body(&self) -> Range<usize> {
		self.body.clone()
	}

	/// Direct declarations, in source order.
	pub fn declarations(&self) -> impl Iterator<Item = &'a Declaration> + use<'a> {
		self.children.iter().filter_map(|node| match node {
			Node::Declaration(decl) => Some(decl),
			Node::Section(_) => None,
		})
	}

	/// Direct sections paired with their path segment.
	#[must_use]
	pub fn keyed_sections(&self) -> Vec<(PathSegment, &'a Section)> {
		let mut seen: Vec<(&str, usize)> = Vec::new();
		let mut out = Vec::new();
		for node in self.children {
			let Node::Section(section) = node else {
				continue;
			};
			let ordinal = match seen.iter().position(|(name, _)| *name == section.name) {
				Some(slot) => {
					let ordinal = seen[slot].1;
					seen[slot].1 += 1;
					ordinal
				}
				None => {
					seen.push((section.name.as_str(), 1));
					0
				}
			};
			out.push((PathSegment::new(section.name.clone(), ordinal), section));
		}
		out
	}

	/// Direct section addressed by `seg`.
	#[must_use]
	pub fn section(&self, seg: &PathSegment) -> Option<&'a Section> {
		self.children
			.iter()
			.filter_map(|node| match node {
				Node::Section(section) if section.name == seg.name() => Some(section),
				_ => None,
			})
			.nth(seg.index())
	}

	/// Last direct declaration named `name`.
	#[must_use]
	pub fn declaration(&self, name: &str) -> Option<&'a Declaration> {
		self.declarations().filter(|decl| decl.name == name).last()
	}
}

fn import_target(value: &str) -> Option<String> {
	let value = value.trim();
	let target = if let Some(rest) = value.strip_prefix("url(") {
		rest.split(')').next()?
	} else if value.starts_with(['"', '\'']) {
		let quote = value.chars().next()?;
		value[1..].split(quote).next()?
	} else {
		value.split_ascii_whitespace().next()?
	};
	let target = target.trim().trim_matches(['"', '\'']);
	(!target.is_empty()).then(|| target.to_string())
}

struct Parser<'a> {
	src: &'a str,
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Parser<'a> {
	fn new(src: &'a str) -> Self {
		Self {
			src,
			bytes: src.as_bytes(),
			pos: 0,
		}
	}

	/// Reads statements until the closing brace of `open` (left unconsumed)
	/// or, for the root, end of input.
	fn block(&mut self, open: Option<(usize, &str)>) -> Result<Vec<Node>, ResolveError> {
		let mut nodes = Vec::new();
		loop {
			self.skip_trivia()?;
			let Some(&byte) = self.bytes.get(self.pos) else {
				return match open {
					Some((at, name)) => Err(ResolveError::Unclosed {
						name: name.to_string(),
						at,
					}),
					None => Ok(nodes),
				};
			};
			match byte {
				b'}' if open.is_none() => return Err(ResolveError::UnexpectedClose { at: self.pos }),
				b'}' => return Ok(nodes),
				b';' => self.pos += 1,
				_ => nodes.push(self.statement()?),
			}
		}
	}

	fn statement(&mut self) -> Result<Node, ResolveError> {
		let start = self.pos;
		let terminator = self.scan_prelude()?;
		let prelude_end = self.pos;

		if terminator == Some(b'{') {
			let name = normalize(&self.src[start..prelude_end]);
			self.pos += 1;
			let body_start = self.pos;
			let children = self.block(Some((start, &name)))?;
			let body_end = self.pos;
			self.pos += 1;
			return Ok(Node::Section(Section {
				name,
				range: start..self.pos,
				body: body_start..body_end,
				children,
			}));
		}

		let terminated = terminator == Some(b';');
		let (text_start, text_end) = trim(self.bytes, start, prelude_end);
		if terminated {
			self.pos += 1;
		}
		let end = if terminated { self.pos } else { text_end };
		self.declaration(text_start..text_end, end, terminated)
	}

	fn declaration(&self, text: Range<usize>, end: usize, terminated: bool) -> Result<Node, ResolveError> {
		let raw = &self.src[text.clone()];
		let (name, value_start) = if raw.starts_with('@') {
			let name_len = raw.find(|c: char| c.is_ascii_whitespace()).unwrap_or(raw.len());
			(&raw[..name_len], text.start + name_len)
		} else {
			let invalid = || ResolveError::InvalidDeclaration {
				text: raw.to_string(),
				at: text.start,
			};
			let colon = raw.find(':').ok_or_else(invalid)?;
			let name = raw[..colon].trim();
			if name.is_empty() {
				return Err(invalid());
			}
			(name, text.start + colon + 1)
		};

		let (value_start, value_end) = trim(self.bytes, value_start, text.end);
		Ok(Node::Declaration(Declaration {
			name: name.to_string(),
			value: self.src[value_start..value_end].to_string(),
			range: text.start..end,
			value_range: value_start..value_end,
			terminated,
		}))
	}

	/// Advances to the next `{`, `;` or `}` outside strings, comments and
	/// parentheses. Returns the byte found, or `None` at end of input.
	fn scan_prelude(&mut self) -> Result<Option<u8>, ResolveError> {
		let mut parens = 0usize;
		while let Some(&byte) = self.bytes.get(self.pos) {
			match byte {
				b'"' | b'\'' => self.skip_string(byte)?,
				b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => self.skip_comment()?,
				b'(' => {
					parens += 1;
					self.pos += 1;
				}
				b')' => {
					parens = parens.saturating_sub(1);
					self.pos += 1;
				}
				b'{' | b';' | b'}' if parens == 0 => return Ok(Some(byte)),
				_ => self.pos += 1,
			}
		}
		Ok(None)
	}

	fn skip_trivia(&mut self) -> Result<(), ResolveError> {
		while let Some(&byte) = self.bytes.get(self.pos) {
			if byte.is_ascii_whitespace() {
				self.pos += 1;
			} else if byte == b'/' && self.bytes.get(self.pos + 1) == Some(&b'*') {
				self.skip_comment()?;
			} else {
				break;
			}
		}
		Ok(())
	}

	fn skip_comment(&mut self) -> Result<(), ResolveError> {
		let at = self.pos;
		match self.src[at + 2..].find("*/") {
			Some(len) => {
				self.pos = at + 2 + len + 2;
				Ok(())
			}
			None => Err(ResolveError::UnterminatedComment { at }),
		}
	}

	fn skip_string(&mut self, quote: u8) -> Result<(), ResolveError> {
		let at = self.pos;
		self.pos += 1;
		loop {
			match self.bytes.get(self.pos) {
				None => return Err(ResolveError::UnterminatedString { at }),
				Some(b'\\') => self.pos += 2,
				Some(&byte) if byte == quote => {
					self.pos += 1;
					return Ok(());
				}
				Some(_) => self.pos += 1,
			}
		}
	}
}

fn trim(bytes: &[u8], mut start: usize, mut end: usize) -> (usize, usize) {
	while start < end && bytes[start].is_ascii_whitespace() {
		start += 1;
	}
	while end > start && bytes[end - 1].is_ascii_whitespace() {
		end -= 1;
	}
	(start, end)
}

/// Collapses whitespace runs and drops comments from a section prelude.
fn normalize(raw: &str) -> String {
	let mut cleaned = String::with_capacity(raw.len());
	let mut rest = raw;
	while let Some(open) = rest.find("/*") {
		cleaned.push_str(&rest[..open]);
		cleaned.push(' ');
		rest = match rest[open + 2..].find("*/") {
			Some(len) => &rest[open + 2 + len + 2..],
			None => "",
		};
	}
	cleaned.push_str(rest);
	cleaned.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn decls(block: &Block<'_>) -> Vec<(String, String)> {
		block.declarations().map(|d| (d.name.clone(), d.value.clone())).collect()
	}

	#[test]
	fn reads_sections_and_properties() {
		let tree = StyleTree::parse("a { color: red; margin:0 }\nb{}").unwrap();
		let root = tree.root();
		let sections = root.keyed_sections();
		assert_eq!(sections.len(), 2);
		assert_eq!(sections[0].0, PathSegment::new("a", 0));

		let a = tree.block(&SectionPath::root().child("a", 0)).unwrap();
		assert_eq!(
			decls(&a),
			vec![("color".into(), "red".into()), ("margin".into(), "0".into())]
		);
		let margin = a.declaration("margin").unwrap();
		assert!(!margin.terminated);
		assert_eq!(&tree.source()[margin.value_range.clone()], "0");
	}

	#[test]
	fn ordinals_count_same_named_siblings() {
		let tree = StyleTree::parse("a{x:1} b{} a{x:2}").unwrap();
		let second = tree.block(&SectionPath::root().child("a", 1)).unwrap();
		assert_eq!(second.declaration("x").unwrap().value, "2");
		assert!(tree.block(&SectionPath::root().child("a", 2)).is_none());
	}

	#[test]
	fn nested_blocks_and_normalized_names() {
		let tree = StyleTree::parse("@media  screen /* wide */ {\n  a,\n  b { x: 1 }\n}").unwrap();
		let path = SectionPath::root().child("@media screen", 0).child("a, b", 0);
		assert_eq!(tree.block(&path).unwrap().declaration("x").unwrap().value, "1");
	}

	#[test]
	fn braces_inside_strings_and_urls_do_not_count() {
		let tree = StyleTree::parse("a{content:\"}{\";background:url(data:x;y)}").unwrap();
		let a = tree.block(&SectionPath::root().child("a", 0)).unwrap();
		assert_eq!(a.declaration("content").unwrap().value, "\"}{\"");
		assert_eq!(a.declaration("background").unwrap().value, "url(data:x;y)");
	}

	#[test]
	fn collects_imports() {
		let tree = StyleTree::parse("@import url(\"/a.css\");\n@import '/b.css' screen;\n@import /c.css;\na{}").unwrap();
		assert_eq!(tree.imports(), vec!["/a.css", "/b.css", "/c.css"]);
	}

	#[test]
	fn reports_structural_errors() {
		assert_eq!(
			StyleTree::parse("a{x:1").unwrap_err(),
			ResolveError::Unclosed { name: "a".into(), at: 0 }
		);
		assert_eq!(StyleTree::parse("a{} }").unwrap_err(), ResolveError::UnexpectedClose { at: 4 });
		assert!(matches!(
			StyleTree::parse("a{oops}").unwrap_err(),
			ResolveError::InvalidDeclaration { .. }
		));
		assert!(matches!(
			StyleTree::parse("a{x:1} /* open").unwrap_err(),
			ResolveError::UnterminatedComment { .. }
		));
	}

	#[test]
	fn replace_records_change_and_rereads() {
		let mut tree = StyleTree::parse("a{x:1}").unwrap();
		tree.replace(4..5, "2").unwrap();
		assert_eq!(tree.source(), "a{x:2}");
		assert_eq!(tree.changes(), &[ChangeRange(4, 5, "2".into())]);
		assert_eq!(tree.block(&SectionPath::root().child("a", 0)).unwrap().declaration("x").unwrap().value, "2");
	}
}
