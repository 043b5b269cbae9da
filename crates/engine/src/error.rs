//! Engine error types.

use livepatch_proto::SectionPath;
use thiserror::Error;

/// Failure to read source text into a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
	/// A `{` without its matching `}`.
	#[error("unclosed section `{name}` opened at {at}")]
	Unclosed {
		/// Section name.
		name: String,
		/// Byte offset of the section start.
		at: usize,
	},

	/// A `}` with no open section.
	#[error("unexpected `}}` at {at}")]
	UnexpectedClose {
		/// Byte offset of the brace.
		at: usize,
	},

	/// A statement that is neither a section, a property nor an at-rule.
	#[error("invalid declaration `{text}` at {at}")]
	InvalidDeclaration {
		/// Statement text.
		text: String,
		/// Byte offset of the statement.
		at: usize,
	},

	/// A `/*` without `*/`.
	#[error("unterminated comment at {at}")]
	UnterminatedComment {
		/// Byte offset of the comment start.
		at: usize,
	},

	/// A quote without its closing quote.
	#[error("unterminated string at {at}")]
	UnterminatedString {
		/// Byte offset of the opening quote.
		at: usize,
	},
}

/// Failure to apply a patch to a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
	/// The section a patch adds into does not exist.
	#[error("no parent section for {path}")]
	MissingParent {
		/// Path of the section being added.
		path: SectionPath,
	},

	/// An edit produced text that no longer parses.
	#[error("patched source is invalid: {0}")]
	Reparse(#[from] ResolveError),
}
