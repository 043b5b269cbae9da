//! Correlation identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier correlating a worker reply with the command that caused it.
///
/// Ids are never reused within a process: they come from [`CommandIdGen`],
/// which draws from one process-wide counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "command{}", self.0)
	}
}

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(0);

/// Monotonic command id source.
///
/// Every generator hands out ids from the same process-wide sequence so two
/// queues can never observe the same id.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandIdGen;

impl CommandIdGen {
	/// Creates a generator handle.
	#[must_use]
	pub const fn new() -> Self {
		Self
	}

	/// Returns the next unused id.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&self) -> CommandId {
		CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Opaque token correlating a `files` reply with its `request-files` request.
///
/// Tokens are unique among currently pending requests only; the file loader
/// guarantees that, not the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileToken(pub String);

impl FileToken {
	/// Generates a fresh random token.
	#[must_use]
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	/// Returns the token text.
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for FileToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for FileToken {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_are_strictly_increasing_across_generators() {
		let a = CommandIdGen::new();
		let b = CommandIdGen::new();
		let first = a.next();
		let second = b.next();
		let third = a.next();
		assert!(first < second);
		assert!(second < third);
	}

	#[test]
	fn generated_tokens_differ() {
		assert_ne!(FileToken::generate(), FileToken::generate());
	}
}
