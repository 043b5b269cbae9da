//! Command-scoped failures. Every variant becomes an `error` reply.

use livepatch_engine::{PatchError, ResolveError};
use thiserror::Error;

/// A payload rejected before it reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	/// The payload does not name a document.
	#[error("No data")]
	MissingData,
	/// The engine cannot read this syntax.
	#[error("Syntax {0} is not supported")]
	UnsupportedSyntax(String),
}

/// Which source text failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
	/// `content` of a diff request.
	Current,
	/// The diff baseline.
	Previous,
	/// `content` of an `initial-content` request.
	Initial,
	/// `content` of an `apply-patch` request.
	PatchTarget,
}

impl SourceState {
	const fn describe(self) -> &'static str {
		match self {
			Self::Current => "Error parsing current state of",
			Self::Previous => "Error parsing previous state of",
			Self::Initial => "Unable to parse initial content of",
			Self::PatchTarget => "Unable to apply patch on",
		}
	}
}

/// Failure of one worker command.
#[derive(Debug, Error)]
pub enum CommandError {
	/// Rejected payload.
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// The engine could not read a source.
	#[error("{} {uri}:\n{source}", .state.describe())]
	Resolution {
		/// Document uri.
		uri: String,
		/// Which source failed.
		state: SourceState,
		/// Engine error.
		source: ResolveError,
	},

	/// A diff with no explicit baseline and nothing cached.
	#[error("Can't diff: no previous state for {uri}")]
	NoBaseline {
		/// Document uri.
		uri: String,
	},

	/// A patch set could not be applied.
	#[error("Unable to apply patch on {uri}:\n{source}")]
	Patch {
		/// Document uri.
		uri: String,
		/// Engine error.
		source: PatchError,
	},

	/// The command task panicked.
	#[error("{message}{}", trace_suffix(.trace.as_deref()))]
	Panicked {
		/// Panic payload text.
		message: String,
		/// Backtrace captured at the panic site, when one was recorded.
		trace: Option<String>,
	},
}

fn trace_suffix(trace: Option<&str>) -> String {
	trace.map(|trace| format!("\nstack backtrace:\n{trace}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn messages_name_the_failing_state() {
		let err = CommandError::Resolution {
			uri: "a.css".into(),
			state: SourceState::Previous,
			source: ResolveError::UnexpectedClose { at: 3 },
		};
		assert_eq!(err.to_string(), "Error parsing previous state of a.css:\nunexpected `}` at 3");
		assert_eq!(
			CommandError::from(ValidationError::UnsupportedSyntax("less".into())).to_string(),
			"Syntax less is not supported"
		);
	}

	#[test]
	fn panic_message_carries_trace_when_recorded() {
		let bare = CommandError::Panicked {
			message: "boom".into(),
			trace: None,
		};
		assert_eq!(bare.to_string(), "boom");

		let traced = CommandError::Panicked {
			message: "boom".into(),
			trace: Some("   0: livepatch::run".into()),
		};
		assert_eq!(traced.to_string(), "boom\nstack backtrace:\n   0: livepatch::run");
	}
}
