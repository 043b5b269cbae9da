//! Command kinds and their payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::patch::Patch;

/// The named requests the core forwards to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
	/// Compute patches between a baseline and the current content.
	CalculateDiff,
	/// Apply patches to content and return the updated text.
	ApplyPatch,
	/// Register a baseline tree for a uri.
	InitialContent,
}

impl CommandKind {
	/// Wire name of the command.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::CalculateDiff => "calculate-diff",
			Self::ApplyPatch => "apply-patch",
			Self::InitialContent => "initial-content",
		}
	}
}

impl fmt::Display for CommandKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Payload of `calculate-diff`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffPayload {
	/// Document uri.
	pub uri: String,
	/// Document syntax; the worker substitutes its default when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub syntax: Option<String>,
	/// Current document content.
	pub content: String,
	/// Explicit baseline overriding the cached tree for `uri`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub previous: Option<String>,
	/// Caller supplied content hash stored alongside the cached tree.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hash: Option<String>,
}

/// Payload of `apply-patch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchPayload {
	/// Document uri.
	pub uri: String,
	/// Document syntax; the worker substitutes its default when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub syntax: Option<String>,
	/// Content the patches apply to.
	pub content: String,
	/// Ordered patch operations.
	pub patches: Vec<Patch>,
	/// Hash echoed back in the reply.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hash: Option<String>,
}

/// Payload of `initial-content`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPayload {
	/// Document uri.
	pub uri: String,
	/// Document syntax; the worker substitutes its default when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub syntax: Option<String>,
	/// Baseline content.
	pub content: String,
	/// Hash stored alongside the cached tree.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hash: Option<String>,
}

/// A command payload tagged by its kind.
///
/// Serialized as `{"name": <kind>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "kebab-case")]
pub enum CommandPayload {
	/// `calculate-diff`.
	CalculateDiff(DiffPayload),
	/// `apply-patch`.
	ApplyPatch(PatchPayload),
	/// `initial-content`.
	InitialContent(ContentPayload),
}

impl CommandPayload {
	/// Kind of this payload.
	#[must_use]
	pub const fn kind(&self) -> CommandKind {
		match self {
			Self::CalculateDiff(_) => CommandKind::CalculateDiff,
			Self::ApplyPatch(_) => CommandKind::ApplyPatch,
			Self::InitialContent(_) => CommandKind::InitialContent,
		}
	}

	/// Target document uri.
	#[must_use]
	pub fn uri(&self) -> &str {
		match self {
			Self::CalculateDiff(p) => &p.uri,
			Self::ApplyPatch(p) => &p.uri,
			Self::InitialContent(p) => &p.uri,
		}
	}

	/// Syntax named by the payload, if any.
	#[must_use]
	pub fn syntax(&self) -> Option<&str> {
		match self {
			Self::CalculateDiff(p) => p.syntax.as_deref(),
			Self::ApplyPatch(p) => p.syntax.as_deref(),
			Self::InitialContent(p) => p.syntax.as_deref(),
		}
	}

	/// Builds a payload of `kind` from its JSON `data`. Absent (`null`) data
	/// decodes as an empty payload, which the worker rejects during validation.
	///
	/// # Errors
	///
	/// Returns the decode error when `data` does not match the payload shape.
	pub fn from_parts(kind: CommandKind, data: serde_json::Value) -> serde_json::Result<Self> {
		let data = if data.is_null() { serde_json::Value::Object(Default::default()) } else { data };
		Ok(match kind {
			CommandKind::CalculateDiff => Self::CalculateDiff(serde_json::from_value(data)?),
			CommandKind::ApplyPatch => Self::ApplyPatch(serde_json::from_value(data)?),
			CommandKind::InitialContent => Self::InitialContent(serde_json::from_value(data)?),
		})
	}

	/// Encodes the payload body without its kind tag.
	///
	/// # Errors
	///
	/// Propagates serializer failures.
	pub fn data(&self) -> serde_json::Result<serde_json::Value> {
		match self {
			Self::CalculateDiff(p) => serde_json::to_value(p),
			Self::ApplyPatch(p) => serde_json::to_value(p),
			Self::InitialContent(p) => serde_json::to_value(p),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn payload_is_tagged_by_name() {
		let payload = CommandPayload::InitialContent(ContentPayload {
			uri: "a.css".into(),
			content: "a{x:1}".into(),
			..Default::default()
		});
		assert_eq!(
			serde_json::to_value(&payload).unwrap(),
			json!({"name": "initial-content", "data": {"uri": "a.css", "content": "a{x:1}"}})
		);
	}

	#[test]
	fn missing_fields_default() {
		let payload = CommandPayload::from_parts(CommandKind::CalculateDiff, json!({"uri": "a.css"})).unwrap();
		let CommandPayload::CalculateDiff(diff) = payload else {
			panic!("wrong kind");
		};
		assert_eq!(diff.content, "");
		assert!(diff.previous.is_none());
		assert!(diff.syntax.is_none());
	}

	#[test]
	fn null_data_is_an_empty_payload() {
		let payload = CommandPayload::from_parts(CommandKind::InitialContent, serde_json::Value::Null).unwrap();
		assert_eq!(payload.uri(), "");
	}

	#[test]
	fn empty_previous_is_still_a_baseline() {
		let payload: DiffPayload = serde_json::from_value(json!({"uri": "a.css", "previous": ""})).unwrap();
		assert_eq!(payload.previous.as_deref(), Some(""));
	}
}
