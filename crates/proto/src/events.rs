//! Client ↔ core events.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::patch::{ChangeRange, Patch};
use crate::payload::{CommandKind, CommandPayload, ContentPayload, DiffPayload, PatchPayload};
use crate::worker::{FileRequest, FilesReply};

/// Events the client sends to the core: `{name, data}`.
///
/// A command event whose `data` is absent or `null` still decodes, as an
/// empty payload, so the worker can reject it with a proper error reply
/// instead of the event vanishing at the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
	/// Request a diff for a document.
	CalculateDiff(DiffPayload),
	/// Request patch application.
	ApplyPatch(PatchPayload),
	/// Register a baseline for a document.
	InitialContent(ContentPayload),
	/// Answer to a prior `request-files`.
	Files(FilesReply),
	/// The client transport opened.
	Open,
	/// The client connected to its server.
	Connect,
}

#[derive(Deserialize)]
struct RawClientEvent {
	name: String,
	#[serde(default)]
	data: Value,
}

impl TryFrom<RawClientEvent> for ClientEvent {
	type Error = serde_json::Error;

	fn try_from(raw: RawClientEvent) -> Result<Self, Self::Error> {
		let kind = match raw.name.as_str() {
			"calculate-diff" => CommandKind::CalculateDiff,
			"apply-patch" => CommandKind::ApplyPatch,
			"initial-content" => CommandKind::InitialContent,
			"files" => return serde_json::from_value(raw.data).map(Self::Files),
			"open" => return Ok(Self::Open),
			"connect" => return Ok(Self::Connect),
			other => return Err(serde::de::Error::custom(format_args!("unknown client event `{other}`"))),
		};
		Ok(match CommandPayload::from_parts(kind, raw.data)? {
			CommandPayload::CalculateDiff(p) => Self::CalculateDiff(p),
			CommandPayload::ApplyPatch(p) => Self::ApplyPatch(p),
			CommandPayload::InitialContent(p) => Self::InitialContent(p),
		})
	}
}

impl<'de> Deserialize<'de> for ClientEvent {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = RawClientEvent::deserialize(deserializer)?;
		Self::try_from(raw).map_err(serde::de::Error::custom)
	}
}

impl ClientEvent {
	/// Splits out the queue-tracked command payload, if this event is one.
	pub fn into_command(self) -> Result<CommandPayload, Self> {
		match self {
			Self::CalculateDiff(p) => Ok(CommandPayload::CalculateDiff(p)),
			Self::ApplyPatch(p) => Ok(CommandPayload::ApplyPatch(p)),
			Self::InitialContent(p) => Ok(CommandPayload::InitialContent(p)),
			other => Err(other),
		}
	}
}

/// Where a client-visible error came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOrigin {
	/// Command that failed.
	pub name: CommandKind,
	/// Document the command targeted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub uri: Option<String>,
}

/// Events the core sends to the client: `{name, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "kebab-case")]
pub enum CoreEvent {
	/// Result of `calculate-diff`.
	Diff {
		/// Document uri.
		uri: String,
		/// Document syntax.
		syntax: String,
		/// Computed patches.
		patches: Vec<Patch>,
	},
	/// Result of `apply-patch`.
	Patch {
		/// Document uri.
		uri: String,
		/// Patched content.
		content: String,
		/// Textual edits applied.
		ranges: Vec<ChangeRange>,
		/// Hash echoed from the request.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		hash: Option<String>,
	},
	/// A command failed.
	Error {
		/// Failure message.
		message: String,
		/// Failing command.
		origin: ErrorOrigin,
	},
	/// The worker needs file contents.
	RequestFiles(FileRequest),
	/// Self-identification sent on connect.
	PatcherConnect,
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn unit_events_need_no_data() {
		let ev: ClientEvent = serde_json::from_value(json!({"name": "connect"})).unwrap();
		assert_eq!(ev, ClientEvent::Connect);
		assert_eq!(serde_json::to_value(CoreEvent::PatcherConnect).unwrap(), json!({"name": "patcher-connect"}));
	}

	#[test]
	fn error_event_carries_origin() {
		let ev = CoreEvent::Error {
			message: "Can't diff".into(),
			origin: ErrorOrigin {
				name: CommandKind::CalculateDiff,
				uri: Some("a.css".into()),
			},
		};
		assert_eq!(
			serde_json::to_value(ev).unwrap(),
			json!({"name": "error", "data": {"message": "Can't diff", "origin": {"name": "calculate-diff", "uri": "a.css"}}})
		);
	}

	#[test]
	fn command_without_data_decodes_as_empty_payload() {
		let absent: ClientEvent = serde_json::from_value(json!({"name": "calculate-diff"})).unwrap();
		let null: ClientEvent = serde_json::from_value(json!({"name": "initial-content", "data": null})).unwrap();
		assert_eq!(absent, ClientEvent::CalculateDiff(DiffPayload::default()));
		assert_eq!(null, ClientEvent::InitialContent(ContentPayload::default()));
	}

	#[test]
	fn unknown_or_mistyped_events_are_rejected() {
		assert!(serde_json::from_value::<ClientEvent>(json!({"name": "reload"})).is_err());
		assert!(serde_json::from_value::<ClientEvent>(json!({"name": "apply-patch", "data": 3})).is_err());
		assert!(serde_json::from_value::<ClientEvent>(json!({"name": "files"})).is_err());
	}

	#[test]
	fn encoding_keeps_the_tagged_shape() {
		let ev = ClientEvent::CalculateDiff(DiffPayload {
			uri: "a.css".into(),
			content: "a{}".into(),
			..Default::default()
		});
		let value = serde_json::to_value(&ev).unwrap();
		assert_eq!(value, json!({"name": "calculate-diff", "data": {"uri": "a.css", "content": "a{}"}}));
		assert_eq!(serde_json::from_value::<ClientEvent>(value).unwrap(), ev);
	}

	#[test]
	fn files_event_is_not_a_command() {
		let ev = ClientEvent::Files(FilesReply {
			token: "t".into(),
			files: vec![],
		});
		assert!(ev.into_command().is_err());
	}
}
