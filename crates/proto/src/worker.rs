//! Core ↔ worker envelopes and the nested file-fetch sub-protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CommandId, FileToken};
use crate::patch::{ChangeRange, Patch};
use crate::payload::{CommandKind, CommandPayload};

/// A command posted to the worker: `{commandId, name, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequest", into = "RawRequest")]
pub struct WorkerRequest {
	/// Correlation id echoed by the reply.
	pub command_id: CommandId,
	/// Command payload.
	pub payload: CommandPayload,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
	command_id: CommandId,
	name: CommandKind,
	#[serde(default)]
	data: Value,
}

impl TryFrom<RawRequest> for WorkerRequest {
	type Error = serde_json::Error;

	fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
		Ok(Self {
			command_id: raw.command_id,
			payload: CommandPayload::from_parts(raw.name, raw.data)?,
		})
	}
}

impl From<WorkerRequest> for RawRequest {
	fn from(req: WorkerRequest) -> Self {
		Self {
			command_id: req.command_id,
			name: req.payload.kind(),
			data: req.payload.data().unwrap_or(Value::Null),
		}
	}
}

/// Status half of a worker reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
	/// The command succeeded.
	Ok,
	/// The command failed; `data` carries the message.
	Error,
}

/// Result of an `apply-patch` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
	/// Patched content.
	pub content: String,
	/// Textual edits that turned the input content into `content`.
	pub ranges: Vec<ChangeRange>,
	/// Hash echoed from the request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hash: Option<String>,
}

/// Successful reply data, shaped by command kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyData {
	/// `calculate-diff`: the computed patch list.
	Patches(Vec<Patch>),
	/// `apply-patch`: the updated document.
	Patched(PatchResult),
	/// `initial-content`: nothing.
	Empty,
}

/// Outcome carried by a worker reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
	/// `status: "ok"`.
	Ok(ReplyData),
	/// `status: "error"` with a human readable message.
	Error(String),
}

impl ReplyOutcome {
	/// Wire status of the outcome.
	#[must_use]
	pub const fn status(&self) -> ReplyStatus {
		match self {
			Self::Ok(_) => ReplyStatus::Ok,
			Self::Error(_) => ReplyStatus::Error,
		}
	}
}

/// A worker reply: `{commandId, status, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawReply", into = "RawReply")]
pub struct WorkerReply {
	/// Id of the command this reply answers.
	pub command_id: CommandId,
	/// Reply outcome.
	pub outcome: ReplyOutcome,
}

impl WorkerReply {
	/// A successful reply.
	#[must_use]
	pub const fn ok(command_id: CommandId, data: ReplyData) -> Self {
		Self {
			command_id,
			outcome: ReplyOutcome::Ok(data),
		}
	}

	/// A failed reply.
	pub fn error(command_id: CommandId, message: impl Into<String>) -> Self {
		Self {
			command_id,
			outcome: ReplyOutcome::Error(message.into()),
		}
	}
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
	command_id: CommandId,
	status: ReplyStatus,
	#[serde(default)]
	data: Value,
}

impl TryFrom<RawReply> for WorkerReply {
	type Error = serde_json::Error;

	fn try_from(raw: RawReply) -> Result<Self, Self::Error> {
		let outcome = match raw.status {
			ReplyStatus::Ok => ReplyOutcome::Ok(serde_json::from_value(raw.data)?),
			ReplyStatus::Error => ReplyOutcome::Error(match raw.data {
				Value::String(message) => message,
				other => other.to_string(),
			}),
		};
		Ok(Self {
			command_id: raw.command_id,
			outcome,
		})
	}
}

impl From<WorkerReply> for RawReply {
	fn from(reply: WorkerReply) -> Self {
		let status = reply.outcome.status();
		let data = match reply.outcome {
			ReplyOutcome::Ok(data) => serde_json::to_value(data).unwrap_or(Value::Null),
			ReplyOutcome::Error(message) => Value::String(message),
		};
		Self {
			command_id: reply.command_id,
			status,
			data,
		}
	}
}

/// One fetched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
	/// File uri as requested.
	pub uri: String,
	/// File content.
	pub content: String,
}

impl FileRecord {
	/// Creates a record.
	pub fn new(uri: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			uri: uri.into(),
			content: content.into(),
		}
	}
}

/// Worker → client request for file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
	/// Correlation token the reply must echo.
	pub token: FileToken,
	/// Uris to fetch.
	pub files: Vec<String>,
}

/// Client → worker answer to a [`FileRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesReply {
	/// Token of the request being answered.
	pub token: FileToken,
	/// Fetched files; may be shorter than the request.
	#[serde(default)]
	pub files: Vec<FileRecord>,
}

/// Worker notices that are not command replies: `{name, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "kebab-case")]
pub enum WorkerNotice {
	/// Nested file fetch issued while a command resolves imports.
	RequestFiles(FileRequest),
	/// Sent once when the worker starts.
	Init(String),
}

/// Anything the worker sends to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerOutbound {
	/// Correlated command reply.
	Reply(WorkerReply),
	/// Uncorrelated notice.
	Notice(WorkerNotice),
}

/// Non-command messages the core sends to the worker: `{name, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "kebab-case")]
pub enum InboundNotice {
	/// Reply half of the file-fetch sub-protocol.
	Files(FilesReply),
}

/// Anything the core sends to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerInbound {
	/// A queue-tracked command.
	Command(WorkerRequest),
	/// A notice that bypasses the command queue.
	Notice(InboundNotice),
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;
	use crate::payload::DiffPayload;

	#[test]
	fn request_envelope_shape() {
		let req = WorkerRequest {
			command_id: CommandId(7),
			payload: CommandPayload::CalculateDiff(DiffPayload {
				uri: "a.css".into(),
				content: "a{}".into(),
				..Default::default()
			}),
		};
		assert_eq!(
			serde_json::to_value(&req).unwrap(),
			json!({"commandId": 7, "name": "calculate-diff", "data": {"uri": "a.css", "content": "a{}"}})
		);
	}

	#[test]
	fn inbound_files_message_is_not_a_command() {
		let msg: WorkerInbound = serde_json::from_value(json!({
			"name": "files",
			"data": {"token": "t1", "files": [{"uri": "/dep.css", "content": "b{}"}]}
		}))
		.unwrap();
		assert_eq!(
			msg,
			WorkerInbound::Notice(InboundNotice::Files(FilesReply {
				token: FileToken::from("t1"),
				files: vec![FileRecord::new("/dep.css", "b{}")],
			}))
		);
	}

	#[test]
	fn request_without_data_decodes_empty() {
		let req: WorkerRequest = serde_json::from_value(json!({"commandId": 1, "name": "apply-patch"})).unwrap();
		assert_eq!(req.payload.kind(), CommandKind::ApplyPatch);
		assert_eq!(req.payload.uri(), "");
	}

	#[test]
	fn request_with_mistyped_data_is_rejected() {
		let res = serde_json::from_value::<WorkerRequest>(json!({"commandId": 1, "name": "apply-patch", "data": 3}));
		assert!(res.is_err());
	}

	#[test]
	fn reply_shapes() {
		let ok = WorkerReply::ok(CommandId(3), ReplyData::Empty);
		assert_eq!(
			serde_json::to_value(&ok).unwrap(),
			json!({"commandId": 3, "status": "ok", "data": null})
		);

		let err: WorkerReply = serde_json::from_value(json!({"commandId": 4, "status": "error", "data": "boom"})).unwrap();
		assert_eq!(err, WorkerReply::error(CommandId(4), "boom"));

		let diff: WorkerOutbound = serde_json::from_value(json!({"commandId": 5, "status": "ok", "data": []})).unwrap();
		assert_eq!(diff, WorkerOutbound::Reply(WorkerReply::ok(CommandId(5), ReplyData::Patches(vec![]))));
	}

	#[test]
	fn request_files_notice_shape() {
		let notice = WorkerOutbound::Notice(WorkerNotice::RequestFiles(FileRequest {
			token: FileToken::from("abc"),
			files: vec!["/dep.css".into()],
		}));
		assert_eq!(
			serde_json::to_value(&notice).unwrap(),
			json!({"name": "request-files", "data": {"token": "abc", "files": ["/dep.css"]}})
		);
	}
}
