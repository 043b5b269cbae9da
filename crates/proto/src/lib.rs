//! Shared wire types for livepatch.
//!
//! Three parties exchange messages:
//! * the client (editor or browser extension) talks to the core with
//!   [`ClientEvent`] and receives [`CoreEvent`]
//! * the core posts [`WorkerInbound`] messages to the worker and receives
//!   [`WorkerOutbound`]
//! * inside a command, the worker may issue a nested [`FileRequest`] that the
//!   client answers with a [`FilesReply`]
//!
//! Every type serializes to the JSON shapes used on the wire
//! (`{commandId, name, data}` requests, `{commandId, status, data}` replies,
//! `{name, data}` events).

#![warn(missing_docs)]

pub mod events;
pub mod ids;
pub mod patch;
pub mod payload;
pub mod worker;

pub use events::{ClientEvent, CoreEvent, ErrorOrigin};
pub use ids::{CommandId, CommandIdGen, FileToken};
pub use patch::{ChangeRange, PathSegment, Patch, PatchAction, Property, SectionPath};
pub use payload::{CommandKind, CommandPayload, ContentPayload, DiffPayload, PatchPayload};
pub use worker::{
	FileRecord, FileRequest, FilesReply, InboundNotice, PatchResult, ReplyData, ReplyOutcome, ReplyStatus, WorkerInbound, WorkerNotice,
	WorkerOutbound, WorkerReply, WorkerRequest,
};

/// Syntax assumed when a payload does not name one.
pub const DEFAULT_SYNTAX: &str = "css";
