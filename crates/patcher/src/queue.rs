//! Single-flight command queue.
//!
//! # Purpose
//!
//! Mediates every client request to the worker. Requests wait in FIFO
//! order, redundant ones are folded together while they wait, and exactly
//! one is handed to the worker at a time.
//!
//! # Mental model
//!
//! A deque of queued [`Command`]s plus one in-flight slot. [`CommandQueue::add`]
//! first tries to fold the request into a queued command for the same
//! target, then appends, then pumps. [`CommandQueue::handle_reply`] empties the
//! slot when the matching reply arrives and pumps again. Nothing else moves
//! a command.
//!
//! # Invariants
//!
//! - At most one command is in flight.
//!   - Enforced in: [`CommandQueue::next`]
//!   - Tested by: `tests::dispatches_one_at_a_time`
//!   - Failure symptom: replies interleave and callbacks see the wrong
//!     result.
//! - Only queued commands are merged; the in-flight command is never
//!   touched.
//!   - Enforced in: [`CommandQueue::add`]
//!   - Tested by: `tests::in_flight_command_is_not_coalesced`
//!   - Failure symptom: a request is silently lost after dispatch.
//! - Diffs carrying an explicit baseline never merge.
//!   - Enforced in: `command::merge`
//!   - Tested by: `tests::coalescing_rules`
//!   - Failure symptom: the client's baseline is dropped and the diff runs
//!     against stale cache.
//! - Every reply, ok or error, advances the queue.
//!   - Enforced in: [`CommandQueue::handle_reply`]
//!   - Tested by: `tests::error_reply_advances`
//!   - Failure symptom: one failing command blocks all later ones.
//!
//! A command whose reply never arrives keeps the slot forever; there is no
//! timeout at this level.

use std::collections::VecDeque;

use livepatch_proto::{CommandId, CommandIdGen, CommandPayload, ReplyOutcome, WorkerInbound, WorkerReply, WorkerRequest};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::command::{Command, OnComplete};

/// The worker end of the queue could not take a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker channel closed")]
pub struct WorkerClosed;

/// Where dispatched commands go.
pub trait CommandSink {
	/// Posts `request` to the worker.
	fn post(&mut self, request: WorkerRequest) -> Result<(), WorkerClosed>;
}

impl CommandSink for mpsc::UnboundedSender<WorkerInbound> {
	fn post(&mut self, request: WorkerRequest) -> Result<(), WorkerClosed> {
		self.send(WorkerInbound::Command(request)).map_err(|_| WorkerClosed)
	}
}

/// How [`CommandQueue::add`] placed a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
	/// Appended as a new command with this id.
	Enqueued(CommandId),
	/// Folded into the queued command with this id.
	Coalesced(CommandId),
}

impl AddOutcome {
	/// Id of the command now carrying the request.
	pub const fn id(self) -> CommandId {
		match self {
			Self::Enqueued(id) | Self::Coalesced(id) => id,
		}
	}
}

/// FIFO of commands with at most one in flight.
pub struct CommandQueue<S> {
	sink: S,
	ids: CommandIdGen,
	queued: VecDeque<Command>,
	in_flight: Option<Command>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for CommandQueue<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CommandQueue")
			.field("sink", &self.sink)
			.field("queued", &self.queued)
			.field("in_flight", &self.in_flight)
			.finish()
	}
}

impl<S: CommandSink> CommandQueue<S> {
	/// Creates an empty queue posting to `sink`.
	pub fn new(sink: S) -> Self {
		Self {
			sink,
			ids: CommandIdGen::new(),
			queued: VecDeque::new(),
			in_flight: None,
		}
	}

	/// Queues a request, folding it into a queued command for the same
	/// target when the coalescing rules allow, then dispatches if idle.
	pub fn add(&mut self, payload: CommandPayload, on_complete: OnComplete) -> AddOutcome {
		let outcome = match self.coalesce(payload, on_complete) {
			Ok(id) => {
				debug!(command_id = %id, "queue.coalesced");
				AddOutcome::Coalesced(id)
			}
			Err((payload, on_complete)) => {
				let id = self.ids.next();
				trace!(command_id = %id, kind = %payload.kind(), uri = payload.uri(), "queue.enqueue");
				self.queued.push_back(Command::new(id, payload, on_complete));
				AddOutcome::Enqueued(id)
			}
		};
		self.next();
		outcome
	}

	fn coalesce(&mut self, payload: CommandPayload, on_complete: OnComplete) -> Result<CommandId, (CommandPayload, OnComplete)> {
		let mut pending = (payload, on_complete);
		for command in &mut self.queued {
			match command.absorb(pending.0, pending.1) {
				Ok(()) => return Ok(command.id()),
				Err(back) => pending = back,
			}
		}
		Err(pending)
	}

	/// Dispatches the head command if nothing is in flight.
	///
	/// A command the sink refuses completes with an error and the next one
	/// is tried.
	pub fn next(&mut self) {
		while self.in_flight.is_none() {
			let Some(command) = self.queued.pop_front() else {
				return;
			};
			debug!(command_id = %command.id(), kind = %command.kind(), queued = self.queued.len(), "queue.dispatch");
			match self.sink.post(command.request()) {
				Ok(()) => self.in_flight = Some(command),
				Err(err) => {
					warn!(command_id = %command.id(), error = %err, "queue.dispatch_failed");
					command.complete(ReplyOutcome::Error(err.to_string()));
				}
			}
		}
	}

	/// Completes the in-flight command with `reply` and advances.
	///
	/// Returns `false`, changing nothing, when `reply` does not answer the
	/// in-flight command.
	pub fn handle_reply(&mut self, reply: WorkerReply) -> bool {
		let Some(command) = self.in_flight.take_if(|command| command.id() == reply.command_id) else {
			warn!(command_id = %reply.command_id, "queue.reply_unmatched");
			return false;
		};
		debug!(command_id = %command.id(), status = ?reply.outcome.status(), "queue.reply");
		command.complete(reply.outcome);
		self.next();
		true
	}

	/// Number of queued commands, excluding the one in flight.
	pub fn len(&self) -> usize {
		self.queued.len()
	}

	/// Whether nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.queued.is_empty()
	}

	/// The command awaiting its reply, if any.
	pub fn in_flight(&self) -> Option<&Command> {
		self.in_flight.as_ref()
	}

	/// Whether nothing is queued or in flight.
	pub fn is_idle(&self) -> bool {
		self.in_flight.is_none() && self.queued.is_empty()
	}

	/// Queued commands in dispatch order.
	pub fn queued(&self) -> impl Iterator<Item = &Command> {
		self.queued.iter()
	}
}
