//! Bridge between client events, the command queue and the worker.

use livepatch_proto::{
	ClientEvent, CommandPayload, CoreEvent, DEFAULT_SYNTAX, ErrorOrigin, InboundNotice, ReplyData, ReplyOutcome, WorkerInbound,
	WorkerNotice, WorkerOutbound,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{Command, OnComplete};
use crate::queue::{AddOutcome, CommandQueue};

/// The core: turns client events into worker commands and worker replies
/// into client events.
#[derive(Debug)]
pub struct Patcher {
	queue: CommandQueue<mpsc::UnboundedSender<WorkerInbound>>,
	worker: mpsc::UnboundedSender<WorkerInbound>,
	client: mpsc::UnboundedSender<CoreEvent>,
	default_syntax: String,
}

impl Patcher {
	/// Creates a patcher. When `connected` is set the client is assumed to
	/// be listening already and is sent `patcher-connect` right away.
	pub fn new(worker: mpsc::UnboundedSender<WorkerInbound>, client: mpsc::UnboundedSender<CoreEvent>, connected: bool) -> Self {
		let patcher = Self {
			queue: CommandQueue::new(worker.clone()),
			worker,
			client,
			default_syntax: DEFAULT_SYNTAX.to_string(),
		};
		if connected {
			patcher.identify();
		}
		patcher
	}

	/// Syntax reported in `diff` events for payloads that do not name one.
	#[must_use]
	pub fn with_default_syntax(mut self, syntax: impl Into<String>) -> Self {
		self.default_syntax = syntax.into();
		self
	}

	/// The command queue.
	pub const fn queue(&self) -> &CommandQueue<mpsc::UnboundedSender<WorkerInbound>> {
		&self.queue
	}

	/// Handles one client event.
	pub fn handle_client(&mut self, event: ClientEvent) -> Option<AddOutcome> {
		match event.into_command() {
			Ok(payload) => Some(self.submit(payload)),
			Err(ClientEvent::Files(reply)) => {
				debug!(token = %reply.token, files = reply.files.len(), "patcher.files");
				if self.worker.send(WorkerInbound::Notice(InboundNotice::Files(reply))).is_err() {
					warn!("patcher.worker_closed");
				}
				None
			}
			Err(ClientEvent::Open | ClientEvent::Connect) => {
				self.identify();
				None
			}
			Err(other) => {
				warn!(event = ?other, "patcher.unexpected_event");
				None
			}
		}
	}

	/// Handles one worker message.
	pub fn handle_worker(&mut self, message: WorkerOutbound) {
		match message {
			WorkerOutbound::Reply(reply) => {
				self.queue.handle_reply(reply);
			}
			WorkerOutbound::Notice(WorkerNotice::RequestFiles(request)) => {
				debug!(token = %request.token, files = request.files.len(), "patcher.request_files");
				self.emit(CoreEvent::RequestFiles(request));
			}
			WorkerOutbound::Notice(WorkerNotice::Init(greeting)) => {
				info!(greeting = %greeting, "patcher.worker_ready");
			}
		}
	}

	/// Pumps both inputs until the client side closes and every queued
	/// command has been answered, or until the worker goes away.
	pub async fn run(mut self, mut client: mpsc::UnboundedReceiver<ClientEvent>, mut worker: mpsc::UnboundedReceiver<WorkerOutbound>) {
		let mut client_open = true;
		loop {
			if !client_open && self.queue.is_idle() {
				debug!("patcher.drained");
				break;
			}
			tokio::select! {
				event = client.recv(), if client_open => match event {
					Some(event) => {
						self.handle_client(event);
					}
					None => {
						debug!(queued = self.queue.len(), "patcher.client_closed");
						client_open = false;
					}
				},
				message = worker.recv() => match message {
					Some(message) => self.handle_worker(message),
					None => {
						warn!(queued = self.queue.len(), "patcher.worker_gone");
						break;
					}
				},
			}
		}
	}

	fn submit(&mut self, payload: CommandPayload) -> AddOutcome {
		let callback = self.reply_callback();
		self.queue.add(payload, callback)
	}

	fn reply_callback(&self) -> OnComplete {
		let client = self.client.clone();
		let default_syntax = self.default_syntax.clone();
		Box::new(move |outcome: ReplyOutcome, command: &Command| {
			if let Some(event) = reply_event(outcome, command, &default_syntax) {
				let _ = client.send(event);
			}
		})
	}

	fn identify(&self) {
		debug!("patcher.identify");
		self.emit(CoreEvent::PatcherConnect);
	}

	fn emit(&self, event: CoreEvent) {
		if self.client.send(event).is_err() {
			debug!("patcher.client_closed");
		}
	}
}

/// Client event for a completed command, if the client gets one.
fn reply_event(outcome: ReplyOutcome, command: &Command, default_syntax: &str) -> Option<CoreEvent> {
	let payload = command.payload();
	let uri = payload.uri().to_string();
	match (outcome, payload) {
		(ReplyOutcome::Error(message), _) => Some(CoreEvent::Error {
			message,
			origin: ErrorOrigin {
				name: command.kind(),
				uri: (!uri.is_empty()).then_some(uri),
			},
		}),
		(ReplyOutcome::Ok(ReplyData::Patches(patches)), CommandPayload::CalculateDiff(data)) => Some(CoreEvent::Diff {
			uri,
			syntax: data.syntax.clone().unwrap_or_else(|| default_syntax.to_string()),
			patches,
		}),
		(ReplyOutcome::Ok(ReplyData::Patched(result)), CommandPayload::ApplyPatch(_)) => Some(CoreEvent::Patch {
			uri,
			content: result.content,
			ranges: result.ranges,
			hash: result.hash,
		}),
		(ReplyOutcome::Ok(_), CommandPayload::InitialContent(_)) => None,
		(ReplyOutcome::Ok(data), _) => {
			warn!(command_id = %command.id(), kind = %command.kind(), data = ?data, "patcher.reply_mismatch");
			None
		}
	}
}
