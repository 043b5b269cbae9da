use livepatch_proto::{CommandId, CommandKind, CommandPayload, ReplyOutcome, WorkerRequest};

/// Completion callback of a [`Command`]: receives the worker's outcome and
/// the command it answers.
pub type OnComplete = Box<dyn FnOnce(ReplyOutcome, &Command) + Send>;

/// A queued request for the worker.
pub struct Command {
	id: CommandId,
	payload: CommandPayload,
	on_complete: Option<OnComplete>,
}

impl std::fmt::Debug for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Command")
			.field("id", &self.id)
			.field("kind", &self.payload.kind())
			.field("uri", &self.payload.uri())
			.finish_non_exhaustive()
	}
}

impl Command {
	pub(crate) fn new(id: CommandId, payload: CommandPayload, on_complete: OnComplete) -> Self {
		Self {
			id,
			payload,
			on_complete: Some(on_complete),
		}
	}

	/// Command id.
	pub const fn id(&self) -> CommandId {
		self.id
	}

	/// Command kind.
	pub const fn kind(&self) -> CommandKind {
		self.payload.kind()
	}

	/// Current payload, including anything merged into it while queued.
	pub const fn payload(&self) -> &CommandPayload {
		&self.payload
	}

	/// Envelope posted to the worker.
	pub(crate) fn request(&self) -> WorkerRequest {
		WorkerRequest {
			command_id: self.id,
			payload: self.payload.clone(),
		}
	}

	/// Folds a newer request for the same target into this queued command.
	///
	/// On success the newer callback replaces the older one, which is
	/// dropped without being called. Hands `payload` and `on_complete` back
	/// when the two cannot be merged.
	pub(crate) fn absorb(&mut self, payload: CommandPayload, on_complete: OnComplete) -> Result<(), (CommandPayload, OnComplete)> {
		match merge(&mut self.payload, payload) {
			Ok(()) => {
				self.on_complete = Some(on_complete);
				Ok(())
			}
			Err(payload) => Err((payload, on_complete)),
		}
	}

	/// Delivers the outcome to the callback. Consumes the command.
	pub(crate) fn complete(mut self, outcome: ReplyOutcome) {
		if let Some(callback) = self.on_complete.take() {
			callback(outcome, &self);
		}
	}
}

/// Coalescing rules. Only commands of the same kind and uri merge, and
/// diffs carrying an explicit baseline never do.
fn merge(queued: &mut CommandPayload, incoming: CommandPayload) -> Result<(), CommandPayload> {
	match (queued, incoming) {
		(CommandPayload::CalculateDiff(old), CommandPayload::CalculateDiff(new))
			if old.uri == new.uri && old.previous.is_none() && new.previous.is_none() =>
		{
			*old = new;
			Ok(())
		}
		(CommandPayload::ApplyPatch(old), CommandPayload::ApplyPatch(mut new)) if old.uri == new.uri => {
			let mut patches = std::mem::take(&mut old.patches);
			patches.append(&mut new.patches);
			new.patches = patches;
			*old = new;
			Ok(())
		}
		(CommandPayload::InitialContent(old), CommandPayload::InitialContent(new)) if old.uri == new.uri => {
			*old = new;
			Ok(())
		}
		(_, incoming) => Err(incoming),
	}
}
