//! Routing of one worker command to the engine.

use std::sync::Arc;

use livepatch_engine::{DiffPatchEngine, FileLoad, ResolveOptions, StyleTree};
use livepatch_proto::{
	CommandPayload, ContentPayload, DEFAULT_SYNTAX, DiffPayload, PatchPayload, PatchResult, ReplyData, WorkerOutbound, WorkerReply,
	WorkerRequest,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::{CommandError, SourceState, ValidationError};
use crate::events::WorkerEvent;
use crate::file_loader::{FileLoader, FileRequester};

/// Executes commands against a [`DiffPatchEngine`].
///
/// Cheap to clone; the host hands each command task its own copy.
#[derive(Clone)]
pub struct Dispatcher {
	engine: Arc<dyn DiffPatchEngine>,
	files: FileRequester,
	events: broadcast::Sender<WorkerEvent>,
	default_syntax: Arc<str>,
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("default_syntax", &self.default_syntax)
			.field("files", &self.files)
			.finish_non_exhaustive()
	}
}

impl Dispatcher {
	/// Creates a dispatcher whose file requests go through `loader` and are
	/// posted on `outbox`.
	pub fn new(
		engine: Arc<dyn DiffPatchEngine>,
		loader: &FileLoader,
		outbox: mpsc::UnboundedSender<WorkerOutbound>,
		events: broadcast::Sender<WorkerEvent>,
	) -> Self {
		Self {
			engine,
			files: loader.requester(outbox),
			events,
			default_syntax: Arc::from(DEFAULT_SYNTAX),
		}
	}

	/// Syntax assumed for payloads that do not name one.
	#[must_use]
	pub fn with_default_syntax(mut self, syntax: impl Into<String>) -> Self {
		self.default_syntax = Arc::from(syntax.into());
		self
	}

	/// Runs `request` and builds its correlated reply.
	pub async fn execute(&self, request: WorkerRequest) -> WorkerReply {
		let id = request.command_id;
		let kind = request.payload.kind();
		debug!(command_id = %id, kind = %kind, uri = request.payload.uri(), "dispatch.execute");
		match self.run(request.payload).await {
			Ok(data) => WorkerReply::ok(id, data),
			Err(err) => {
				warn!(command_id = %id, kind = %kind, error = %err, "dispatch.failed");
				WorkerReply::error(id, err.to_string())
			}
		}
	}

	async fn run(&self, payload: CommandPayload) -> Result<ReplyData, CommandError> {
		let syntax = self.validate(&payload)?;
		match payload {
			CommandPayload::CalculateDiff(data) => self.diff(data, &syntax).await,
			CommandPayload::ApplyPatch(data) => self.patch(data, &syntax).await,
			CommandPayload::InitialContent(data) => self.initial_content(data, &syntax).await,
		}
	}

	fn validate(&self, payload: &CommandPayload) -> Result<String, ValidationError> {
		// An absent payload decodes with an empty uri; both are rejected.
		if payload.uri().is_empty() {
			return Err(ValidationError::MissingData);
		}
		let syntax = payload.syntax().unwrap_or(&self.default_syntax);
		if !self.engine.supports(syntax) {
			return Err(ValidationError::UnsupportedSyntax(syntax.to_string()));
		}
		Ok(syntax.to_string())
	}

	fn options<'a>(&'a self, uri: &'a str, syntax: &'a str) -> ResolveOptions<'a> {
		ResolveOptions {
			uri,
			syntax,
			loader: Some(&self.files as &dyn FileLoad),
		}
	}

	async fn resolve(&self, uri: &str, syntax: &str, source: &str, state: SourceState) -> Result<StyleTree, CommandError> {
		self.engine
			.resolve(source, self.options(uri, syntax))
			.await
			.map_err(|source| CommandError::Resolution {
				uri: uri.to_string(),
				state,
				source,
			})
	}

	async fn diff(&self, data: DiffPayload, syntax: &str) -> Result<ReplyData, CommandError> {
		let cache = self.engine.cache();
		let cached = cache.get(&data.uri);

		let cur = Arc::new(self.resolve(&data.uri, syntax, &data.content, SourceState::Current).await?);
		cache.add(data.uri.clone(), Arc::clone(&cur), data.hash.clone());

		let prev = match (&data.previous, cached) {
			(Some(previous), _) => Arc::new(self.resolve(&data.uri, syntax, previous, SourceState::Previous).await?),
			(None, Some(entry)) => entry.tree,
			(None, None) => return Err(CommandError::NoBaseline { uri: data.uri }),
		};

		let patches = self.engine.diff(&prev, &cur);
		debug!(uri = %data.uri, patches = patches.len(), "dispatch.diff");
		self.publish(WorkerEvent::Diff {
			uri: data.uri,
			patches: patches.clone(),
		});
		Ok(ReplyData::Patches(patches))
	}

	async fn patch(&self, data: PatchPayload, syntax: &str) -> Result<ReplyData, CommandError> {
		let tree = self.resolve(&data.uri, syntax, &data.content, SourceState::PatchTarget).await?;
		let condensed = self.engine.condense(&data.patches);
		let patched = self.engine.patch(&tree, &condensed).map_err(|source| CommandError::Patch {
			uri: data.uri.clone(),
			source,
		})?;

		debug!(uri = %data.uri, patches = condensed.len(), edits = patched.changes().len(), "dispatch.patch");
		self.publish(WorkerEvent::Patch {
			uri: data.uri,
			content: patched.source().to_string(),
		});
		Ok(ReplyData::Patched(PatchResult {
			content: patched.source().to_string(),
			ranges: patched.changes().to_vec(),
			hash: data.hash,
		}))
	}

	async fn initial_content(&self, data: ContentPayload, syntax: &str) -> Result<ReplyData, CommandError> {
		let tree = self.resolve(&data.uri, syntax, &data.content, SourceState::Initial).await?;
		self.engine.cache().add(data.uri.clone(), tree, data.hash);
		self.publish(WorkerEvent::InitialContent { uri: data.uri });
		Ok(ReplyData::Empty)
	}

	fn publish(&self, event: WorkerEvent) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}
}
