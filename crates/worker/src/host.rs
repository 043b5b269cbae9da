//! The worker task: receives core messages, runs commands, posts replies.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use livepatch_engine::DiffPatchEngine;
use livepatch_proto::{CommandId, DEFAULT_SYNTAX, InboundNotice, WorkerInbound, WorkerNotice, WorkerOutbound, WorkerReply};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::CommandError;
use crate::events::WorkerEvent;
use crate::file_loader::{DEFAULT_FILE_TIMEOUT, FileLoader};

const EVENT_CAPACITY: usize = 64;

type TraceSlot = Arc<Mutex<Option<String>>>;

tokio::task_local! {
	/// Where the panic hook leaves a backtrace for the running command.
	static PANIC_TRACE: TraceSlot;
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that records a backtrace for panics raised inside a
/// command task. A `JoinError` only carries the payload, so this is the one
/// place the trace can be taken. Other panics go straight to the previous
/// hook.
fn install_panic_hook() {
	PANIC_HOOK.call_once(|| {
		let previous = std::panic::take_hook();
		std::panic::set_hook(Box::new(move |info| {
			let _ = PANIC_TRACE.try_with(|slot| {
				*slot.lock() = Some(Backtrace::force_capture().to_string());
			});
			previous(info);
		}));
	});
}

struct RunningCommand {
	command_id: CommandId,
	trace: TraceSlot,
}

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
	/// Expiry window for file requests.
	pub file_timeout: Duration,
	/// Syntax assumed for payloads that do not name one.
	pub default_syntax: String,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			file_timeout: DEFAULT_FILE_TIMEOUT,
			default_syntax: DEFAULT_SYNTAX.to_string(),
		}
	}
}

/// A running worker.
///
/// `inbox` and `outbox` are the two halves of the core ↔ worker channel;
/// dropping `inbox` stops the worker the same way [`WorkerControl::shutdown`]
/// does.
#[derive(Debug)]
pub struct WorkerHandle {
	/// Messages to the worker.
	pub inbox: mpsc::UnboundedSender<WorkerInbound>,
	/// Messages from the worker.
	pub outbox: mpsc::UnboundedReceiver<WorkerOutbound>,
	/// Lifecycle and observation.
	pub control: WorkerControl,
}

/// Lifecycle half of a [`WorkerHandle`].
#[derive(Debug)]
pub struct WorkerControl {
	loader: FileLoader,
	events: broadcast::Sender<WorkerEvent>,
	cancel: CancellationToken,
	task: JoinHandle<()>,
}

impl WorkerControl {
	/// Observer stream of successful operations.
	pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
		self.events.subscribe()
	}

	/// The worker's file loader.
	pub fn file_loader(&self) -> &FileLoader {
		&self.loader
	}

	/// Asks the worker loop to stop.
	pub fn shutdown(&self) {
		self.cancel.cancel();
	}

	/// Waits for the worker loop to finish.
	pub async fn join(self) {
		if let Err(err) = self.task.await
			&& err.is_panic()
		{
			warn!(error = %err, "worker.host_panicked");
		}
	}
}

/// Starts a worker on the current tokio runtime.
pub fn spawn_worker(engine: Arc<dyn DiffPatchEngine>, config: WorkerConfig) -> WorkerHandle {
	install_panic_hook();
	let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
	let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
	let (events, _) = broadcast::channel(EVENT_CAPACITY);
	let loader = FileLoader::new(config.file_timeout);
	let cancel = CancellationToken::new();

	let syntaxes = engine.syntaxes();
	let dispatcher = Dispatcher::new(engine, &loader, outbox_tx.clone(), events.clone()).with_default_syntax(config.default_syntax);
	let host = WorkerHost {
		dispatcher,
		loader: loader.clone(),
		inbox: inbox_rx,
		outbox: outbox_tx,
		cancel: cancel.clone(),
	};
	let task = tokio::spawn(host.run(syntaxes));

	WorkerHandle {
		inbox: inbox_tx,
		outbox: outbox_rx,
		control: WorkerControl {
			loader,
			events,
			cancel,
			task,
		},
	}
}

struct WorkerHost {
	dispatcher: Dispatcher,
	loader: FileLoader,
	inbox: mpsc::UnboundedReceiver<WorkerInbound>,
	outbox: mpsc::UnboundedSender<WorkerOutbound>,
	cancel: CancellationToken,
}

impl WorkerHost {
	async fn run(mut self, syntaxes: Vec<String>) {
		let greeting = format!("Created worker with {} syntaxes", syntaxes.join(", ").to_uppercase());
		info!(syntaxes = ?syntaxes, "worker.start");
		let _ = self.outbox.send(WorkerOutbound::Notice(WorkerNotice::Init(greeting)));

		let mut tasks: JoinSet<WorkerReply> = JoinSet::new();
		let mut running: HashMap<tokio::task::Id, RunningCommand> = HashMap::new();

		loop {
			tokio::select! {
				() = self.cancel.cancelled() => {
					debug!("worker.cancelled");
					break;
				}
				msg = self.inbox.recv() => match msg {
					Some(WorkerInbound::Command(request)) => {
						let command_id = request.command_id;
						let dispatcher = self.dispatcher.clone();
						let trace = TraceSlot::default();
						let handle = tasks.spawn(PANIC_TRACE.scope(Arc::clone(&trace), async move { dispatcher.execute(request).await }));
						running.insert(handle.id(), RunningCommand { command_id, trace });
					}
					Some(WorkerInbound::Notice(InboundNotice::Files(reply))) => {
						self.loader.respond(reply);
					}
					None => {
						debug!("worker.inbox_closed");
						break;
					}
				},
				Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
					let reply = match joined {
						Ok((task, reply)) => {
							running.remove(&task);
							reply
						}
						Err(err) => {
							let Some(command) = running.remove(&err.id()) else {
								continue;
							};
							let message = panic_message(err);
							let trace = command.trace.lock().take();
							warn!(command_id = %command.command_id, error = %message, "worker.command_panicked");
							let error = CommandError::Panicked { message, trace };
							WorkerReply::error(command.command_id, error.to_string())
						}
					};
					if self.outbox.send(WorkerOutbound::Reply(reply)).is_err() {
						debug!("worker.outbox_closed");
						break;
					}
				}
			}
		}

		self.loader.dispose();
		tasks.shutdown().await;
		info!("worker.stop");
	}
}

fn panic_message(err: JoinError) -> String {
	if !err.is_panic() {
		return err.to_string();
	}
	let payload = err.into_panic();
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"command panicked".to_string()
	}
}
