//! Worker → client file fetches with timeout reclamation.
//!
//! # Purpose
//!
//! Import resolution inside a command may need files only the client can
//! read. [`FileLoader`] posts a `request-files` notice carrying a fresh
//! [`FileToken`], parks the caller on a oneshot, and wakes it when the
//! matching `files` message arrives or when the request expires.
//!
//! # Invariants
//!
//! - A pending entry is registered before its notice is posted, so a reply
//!   can never race ahead of its registration.
//! - Each entry is removed exactly once: by [`FileLoader::respond`], by the
//!   sweep, or by [`FileLoader::dispose`]. Whoever removes it completes it.
//! - At most one sweep task exists. It is armed lazily by the first request
//!   and disarms itself once a pass leaves nothing pending.
//! - The state lock is never held while completing an entry or posting a
//!   notice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use livepatch_engine::FileLoad;
use livepatch_proto::{FileRecord, FileRequest, FileToken, FilesReply, WorkerNotice, WorkerOutbound};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Window after which an unanswered file request resolves empty.
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_millis(3000);

struct PendingFileRequest {
	expires_at: Instant,
	reply: oneshot::Sender<Vec<FileRecord>>,
}

struct LoaderState {
	timeout: Duration,
	pending: HashMap<FileToken, PendingFileRequest>,
	sweep: Option<JoinHandle<()>>,
}

/// Registry of outstanding file requests and their shared sweep timer.
///
/// Cloning shares the registry.
#[derive(Clone)]
pub struct FileLoader {
	state: Arc<Mutex<LoaderState>>,
}

impl std::fmt::Debug for FileLoader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("FileLoader")
			.field("timeout", &state.timeout)
			.field("pending", &state.pending.len())
			.field("sweep_armed", &state.sweep.is_some())
			.finish()
	}
}

impl Default for FileLoader {
	fn default() -> Self {
		Self::new(DEFAULT_FILE_TIMEOUT)
	}
}

impl FileLoader {
	/// Creates a loader whose requests expire after `timeout`.
	pub fn new(timeout: Duration) -> Self {
		Self {
			state: Arc::new(Mutex::new(LoaderState {
				timeout,
				pending: HashMap::new(),
				sweep: None,
			})),
		}
	}

	/// Current expiry window.
	pub fn timeout(&self) -> Duration {
		self.state.lock().timeout
	}

	/// Changes the expiry window for requests created from now on. Requests
	/// already pending keep their deadline.
	pub fn set_timeout(&self, timeout: Duration) {
		self.state.lock().timeout = timeout;
	}

	/// Number of unanswered requests.
	pub fn pending_len(&self) -> usize {
		self.state.lock().pending.len()
	}

	/// Whether the sweep task is scheduled.
	pub fn is_sweep_armed(&self) -> bool {
		self.state.lock().sweep.is_some()
	}

	/// Binds the loader to the channel its notices are posted on.
	pub fn requester(&self, outbox: mpsc::UnboundedSender<WorkerOutbound>) -> FileRequester {
		FileRequester {
			loader: self.clone(),
			outbox,
		}
	}

	/// Asks the client for `files`.
	///
	/// The returned future resolves with the client's records, or with an
	/// empty list when the request expires or the loader is disposed. Must be
	/// called within a tokio runtime.
	pub fn request(
		&self,
		files: Vec<String>,
		outbox: &mpsc::UnboundedSender<WorkerOutbound>,
	) -> impl Future<Output = Vec<FileRecord>> + Send + 'static {
		let (tx, rx) = oneshot::channel();
		let token = {
			let mut state = self.state.lock();
			let token = loop {
				let candidate = FileToken::generate();
				if !state.pending.contains_key(&candidate) {
					break candidate;
				}
			};
			let expires_at = Instant::now() + state.timeout;
			state.pending.insert(token.clone(), PendingFileRequest { expires_at, reply: tx });
			if state.sweep.is_none() {
				state.sweep = Some(spawn_sweep(Arc::downgrade(&self.state), state.timeout));
				trace!("file_loader.sweep_armed");
			}
			token
		};

		debug!(token = %token, files = files.len(), "file_loader.request");
		let notice = WorkerNotice::RequestFiles(FileRequest { token: token.clone(), files });
		if outbox.send(WorkerOutbound::Notice(notice)).is_err() {
			warn!(token = %token, "file_loader.outbox_closed");
		}

		async move { rx.await.unwrap_or_default() }
	}

	/// Completes the request matching `reply.token`.
	///
	/// Returns `false` for unknown tokens: late, duplicate, or already
	/// reclaimed.
	pub fn respond(&self, reply: FilesReply) -> bool {
		let entry = self.state.lock().pending.remove(&reply.token);
		match entry {
			Some(entry) => {
				debug!(token = %reply.token, files = reply.files.len(), "file_loader.respond");
				let _ = entry.reply.send(reply.files);
				true
			}
			None => {
				debug!(token = %reply.token, "file_loader.respond_unknown");
				false
			}
		}
	}

	/// Resolves every pending request with an empty list and cancels the
	/// sweep.
	pub fn dispose(&self) {
		let (drained, sweep) = {
			let mut state = self.state.lock();
			(state.pending.drain().collect::<Vec<_>>(), state.sweep.take())
		};
		if let Some(sweep) = sweep {
			sweep.abort();
		}
		if !drained.is_empty() {
			debug!(pending = drained.len(), "file_loader.dispose");
		}
		for (_, entry) in drained {
			let _ = entry.reply.send(Vec::new());
		}
	}
}

fn spawn_sweep(state: Weak<Mutex<LoaderState>>, window: Duration) -> JoinHandle<()> {
	// Deadline is fixed when armed, not when the task is first polled.
	let mut deadline = Instant::now() + window;
	tokio::spawn(async move {
		loop {
			tokio::time::sleep_until(deadline).await;
			let Some(strong) = state.upgrade() else {
				return;
			};

			let (expired, next) = {
				let mut guard = strong.lock();
				let now = Instant::now();
				let tokens: Vec<FileToken> = guard
					.pending
					.iter()
					.filter(|(_, entry)| entry.expires_at <= now)
					.map(|(token, _)| token.clone())
					.collect();
				let expired: Vec<_> = tokens
					.into_iter()
					.filter_map(|token| guard.pending.remove_entry(&token))
					.collect();
				let next = if guard.pending.is_empty() {
					guard.sweep = None;
					None
				} else {
					Some(guard.timeout)
				};
				(expired, next)
			};

			for (token, entry) in expired {
				debug!(token = %token, "file_loader.expired");
				let _ = entry.reply.send(Vec::new());
			}

			match next {
				Some(window) => deadline = Instant::now() + window,
				None => {
					trace!("file_loader.sweep_disarmed");
					return;
				}
			}
		}
	})
}

/// [`FileLoad`] implementation posting through a [`FileLoader`].
#[derive(Debug, Clone)]
pub struct FileRequester {
	loader: FileLoader,
	outbox: mpsc::UnboundedSender<WorkerOutbound>,
}

#[async_trait]
impl FileLoad for FileRequester {
	async fn load(&self, uris: Vec<String>) -> Vec<FileRecord> {
		self.loader.request(uris, &self.outbox).await
	}
}

#[cfg(test)]
mod tests;
