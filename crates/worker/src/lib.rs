//! Worker side of livepatch.
//!
//! # Purpose
//!
//! Owns the engine and executes the commands the core posts: diff, patch
//! and initial content. Replies carry the originating command id so the
//! core's queue can correlate them.
//!
//! # Mental model
//!
//! The worker is a single task reading one channel. Commands are spawned
//! into a `JoinSet`; a command that needs imported files parks on the
//! [`FileLoader`] while the task keeps reading, so the `files` message that
//! wakes it is never stuck behind it. The core sends one command at a time,
//! which keeps the set at one entry in practice.
//!
//! # Key types
//!
//! | Type | Role |
//! |---|---|
//! | [`WorkerHandle`] | Channels plus lifecycle for a spawned worker |
//! | [`Dispatcher`] | Validates a payload and runs it against the engine |
//! | [`FileLoader`] | Token-correlated file requests with timeout sweep |
//! | [`WorkerEvent`] | Observer notifications after successful commands |
//!
//! # Invariants
//!
//! - Every command yields exactly one reply, even if its task panics.
//!   - Enforced in: `WorkerHost::run`
//!   - Tested by: `host::tests::panicking_command_becomes_error_reply`
//!   - Failure symptom: the core queue stalls waiting for a reply.
//! - A diff caches the current tree before looking for a baseline.
//!   - Enforced in: `Dispatcher::diff`
//!   - Tested by: `dispatcher::tests::first_diff_fails_but_seeds_cache`
//!   - Failure symptom: every diff of a new document fails forever.
//! - File requests always complete: by reply, sweep, or disposal.
//!   - Enforced in: [`FileLoader::respond`], [`FileLoader::dispose`], the
//!     sweep task
//!   - Tested by: `file_loader::tests::unanswered_request_resolves_empty_and_disarms`
//!   - Failure symptom: a command hangs on an import nobody answers.

mod dispatcher;
mod error;
mod events;
mod file_loader;
mod host;

pub use dispatcher::Dispatcher;
pub use error::{CommandError, SourceState, ValidationError};
pub use events::WorkerEvent;
pub use file_loader::{DEFAULT_FILE_TIMEOUT, FileLoader, FileRequester};
pub use host::{WorkerConfig, WorkerControl, WorkerHandle, spawn_worker};
