//! Client-facing core of livepatch.
//!
//! The client sends [`ClientEvent`](livepatch_proto::ClientEvent)s; commands
//! among them go through the single-flight [`CommandQueue`] to the worker,
//! and worker replies come back as
//! [`CoreEvent`](livepatch_proto::CoreEvent)s. File requests issued by the
//! worker in the middle of a command bypass the queue in both directions.

mod command;
pub mod config;
mod patcher;
pub mod queue;
pub mod stdio;

pub use command::{Command, OnComplete};
pub use config::{ConfigError, PatcherConfig};
pub use patcher::Patcher;
pub use queue::{AddOutcome, CommandQueue, CommandSink, WorkerClosed};
pub use stdio::TransportError;
