//! JSON-lines transport between a client process and the core.
//!
//! Each input line is one [`ClientEvent`], each output line one
//! [`CoreEvent`], both as `{"name": ..., "data": ...}`.

use livepatch_proto::{ClientEvent, CoreEvent};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
	/// Reading input or writing output failed.
	#[error("transport I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// An outgoing event could not be encoded.
	#[error("failed to encode event: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Reads client events from `input` until EOF, forwarding them to `events`.
///
/// Malformed lines are logged and skipped. Returning drops `events`, which
/// tells the core no more input is coming.
pub async fn read_events<R>(input: R, events: mpsc::UnboundedSender<ClientEvent>) -> Result<(), TransportError>
where
	R: AsyncBufRead + Unpin,
{
	let mut lines = input.lines();
	while let Some(line) = lines.next_line().await? {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		match serde_json::from_str::<ClientEvent>(line) {
			Ok(event) => {
				trace!(event = ?event, "stdio.read");
				if events.send(event).is_err() {
					break;
				}
			}
			Err(error) => warn!(%error, line, "stdio.malformed_line"),
		}
	}
	Ok(())
}

/// Writes core events to `output`, one per line, until `events` closes.
pub async fn write_events<W>(mut output: W, mut events: mpsc::UnboundedReceiver<CoreEvent>) -> Result<(), TransportError>
where
	W: AsyncWrite + Unpin,
{
	while let Some(event) = events.recv().await {
		let mut line = serde_json::to_vec(&event)?;
		line.push(b'\n');
		output.write_all(&line).await?;
		output.flush().await?;
	}
	Ok(())
}

/// Runs both directions until input reaches EOF and every event the core
/// produced afterwards has been written.
pub async fn serve<R, W>(
	input: R,
	output: W,
	client: mpsc::UnboundedSender<ClientEvent>,
	core: mpsc::UnboundedReceiver<CoreEvent>,
) -> Result<(), TransportError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let (read, write) = tokio::join!(read_events(input, client), write_events(output, core));
	read.and(write)
}
