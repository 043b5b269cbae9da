//! livepatch core binary.
//!
//! Speaks JSON lines on stdio: client events in on stdin, core events out
//! on stdout. Logs go to stderr, or to a file under `LIVEPATCH_LOG_DIR`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use livepatch_engine::CssEngine;
use livepatch_patcher::{Patcher, PatcherConfig};
use livepatch_worker::spawn_worker;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "livepatch")]
#[command(about = "Live stylesheet diff/patch core speaking JSON lines on stdio")]
struct Args {
	/// TOML configuration file
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Override the file request timeout
	#[arg(long, value_name = "MS")]
	file_timeout_ms: Option<u64>,

	/// Treat the client as already connected
	#[arg(long)]
	connected: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let mut config = match &args.config {
		Some(path) => PatcherConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
		None => PatcherConfig::default(),
	};
	if let Some(ms) = args.file_timeout_ms {
		config.file_timeout_ms = ms;
	}
	let capacity = config.cache_capacity().context("cache_capacity must be at least 1")?;

	info!(
		file_timeout = ?Duration::from_millis(config.file_timeout_ms),
		cache_capacity = capacity.get(),
		"starting livepatch"
	);

	let engine = Arc::new(CssEngine::with_cache_capacity(capacity));
	let worker = spawn_worker(engine, config.worker_config());

	let (client_tx, client_rx) = mpsc::unbounded_channel();
	let (core_tx, core_rx) = mpsc::unbounded_channel();
	let patcher = Patcher::new(worker.inbox, core_tx, args.connected).with_default_syntax(config.default_syntax.clone());
	let patcher = tokio::spawn(patcher.run(client_rx, worker.outbox));

	let served = livepatch_patcher::stdio::serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), client_tx, core_rx).await;

	patcher.await.context("patcher task failed")?;
	worker.control.shutdown();
	worker.control.join().await;
	served?;

	info!("livepatch stopped");
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("livepatch=trace,debug")
			} else {
				EnvFilter::new("info")
			}
		})
	};

	if let Some(log_dir) = std::env::var("LIVEPATCH_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("livepatch.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	// stdout carries protocol data
	tracing_subscriber::fmt().with_env_filter(filter()).with_writer(std::io::stderr).init();
}
