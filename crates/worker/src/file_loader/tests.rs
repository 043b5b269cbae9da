use std::time::Duration;

use livepatch_proto::{FileRecord, FilesReply, WorkerNotice, WorkerOutbound};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::FileLoader;

async fn settle() {
	for _ in 0..8 {
		tokio::task::yield_now().await;
	}
}

fn request(
	loader: &FileLoader,
	outbox: &mpsc::UnboundedSender<WorkerOutbound>,
	outbound: &mut mpsc::UnboundedReceiver<WorkerOutbound>,
	files: &[&str],
) -> (livepatch_proto::FileToken, JoinHandle<Vec<FileRecord>>) {
	let fut = loader.request(files.iter().map(|f| f.to_string()).collect(), outbox);
	let Ok(WorkerOutbound::Notice(WorkerNotice::RequestFiles(req))) = outbound.try_recv() else {
		panic!("request-files notice not posted");
	};
	assert_eq!(req.files, files.iter().map(|f| f.to_string()).collect::<Vec<_>>());
	(req.token, tokio::spawn(fut))
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn reply_completes_request_once() {
	let loader = FileLoader::default();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let (token, fetch) = request(&loader, &tx, &mut rx, &["base.css"]);
	assert_eq!(loader.pending_len(), 1);
	assert!(loader.is_sweep_armed());

	let files = vec![FileRecord::new("base.css", "b{}")];
	assert!(loader.respond(FilesReply {
		token: token.clone(),
		files: files.clone(),
	}));
	assert_eq!(fetch.await.unwrap(), files);
	assert_eq!(loader.pending_len(), 0);

	assert!(!loader.respond(FilesReply { token, files: vec![] }));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn unanswered_request_resolves_empty_and_disarms() {
	let loader = FileLoader::default();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let (token, fetch) = request(&loader, &tx, &mut rx, &["missing.css"]);

	tokio::time::advance(Duration::from_millis(2999)).await;
	settle().await;
	assert!(!fetch.is_finished());

	tokio::time::advance(Duration::from_millis(1)).await;
	settle().await;
	assert!(fetch.is_finished());
	assert_eq!(fetch.await.unwrap(), vec![]);
	assert_eq!(loader.pending_len(), 0);
	assert!(!loader.is_sweep_armed());

	assert!(!loader.respond(FilesReply {
		token,
		files: vec![FileRecord::new("missing.css", "")],
	}));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn sweep_rearms_while_requests_remain() {
	let loader = FileLoader::default();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let (_, first) = request(&loader, &tx, &mut rx, &["a.css"]);

	tokio::time::advance(Duration::from_millis(2000)).await;
	let (_, second) = request(&loader, &tx, &mut rx, &["b.css"]);

	tokio::time::advance(Duration::from_millis(1000)).await;
	settle().await;
	assert!(first.is_finished());
	assert!(!second.is_finished());
	assert!(loader.is_sweep_armed());

	tokio::time::advance(Duration::from_millis(3000)).await;
	settle().await;
	assert!(second.is_finished());
	assert!(!loader.is_sweep_armed());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn timeout_change_is_not_retroactive() {
	let loader = FileLoader::default();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let (_, before) = request(&loader, &tx, &mut rx, &["a.css"]);

	loader.set_timeout(Duration::from_millis(10_000));
	assert_eq!(loader.timeout(), Duration::from_millis(10_000));
	let (_, after) = request(&loader, &tx, &mut rx, &["b.css"]);

	tokio::time::advance(Duration::from_millis(3000)).await;
	settle().await;
	assert!(before.is_finished());
	assert!(!after.is_finished());
	assert_eq!(loader.pending_len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dispose_drains_pending_requests() {
	let loader = FileLoader::default();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let (_, first) = request(&loader, &tx, &mut rx, &["a.css"]);
	let (_, second) = request(&loader, &tx, &mut rx, &["b.css", "c.css"]);

	loader.dispose();
	assert_eq!(first.await.unwrap(), vec![]);
	assert_eq!(second.await.unwrap(), vec![]);
	assert_eq!(loader.pending_len(), 0);
	assert!(!loader.is_sweep_armed());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn closed_outbox_still_expires() {
	let loader = FileLoader::new(Duration::from_millis(500));
	let (tx, rx) = mpsc::unbounded_channel();
	drop(rx);

	let fetch = tokio::spawn(loader.request(vec!["a.css".into()], &tx));
	assert_eq!(loader.pending_len(), 1);
	assert_eq!(fetch.await.unwrap(), vec![]);
	assert_eq!(loader.pending_len(), 0);
}
