//! tagbuffer-worker: drain a directory of TAG files through the worker pool.
//!
//! Files are read from `<input-dir>/<project-uuid>/<asset-uuid>/<file>`, put
//! into an in-memory buffer, and queued. The pool archives each group under
//! `<archive-dir>/<project>/<asset>/` and removes it from the buffer. The
//! process exits once everything is drained, or on Ctrl+C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use walkdir::WalkDir;

use tagbuffer_core::config::{load_dotenv, Config, FailurePolicyKind};
use tagbuffer_core::{BufferItem, BufferKey};
use tagbuffer_queue::{ArchiveProcessor, BufferStore, InMemoryBufferStore, WorkerPool};

// ── CLI ─────────────────────────────────────────────────────────────

/// Buffer TAG files and process them one project at a time.
#[derive(Parser, Debug)]
#[command(name = "tagbuffer-worker", version, about)]
struct Cli {
    /// Directory holding `<project>/<asset>/<file>` TAG files.
    #[arg(long, env = "TAGBUFFER_INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Directory processed files are archived to.
    #[arg(long, env = "TAGBUFFER_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Number of concurrent workers.
    #[arg(long, env = "TAGBUFFER_WORKERS")]
    workers: Option<u32>,

    /// Poll interval in milliseconds when the queue is empty.
    #[arg(long, env = "TAGBUFFER_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// What to do with files the processor rejects: `remove` or `retain`.
    #[arg(long, env = "TAGBUFFER_FAILURE_POLICY")]
    failure_policy: Option<FailurePolicyKind>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.input_dir {
            config.storage.input_dir = dir;
        }
        if let Some(dir) = self.archive_dir {
            config.storage.archive_dir = dir;
        }
        if let Some(n) = self.workers {
            config.queue.workers = n.max(1);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.queue.poll_interval_ms = ms;
        }
        if let Some(policy) = self.failure_policy {
            config.queue.failure_policy = policy;
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Put every file under `root` into the store and queue its key.
async fn load_input(root: &Path, store: &InMemoryBufferStore, pool: &WorkerPool) -> (usize, usize) {
    let mut loaded = 0;
    let mut skipped = 0;

    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to walk input directory entry");
                skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let key = match BufferKey::from_relative_path(relative) {
            Ok(k) => k,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping file");
                skipped += 1;
                continue;
            }
        };

        let content = match tokio::fs::read(entry.path()).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "failed to read file");
                skipped += 1;
                continue;
            }
        };

        if let Err(e) = store.put(BufferItem::new(&key, content)).await {
            warn!(%key, error = %e, "failed to buffer file");
            skipped += 1;
            continue;
        }
        pool.add(key);
        loaded += 1;
    }

    (loaded, skipped)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    config.log_summary();

    let store = Arc::new(InMemoryBufferStore::new());
    let processor = Arc::new(ArchiveProcessor::new(&config.storage.archive_dir));
    let pool = WorkerPool::start(&config.queue, store.clone(), processor);

    let (loaded, skipped) = load_input(&config.storage.input_dir, &store, &pool).await;
    info!(loaded, skipped, input_dir = %config.storage.input_dir.display(), "input buffered");

    let check_interval = Duration::from_millis(config.queue.poll_interval_ms.max(50));
    tokio::select! {
        _ = async {
            while !(pool.is_drained() && store.is_empty().await) {
                tokio::time::sleep(check_interval).await;
            }
        } => {
            info!("buffer drained");
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for ctrl_c");
            }
            info!("shutdown signal received");
        }
    }

    let stats = pool.shutdown().await;
    let remaining = store.len().await;
    info!(
        groups = stats.groups_processed,
        removed = stats.files_removed,
        failed = stats.files_failed,
        missing = stats.files_missing,
        remaining,
        "tagbuffer-worker exited cleanly"
    );
    Ok(())
}
