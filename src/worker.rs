//! The dedicated indexing worker (spec §5): the only task allowed to
//! rebuild the index. Rebuild requests arrive over a length-1 channel so a
//! burst of webhook deliveries coalesces into a single rebuild, matching
//! the teacher's pattern of moving blocking `git2` work onto
//! `spawn_blocking` rather than the async executor threads.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::git::Backend;
use crate::index::{self, SharedCache};

/// A handle request handlers use to ask for a branch to be re-indexed.
#[derive(Clone)]
pub struct ReindexHandle {
    tx: mpsc::Sender<String>,
}

impl ReindexHandle {
    /// Enqueues `branch` for re-indexing. A rebuild already queued causes
    /// this one to be silently coalesced (still `true`: the pending
    /// rebuild will see the same new state) — only a stopped worker
    /// returns `false`.
    pub fn request(&self, branch: String) -> bool {
        match self.tx.try_send(branch) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Spawns the worker and returns the handle used to trigger rebuilds.
/// `cache` is swapped in place on a successful rebuild; a failed rebuild
/// leaves the previous generation untouched (spec §7).
pub fn spawn(
    backend: Arc<Backend>,
    base: String,
    clone_depth: u32,
    cache: Arc<SharedCache>,
) -> ReindexHandle {
    let (tx, mut rx) = mpsc::channel::<String>(1);

    tokio::spawn(async move {
        while let Some(branch) = rx.recv().await {
            let backend = backend.clone();
            let base = base.clone();
            let branch_for_task = branch.clone();

            let result = tokio::task::spawn_blocking(move || {
                backend.fetch_branch(&branch_for_task)?;
                index::build(&backend, &base, clone_depth)
            })
            .await;

            match result {
                Ok(Ok(new_cache)) => {
                    cache.swap(new_cache);
                    tracing::info!(branch = %branch, "reindex complete");
                }
                Ok(Err(err)) => {
                    tracing::error!(branch = %branch, error = %err, "reindex failed, keeping previous index");
                }
                Err(join_err) => {
                    tracing::error!(branch = %branch, error = %join_err, "reindex task panicked");
                }
            }
        }
    });

    ReindexHandle { tx }
}
