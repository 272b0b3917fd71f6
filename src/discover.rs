// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workspace discovery.
//!
//! Find nested repositories beneath a scan root, and turn each one into a
//! manifest entry.
//!
//! # Pipeline
//!
//! Discovery runs as a small producer/consumer pipeline:
//!
//! 1. A blocking task walks the file system, pushing each candidate into a
//!    bounded queue of [`DISCOVERY_QUEUE_CAPACITY`] entries.
//! 2. The async side pulls candidates off of the queue and spawns one task per
//!    candidate. Each task must acquire a permit from a semaphore sized by
//!    [`WorkerCount`] before it may inspect its candidate, so never more than
//!    that many inspections run at once.
//! 3. Inspection results are appended to a shared, mutex guarded list.
//!
//! The first worker failure cancels everything else. Tasks waiting on a permit
//! give up, the walker is told to stop, and the whole call fails without
//! returning partial results.

pub mod walk;

use crate::{
    config::{is_local_path_url, WorkerCount, WorkspaceEntry},
    git::Vcs,
    keep::non_blank,
};
use walk::{walk_candidates, WalkAction, WalkOutcome};

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    sync::{mpsc, Mutex, Semaphore},
    task::{self, JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Capacity of the queue between the walker and the workers.
pub const DISCOVERY_QUEUE_CAPACITY: usize = 100;

/// Workspace candidate found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Absolute path to the candidate.
    pub path: PathBuf,

    /// Candidate path relative to the manifest root, '/' separated.
    pub relative: String,
}

/// Concurrent workspace discoverer.
pub struct Discoverer<V>
where
    V: Vcs,
{
    vcs: Arc<V>,
    workers: WorkerCount,
    progress: ProgressBar,
}

impl<V> Discoverer<V>
where
    V: Vcs,
{
    /// Construct new discoverer without progress display.
    pub fn new(vcs: Arc<V>, workers: WorkerCount) -> Self {
        Self {
            vcs,
            workers,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report progress through given spinner.
    ///
    /// # Errors
    ///
    /// - Return [`DiscoverError::Template`] if spinner template is invalid.
    pub fn with_progress(mut self, progress: ProgressBar) -> Result<Self> {
        progress.set_style(ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {pos} workspace(s) {msg}",
        )?);
        self.progress = progress;
        Ok(self)
    }

    /// Discover every workspace beneath `scan_root`.
    ///
    /// Returned entries are sorted by path, carry no branch, and spell their
    /// path relative to `manifest_root`.
    ///
    /// # Errors
    ///
    /// - Return [`DiscoverError::Worker`] if any inspection task fails.
    /// - Return [`DiscoverError::Walk`] if the walker itself fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn discover(
        &self,
        scan_root: &Path,
        manifest_root: &Path,
    ) -> Result<Vec<WorkspaceEntry>> {
        info!("scanning {:?} for workspaces", scan_root.display());

        let (sender, mut receiver) = mpsc::channel::<Discovery>(DISCOVERY_QUEUE_CAPACITY);
        let walk_scan_root = scan_root.to_path_buf();
        let walk_manifest_root = manifest_root.to_path_buf();
        let walker = task::spawn_blocking(move || {
            walk_candidates(&walk_scan_root, &walk_manifest_root, |discovery| {
                match sender.blocking_send(discovery) {
                    Ok(()) => WalkAction::SkipSubtree,
                    Err(_) => WalkAction::Abort,
                }
            })
        });

        let semaphore = Arc::new(Semaphore::new(self.workers.get()));
        let token = CancellationToken::new();
        let results = Arc::new(Mutex::new(Vec::new()));
        let mut workers = JoinSet::new();
        let mut failure = None;

        while let Some(discovery) = receiver.recv().await {
            while let Some(joined) = workers.try_join_next() {
                record_failure(&mut failure, &token, joined);
            }

            if token.is_cancelled() {
                break;
            }

            self.progress.set_message(discovery.relative.clone());
            workers.spawn(inspect_task(
                self.vcs.clone(),
                semaphore.clone(),
                token.clone(),
                results.clone(),
                self.progress.clone(),
                discovery,
            ));
        }

        // INVARIANT: Dropping the receiver makes the walker abort on its next send.
        drop(receiver);

        while let Some(joined) = workers.join_next().await {
            record_failure(&mut failure, &token, joined);
        }

        let outcome = walker.await.map_err(DiscoverError::Walk)?;
        self.progress.finish_and_clear();

        if let Some(error) = failure {
            return Err(error);
        }

        if outcome == WalkOutcome::Aborted {
            debug!("walker stopped early");
        }

        let mut entries = std::mem::take(&mut *results.lock().await);
        entries.sort_by(|a: &WorkspaceEntry, b| a.path.cmp(&b.path));
        info!("discovered {} workspace(s)", entries.len());

        Ok(entries)
    }
}

async fn inspect_task<V>(
    vcs: Arc<V>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    results: Arc<Mutex<Vec<WorkspaceEntry>>>,
    progress: ProgressBar,
    discovery: Discovery,
) -> Result<()>
where
    V: Vcs,
{
    let _permit = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(DiscoverError::Cancelled),
        permit = semaphore.acquire_owned() => permit.map_err(|_| DiscoverError::Cancelled)?,
    };

    let entry = task::spawn_blocking(move || inspect_candidate(vcs.as_ref(), discovery)).await?;
    if token.is_cancelled() {
        return Err(DiscoverError::Cancelled);
    }

    results.lock().await.push(entry);
    progress.inc(1);

    Ok(())
}

/// Turn candidate into manifest entry.
///
/// Failing queries only degrade the entry: a missing remote becomes an empty
/// URL, and a missing keep list becomes empty.
fn inspect_candidate<V>(vcs: &V, discovery: Discovery) -> WorkspaceEntry
where
    V: Vcs + ?Sized,
{
    let repo = match vcs.remote_url(&discovery.path) {
        Ok(Some(url)) => {
            if is_local_path_url(&url) {
                warn!(
                    "workspace {} uses local path remote {url:?}, it will not sync on other machines",
                    discovery.relative
                );
            }
            url
        }
        Ok(None) => {
            warn!("workspace {} has no remote, registering as local-only", discovery.relative);
            String::new()
        }
        Err(error) => {
            warn!("cannot query remote of {}: {error}", discovery.relative);
            String::new()
        }
    };

    let keep = match vcs.skip_worktree_files(&discovery.path) {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => modified_or_empty(vcs, &discovery),
        Err(error) => {
            debug!("cannot list skip-worktree files of {}: {error}", discovery.relative);
            modified_or_empty(vcs, &discovery)
        }
    };

    info!("found workspace {}", discovery.relative);
    WorkspaceEntry {
        path: discovery.relative,
        repo,
        branch: None,
        keep: non_blank(keep),
    }
}

fn modified_or_empty<V>(vcs: &V, discovery: &Discovery) -> Vec<String>
where
    V: Vcs + ?Sized,
{
    vcs.modified_files(&discovery.path).unwrap_or_else(|error| {
        debug!("cannot list modified files of {}: {error}", discovery.relative);
        Vec::new()
    })
}

fn record_failure(
    failure: &mut Option<DiscoverError>,
    token: &CancellationToken,
    joined: std::result::Result<Result<()>, JoinError>,
) {
    let error = match joined {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(error) => DiscoverError::Worker(error),
    };

    token.cancel();
    match failure {
        Some(DiscoverError::Cancelled) | None => *failure = Some(error),
        Some(_) => debug!("dropping follow-up discovery failure: {error}"),
    }
}

/// Discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    /// Inspection task failed or panicked.
    #[error("workspace inspection failed")]
    Worker(#[from] JoinError),

    /// Directory walker failed or panicked.
    #[error("directory walk failed")]
    Walk(#[source] JoinError),

    /// Task gave up because discovery was cancelled.
    #[error("discovery cancelled")]
    Cancelled,

    #[error(transparent)]
    Template(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = DiscoverError> = std::result::Result<T, E>;
