// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workspace status reporting.
//!
//! Read-only summary of every registered workspace: whether it is present,
//! which branch it is on, what it has modified, and how it relates to its
//! upstream.

use crate::{
    context::SyncContext,
    git::{fetch_with_timeout, FetchOutcome, Vcs},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    sync::Arc,
};
use tracing::{debug, instrument, warn};

/// Status of one registered workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceStatus {
    pub path: String,

    /// Workspace exists as a working copy.
    pub present: bool,

    pub branch: Option<String>,
    pub modified: Vec<String>,

    /// Keep files that are not protected right now.
    pub unprotected: Vec<String>,

    /// Commits ahead and behind of upstream.
    pub ahead_behind: Option<(usize, usize)>,

    /// Outcome of remote fetch, if one was attempted.
    pub fetch: Option<FetchOutcome>,
}

impl Display for WorkspaceStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if !self.present {
            return write!(fmt, "{}: missing", self.path);
        }

        write!(
            fmt,
            "{} [{}]",
            self.path,
            self.branch.as_deref().unwrap_or("detached")
        )?;

        if let Some((ahead, behind)) = self.ahead_behind {
            write!(fmt, " ahead {ahead}, behind {behind}")?;
        }

        if self.fetch == Some(FetchOutcome::TimedOut) {
            write!(fmt, " (fetch timed out)")?;
        }

        if !self.modified.is_empty() {
            write!(fmt, ", {} modified", self.modified.len())?;
        }

        if !self.unprotected.is_empty() {
            write!(fmt, ", unprotected keep files: {}", self.unprotected.join(", "))?;
        }

        Ok(())
    }
}

/// Collect status of every registered workspace, in manifest order.
///
/// Remotes are fetched first when `fetch` is set, each bounded by the fetch
/// timeout of the context's settings. Failing queries degrade the status
/// rather than fail the report.
#[instrument(skip(ctx, vcs), level = "debug")]
pub async fn collect_status<V>(ctx: &SyncContext, vcs: Arc<V>, fetch: bool) -> Vec<WorkspaceStatus>
where
    V: Vcs,
{
    let mut report = Vec::with_capacity(ctx.manifest.workspaces.len());
    for entry in &ctx.manifest.workspaces {
        let path = ctx.repo_root.join(&entry.path);
        if !vcs.is_repo(&path) {
            report.push(WorkspaceStatus {
                path: entry.path.clone(),
                present: false,
                branch: None,
                modified: Vec::new(),
                unprotected: Vec::new(),
                ahead_behind: None,
                fetch: None,
            });
            continue;
        }

        let mut fetched = None;
        if fetch && !entry.repo.is_empty() {
            match fetch_with_timeout(&path, ctx.settings.fetch_timeout).await {
                Ok(outcome) => fetched = Some(outcome),
                Err(error) => warn!("cannot fetch {}: {error}", entry.path),
            }
        }

        let query_vcs = vcs.clone();
        let keep = entry.keep.clone();
        let query_path = path.clone();
        let queried = tokio::task::spawn_blocking(move || {
            query(query_vcs.as_ref(), &query_path, &keep)
        })
        .await;

        let (branch, modified, unprotected, ahead_behind) = match queried {
            Ok(result) => result,
            Err(error) => {
                warn!("status query of {} failed: {error}", entry.path);
                (None, Vec::new(), Vec::new(), None)
            }
        };

        report.push(WorkspaceStatus {
            path: entry.path.clone(),
            present: true,
            branch,
            modified,
            unprotected,
            ahead_behind,
            fetch: fetched,
        });
    }

    report
}

type Query = (Option<String>, Vec<String>, Vec<String>, Option<(usize, usize)>);

fn query<V>(vcs: &V, path: &Path, keep: &[String]) -> Query
where
    V: Vcs + ?Sized,
{
    let branch = vcs.current_branch(path).unwrap_or_else(|error| {
        debug!("cannot read branch of {:?}: {error}", path.display());
        None
    });
    let modified = vcs.modified_files(path).unwrap_or_default();
    let protected = vcs.skip_worktree_files(path).unwrap_or_default();
    let unprotected = keep
        .iter()
        .filter(|file| !protected.contains(*file))
        .cloned()
        .collect();
    let ahead_behind = vcs.ahead_behind(path).unwrap_or(None);

    (branch, modified, unprotected, ahead_behind)
}
