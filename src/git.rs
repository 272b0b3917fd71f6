// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control plumbing.
//!
//! Everything nestsync needs to know about a repository goes through the
//! [`Vcs`] trait. Queries that libgit2 answers well are done through [`git2`],
//! while index flag manipulation and patch generation shell out to the Git
//! binary so the user's own Git configuration is honored.
//!
//! # Skip-Worktree Flag
//!
//! Git keeps a per-file __skip-worktree__ flag in the index. While it is set,
//! Git pretends the file in the work tree matches the index, so local edits
//! never show up as modifications and never get clobbered by pulls. Keep files
//! are protected by this flag.

use git2::{BranchType, ErrorCode, Repository};
use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Command,
    time::Duration,
};
use tracing::{debug, instrument};

/// Operations nestsync performs on a working copy.
///
/// Every path given is the top-level of a working copy.
pub trait Vcs: Send + Sync + 'static {
    /// Check if path is the top-level of a repository.
    fn is_repo(&self, path: &Path) -> bool;

    /// URL of the primary remote, `None` when no remote is configured.
    fn remote_url(&self, path: &Path) -> Result<Option<String>>;

    /// Name of checked out branch, `None` when detached or unborn.
    fn current_branch(&self, path: &Path) -> Result<Option<String>>;

    /// Tracked files whose content differs from HEAD.
    fn modified_files(&self, path: &Path) -> Result<Vec<String>>;

    /// Tracked files that currently carry the skip-worktree flag.
    fn skip_worktree_files(&self, path: &Path) -> Result<Vec<String>>;

    /// Clear the skip-worktree flag of each file.
    fn lift_skip_worktree(&self, path: &Path, files: &[String]) -> Result<()>;

    /// Set the skip-worktree flag of each file.
    fn apply_skip_worktree(&self, path: &Path, files: &[String]) -> Result<()>;

    /// Unified diff of one file against HEAD.
    fn diff_against_head(&self, path: &Path, file: &str) -> Result<String>;

    /// Commits ahead and behind of upstream, `None` without an upstream.
    fn ahead_behind(&self, path: &Path) -> Result<Option<(usize, usize)>>;

    /// Clone remote into path.
    fn clone_repo(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<()>;

    /// Pull upstream changes into the checked out branch.
    fn pull(&self, path: &Path) -> Result<()>;

    /// Turn existing directory into a working copy of remote.
    ///
    /// Files already in the directory are left as is.
    fn init_in_place(&self, path: &Path, url: &str, branch: Option<&str>) -> Result<()>;
}

/// [`Vcs`] implementation backed by libgit2 and the Git binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    /// Construct new Git backend.
    pub fn new() -> Self {
        Self
    }
}

impl Vcs for GitCli {
    fn is_repo(&self, path: &Path) -> bool {
        Repository::open(path).is_ok_and(|repo| !repo.is_bare())
    }

    fn remote_url(&self, path: &Path) -> Result<Option<String>> {
        let repo = Repository::open(path)?;
        let remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(error) if error.code() == ErrorCode::NotFound => {
                let names = repo.remotes()?;
                match names.iter().flatten().next() {
                    Some(name) => repo.find_remote(name)?,
                    None => return Ok(None),
                }
            }
            Err(error) => return Err(error.into()),
        };

        Ok(remote.url().map(str::to_owned))
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>> {
        let repo = Repository::open(path)?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(error) if error.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        if !head.is_branch() {
            return Ok(None);
        }

        Ok(head.shorthand().map(str::to_owned))
    }

    #[instrument(skip(self), level = "debug")]
    fn modified_files(&self, path: &Path) -> Result<Vec<String>> {
        let output = gitcall(path, ["diff", "--name-only", "-z", "HEAD", "--"])?;
        Ok(split_nul(&output))
    }

    #[instrument(skip(self), level = "debug")]
    fn skip_worktree_files(&self, path: &Path) -> Result<Vec<String>> {
        let output = gitcall(path, ["ls-files", "-v", "-z"])?;
        let files = output
            .split('\0')
            .filter_map(|entry| entry.strip_prefix("S "))
            .filter(|file| !file.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(files)
    }

    #[instrument(skip(self), level = "debug")]
    fn lift_skip_worktree(&self, path: &Path, files: &[String]) -> Result<()> {
        update_index(path, "--no-skip-worktree", files)
    }

    #[instrument(skip(self), level = "debug")]
    fn apply_skip_worktree(&self, path: &Path, files: &[String]) -> Result<()> {
        update_index(path, "--skip-worktree", files)
    }

    fn diff_against_head(&self, path: &Path, file: &str) -> Result<String> {
        gitcall(
            path,
            ["diff", "--no-color", "--no-ext-diff", "HEAD", "--", file],
        )
    }

    fn ahead_behind(&self, path: &Path) -> Result<Option<(usize, usize)>> {
        let repo = Repository::open(path)?;
        let Some(name) = self.current_branch(path)? else {
            return Ok(None);
        };

        let branch = repo.find_branch(&name, BranchType::Local)?;
        let upstream = match branch.upstream() {
            Ok(upstream) => upstream,
            Err(error) if error.code() == ErrorCode::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let (Some(local), Some(remote)) = (branch.get().target(), upstream.get().target()) else {
            return Ok(None);
        };

        Ok(Some(repo.graph_ahead_behind(local, remote)?))
    }

    #[instrument(skip(self), level = "debug")]
    fn clone_repo(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<()> {
        let mut args = vec!["clone".to_string()];
        if let Some(branch) = branch {
            args.extend(["--branch".into(), branch.into()]);
        }
        args.extend(["--".into(), url.into(), path.to_string_lossy().into_owned()]);

        syscall_non_interactive("git", args)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn pull(&self, path: &Path) -> Result<()> {
        gitcall(path, ["pull", "--quiet", "--no-edit"])?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn init_in_place(&self, path: &Path, url: &str, branch: Option<&str>) -> Result<()> {
        gitcall(path, ["init", "--quiet"])?;
        if url.is_empty() {
            return Ok(());
        }

        gitcall(path, ["remote", "add", "origin", url])?;
        gitcall(path, ["fetch", "--quiet", "origin", branch.unwrap_or("HEAD")])?;

        // INVARIANT: Mixed reset keeps every file already present in the directory.
        gitcall(path, ["reset", "--quiet", "--mixed", "FETCH_HEAD"])?;
        if let Some(branch) = branch {
            gitcall(path, ["checkout", "--quiet", "-B", branch])?;
        }

        Ok(())
    }
}

/// Result of a remote fetch bounded by a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Remote refs were updated.
    Fetched,

    /// Fetch was killed after exceeding its timeout.
    TimedOut,
}

/// Fetch from the default remote of a working copy, giving up after `timeout`.
///
/// The Git process is killed when the timeout elapses.
///
/// # Errors
///
/// - Return [`GitError::Spawn`] if Git cannot be executed.
/// - Return [`GitError::Syscall`] if the fetch itself fails.
#[instrument(level = "debug")]
pub async fn fetch_with_timeout(path: &Path, timeout: Duration) -> Result<FetchOutcome> {
    let child = tokio::process::Command::new("git")
        .arg("-C")
        .arg(path)
        .args(["fetch", "--quiet"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true)
        .output();

    let Ok(output) = tokio::time::timeout(timeout, child).await else {
        debug!("fetch of {:?} timed out", path.display());
        return Ok(FetchOutcome::TimedOut);
    };

    let output = output?;
    if !output.status.success() {
        return Err(GitError::Syscall {
            command: format!("git -C {} fetch", path.display()),
            message: chomp(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }

    Ok(FetchOutcome::Fetched)
}

fn update_index(path: &Path, flag: &str, files: &[String]) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }

    let mut args = vec!["update-index".to_string(), flag.to_string(), "--".to_string()];
    args.extend(files.iter().cloned());
    gitcall(path, args)?;

    Ok(())
}

fn gitcall(
    path: &Path,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let mut bin_args: Vec<OsString> = vec!["-C".into(), path.as_os_str().to_os_string()];
    bin_args.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
    syscall_non_interactive("git", bin_args)
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    let output = Command::new(cmd.as_ref())
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;

    if !output.status.success() {
        let command = std::iter::once(cmd.as_ref())
            .chain(args.iter().map(|arg| arg.as_os_str()))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        return Err(GitError::Syscall {
            command,
            message: chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned()),
        });
    }

    Ok(String::from_utf8_lossy(output.stdout.as_slice()).into_owned())
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

fn split_nul(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::to_owned)
        .collect()
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary could not be executed.
    #[error(transparent)]
    Spawn(#[from] std::io::Error),

    /// Git binary exited unsuccessfully.
    #[error("command {command:?} failed: {message}")]
    Syscall { command: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
