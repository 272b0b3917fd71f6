// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep file processing.
//!
//! A __keep file__ is a tracked file whose local modifications must survive
//! synchronization, e.g., a machine specific configuration file. Keep files
//! stay protected by Git's skip-worktree flag. Whenever a workspace is
//! processed, the flag is briefly lifted so that every modified file can be
//! snapshotted, and patched against HEAD, before protection comes back.

pub mod transaction;

use crate::{
    backup::{copy_into, write_into, BackupError, BackupLayout, BackupScope, SnapshotDirs},
    git::{GitError, Vcs},
};
use transaction::with_skip_worktree;

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Branch name used for snapshots of detached or unborn heads.
pub const DETACHED_BRANCH: &str = "detached";

/// Drop blank entries from a file list.
pub fn non_blank(files: impl IntoIterator<Item = String>) -> Vec<String> {
    files
        .into_iter()
        .filter(|file| !file.trim().is_empty())
        .collect()
}

/// Result of processing the keep files of one scope.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeepOutcome {
    /// Files that differed from HEAD while protection was lifted.
    pub modified: Vec<String>,

    /// Bootstrapped keep list, set only when the scope had none.
    pub populated: Option<Vec<String>>,

    /// Files that were snapshotted.
    pub backed_up: usize,

    /// Files whose snapshot or patch failed.
    pub failures: usize,
}

/// Snapshot and patch keep files of a working copy.
pub struct KeepProcessor<'a, V>
where
    V: Vcs + ?Sized,
{
    vcs: &'a V,
    layout: &'a BackupLayout,
    now: NaiveDateTime,
}

impl<'a, V> KeepProcessor<'a, V>
where
    V: Vcs + ?Sized,
{
    /// Construct new processor stamping snapshots with `now`.
    pub fn new(vcs: &'a V, layout: &'a BackupLayout, now: NaiveDateTime) -> Self {
        Self { vcs, layout, now }
    }

    /// Process keep files of working copy at `workspace`.
    ///
    /// While protection of `keep` is lifted, every modified file is copied
    /// into a fresh snapshot, and its diff against HEAD is written both as the
    /// latest patch and into the snapshot. An empty `keep` list is bootstrapped
    /// from the modified files, reported through [`KeepOutcome::populated`].
    ///
    /// Per-file failures are logged and counted, but do not stop processing.
    ///
    /// # Errors
    ///
    /// - Return [`KeepError::Lift`] if protection cannot be lifted.
    /// - Return [`KeepError::ListModified`] if modified files cannot be
    ///   listed.
    /// - Return [`KeepError::Backup`] if backup directories cannot be
    ///   prepared.
    #[instrument(skip(self, keep), level = "debug")]
    pub fn process(
        &self,
        scope: &BackupScope,
        workspace: &Path,
        keep: &[String],
    ) -> Result<KeepOutcome> {
        with_skip_worktree(self.vcs, workspace, keep, || {
            self.snapshot(scope, workspace, keep)
        })
    }

    fn snapshot(
        &self,
        scope: &BackupScope,
        workspace: &Path,
        keep: &[String],
    ) -> Result<KeepOutcome> {
        let modified = self
            .vcs
            .modified_files(workspace)
            .map(non_blank)
            .map_err(|source| KeepError::ListModified {
                source,
                workspace: workspace.to_path_buf(),
            })?;

        let mut outcome = KeepOutcome::default();
        if keep.is_empty() && !modified.is_empty() {
            info!(
                "registering {} modified file(s) as keep files of {}: {}",
                modified.len(),
                scope.label(),
                modified.join(", ")
            );
            outcome.populated = Some(modified.clone());
        }

        let patch_dir = self.layout.reset_patch_dir(scope)?;
        if modified.is_empty() {
            debug!("no modified files in {}", scope.label());
            return Ok(outcome);
        }

        let branch = match self.vcs.current_branch(workspace) {
            Ok(Some(branch)) => branch,
            Ok(None) => DETACHED_BRANCH.into(),
            Err(error) => {
                debug!("cannot determine branch of {}: {error}", scope.label());
                DETACHED_BRANCH.into()
            }
        };
        let snapshot = self.layout.create_snapshot_dirs(scope, &branch, self.now)?;

        for file in &modified {
            if !workspace.join(file).exists() {
                debug!("skipping deleted file {file}");
                continue;
            }

            match self.backup_file(workspace, file, &patch_dir, &snapshot) {
                Ok(()) => outcome.backed_up += 1,
                Err(error) => {
                    warn!("failed to back up {file} of {}: {error}", scope.label());
                    outcome.failures += 1;
                }
            }
        }

        info!("backed up {} file(s) of {}", outcome.backed_up, scope.label());
        outcome.modified = modified;

        Ok(outcome)
    }

    fn backup_file(
        &self,
        workspace: &Path,
        file: &str,
        patch_dir: &Path,
        snapshot: &SnapshotDirs,
    ) -> Result<()> {
        copy_into(workspace.join(file), &snapshot.modified, file)?;

        let patch = self
            .vcs
            .diff_against_head(workspace, file)
            .map_err(|source| KeepError::Diff {
                source,
                file: file.to_string(),
            })?;

        let patch_name = format!("{file}.patch");
        let latest = write_into(patch_dir, &patch_name, &patch)?;
        copy_into(&latest, &snapshot.patched, &patch_name)?;

        Ok(())
    }
}

/// Keep file processing error types.
#[derive(Debug, thiserror::Error)]
pub enum KeepError {
    /// Protection of keep files cannot be lifted.
    #[error("failed to lift keep file protection in {:?}", workspace.display())]
    Lift {
        #[source]
        source: GitError,
        workspace: PathBuf,
    },

    /// Modified files cannot be listed.
    #[error("failed to list modified files in {:?}", workspace.display())]
    ListModified {
        #[source]
        source: GitError,
        workspace: PathBuf,
    },

    /// Patch of a single file cannot be produced.
    #[error("failed to diff {file:?} against HEAD")]
    Diff {
        #[source]
        source: GitError,
        file: String,
    },

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Friendly result alias :3
pub type Result<T, E = KeepError> = std::result::Result<T, E>;
