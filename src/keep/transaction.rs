// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Scoped lifting of keep file protection.
//!
//! Inspecting keep files requires Git to see them as modified, which means
//! their skip-worktree flag must be cleared first. [`with_skip_worktree`]
//! clears the flag, runs the given work, and sets the flag again no matter how
//! the work ends, be it through success, error, or panic.

use crate::{
    git::Vcs,
    keep::{KeepError, Result},
};

use std::path::Path;
use tracing::{debug, warn};

/// Run `work` while protection of `keep` files is lifted in `workspace`.
///
/// Protection is restored on every listed file once `work` ends, even if some
/// of them were unprotected beforehand. Failure to restore is only logged.
///
/// # Errors
///
/// - Return [`KeepError::Lift`] if protection cannot be lifted, in which case
///   `work` never runs.
/// - Return whatever `work` returns.
pub fn with_skip_worktree<V, T, F>(
    vcs: &V,
    workspace: &Path,
    keep: &[String],
    work: F,
) -> Result<T>
where
    V: Vcs + ?Sized,
    F: FnOnce() -> Result<T>,
{
    if keep.is_empty() {
        return work();
    }

    vcs.lift_skip_worktree(workspace, keep)
        .map_err(|source| KeepError::Lift {
            source,
            workspace: workspace.to_path_buf(),
        })?;
    debug!("lifted protection of {} file(s) in {:?}", keep.len(), workspace.display());

    let _guard = RestoreGuard {
        vcs,
        workspace,
        keep,
    };

    work()
}

struct RestoreGuard<'a, V>
where
    V: Vcs + ?Sized,
{
    vcs: &'a V,
    workspace: &'a Path,
    keep: &'a [String],
}

impl<V> Drop for RestoreGuard<'_, V>
where
    V: Vcs + ?Sized,
{
    fn drop(&mut self) {
        match self.vcs.apply_skip_worktree(self.workspace, self.keep) {
            Ok(()) => debug!("restored protection in {:?}", self.workspace.display()),
            Err(error) => warn!(
                "failed to restore protection of keep files in {:?}: {error}",
                self.workspace.display()
            ),
        }
    }
}
