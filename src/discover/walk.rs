// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory walking.
//!
//! Depth-first traversal of a directory tree that lets the visitor prune
//! subtrees or stop the walk outright. Symbolic links are never followed, and
//! `.git` directories are never entered.

use crate::{discover::Discovery, exclude::is_excluded, path::relative_slash_path};

use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// What the walk does after visiting a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Descend into the directory.
    Continue,

    /// Do not descend into the directory.
    SkipSubtree,

    /// Stop walking altogether.
    Abort,
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every reachable directory was visited.
    Completed,

    /// Visitor requested [`WalkAction::Abort`].
    Aborted,
}

/// Walk directories beneath `root` depth-first, starting with `root` itself.
///
/// Siblings are visited in lexicographic order. Directories that cannot be
/// read are logged and skipped.
pub fn walk_dirs<F>(root: impl AsRef<Path>, mut visit: F) -> WalkOutcome
where
    F: FnMut(&Path) -> WalkAction,
{
    let mut entries = WalkDir::new(root.as_ref())
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir() && entry.file_name() != ".git");

    while let Some(entry) = entries.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                debug!("skipping unreadable directory: {error}");
                continue;
            }
        };

        match visit(entry.path()) {
            WalkAction::Abort => return WalkOutcome::Aborted,
            WalkAction::SkipSubtree => entries.skip_current_dir(),
            WalkAction::Continue => {}
        }
    }

    WalkOutcome::Completed
}

/// Walk `scan_root` for workspace candidates.
///
/// A candidate is a directory holding a `.git` directory, other than
/// `manifest_root` itself. Candidates that belong to a package manager are
/// skipped. Each remaining candidate is handed to `on_candidate`, and its
/// subtree is never walked. Only [`WalkAction::Abort`] from the callback has
/// any effect.
pub fn walk_candidates<F>(
    scan_root: impl AsRef<Path>,
    manifest_root: impl AsRef<Path>,
    mut on_candidate: F,
) -> WalkOutcome
where
    F: FnMut(Discovery) -> WalkAction,
{
    let manifest_root = manifest_root.as_ref();

    walk_dirs(scan_root, |dir| {
        if dir == manifest_root || !dir.join(".git").is_dir() {
            return WalkAction::Continue;
        }

        let Some(relative) = relative_slash_path(manifest_root, dir) else {
            debug!("candidate {:?} lies outside of manifest root", dir.display());
            return WalkAction::SkipSubtree;
        };

        if is_excluded(manifest_root, &relative) {
            debug!("skipping package-manager dependency {relative}");
            return WalkAction::SkipSubtree;
        }

        let discovery = Discovery {
            path: dir.to_path_buf(),
            relative,
        };

        match on_candidate(discovery) {
            WalkAction::Abort => WalkAction::Abort,
            _ => WalkAction::SkipSubtree,
        }
    })
}
