// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workspace registration.
//!
//! Register single workspaces by cloning them into place, unregister them
//! again, and pull upstream changes into registered workspaces. Every
//! workspace path given here is spelled relative to the manifest root.
//!
//! Manifest and `.gitignore` of the mother repository are kept in step: an
//! added workspace gets its `.git` directory ignored, and a removed workspace
//! loses that entry again.

use crate::{
    config::{ConfigError, WorkspaceEntry},
    context::{ContextError, SyncContext},
    git::{GitError, Vcs},
    gitignore::{IgnoreDrafter, IgnoreError},
};

use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Options for unregistering a workspace.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove even if the workspace has uncommitted changes.
    pub force: bool,

    /// Leave workspace files on disk.
    pub keep_files: bool,
}

/// Summary of a pull over registered workspaces.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// Workspaces pulled without trouble.
    pub updated: usize,

    /// Workspaces that are not cloned yet.
    pub skipped: usize,

    /// Workspaces whose pull failed.
    pub failed: usize,
}

/// Add, remove, and pull registered workspaces.
pub struct WorkspaceManager<'a, V>
where
    V: Vcs,
{
    vcs: &'a V,
}

impl<'a, V> WorkspaceManager<'a, V>
where
    V: Vcs,
{
    /// Construct new workspace manager.
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    /// Clone `repo` into `path` and register it as a workspace.
    ///
    /// Registration is checked against the manifest before anything is
    /// cloned, so a conflicting path leaves the file system untouched.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::InvalidPath`] if path leaves manifest root.
    /// - Return [`WorkspaceError::Register`] if path is already registered,
    ///   or overlaps a registered workspace.
    /// - Return [`WorkspaceError::Occupied`] if path already holds files.
    /// - Return [`WorkspaceError::Git`] if clone fails.
    /// - Return [`WorkspaceError::Context`] if manifest cannot be saved.
    /// - Return [`WorkspaceError::Ignore`] if `.gitignore` cannot be updated.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn add(
        &self,
        ctx: &mut SyncContext,
        repo: &str,
        path: &str,
        branch: Option<&str>,
    ) -> Result<WorkspaceEntry> {
        let path = workspace_path(path)?;
        let mut entry = WorkspaceEntry::new(path.clone(), repo);
        entry.branch = branch.map(str::to_owned);

        let mut manifest = ctx.manifest.clone();
        manifest.register(entry.clone())?;

        let target = ctx.repo_root.join(&path);
        let occupied = fs::read_dir(&target).is_ok_and(|mut entries| entries.next().is_some());
        if occupied || target.is_file() {
            return Err(WorkspaceError::Occupied { target });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        info!("cloning {repo} into {path}");
        self.vcs.clone_repo(repo, &target, branch)?;

        ctx.manifest = manifest;
        ctx.save_manifest()?;
        IgnoreDrafter::new(&ctx.repo_root).ignore_workspace(&path)?;
        info!("registered workspace {path}");

        Ok(entry)
    }

    /// Unregister workspace at `path`, deleting its files unless told not to.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::InvalidPath`] if path leaves manifest root.
    /// - Return [`WorkspaceError::NotRegistered`] if no workspace lives at
    ///   path.
    /// - Return [`WorkspaceError::Uncommitted`] if workspace has modified
    ///   files and removal is not forced.
    /// - Return [`WorkspaceError::Context`] if manifest cannot be saved.
    /// - Return [`WorkspaceError::Ignore`] if `.gitignore` cannot be updated.
    /// - Return [`WorkspaceError::Io`] if workspace files cannot be deleted.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn remove(
        &self,
        ctx: &mut SyncContext,
        path: &str,
        options: RemoveOptions,
    ) -> Result<WorkspaceEntry> {
        let path = workspace_path(path)?;
        if ctx.manifest.find(&path).is_none() {
            return Err(WorkspaceError::NotRegistered { path });
        }

        let target = ctx.repo_root.join(&path);
        if !options.force && self.vcs.is_repo(&target) {
            let modified = self.vcs.modified_files(&target)?;
            if !modified.is_empty() {
                return Err(WorkspaceError::Uncommitted {
                    path,
                    modified: modified.len(),
                });
            }
        }

        let entry = ctx
            .manifest
            .unregister(&path)
            .ok_or_else(|| WorkspaceError::NotRegistered { path: path.clone() })?;
        ctx.save_manifest()?;
        IgnoreDrafter::new(&ctx.repo_root).unignore_workspace(&path)?;
        info!("unregistered workspace {path}");

        if options.keep_files || !target.exists() {
            return Ok(entry);
        }

        fs::remove_dir_all(&target).map_err(|source| WorkspaceError::Io {
            source,
            path: target.clone(),
        })?;
        info!("deleted {:?}", target.display());

        Ok(entry)
    }

    /// Pull upstream changes into registered workspaces.
    ///
    /// Pull only the workspace at `path` if given, otherwise every registered
    /// workspace. Workspaces that are not cloned yet are skipped, and a
    /// failed pull does not stop the others.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::InvalidPath`] if path leaves manifest root.
    /// - Return [`WorkspaceError::NotRegistered`] if no workspace lives at
    ///   path.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn pull(&self, ctx: &SyncContext, path: Option<&str>) -> Result<PullReport> {
        let entries = match path {
            Some(path) => {
                let path = workspace_path(path)?;
                let entry = ctx
                    .manifest
                    .find(&path)
                    .ok_or_else(|| WorkspaceError::NotRegistered { path: path.clone() })?;
                vec![entry]
            }
            None => ctx.manifest.workspaces.iter().collect(),
        };

        let mut report = PullReport::default();
        for entry in entries {
            let target = ctx.repo_root.join(&entry.path);
            if !self.vcs.is_repo(&target) {
                warn!("{} is not cloned yet, run sync first", entry.path);
                report.skipped += 1;
                continue;
            }

            match self.vcs.pull(&target) {
                Ok(()) => {
                    info!("pulled {}", entry.path);
                    report.updated += 1;
                }
                Err(error) => {
                    warn!("failed to pull {}: {error}", entry.path);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Spell workspace path with '/' separators and no redundant components.
///
/// # Errors
///
/// - Return [`WorkspaceError::InvalidPath`] if path is empty, absolute, or
///   climbs out through "..".
fn workspace_path(raw: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(WorkspaceError::InvalidPath { path: raw.into() }),
        }
    }

    if parts.is_empty() {
        return Err(WorkspaceError::InvalidPath { path: raw.into() });
    }

    Ok(parts.join("/"))
}

/// Workspace registration error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace path {path:?} must be relative to the manifest root")]
    InvalidPath { path: String },

    #[error("no workspace registered at {path:?}")]
    NotRegistered { path: String },

    /// Refusing to clone over existing files.
    #[error("{:?} already exists and is not empty", target.display())]
    Occupied { target: PathBuf },

    #[error("workspace {path:?} has {modified} modified file(s), use --force to remove anyway")]
    Uncommitted { path: String, modified: usize },

    #[error(transparent)]
    Register(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Ignore(#[from] IgnoreError),

    #[error("file system failure at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
