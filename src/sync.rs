// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Synchronization of the mother repository and its workspaces.
//!
//! One synchronization pass goes through the following steps:
//!
//! 1. Validate manifest integrity, and report every issue found.
//! 2. Discover workspaces if the manifest has none registered.
//! 3. Apply ignore patterns of the manifest.
//! 4. Process keep files of the mother repository.
//! 5. Bring every registered workspace into place, and process its keep
//!    files.
//! 6. Persist the manifest if anything in it changed.
//! 7. Archive finished months of backups, at most once a day.
//!
//! Problems with single workspaces or files are counted as issues and do not
//! stop the pass. Only failures that leave nothing sensible to continue with
//! are returned as errors.

use crate::{
    backup::{
        archive::{mark_run, should_run, Archiver},
        BackupScope,
    },
    config::{ConfigError, Manifest, WorkspaceEntry},
    context::{ContextError, SyncContext},
    discover::{DiscoverError, Discoverer},
    git::{GitError, Vcs},
    gitignore::IgnoreDrafter,
    integrity::{log_issues, IntegrityIssue, IntegrityValidator},
    keep::{KeepOutcome, KeepProcessor},
};

use chrono::{DateTime, Local};
use indicatif::ProgressBar;
use std::{fs, path::Path, sync::Arc};
use tracing::{debug, info, instrument, warn};

/// Options of a synchronization pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Log every integrity issue instead of a summary line, and list keep
    /// files of every scope.
    pub verbose: bool,

    /// Show discovery progress spinner.
    pub progress: bool,
}

/// Summary of a synchronization pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Integrity issues found before synchronizing.
    pub integrity: Vec<IntegrityIssue>,

    /// Workspaces registered through discovery.
    pub discovered: usize,

    /// Workspaces processed without trouble.
    pub synced: usize,

    /// Problems encountered while synchronizing.
    pub issues: usize,

    /// Manifest was written back to disk.
    pub manifest_saved: bool,

    /// Monthly archives written.
    pub archived: usize,
}

impl SyncReport {
    /// Summary line for the end of a pass.
    pub fn summary(&self) -> String {
        if self.issues > 0 {
            format!("sync completed with {} issue(s)", self.issues)
        } else {
            "all workspaces synced successfully".into()
        }
    }
}

/// Drive synchronization passes.
pub struct Synchronizer<V>
where
    V: Vcs,
{
    vcs: Arc<V>,
    options: SyncOptions,
    now: DateTime<Local>,
}

impl<V> Synchronizer<V>
where
    V: Vcs,
{
    /// Construct new synchronizer treating `now` as the current instant.
    pub fn new(vcs: Arc<V>, options: SyncOptions, now: DateTime<Local>) -> Self {
        Self { vcs, options, now }
    }

    /// Run one synchronization pass.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Discover`] if workspace discovery fails.
    /// - Return [`SyncError::Register`] if discovery yields conflicting paths.
    /// - Return [`SyncError::Context`] if the manifest cannot be saved.
    #[instrument(skip(self, ctx), level = "debug")]
    pub async fn run(&self, ctx: &mut SyncContext) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut manifest_changed = false;

        report.integrity = IntegrityValidator::new(self.vcs.as_ref(), &ctx.repo_root, &ctx.manifest).validate();
        self.report_integrity(&report.integrity);

        if ctx.manifest.workspaces.is_empty() {
            report.discovered = self.discover_into(ctx).await?;
            manifest_changed |= report.discovered > 0;
        }

        if !ctx.manifest.ignore.is_empty() {
            if let Err(error) = IgnoreDrafter::new(&ctx.repo_root).apply_patterns(&ctx.manifest.ignore) {
                warn!("failed to apply ignore patterns: {error}");
                report.issues += 1;
            }
        }

        let layout = ctx.layout();
        let processor = KeepProcessor::new(self.vcs.as_ref(), &layout, self.now.naive_local());

        if self.options.verbose {
            log_keep_files(&ctx.manifest);
        }

        if !ctx.manifest.keep.is_empty() {
            let keep = ctx.manifest.keep.clone();
            match processor.process(&BackupScope::Mother, &ctx.repo_root, &keep) {
                Ok(outcome) => report.issues += outcome.failures,
                Err(error) => {
                    warn!("failed to process keep files of mother repository: {error}");
                    report.issues += 1;
                }
            }
        }

        let drafter = IgnoreDrafter::new(&ctx.repo_root);
        for index in 0..ctx.manifest.workspaces.len() {
            let entry = ctx.manifest.workspaces[index].clone();
            let path = ctx.repo_root.join(&entry.path);

            if let Err(error) = self.ensure_present(&entry, &path) {
                warn!("failed to set up workspace {}: {error}", entry.path);
                report.issues += 1;
                continue;
            }

            if let Err(error) = drafter.ignore_workspace(&entry.path) {
                warn!("failed to ignore {} in mother repository: {error}", entry.path);
                report.issues += 1;
            }

            let scope = BackupScope::Workspace(entry.path.clone());
            match processor.process(&scope, &path, &entry.keep) {
                Ok(KeepOutcome {
                    populated,
                    failures,
                    ..
                }) => {
                    if let Some(keep) = populated {
                        ctx.manifest.workspaces[index].keep = keep;
                        manifest_changed = true;
                    }

                    report.issues += failures;
                    if failures == 0 {
                        report.synced += 1;
                    }
                }
                Err(error) => {
                    warn!("failed to process keep files of {}: {error}", entry.path);
                    report.issues += 1;
                }
            }
        }

        if manifest_changed {
            ctx.save_manifest()?;
            report.manifest_saved = true;
        }

        report.archived = self.archive_if_due(ctx);
        info!("{}", report.summary());

        Ok(report)
    }

    async fn discover_into(&self, ctx: &mut SyncContext) -> Result<usize> {
        info!("no workspaces registered, discovering from {:?}", ctx.scan_root.display());

        let mut discoverer = Discoverer::new(self.vcs.clone(), ctx.settings.workers);
        if self.options.progress {
            discoverer = discoverer.with_progress(ProgressBar::new_spinner())?;
        }

        let discovered = discoverer.discover(&ctx.scan_root, &ctx.repo_root).await?;
        let count = discovered.len();
        for entry in discovered {
            ctx.manifest.register(entry)?;
        }

        Ok(count)
    }

    /// Clone missing workspace, or adopt a directory that is not a working
    /// copy yet.
    fn ensure_present(&self, entry: &WorkspaceEntry, path: &Path) -> Result<()> {
        if self.vcs.is_repo(path) {
            return Ok(());
        }

        let branch = entry.branch.as_deref();
        let populated = fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some());
        if populated {
            info!("initializing {} in place from {:?}", entry.path, entry.repo);
            self.vcs.init_in_place(path, &entry.repo, branch)?;
            return Ok(());
        }

        if entry.repo.is_empty() {
            return Err(SyncError::NoRemote {
                workspace: entry.path.clone(),
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SyncError::CreateParent {
                source,
                workspace: entry.path.clone(),
            })?;
        }

        info!("cloning {} into {}", entry.repo, entry.path);
        self.vcs.clone_repo(&entry.repo, path, branch)?;

        Ok(())
    }

    fn archive_if_due(&self, ctx: &SyncContext) -> usize {
        let layout = ctx.layout();
        let sentinel = layout.sentinel_path();
        if !should_run(&sentinel, self.now.into()) {
            debug!("archival ran within the last day");
            return 0;
        }

        let archived = match Archiver::new(layout, self.now.date_naive()).run() {
            Ok(report) => report.archived.len(),
            Err(error) => {
                warn!("backup archival failed: {error}");
                return 0;
            }
        };

        if let Err(error) = mark_run(&sentinel, self.now) {
            warn!("{error}");
        }

        archived
    }

    fn report_integrity(&self, issues: &[IntegrityIssue]) {
        if issues.is_empty() {
            return;
        }

        if self.options.verbose {
            log_issues(issues);
        } else {
            warn!(
                "manifest has {} integrity issue(s), rerun with --verbose for details",
                issues.len()
            );
        }
    }
}

fn log_keep_files(manifest: &Manifest) {
    let scopes = std::iter::once((BackupScope::Mother, &manifest.keep)).chain(
        manifest
            .workspaces
            .iter()
            .map(|entry| (BackupScope::Workspace(entry.path.clone()), &entry.keep)),
    );

    for (scope, keep) in scopes {
        if keep.is_empty() {
            info!("{} has no keep files", scope.label());
        } else {
            info!("keep files of {}: {}", scope.label(), keep.join(", "));
        }
    }
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),

    /// Discovered workspaces conflict with each other.
    #[error(transparent)]
    Register(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Git(#[from] GitError),

    /// Missing workspace has nowhere to be cloned from.
    #[error("workspace {workspace} is missing and has no remote to clone from")]
    NoRemote { workspace: String },

    #[error("failed to create parent directory of workspace {workspace}")]
    CreateParent {
        #[source]
        source: std::io::Error,
        workspace: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
