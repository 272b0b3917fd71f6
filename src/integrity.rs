// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest integrity validation.
//!
//! Compare the manifest against the file system, and report everything that
//! would make synchronization misbehave. Validation never modifies anything,
//! and never fails as a whole: checks that cannot be performed are skipped.

use crate::{
    config::{is_nested_within, Manifest},
    discover::walk::{walk_candidates, WalkAction},
    exclude::is_excluded,
    git::Vcs,
    path::MANIFEST_FILE_NAME,
};

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, error, instrument, warn};

/// Severity of an integrity issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueLevel {
    /// Synchronization would corrupt or lose data.
    Critical,

    /// Synchronization works, but something is probably wrong.
    Warning,
}

impl Display for IssueLevel {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            IssueLevel::Critical => write!(fmt, "critical"),
            IssueLevel::Warning => write!(fmt, "warning"),
        }
    }
}

/// Category of an integrity issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Workspace holds its own manifest.
    NestedManifest,

    /// Ancestor of the manifest root holds a manifest.
    ParentManifest,

    /// Nested repository missing from the manifest.
    UnregisteredWorkspace,

    /// Workspace remote differs from its manifest entry.
    RemoteMismatch,

    /// Workspace remote is a local file system path.
    LocalPathRepo,

    /// Registered workspace lives inside of a package-manager dependency.
    PackageManagerDependency,

    /// Registered workspace nests inside another registered workspace.
    NestedWorkspace,

    /// Workspace path registered more than once.
    DuplicateWorkspace,
}

/// Problem found during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub level: IssueLevel,
    pub kind: IssueKind,
    pub message: String,

    /// Paths involved, relative to the manifest root where possible.
    pub paths: Vec<PathBuf>,

    /// Suggested remedy.
    pub fix: String,
}

impl Display for IntegrityIssue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "[{}] {} (fix: {})", self.level, self.message, self.fix)
    }
}

/// Validate manifest against the file system.
pub struct IntegrityValidator<'a, V>
where
    V: Vcs + ?Sized,
{
    vcs: &'a V,
    root: &'a Path,
    manifest: &'a Manifest,
}

impl<'a, V> IntegrityValidator<'a, V>
where
    V: Vcs + ?Sized,
{
    /// Construct new validator for manifest rooted at `root`.
    pub fn new(vcs: &'a V, root: &'a Path, manifest: &'a Manifest) -> Self {
        Self {
            vcs,
            root,
            manifest,
        }
    }

    /// Run every check, critical issues first.
    #[instrument(skip(self), level = "debug")]
    pub fn validate(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        issues.extend(self.nested_manifests());
        issues.extend(self.parent_manifests());
        issues.extend(self.duplicate_workspaces());
        issues.extend(self.nested_workspaces());
        issues.extend(self.unregistered_workspaces());
        issues.extend(self.remote_mismatches());
        issues.extend(self.local_path_repos());
        issues.extend(self.package_manager_dependencies());
        issues.sort_by_key(|issue| issue.level);

        debug!("integrity validation found {} issue(s)", issues.len());
        issues
    }

    fn nested_manifests(&self) -> Vec<IntegrityIssue> {
        self.manifest
            .workspaces
            .iter()
            .filter(|entry| self.root.join(&entry.path).join(MANIFEST_FILE_NAME).is_file())
            .map(|entry| IntegrityIssue {
                level: IssueLevel::Critical,
                kind: IssueKind::NestedManifest,
                message: format!("workspace {} has its own {MANIFEST_FILE_NAME}", entry.path),
                paths: vec![Path::new(&entry.path).join(MANIFEST_FILE_NAME)],
                fix: format!("remove {MANIFEST_FILE_NAME} from {}", entry.path),
            })
            .collect()
    }

    fn parent_manifests(&self) -> Vec<IntegrityIssue> {
        self.root
            .ancestors()
            .skip(1)
            .map(|dir| dir.join(MANIFEST_FILE_NAME))
            .filter(|path| path.is_file())
            .map(|path| IntegrityIssue {
                level: IssueLevel::Warning,
                kind: IssueKind::ParentManifest,
                message: format!("another manifest exists above the mother repository at {:?}", path.display()),
                fix: format!("remove {:?} or merge it into this manifest", path.display()),
                paths: vec![path],
            })
            .collect()
    }

    fn duplicate_workspaces(&self) -> Vec<IntegrityIssue> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut issues = Vec::new();
        for entry in &self.manifest.workspaces {
            if !seen.insert(entry.path.as_str()) && reported.insert(entry.path.as_str()) {
                issues.push(IntegrityIssue {
                    level: IssueLevel::Warning,
                    kind: IssueKind::DuplicateWorkspace,
                    message: format!("workspace {} is registered more than once", entry.path),
                    paths: vec![PathBuf::from(&entry.path)],
                    fix: format!("keep a single entry for {}", entry.path),
                });
            }
        }

        issues
    }

    fn nested_workspaces(&self) -> Vec<IntegrityIssue> {
        let workspaces = &self.manifest.workspaces;
        let mut issues = Vec::new();
        for inner in workspaces {
            for outer in workspaces {
                if is_nested_within(&inner.path, &outer.path) {
                    issues.push(IntegrityIssue {
                        level: IssueLevel::Warning,
                        kind: IssueKind::NestedWorkspace,
                        message: format!("workspace {} is nested inside workspace {}", inner.path, outer.path),
                        paths: vec![PathBuf::from(&inner.path), PathBuf::from(&outer.path)],
                        fix: format!("unregister either {} or {}", inner.path, outer.path),
                    });
                }
            }
        }

        issues
    }

    fn unregistered_workspaces(&self) -> Vec<IntegrityIssue> {
        let registered = self
            .manifest
            .workspaces
            .iter()
            .map(|entry| entry.path.as_str())
            .collect::<HashSet<_>>();

        let mut issues = Vec::new();
        walk_candidates(self.root, self.root, |discovery| {
            if !registered.contains(discovery.relative.as_str()) {
                issues.push(IntegrityIssue {
                    level: IssueLevel::Warning,
                    kind: IssueKind::UnregisteredWorkspace,
                    message: format!("repository {} is not registered in the manifest", discovery.relative),
                    fix: format!("register {} or remove its .git directory", discovery.relative),
                    paths: vec![PathBuf::from(discovery.relative)],
                });
            }
            WalkAction::SkipSubtree
        });

        issues
    }

    fn remote_mismatches(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        for entry in &self.manifest.workspaces {
            let path = self.root.join(&entry.path);
            if !self.vcs.is_repo(&path) {
                continue;
            }

            let actual = match self.vcs.remote_url(&path) {
                Ok(Some(actual)) => actual,
                Ok(None) => continue,
                Err(error) => {
                    debug!("cannot query remote of {}: {error}", entry.path);
                    continue;
                }
            };

            if actual != entry.repo {
                issues.push(IntegrityIssue {
                    level: IssueLevel::Warning,
                    kind: IssueKind::RemoteMismatch,
                    message: format!(
                        "workspace {} points to {actual:?}, but the manifest says {:?}",
                        entry.path, entry.repo
                    ),
                    paths: vec![PathBuf::from(&entry.path)],
                    fix: format!("update repo of {} in the manifest, or its remote", entry.path),
                });
            }
        }

        issues
    }

    fn local_path_repos(&self) -> Vec<IntegrityIssue> {
        self.manifest
            .workspaces
            .iter()
            .filter(|entry| entry.has_local_path_repo())
            .map(|entry| IntegrityIssue {
                level: IssueLevel::Warning,
                kind: IssueKind::LocalPathRepo,
                message: format!(
                    "workspace {} uses local path remote {:?}, which will not resolve on other machines",
                    entry.path, entry.repo
                ),
                paths: vec![PathBuf::from(&entry.path)],
                fix: format!("point {} at a network reachable remote", entry.path),
            })
            .collect()
    }

    fn package_manager_dependencies(&self) -> Vec<IntegrityIssue> {
        self.manifest
            .workspaces
            .iter()
            .filter(|entry| is_excluded(self.root, &entry.path))
            .map(|entry| IntegrityIssue {
                level: IssueLevel::Warning,
                kind: IssueKind::PackageManagerDependency,
                message: format!("workspace {} belongs to a package manager", entry.path),
                paths: vec![PathBuf::from(&entry.path)],
                fix: format!("unregister {} and let the package manager own it", entry.path),
            })
            .collect()
    }
}

/// Log every issue at a level matching its severity.
pub fn log_issues(issues: &[IntegrityIssue]) {
    for issue in issues {
        match issue.level {
            IssueLevel::Critical => error!("{issue}"),
            IssueLevel::Warning => warn!("{issue}"),
        }
    }
}
