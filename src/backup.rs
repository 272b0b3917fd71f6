// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup storage layout.
//!
//! Keep file processing leaves three kinds of artifacts behind in nestsync's
//! data directory, `.nestsync/` under the manifest root:
//!
//! ```text
//! .nestsync/
//! ├── .last-archive-check
//! ├── patches/<workspace>/<file>.patch
//! └── backup/
//!     ├── modified/<category>/<branch>/<YYYY>/<MM>/<DD>/<HHMMSS>/<file>
//!     ├── patched/<category>/<branch>/<YYYY>/<MM>/<DD>/<HHMMSS>/<file>.patch
//!     └── archived/<kind>/<category>/<YYYY>-<MM>-<branch>.tar.gz
//! ```
//!
//! The __category__ is `mother` for the mother repository, and
//! `nested/<workspace>` for workspaces, where the workspace path is encoded
//! into a single component by [`sanitize_component`]. Only the latest patch
//! of each file is kept under `patches/`, while `backup/` accumulates
//! timestamped snapshots until they are archived by month.

pub mod archive;

use chrono::NaiveDateTime;
use std::{
    fs::{copy, create_dir_all, remove_dir_all, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Directory name of the mother repository's latest patches under `patches/`.
pub const MOTHER_PATCH_DIR: &str = ".mother";

/// Kind of snapshot stored under `backup/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Verbatim copies of modified files.
    Modified,

    /// Patches of modified files against HEAD.
    Patched,
}

impl BackupKind {
    /// Every snapshot kind, in archival order.
    pub const ALL: [BackupKind; 2] = [BackupKind::Modified, BackupKind::Patched];

    /// Directory name of the snapshot kind.
    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Modified => "modified",
            BackupKind::Patched => "patched",
        }
    }
}

/// Owner of backed up files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupScope {
    /// The mother repository.
    Mother,

    /// Workspace at given manifest-relative path.
    Workspace(String),
}

impl BackupScope {
    /// Category directory of scope, relative to a snapshot kind directory.
    pub fn category(&self) -> PathBuf {
        match self {
            BackupScope::Mother => PathBuf::from("mother"),
            BackupScope::Workspace(path) => Path::new("nested").join(sanitize_component(path)),
        }
    }

    /// Human readable label for log messages.
    pub fn label(&self) -> &str {
        match self {
            BackupScope::Mother => "mother repository",
            BackupScope::Workspace(path) => path.as_str(),
        }
    }
}

/// Freshly created snapshot directories of one processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDirs {
    pub modified: PathBuf,
    pub patched: PathBuf,
}

/// Resolve paths inside of nestsync's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    data_dir: PathBuf,
}

impl BackupLayout {
    /// Construct new layout rooted at data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backup")
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.data_dir.join("patches")
    }

    /// Path to archive gate sentinel.
    pub fn sentinel_path(&self) -> PathBuf {
        self.data_dir.join(".last-archive-check")
    }

    /// Directory holding latest patches of scope.
    pub fn patch_dir(&self, scope: &BackupScope) -> PathBuf {
        match scope {
            BackupScope::Mother => self.patches_dir().join(MOTHER_PATCH_DIR),
            BackupScope::Workspace(path) => path
                .split('/')
                .filter(|part| !part.is_empty())
                .fold(self.patches_dir(), |dir, part| dir.join(part)),
        }
    }

    /// Remove stale latest patches of scope, leaving an empty directory.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::RemoveDir`] if stale patches cannot be removed.
    /// - Return [`BackupError::CreateDir`] if directory cannot be recreated.
    pub fn reset_patch_dir(&self, scope: &BackupScope) -> Result<PathBuf> {
        let dir = self.patch_dir(scope);
        match remove_dir_all(&dir) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(BackupError::RemoveDir { source, path: dir }),
        }

        create_dir(&dir)?;
        Ok(dir)
    }

    /// Snapshot directory for one kind, scope, branch, and instant.
    pub fn snapshot_dir(
        &self,
        kind: BackupKind,
        scope: &BackupScope,
        branch: &str,
        now: NaiveDateTime,
    ) -> PathBuf {
        self.backup_dir()
            .join(kind.as_str())
            .join(scope.category())
            .join(sanitize_component(branch))
            .join(now.format("%Y").to_string())
            .join(now.format("%m").to_string())
            .join(now.format("%d").to_string())
            .join(now.format("%H%M%S").to_string())
    }

    /// Create both snapshot directories for one processing run.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::CreateDir`] if either directory cannot be
    ///   created.
    pub fn create_snapshot_dirs(
        &self,
        scope: &BackupScope,
        branch: &str,
        now: NaiveDateTime,
    ) -> Result<SnapshotDirs> {
        let dirs = SnapshotDirs {
            modified: self.snapshot_dir(BackupKind::Modified, scope, branch, now),
            patched: self.snapshot_dir(BackupKind::Patched, scope, branch, now),
        };
        create_dir(&dirs.modified)?;
        create_dir(&dirs.patched)?;

        Ok(dirs)
    }

    /// Directory of monthly archives for one kind and category.
    pub fn archive_dir(&self, kind: BackupKind, category: impl AsRef<Path>) -> PathBuf {
        self.backup_dir()
            .join("archived")
            .join(kind.as_str())
            .join(category)
    }
}

/// Make a name safe for use as a single path component.
///
/// Forward slashes become '_', so `packages/lib` reads as `packages_lib`.
/// Every other character that could make two names collide or escape their
/// directory is percent-escaped, i.e., '%', '_', '\\', and the dots of a
/// name made only of dots. Distinct names always map to distinct components.
pub fn sanitize_component(name: impl AsRef<str>) -> String {
    let name = name.as_ref();
    if name.is_empty() {
        return "%".into();
    }

    if name.chars().all(|ch| ch == '.') {
        return "%2E".repeat(name.len());
    }

    let mut sanitized = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '%' => sanitized.push_str("%25"),
            '_' => sanitized.push_str("%5F"),
            '\\' => sanitized.push_str("%5C"),
            '/' => sanitized.push('_'),
            _ => sanitized.push(ch),
        }
    }

    sanitized
}

/// Copy file into directory, keeping its relative path.
///
/// # Errors
///
/// - Return [`BackupError::CreateDir`] if parent directories cannot be
///   created.
/// - Return [`BackupError::Copy`] if file cannot be copied.
pub fn copy_into(source: impl AsRef<Path>, dir: impl AsRef<Path>, relative: &str) -> Result<PathBuf> {
    let destination = dir.as_ref().join(relative);
    if let Some(parent) = destination.parent() {
        create_dir(parent)?;
    }

    copy(source.as_ref(), &destination).map_err(|error| BackupError::Copy {
        source: error,
        from: source.as_ref().to_path_buf(),
        to: destination.clone(),
    })?;

    Ok(destination)
}

/// Write content into directory, keeping its relative path.
///
/// # Errors
///
/// - Return [`BackupError::CreateDir`] if parent directories cannot be
///   created.
/// - Return [`BackupError::Write`] if content cannot be written.
pub fn write_into(dir: impl AsRef<Path>, relative: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
    let destination = dir.as_ref().join(relative);
    if let Some(parent) = destination.parent() {
        create_dir(parent)?;
    }

    write(&destination, content).map_err(|source| BackupError::Write {
        source,
        path: destination.clone(),
    })?;

    Ok(destination)
}

fn create_dir(path: &Path) -> Result<()> {
    create_dir_all(path).map_err(|source| BackupError::CreateDir {
        source,
        path: path.to_path_buf(),
    })
}

/// Backup storage error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to remove directory {:?}", path.display())]
    RemoveDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
