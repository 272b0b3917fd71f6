// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Invocation context.
//!
//! Everything a command needs is resolved once up front and carried around in
//! a [`SyncContext`], so that no operation has to consult global state.

use crate::{
    backup::BackupLayout,
    config::{ConfigError, Manifest, Settings},
    path::{find_manifest_root, find_repo_root, PathError, DATA_DIR_NAME, MANIFEST_FILE_NAME},
};

use std::{
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Resolved state of one nestsync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    /// Manifest root, i.e., top-level of the mother repository.
    pub repo_root: PathBuf,

    /// Directory discovery starts from.
    pub scan_root: PathBuf,

    pub manifest: Manifest,
    pub settings: Settings,
}

impl SyncContext {
    /// Resolve context from working directory.
    ///
    /// The manifest root is the nearest directory at or above
    /// `current_dir` holding a manifest. Without any manifest, the top-level
    /// of the enclosing Git repository is used with an empty manifest. When
    /// invoked from a subdirectory of the manifest root, discovery is limited
    /// to that subdirectory.
    ///
    /// # Errors
    ///
    /// - Return [`ContextError::CurrentDir`] if working directory cannot be
    ///   resolved.
    /// - Return [`ContextError::Path`] if no manifest or repository encloses
    ///   working directory.
    /// - Return [`ContextError::Read`] or [`ContextError::Config`] if
    ///   manifest exists but cannot be loaded.
    #[instrument(skip(settings), level = "debug")]
    pub fn load(current_dir: &Path, settings: Settings) -> Result<Self> {
        let current_dir = canonical(current_dir)?;
        let (repo_root, scan_root) = match find_manifest_root(&current_dir) {
            Some(root) => (root, current_dir),
            None => {
                let root = canonical(&find_repo_root(&current_dir)?)?;
                (root.clone(), root)
            }
        };

        debug!("manifest root {:?}, scan root {:?}", repo_root.display(), scan_root.display());
        let manifest = load_manifest(&repo_root)?;

        Ok(Self::new(repo_root, scan_root, manifest, settings))
    }

    /// Construct context from already resolved parts.
    pub fn new(
        repo_root: impl Into<PathBuf>,
        scan_root: impl Into<PathBuf>,
        manifest: Manifest,
        settings: Settings,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            scan_root: scan_root.into(),
            manifest,
            settings,
        }
    }

    /// Path to manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.repo_root.join(MANIFEST_FILE_NAME)
    }

    /// Layout of nestsync's data directory.
    pub fn layout(&self) -> BackupLayout {
        BackupLayout::new(self.repo_root.join(DATA_DIR_NAME))
    }

    /// Persist manifest to disk.
    ///
    /// # Errors
    ///
    /// - Return [`ContextError::Write`] if manifest cannot be written.
    pub fn save_manifest(&self) -> Result<()> {
        save_manifest(&self.repo_root, &self.manifest)
    }
}

/// Load manifest from manifest root.
///
/// A missing manifest is an empty manifest.
///
/// # Errors
///
/// - Return [`ContextError::Read`] if manifest cannot be read.
/// - Return [`ContextError::Config`] if manifest cannot be parsed.
pub fn load_manifest(root: impl AsRef<Path>) -> Result<Manifest> {
    let path = root.as_ref().join(MANIFEST_FILE_NAME);
    match read_to_string(&path) {
        Ok(content) => content.parse().map_err(|source| ContextError::Config {
            source,
            manifest_path: path,
        }),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(Manifest::default()),
        Err(source) => Err(ContextError::Read {
            source,
            manifest_path: path,
        }),
    }
}

/// Write manifest into manifest root.
///
/// # Errors
///
/// - Return [`ContextError::Write`] if manifest cannot be written.
pub fn save_manifest(root: impl AsRef<Path>, manifest: &Manifest) -> Result<()> {
    let path = root.as_ref().join(MANIFEST_FILE_NAME);
    write(&path, manifest.to_string()).map_err(|source| ContextError::Write {
        source,
        manifest_path: path.clone(),
    })?;
    info!("saved manifest {:?}", path.display());

    Ok(())
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|source| ContextError::CurrentDir {
        source,
        path: path.to_path_buf(),
    })
}

/// Context resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("cannot resolve directory {:?}", path.display())]
    CurrentDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("failed to read manifest at {:?}", manifest_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    #[error("failed to write manifest at {:?}", manifest_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    /// Manifest exists, but is corrupt.
    #[error("manifest at {:?} is invalid", manifest_path.display())]
    Config {
        #[source]
        source: ConfigError,
        manifest_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ContextError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceEntry;
    use git2::Repository;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn load_from_manifest_subdirectory() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let root_path = root.path().canonicalize()?;
        fs::create_dir_all(root_path.join("packages"))?;
        fs::write(
            root_path.join(MANIFEST_FILE_NAME),
            "[[workspaces]]\npath = \"packages/lib\"\nrepo = \"\"\n",
        )?;

        let context = SyncContext::load(&root_path.join("packages"), Settings::default())?;
        assert_eq!(context.repo_root, root_path);
        assert_eq!(context.scan_root, root_path.join("packages"));
        assert_eq!(context.manifest.workspaces, vec![WorkspaceEntry::new("packages/lib", "")]);

        Ok(())
    }

    #[test]
    fn load_without_manifest_uses_repository_root() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let root_path = root.path().canonicalize()?;
        Repository::init(&root_path)?;
        fs::create_dir_all(root_path.join("src"))?;

        let context = SyncContext::load(&root_path.join("src"), Settings::default())?;
        assert_eq!(context.repo_root, root_path);
        assert_eq!(context.scan_root, root_path);
        assert_eq!(context.manifest, Manifest::default());

        Ok(())
    }

    #[test]
    fn corrupt_manifest_is_fatal() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::write(root.path().join(MANIFEST_FILE_NAME), "workspaces = [[[")?;

        let result = SyncContext::load(root.path(), Settings::default());
        assert!(matches!(result, Err(ContextError::Config { .. })));

        Ok(())
    }

    #[test]
    fn save_then_load_manifest() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let manifest = Manifest {
            keep: vec!["local.env".into()],
            workspaces: vec![WorkspaceEntry::new("apps/web", "https://example.org/web.git")],
            ..Default::default()
        };

        save_manifest(root.path(), &manifest)?;
        assert_eq!(load_manifest(root.path())?, manifest);

        Ok(())
    }
}
