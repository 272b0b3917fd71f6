// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the manifest root is, and how paths beneath it are spelled
//! inside of the manifest.

use git2::Repository;
use std::path::{Component, Path, PathBuf};

/// File name of the workspace manifest.
pub const MANIFEST_FILE_NAME: &str = ".nestsync.toml";

/// Directory name of nestsync's private data under the manifest root.
pub const DATA_DIR_NAME: &str = ".nestsync";

/// Find nearest directory at or above `start` that holds a manifest.
///
/// Does not check if the manifest is actually parseable.
pub fn find_manifest_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    start
        .as_ref()
        .ancestors()
        .find(|dir| dir.join(MANIFEST_FILE_NAME).is_file())
        .map(Path::to_path_buf)
}

/// Find top-level of the Git repository enclosing `start`.
///
/// # Errors
///
/// - Return [`PathError::NoRepository`] if no repository encloses `start`.
/// - Return [`PathError::BareRepository`] if enclosing repository has no work
///   tree.
pub fn find_repo_root(start: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start.as_ref();
    let repo = Repository::discover(start).map_err(|source| PathError::NoRepository {
        source,
        start: start.to_path_buf(),
    })?;

    repo.workdir()
        .map(Path::to_path_buf)
        .ok_or_else(|| PathError::BareRepository {
            gitdir: repo.path().to_path_buf(),
        })
}

/// Spell `path` relative to `root` using '/' separators.
///
/// Return `None` if `path` is not beneath `root`. Return an empty string when
/// both are the same directory.
pub fn relative_slash_path(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<String> {
    let relative = path.as_ref().strip_prefix(root.as_ref()).ok()?;
    let parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>();

    Some(parts.join("/"))
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No Git repository encloses starting directory.
    #[error("no git repository found at or above {:?}", start.display())]
    NoRepository {
        #[source]
        source: git2::Error,
        start: PathBuf,
    },

    /// Enclosing repository is bare.
    #[error("repository {:?} has no work tree", gitdir.display())]
    BareRepository { gitdir: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn manifest_root_is_nearest_ancestor() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let nested = root.path().join("apps").join("web");
        fs::create_dir_all(&nested)?;
        fs::write(root.path().join(MANIFEST_FILE_NAME), "")?;

        assert_eq!(find_manifest_root(&nested), Some(root.path().to_path_buf()));

        fs::write(root.path().join("apps").join(MANIFEST_FILE_NAME), "")?;
        assert_eq!(find_manifest_root(&nested), Some(root.path().join("apps")));

        Ok(())
    }

    #[test]
    fn repo_root_from_subdirectory() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        Repository::init(root.path())?;
        let nested = root.path().join("src");
        fs::create_dir_all(&nested)?;

        let result = find_repo_root(&nested)?.canonicalize()?;
        assert_eq!(result, root.path().canonicalize()?);

        Ok(())
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/work/mother");
        assert_eq!(
            relative_slash_path(root, root.join("packages").join("lib")),
            Some("packages/lib".into())
        );
        assert_eq!(relative_slash_path(root, root), Some(String::new()));
        assert_eq!(relative_slash_path(root, "/elsewhere"), None);
    }
}
