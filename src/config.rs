// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the workspace manifest, and the runtime settings that
//! nestsync resolves from its environment. File I/O for the manifest is left
//! to [`SyncContext`](crate::context::SyncContext).
//!
//! # Manifest Layout
//!
//! The manifest lives at the top-level of the mother repository as
//! `.nestsync.toml`. It lists the mother repository's own keep files and
//! ignore patterns, followed by every registered workspace:
//!
//! ```toml
//! keep = ["config/local.yml"]
//! ignore = ["*.log"]
//!
//! [[workspaces]]
//! path = "packages/lib"
//! repo = "https://example.org/lib.git"
//! branch = "main"
//! keep = ["settings.json"]
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    num::NonZeroUsize,
    path::Path,
    str::FromStr,
    time::Duration,
};

/// Environment variable that overrides the discovery worker count.
pub const WORKERS_ENV: &str = "NESTSYNC_WORKERS";

/// Lowest worker count discovery will ever use.
pub const MIN_WORKERS: usize = 1;

/// Highest worker count discovery will ever use.
pub const MAX_WORKERS: usize = 32;

/// Default timeout for remote fetches done by the status command.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Workspace manifest layout.
///
/// Declares the state that synchronization reconciles the file system
/// against. The manifest is loaded once per invocation, and only ever mutated
/// by the invoking task.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Language tag for user-facing messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Keep files of the mother repository.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keep: Vec<String>,

    /// Ignore patterns applied to the mother repository.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,

    /// Registered workspaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceEntry>,
}

impl Manifest {
    /// Find registered workspace by its path.
    pub fn find(&self, path: impl AsRef<str>) -> Option<&WorkspaceEntry> {
        self.workspaces
            .iter()
            .find(|entry| entry.path == path.as_ref())
    }

    /// Remove registered workspace by its path.
    ///
    /// Return the removed entry, or `None` if nothing was registered there.
    pub fn unregister(&mut self, path: impl AsRef<str>) -> Option<WorkspaceEntry> {
        let index = self
            .workspaces
            .iter()
            .position(|entry| entry.path == path.as_ref())?;
        Some(self.workspaces.remove(index))
    }

    /// Register new workspace entry.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::DuplicateWorkspace`] if the path is already
    ///   registered.
    /// - Return [`ConfigError::NestedWorkspace`] if the path nests, or is
    ///   nested by, an already registered workspace.
    pub fn register(&mut self, entry: WorkspaceEntry) -> Result<()> {
        for existing in &self.workspaces {
            if existing.path == entry.path {
                return Err(ConfigError::DuplicateWorkspace { path: entry.path });
            }

            if is_nested_within(&entry.path, &existing.path)
                || is_nested_within(&existing.path, &entry.path)
            {
                return Err(ConfigError::NestedWorkspace {
                    inner: entry.path,
                    outer: existing.path.clone(),
                });
            }
        }

        self.workspaces.push(entry);
        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Registered workspace.
///
/// A __workspace__ is an independently version controlled directory nested
/// inside of the mother repository.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct WorkspaceEntry {
    /// Path relative to the manifest root, always '/' separated.
    pub path: String,

    /// Remote URL, empty for local-only repositories.
    #[serde(default)]
    pub repo: String,

    /// Branch to checkout instead of the default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Files whose local modifications must survive synchronization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keep: Vec<String>,
}

impl WorkspaceEntry {
    /// Construct new workspace entry without branch or keep files.
    pub fn new(path: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repo: repo.into(),
            branch: None,
            keep: Vec::new(),
        }
    }

    /// Remote is a path on this machine rather than a URL.
    pub fn has_local_path_repo(&self) -> bool {
        is_local_path_url(&self.repo)
    }
}

/// Check if remote URL is a file system path.
///
/// Such remotes will not resolve on any other machine.
pub fn is_local_path_url(url: impl AsRef<str>) -> bool {
    url.as_ref().starts_with('/')
}

/// Check if workspace path is nested strictly inside another workspace path.
///
/// Comparison is done per path component, so "packages/lib2" is not nested in
/// "packages/lib".
pub fn is_nested_within(inner: impl AsRef<str>, outer: impl AsRef<str>) -> bool {
    let inner = Path::new(inner.as_ref());
    let outer = Path::new(outer.as_ref());
    inner != outer && inner.starts_with(outer)
}

/// Number of concurrent discovery workers.
///
/// # Invariant
///
/// - Always within [`MIN_WORKERS`] and [`MAX_WORKERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Construct new worker count clamped into the allowed range.
    pub fn new(workers: usize) -> Self {
        Self(workers.clamp(MIN_WORKERS, MAX_WORKERS))
    }

    /// Resolve worker count from [`WORKERS_ENV`].
    pub fn from_env() -> Self {
        let raw = std::env::var(WORKERS_ENV).ok();
        Self::resolve(raw.as_deref(), available_cpus())
    }

    /// Resolve worker count from raw override value and CPU count.
    ///
    /// A positive integer override wins. Anything else falls back to twice
    /// the CPU count, given that discovery is bound by I/O rather than CPU.
    pub fn resolve(raw: Option<&str>, cpus: usize) -> Self {
        match raw.and_then(|value| value.trim().parse::<i64>().ok()) {
            Some(workers) if workers > 0 => {
                Self::new(usize::try_from(workers).unwrap_or(MAX_WORKERS))
            }
            _ => Self::new(cpus.saturating_mul(2)),
        }
    }

    /// Get raw worker count.
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::resolve(None, available_cpus())
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Runtime settings resolved once per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Worker count for discovery.
    pub workers: WorkerCount,

    /// Timeout of remote fetches.
    pub fetch_timeout: Duration,
}

impl Settings {
    /// Resolve settings from process environment.
    pub fn from_env() -> Self {
        Self {
            workers: WorkerCount::from_env(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: WorkerCount::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize manifest.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize manifest.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Workspace path registered twice.
    #[error("workspace {path:?} is already registered")]
    DuplicateWorkspace { path: String },

    /// Workspace path nests another registered workspace.
    #[error("workspace {inner:?} overlaps registered workspace {outer:?}")]
    NestedWorkspace { inner: String, outer: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
