// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep nested repositories of a mother repository in sync.
//!
//! A __mother repository__ is a Git repository whose top-level holds a
//! `.nestsync.toml` manifest. Beneath it live __workspaces__, i.e.,
//! independently version controlled repositories that the mother repository
//! does not track itself. Nestsync discovers workspaces, clones them where
//! they are missing, and protects their __keep files__, i.e., locally modified
//! tracked files, with timestamped backups and patches.
//!
//! # See Also
//!
//! 1. [Git skip-worktree](https://git-scm.com/docs/git-update-index#_skip_worktree_bit)

pub mod backup;
pub mod config;
pub mod context;
pub mod discover;
pub mod exclude;
pub mod git;
pub mod gitignore;
pub mod integrity;
pub mod keep;
pub mod path;
pub mod status;
pub mod sync;
pub mod workspace;
