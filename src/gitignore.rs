// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Gitignore handling of the mother repository.
//!
//! The mother repository must never track the contents of a workspace, so the
//! `.git` directory of every workspace gets an entry in the mother
//! repository's top-level `.gitignore`. Ignore patterns listed in the manifest
//! land in the same file.
//!
//! Edits append lines that are missing, or drop the entry of a workspace that
//! is no longer registered. Every other line keeps its order, and comments or
//! blank lines stay untouched.

use ignore::gitignore::GitignoreBuilder;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Manage lines of a `.gitignore` file.
#[derive(Clone, Debug)]
pub struct IgnoreDrafter {
    root: PathBuf,
    ignore_path: PathBuf,
}

impl IgnoreDrafter {
    /// Construct new drafter for top-level `.gitignore` of `root`.
    ///
    /// The file is created lazily on first edit.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ignore_path = root.join(".gitignore");
        Self { root, ignore_path }
    }

    /// Edit gitignore lines.
    ///
    /// Read current lines into [`IgnoreEdit`] instance, and let `editor`
    /// modify them before writing the result back. Nothing is written if the
    /// editor changed nothing. Return whether the file changed.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::Read`] if gitignore cannot be read.
    /// - Return [`IgnoreError::Write`] if gitignore cannot be written.
    pub fn edit<E>(&self, editor: E) -> Result<bool>
    where
        E: FnOnce(&mut IgnoreEdit),
    {
        let mut lines = IgnoreEdit::from(self.read()?);
        editor(&mut lines);

        if !lines.changed {
            return Ok(false);
        }

        write(&self.ignore_path, lines.to_string().as_bytes()).map_err(|source| {
            IgnoreError::Write {
                source,
                ignore_path: self.ignore_path.clone(),
            }
        })?;

        Ok(true)
    }

    /// List current gitignore lines.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::Read`] if gitignore cannot be read.
    pub fn current_lines(&self) -> Result<Vec<String>> {
        self.read()
            .map(|content| content.lines().map(str::to_owned).collect())
    }

    /// Check if path relative to root is ignored by current lines.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::Read`] if gitignore cannot be read.
    /// - Return [`IgnoreError::Pattern`] if gitignore holds a bad pattern.
    pub fn is_ignored(&self, relative: impl AsRef<Path>, is_dir: bool) -> Result<bool> {
        let mut builder = GitignoreBuilder::new(&self.root);
        for line in self.current_lines()? {
            builder.add_line(None, &line)?;
        }
        let matcher = builder.build()?;

        Ok(matcher
            .matched_path_or_any_parents(relative.as_ref(), is_dir)
            .is_ignore())
    }

    /// Append every missing ignore pattern.
    ///
    /// All patterns are validated before anything is written. Return number
    /// of patterns appended.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::Pattern`] if any pattern is invalid.
    /// - Return [`IgnoreError::Read`] or [`IgnoreError::Write`] on file
    ///   system failure.
    pub fn apply_patterns(&self, patterns: &[String]) -> Result<usize> {
        for pattern in patterns {
            validate_pattern(pattern)?;
        }

        let mut added = 0;
        self.edit(|lines| added = lines.insert_lines(patterns))?;
        if added > 0 {
            info!("added {added} ignore pattern(s) to {:?}", self.ignore_path.display());
        }

        Ok(added)
    }

    /// Make sure `.git` directory of workspace is ignored.
    ///
    /// Return whether a new entry had to be appended.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::Read`] or [`IgnoreError::Write`] on file
    ///   system failure.
    /// - Return [`IgnoreError::Pattern`] if gitignore holds a bad pattern.
    pub fn ignore_workspace(&self, workspace: &str) -> Result<bool> {
        let gitdir = Path::new(workspace).join(".git");
        if self.is_ignored(&gitdir, true)? {
            debug!("{workspace}/.git already ignored");
            return Ok(false);
        }

        let entry = format!("{}/.git/", workspace.trim_end_matches('/'));
        let changed = self.edit(|lines| {
            lines.insert_line(entry.clone());
        })?;
        if changed {
            info!("ignoring {entry} in mother repository");
        }

        Ok(changed)
    }

    /// Drop `.git` entry of workspace that [`ignore_workspace`] appended.
    ///
    /// Broader rules covering the workspace are left alone. Return whether
    /// the file changed.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::Read`] or [`IgnoreError::Write`] on file
    ///   system failure.
    ///
    /// [`ignore_workspace`]: IgnoreDrafter::ignore_workspace
    pub fn unignore_workspace(&self, workspace: &str) -> Result<bool> {
        let workspace = workspace.trim_end_matches('/');
        let changed = self.edit(|lines| {
            lines.remove_line(format!("{workspace}/.git/"));
            lines.remove_line(format!("{workspace}/.git"));
        })?;
        if changed {
            info!("no longer ignoring {workspace}/.git/ in mother repository");
        }

        Ok(changed)
    }

    fn read(&self) -> Result<String> {
        match read_to_string(&self.ignore_path) {
            Ok(content) => Ok(content),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(IgnoreError::Read {
                source,
                ignore_path: self.ignore_path.clone(),
            }),
        }
    }
}

/// Check that pattern is valid gitignore syntax.
///
/// # Errors
///
/// - Return [`IgnoreError::Pattern`] if pattern does not parse.
pub fn validate_pattern(pattern: impl AsRef<str>) -> Result<()> {
    GitignoreBuilder::new("").add_line(None, pattern.as_ref())?;
    Ok(())
}

/// Gitignore line editor.
///
/// # Invariant
///
/// - Insertion never reorders or removes existing lines.
/// - Removal never reorders the lines it keeps.
/// - Inserted lines are never duplicates of existing lines.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgnoreEdit {
    lines: Vec<String>,
    changed: bool,
}

impl IgnoreEdit {
    /// Append line unless an equal line already exists.
    pub fn insert_line(&mut self, line: impl Into<String>) -> bool {
        let line = line.into();
        let trimmed = line.trim();
        if trimmed.is_empty() || self.lines.iter().any(|existing| existing.trim() == trimmed) {
            return false;
        }

        self.lines.push(trimmed.to_string());
        self.changed = true;
        true
    }

    /// Append each missing line, returning how many were appended.
    pub fn insert_lines(&mut self, lines: impl IntoIterator<Item = impl Into<String>>) -> usize {
        let mut inserted = 0;
        for line in lines {
            if self.insert_line(line) {
                inserted += 1;
            }
        }

        inserted
    }

    /// Drop every line equal to `line`, returning how many were dropped.
    pub fn remove_line(&mut self, line: impl AsRef<str>) -> usize {
        let line = line.as_ref().trim();
        let before = self.lines.len();
        self.lines.retain(|existing| existing.trim() != line);

        let removed = before - self.lines.len();
        self.changed |= removed > 0;
        removed
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

impl Display for IgnoreEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        for line in &self.lines {
            writeln!(fmt, "{line}")?;
        }

        Ok(())
    }
}

impl From<String> for IgnoreEdit {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

impl From<&str> for IgnoreEdit {
    fn from(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_owned).collect(),
            changed: false,
        }
    }
}

/// Gitignore management error types.
#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    #[error("failed to read gitignore at {:?}", ignore_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    #[error("failed to write gitignore at {:?}", ignore_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    /// Pattern is not valid gitignore syntax.
    #[error(transparent)]
    Pattern(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = IgnoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn ignore_edit_appends_missing_lines_only() {
        let mut editor = IgnoreEdit::from(indoc! {r#"
            # build output
            /target

            *.log
        "#});

        assert_eq!(editor.insert_lines(["*.log", "  /target  ", "*.tmp", ""]), 1);
        assert!(editor.is_changed());

        let expect = indoc! {r#"
            # build output
            /target

            *.log
            *.tmp
        "#};
        assert_eq!(editor.to_string(), expect);
    }

    #[test]
    fn untouched_file_is_not_rewritten() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let drafter = IgnoreDrafter::new(root.path());

        assert!(!drafter.edit(|lines| {
            lines.insert_lines(Vec::<String>::new());
        })?);
        assert!(!root.path().join(".gitignore").exists());

        Ok(())
    }

    #[test]
    fn workspace_git_dir_is_ignored_once() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let drafter = IgnoreDrafter::new(root.path());

        assert!(drafter.ignore_workspace("packages/lib")?);
        assert!(!drafter.ignore_workspace("packages/lib")?);
        assert_eq!(drafter.current_lines()?, vec!["packages/lib/.git/"]);
        assert!(drafter.is_ignored("packages/lib/.git", true)?);
        assert!(!drafter.is_ignored("packages/lib/src", true)?);

        Ok(())
    }

    #[test]
    fn unignore_drops_only_the_workspace_entry() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::write(
            root.path().join(".gitignore"),
            indoc! {r#"
                # workspaces
                packages/lib/.git/
                packages/lib2/.git/
                *.log
            "#},
        )?;
        let drafter = IgnoreDrafter::new(root.path());

        assert!(drafter.unignore_workspace("packages/lib/")?);
        assert!(!drafter.unignore_workspace("packages/lib")?);
        assert_eq!(
            drafter.current_lines()?,
            vec!["# workspaces", "packages/lib2/.git/", "*.log"]
        );

        Ok(())
    }

    #[test]
    fn broader_existing_rule_covers_workspace() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::write(root.path().join(".gitignore"), "packages/\n")?;
        let drafter = IgnoreDrafter::new(root.path());

        assert!(!drafter.ignore_workspace("packages/lib")?);
        assert_eq!(drafter.current_lines()?, vec!["packages/"]);

        Ok(())
    }

    #[test]
    fn patterns_are_validated_before_writing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let drafter = IgnoreDrafter::new(root.path());

        let result = drafter.apply_patterns(&["*.log".into(), "bad[".into()]);
        assert!(matches!(result, Err(IgnoreError::Pattern(_))));
        assert!(!root.path().join(".gitignore").exists());

        assert_eq!(drafter.apply_patterns(&["*.log".into(), "*.log".into()])?, 1);
        assert_eq!(drafter.current_lines()?, vec!["*.log"]);

        Ok(())
    }
}
