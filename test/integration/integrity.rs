// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use nestsync::{
    config::{Manifest, WorkspaceEntry},
    git::GitCli,
    integrity::{IntegrityValidator, IssueKind, IssueLevel},
    path::MANIFEST_FILE_NAME,
};
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn local_path_remote_is_reported_apart_from_unregistered() -> Result<()> {
    let root = tempfile::tempdir()?;
    let origin = tempfile::tempdir()?;
    let origin_path = origin.path().to_string_lossy().into_owned();

    let local = RepoFixture::new(root.path().join("packages/local"))?;
    local.add_remote(&origin_path)?;
    local.commit_file("README.md", "local\n")?;

    let stray = RepoFixture::new(root.path().join("scratch"))?;
    stray.commit_file("notes.txt", "todo\n")?;

    let manifest = Manifest {
        workspaces: vec![WorkspaceEntry::new("packages/local", origin_path)],
        ..Default::default()
    };

    let git = GitCli::new();
    let issues = IntegrityValidator::new(&git, root.path(), &manifest).validate();
    let kinds = issues.iter().map(|issue| issue.kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![IssueKind::UnregisteredWorkspace, IssueKind::LocalPathRepo]);
    assert!(issues.iter().all(|issue| issue.level == IssueLevel::Warning));
    assert!(issues[0].message.contains("scratch"));
    assert!(issues[1].message.contains("packages/local"));

    Ok(())
}

#[test]
fn nested_manifest_is_critical() -> Result<()> {
    let root = tempfile::tempdir()?;
    let lib = RepoFixture::new(root.path().join("lib"))?;
    lib.add_remote("https://example.org/lib.git")?;
    lib.commit_file("lib.rs", "\n")?;
    fs::write(lib.path().join(MANIFEST_FILE_NAME), "workspaces = []\n")?;

    let manifest = Manifest {
        workspaces: vec![WorkspaceEntry::new("lib", "https://example.org/other.git")],
        ..Default::default()
    };

    let git = GitCli::new();
    let issues = IntegrityValidator::new(&git, root.path(), &manifest).validate();
    let kinds = issues.iter().map(|issue| issue.kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![IssueKind::NestedManifest, IssueKind::RemoteMismatch]);
    assert_eq!(issues[0].level, IssueLevel::Critical);

    Ok(())
}
