// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use nestsync::{
    backup::{BackupKind, BackupLayout, BackupScope},
    git::{GitCli, Vcs},
    keep::KeepProcessor,
};
use pretty_assertions::assert_eq;
use std::fs;

fn at(hour: u32, min: u32, sec: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2025, 4, 2)
        .and_then(|date| date.and_hms_opt(hour, min, sec))
        .ok_or_else(|| anyhow::anyhow!("invalid timestamp"))
}

#[test]
fn keep_files_are_snapshotted_and_stay_protected() -> Result<()> {
    let root = tempfile::tempdir()?;
    let repo = RepoFixture::new(root.path().join("lib"))?;
    repo.commit_file("config.yml", "debug: false\n")?;
    repo.commit_file("src/lib.rs", "pub fn lib() {}\n")?;
    repo.modify_file("config.yml", "debug: true\n")?;

    let git = GitCli::new();
    let workspace = repo.path();
    let keep = vec!["config.yml".to_string()];
    git.apply_skip_worktree(&workspace, &keep)?;

    // Protected files are invisible to a plain diff.
    assert!(git.modified_files(&workspace)?.is_empty());

    let layout = BackupLayout::new(root.path().join(".nestsync"));
    let scope = BackupScope::Workspace("lib".into());

    let first = KeepProcessor::new(&git, &layout, at(9, 0, 0)?).process(&scope, &workspace, &keep)?;
    assert_eq!(first.modified, keep);
    assert_eq!(first.backed_up, 1);
    assert_eq!(first.failures, 0);
    assert_eq!(first.populated, None);

    repo.modify_file("config.yml", "debug: true\nverbose: true\n")?;
    let second = KeepProcessor::new(&git, &layout, at(9, 30, 0)?).process(&scope, &workspace, &keep)?;
    assert_eq!(second.backed_up, 1);

    for (time, content) in [(at(9, 0, 0)?, "debug: true\n"), (at(9, 30, 0)?, "debug: true\nverbose: true\n")] {
        let modified = layout.snapshot_dir(BackupKind::Modified, &scope, "main", time);
        assert_eq!(fs::read_to_string(modified.join("config.yml"))?, content);

        let patched = layout.snapshot_dir(BackupKind::Patched, &scope, "main", time);
        assert!(patched.join("config.yml.patch").is_file());
    }

    let latest = fs::read_to_string(layout.patch_dir(&scope).join("config.yml.patch"))?;
    assert!(latest.contains("+verbose: true"));
    assert!(latest.contains("-debug: false"));

    assert_eq!(git.skip_worktree_files(&workspace)?, keep);
    assert_eq!(fs::read_to_string(workspace.join("config.yml"))?, "debug: true\nverbose: true\n");

    Ok(())
}

#[test]
fn empty_keep_list_is_bootstrapped_from_modified_files() -> Result<()> {
    let root = tempfile::tempdir()?;
    let repo = RepoFixture::new(root.path().join("app"))?;
    repo.commit_file(".env", "TOKEN=\n")?;
    repo.commit_file("Makefile", "all:\n")?;
    repo.modify_file(".env", "TOKEN=secret\n")?;

    let git = GitCli::new();
    let layout = BackupLayout::new(root.path().join(".nestsync"));
    let scope = BackupScope::Workspace("app".into());

    let outcome = KeepProcessor::new(&git, &layout, at(12, 0, 0)?).process(&scope, &repo.path(), &[])?;
    assert_eq!(outcome.populated, Some(vec![".env".to_string()]));
    assert_eq!(outcome.backed_up, 1);
    assert!(layout.patch_dir(&scope).join(".env.patch").is_file());

    // Nothing was protected before, so nothing is protected now.
    assert!(git.skip_worktree_files(&repo.path())?.is_empty());

    Ok(())
}
