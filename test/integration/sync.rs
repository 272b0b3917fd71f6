// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use chrono::{Local, TimeZone};
use nestsync::{
    config::{Manifest, Settings, WorkspaceEntry},
    context::{load_manifest, SyncContext},
    git::{GitCli, Vcs},
    sync::{SyncOptions, Synchronizer},
};
use pretty_assertions::assert_eq;
use std::{fs, sync::Arc};

#[tokio::test]
async fn sync_clones_and_adopts_workspaces() -> Result<()> {
    let upstream = tempfile::tempdir()?;
    let core = RepoFixture::new(upstream.path().join("core"))?;
    core.commit_file("lib.rs", "pub fn core() {}\n")?;
    let web = RepoFixture::new(upstream.path().join("web"))?;
    web.commit_file("README.md", "upstream\n")?;

    let mother = tempfile::tempdir()?;
    let adopted = mother.path().join("apps/web");
    fs::create_dir_all(&adopted)?;
    fs::write(adopted.join("README.md"), "local edits\n")?;

    let manifest = Manifest {
        workspaces: vec![
            WorkspaceEntry::new("libs/core", core.path().to_string_lossy()),
            WorkspaceEntry::new("apps/web", web.path().to_string_lossy()),
        ],
        ..Default::default()
    };
    let mut ctx = SyncContext::new(mother.path(), mother.path(), manifest, Settings::default());

    let git = Arc::new(GitCli::new());
    let now = Local
        .with_ymd_and_hms(2025, 4, 2, 10, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous timestamp"))?;
    let report = Synchronizer::new(git.clone(), SyncOptions::default(), now)
        .run(&mut ctx)
        .await?;

    assert_eq!(report.issues, 0);
    assert_eq!(report.synced, 2);
    assert!(report.manifest_saved);

    let cloned = mother.path().join("libs/core");
    assert!(git.is_repo(&cloned));
    assert_eq!(fs::read_to_string(cloned.join("lib.rs"))?, "pub fn core() {}\n");

    assert!(git.is_repo(&adopted));
    assert_eq!(fs::read_to_string(adopted.join("README.md"))?, "local edits\n");
    assert_eq!(git.modified_files(&adopted)?, vec!["README.md".to_string()]);

    let saved = load_manifest(mother.path())?;
    assert_eq!(saved.workspaces[0].keep, Vec::<String>::new());
    assert_eq!(saved.workspaces[1].keep, vec!["README.md".to_string()]);

    let gitignore = fs::read_to_string(mother.path().join(".gitignore"))?;
    assert!(gitignore.contains("libs/core/.git/"));
    assert!(gitignore.contains("apps/web/.git/"));

    Ok(())
}

#[tokio::test]
async fn second_sync_leaves_manifest_alone() -> Result<()> {
    let upstream = tempfile::tempdir()?;
    let core = RepoFixture::new(upstream.path().join("core"))?;
    core.commit_file("lib.rs", "pub fn core() {}\n")?;

    let mother = tempfile::tempdir()?;
    let manifest = Manifest {
        workspaces: vec![WorkspaceEntry::new("core", core.path().to_string_lossy())],
        ..Default::default()
    };
    let mut ctx = SyncContext::new(mother.path(), mother.path(), manifest, Settings::default());

    let now = Local
        .with_ymd_and_hms(2025, 4, 2, 10, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous timestamp"))?;
    let sync = Synchronizer::new(Arc::new(GitCli::new()), SyncOptions::default(), now);

    let first = sync.run(&mut ctx).await?;
    assert_eq!(first.issues, 0);
    assert!(!first.manifest_saved);

    let second = sync.run(&mut ctx).await?;
    assert_eq!(second.issues, 0);
    assert_eq!(second.synced, 1);
    assert!(!second.manifest_saved);

    let gitignore = fs::read_to_string(mother.path().join(".gitignore"))?;
    assert_eq!(gitignore.matches("core/.git/").count(), 1);

    Ok(())
}
