// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use nestsync::{config::WorkerCount, discover::Discoverer, git::GitCli};
use simple_test_case::test_case;
use std::{fs, sync::Arc};

#[test_case(1; "single worker")]
#[test_case(4; "few workers")]
#[test_case(32; "max workers")]
#[tokio::test]
async fn discover_finds_every_kind_of_workspace(workers: usize) -> Result<()> {
    let root = tempfile::tempdir()?;
    let origin = tempfile::tempdir()?;
    let origin_path = origin.path().to_string_lossy().into_owned();

    let hosted = RepoFixture::new(root.path().join("packages/hosted"))?;
    hosted.add_remote("https://example.org/hosted.git")?;
    hosted.commit_file("config.yml", "remote: true\n")?;
    hosted.modify_file("config.yml", "remote: false\n")?;

    let local = RepoFixture::new(root.path().join("packages/local"))?;
    local.add_remote(&origin_path)?;
    local.commit_file("README.md", "local\n")?;

    let lonely = RepoFixture::new(root.path().join("tools/lonely"))?;
    lonely.commit_file("main.sh", "echo hi\n")?;

    let discovered = Discoverer::new(Arc::new(GitCli::new()), WorkerCount::new(workers))
        .discover(root.path(), root.path())
        .await?;

    let paths = discovered.iter().map(|entry| entry.path.as_str()).collect::<Vec<_>>();
    pretty_assertions::assert_eq!(paths, vec!["packages/hosted", "packages/local", "tools/lonely"]);

    pretty_assertions::assert_eq!(discovered[0].repo, "https://example.org/hosted.git");
    pretty_assertions::assert_eq!(discovered[0].keep, vec!["config.yml".to_string()]);
    pretty_assertions::assert_eq!(discovered[1].repo, origin_path);
    assert!(discovered[1].has_local_path_repo());
    assert!(discovered[1].keep.is_empty());
    pretty_assertions::assert_eq!(discovered[2].repo, "");

    Ok(())
}

#[tokio::test]
async fn discover_skips_package_manager_checkouts() -> Result<()> {
    let root = tempfile::tempdir()?;
    fs::create_dir_all(root.path().join("web"))?;
    fs::write(root.path().join("web/package.json"), "{}\n")?;

    let dependency = RepoFixture::new(root.path().join("web/node_modules/left-pad"))?;
    dependency.commit_file("index.js", "module.exports = 1;\n")?;

    let app = RepoFixture::new(root.path().join("web/app"))?;
    app.commit_file("index.js", "main();\n")?;

    let discovered = Discoverer::new(Arc::new(GitCli::new()), WorkerCount::default())
        .discover(root.path(), root.path())
        .await?;

    let paths = discovered.iter().map(|entry| entry.path.as_str()).collect::<Vec<_>>();
    pretty_assertions::assert_eq!(paths, vec!["web/app"]);

    Ok(())
}

#[tokio::test]
async fn discover_does_not_descend_into_workspaces() -> Result<()> {
    let root = tempfile::tempdir()?;
    let outer = RepoFixture::new(root.path().join("outer"))?;
    outer.commit_file("lib.rs", "\n")?;
    let inner = RepoFixture::new(root.path().join("outer/vendor/inner"))?;
    inner.commit_file("lib.rs", "\n")?;

    let discovered = Discoverer::new(Arc::new(GitCli::new()), WorkerCount::default())
        .discover(root.path(), root.path())
        .await?;

    pretty_assertions::assert_eq!(discovered.len(), 1);
    pretty_assertions::assert_eq!(discovered[0].path, "outer");

    Ok(())
}
