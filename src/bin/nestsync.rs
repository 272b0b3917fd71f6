// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nestsync::{
    config::Settings,
    context::SyncContext,
    discover::Discoverer,
    git::GitCli,
    integrity::{log_issues, IntegrityValidator},
    status::collect_status,
    sync::{SyncOptions, Synchronizer},
    workspace::{RemoveOptions, WorkspaceManager},
};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use inquire::Confirm;
use std::{env::current_dir, process::exit, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  nestsync [options] <nestsync-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Sync(opts) => run_sync(opts).await,
            Command::Status(opts) => run_status(opts).await,
            Command::Discover(opts) => run_discover(opts).await,
            Command::Add(opts) => run_add(opts),
            Command::Remove(opts) => run_remove(opts),
            Command::Pull(opts) => run_pull(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Synchronize mother repository with its workspaces.
    #[command(override_usage = "nestsync sync [options]")]
    Sync(SyncArgs),

    /// Show status of every registered workspace.
    #[command(override_usage = "nestsync status [options]")]
    Status(StatusArgs),

    /// Scan for workspaces without synchronizing.
    #[command(override_usage = "nestsync discover [options]")]
    Discover(DiscoverArgs),

    /// Clone repository and register it as a workspace.
    #[command(override_usage = "nestsync add [options] <repo> <path>")]
    Add(AddArgs),

    /// Unregister workspace.
    #[command(override_usage = "nestsync remove [options] <path>")]
    Remove(RemoveArgs),

    /// Pull upstream changes into workspaces.
    #[command(override_usage = "nestsync pull [path]")]
    Pull(PullArgs),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncArgs {
    /// Report every integrity issue in detail.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusArgs {
    /// Fetch from remotes before comparing with upstream.
    #[arg(short, long)]
    pub fetch: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DiscoverArgs {
    /// Register discovered workspaces in the manifest.
    #[arg(short, long)]
    pub save: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddArgs {
    /// URL of repository to clone.
    #[arg(value_name = "repo")]
    pub repo: String,

    /// Workspace path relative to the manifest root.
    #[arg(value_name = "path")]
    pub path: String,

    /// Branch to checkout instead of the default branch.
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveArgs {
    /// Workspace path relative to the manifest root.
    #[arg(value_name = "path")]
    pub path: String,

    /// Remove despite uncommitted changes, without asking.
    #[arg(short, long)]
    pub force: bool,

    /// Leave workspace files on disk.
    #[arg(short, long)]
    pub keep_files: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PullArgs {
    /// Only pull workspace at this path.
    #[arg(value_name = "path")]
    pub path: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load_context() -> Result<SyncContext> {
    Ok(SyncContext::load(&current_dir()?, Settings::from_env())?)
}

async fn run_sync(opts: SyncArgs) -> Result<()> {
    let mut ctx = load_context()?;
    let options = SyncOptions {
        verbose: opts.verbose,
        progress: true,
    };

    Synchronizer::new(Arc::new(GitCli::new()), options, Local::now())
        .run(&mut ctx)
        .await?;

    Ok(())
}

async fn run_status(opts: StatusArgs) -> Result<()> {
    let ctx = load_context()?;
    if ctx.manifest.workspaces.is_empty() {
        warn!("no workspaces registered in {:?}", ctx.manifest_path().display());
        return Ok(());
    }

    let git = Arc::new(GitCli::new());
    let issues = IntegrityValidator::new(git.as_ref(), &ctx.repo_root, &ctx.manifest).validate();
    if issues.is_empty() {
        info!("no integrity issues found");
    } else {
        log_issues(&issues);
    }

    for status in collect_status(&ctx, git, opts.fetch).await {
        info!("{status}");
    }

    Ok(())
}

async fn run_discover(opts: DiscoverArgs) -> Result<()> {
    let mut ctx = load_context()?;
    let discovered = Discoverer::new(Arc::new(GitCli::new()), ctx.settings.workers)
        .with_progress(ProgressBar::new_spinner())?
        .discover(&ctx.scan_root, &ctx.repo_root)
        .await?;

    for entry in &discovered {
        let remote = if entry.repo.is_empty() {
            "<local only>"
        } else {
            entry.repo.as_str()
        };
        info!("{} -> {remote}", entry.path);
    }

    if !opts.save {
        return Ok(());
    }

    let mut registered = 0;
    for entry in discovered {
        let path = entry.path.clone();
        match ctx.manifest.register(entry) {
            Ok(()) => registered += 1,
            Err(error) => warn!("skipping {path}: {error}"),
        }
    }

    if registered > 0 {
        ctx.save_manifest()?;
    }
    info!("registered {registered} new workspace(s)");

    Ok(())
}

fn run_add(opts: AddArgs) -> Result<()> {
    let mut ctx = load_context()?;
    WorkspaceManager::new(&GitCli::new()).add(
        &mut ctx,
        &opts.repo,
        &opts.path,
        opts.branch.as_deref(),
    )?;

    Ok(())
}

fn run_remove(opts: RemoveArgs) -> Result<()> {
    let mut ctx = load_context()?;
    let mut options = RemoveOptions {
        force: opts.force,
        keep_files: opts.keep_files,
    };

    if !options.force && !options.keep_files {
        let delete = Confirm::new(&format!("delete files of {}?", opts.path))
            .with_default(false)
            .with_help_message("declining only unregisters the workspace")
            .prompt()?;
        options.keep_files = !delete;
    }

    WorkspaceManager::new(&GitCli::new()).remove(&mut ctx, &opts.path, options)?;

    Ok(())
}

fn run_pull(opts: PullArgs) -> Result<()> {
    let ctx = load_context()?;
    let report = WorkspaceManager::new(&GitCli::new()).pull(&ctx, opts.path.as_deref())?;
    info!(
        "pulled {} workspace(s), {} skipped, {} failed",
        report.updated, report.skipped, report.failed
    );

    Ok(())
}
