// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Monthly archival of backup snapshots.
//!
//! Snapshot trees of finished months are packed into one gzip compressed tar
//! archive per kind, category, branch, and month. An archive is only trusted
//! after it has been fully decoded again, and only then are the originals
//! removed. The current month is never touched.
//!
//! Archival is gated by a sentinel file, so it runs at most once per
//! [`ARCHIVE_INTERVAL`].

use crate::backup::{BackupKind, BackupLayout};

use chrono::{DateTime, Local, NaiveDate};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::{
    fs::{self, File},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, info, instrument, warn};

/// Minimum time between two archival passes.
pub const ARCHIVE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Check if archival pass is due.
///
/// Due when the sentinel is missing, unreadable, at least
/// [`ARCHIVE_INTERVAL`] old, or dated in the future.
pub fn should_run(sentinel: impl AsRef<Path>, now: SystemTime) -> bool {
    let Ok(modified) = fs::metadata(sentinel.as_ref()).and_then(|meta| meta.modified()) else {
        return true;
    };

    match now.duration_since(modified) {
        Ok(age) => age >= ARCHIVE_INTERVAL,
        Err(_) => true,
    }
}

/// Record that an archival pass ran at `now`.
///
/// # Errors
///
/// - Return [`ArchiveError::Sentinel`] if sentinel cannot be written.
pub fn mark_run(sentinel: impl AsRef<Path>, now: DateTime<Local>) -> Result<()> {
    let sentinel = sentinel.as_ref();
    let write = || -> io::Result<()> {
        if let Some(parent) = sentinel.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(sentinel, format!("{}\n", now.to_rfc3339()))
    };

    write().map_err(|source| ArchiveError::Sentinel {
        source,
        path: sentinel.to_path_buf(),
    })
}

/// Summary of one archival pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Archives written during the pass.
    pub archived: Vec<PathBuf>,

    /// Month directories left alone for being current.
    pub current: usize,

    /// Month directories left alone because their archive already exists.
    pub existing: usize,
}

/// Monthly snapshot archiver.
#[derive(Debug, Clone)]
pub struct Archiver {
    layout: BackupLayout,
    today: NaiveDate,
}

impl Archiver {
    /// Construct new archiver treating `today` as the current date.
    pub fn new(layout: BackupLayout, today: NaiveDate) -> Self {
        Self { layout, today }
    }

    /// Archive every finished month of every snapshot kind.
    ///
    /// Stops at the first failure. Month directories archived before the
    /// failure stay archived.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Verify`] or [`ArchiveError::Empty`] if a
    ///   freshly written archive does not decode.
    /// - Return any other [`ArchiveError`] on file system failure.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self) -> Result<ArchiveReport> {
        let mut report = ArchiveReport::default();
        for kind in BackupKind::ALL {
            self.archive_kind(kind, &mut report)?;
        }

        if !report.archived.is_empty() {
            info!("archived {} month(s) of backups", report.archived.len());
        }

        Ok(report)
    }

    fn archive_kind(&self, kind: BackupKind, report: &mut ArchiveReport) -> Result<()> {
        let kind_dir = self.layout.backup_dir().join(kind.as_str());
        if !kind_dir.is_dir() {
            return Ok(());
        }

        for category in categories(&kind_dir)? {
            let category_dir = kind_dir.join(&category);
            for branch in subdirs(&category_dir)? {
                let branch_dir = category_dir.join(&branch);
                for year in subdirs(&branch_dir)? {
                    let year_dir = branch_dir.join(&year);
                    for month in subdirs(&year_dir)? {
                        let month_dir = year_dir.join(&month);
                        if !is_year(&year) || !is_month(&month) {
                            warn!("ignoring unexpected backup directory {:?}", month_dir.display());
                            continue;
                        }

                        let target = MonthTarget {
                            kind,
                            kind_dir: &kind_dir,
                            category: &category,
                            branch: &branch,
                            year: &year,
                            month: &month,
                            month_dir: &month_dir,
                        };
                        self.archive_month(&target, report)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn archive_month(&self, target: &MonthTarget<'_>, report: &mut ArchiveReport) -> Result<()> {
        if self.is_current(target.year, target.month) {
            debug!("skipping current month {:?}", target.month_dir.display());
            report.current += 1;
            return Ok(());
        }

        let archive_dir = self.layout.archive_dir(target.kind, target.category);
        // INVARIANT: Branch directory names are already sanitized components.
        let name = format!("{}-{}-{}.tar.gz", target.year, target.month, target.branch);
        let archive = archive_dir.join(&name);
        if archive.exists() {
            info!("archive {:?} already exists, leaving originals alone", archive.display());
            report.existing += 1;
            return Ok(());
        }

        fs::create_dir_all(&archive_dir).map_err(|source| ArchiveError::Write {
            source,
            path: archive_dir.clone(),
        })?;

        let partial = archive_dir.join(format!("{name}.partial"));
        if let Err(error) = write_archive(target.month_dir, &partial) {
            remove_partial(&partial);
            return Err(error);
        }

        match verify_archive(&partial) {
            Ok(entries) => debug!("verified {entries} entries in {:?}", partial.display()),
            Err(error) => {
                remove_partial(&partial);
                return Err(error);
            }
        }

        fs::rename(&partial, &archive).map_err(|source| ArchiveError::Write {
            source,
            path: archive.clone(),
        })?;

        fs::remove_dir_all(target.month_dir).map_err(|source| ArchiveError::RemoveOriginal {
            source,
            path: target.month_dir.to_path_buf(),
        })?;
        prune_empty_parents(target.month_dir, target.kind_dir);

        info!("archived {:?}", archive.display());
        report.archived.push(archive);

        Ok(())
    }

    fn is_current(&self, year: &str, month: &str) -> bool {
        self.today.format("%Y").to_string() == year && self.today.format("%m").to_string() == month
    }
}

struct MonthTarget<'a> {
    kind: BackupKind,
    kind_dir: &'a Path,
    category: &'a Path,
    branch: &'a str,
    year: &'a str,
    month: &'a str,
    month_dir: &'a Path,
}

/// Pack directory tree into gzip compressed tar archive.
///
/// Entries are stored relative to `source_dir`, and symlinks are stored as
/// links. The archive is flushed to disk before returning.
///
/// # Errors
///
/// - Return [`ArchiveError::Write`] if archive cannot be written.
pub fn write_archive(source_dir: impl AsRef<Path>, archive: impl AsRef<Path>) -> Result<()> {
    let archive = archive.as_ref();
    let write_error = |source| ArchiveError::Write {
        source,
        path: archive.to_path_buf(),
    };

    let file = File::create(archive).map_err(write_error)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all("", source_dir.as_ref())
        .map_err(write_error)?;

    let encoder = builder.into_inner().map_err(write_error)?;
    let file = encoder.finish().map_err(write_error)?;
    file.sync_all().map_err(write_error)?;

    Ok(())
}

/// Decode every entry of an archive, returning the entry count.
///
/// # Errors
///
/// - Return [`ArchiveError::Verify`] if archive cannot be decoded.
/// - Return [`ArchiveError::Empty`] if archive holds no entries.
pub fn verify_archive(archive: impl AsRef<Path>) -> Result<usize> {
    let archive = archive.as_ref();
    let verify_error = |source| ArchiveError::Verify {
        source,
        path: archive.to_path_buf(),
    };

    let file = File::open(archive).map_err(verify_error)?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    let mut count = 0;
    for entry in reader.entries().map_err(verify_error)? {
        let mut entry = entry.map_err(verify_error)?;
        io::copy(&mut entry, &mut io::sink()).map_err(verify_error)?;
        count += 1;
    }

    if count == 0 {
        return Err(ArchiveError::Empty {
            path: archive.to_path_buf(),
        });
    }

    Ok(count)
}

/// Categories are `mother` and every `nested/<workspace>` directory.
fn categories(kind_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut categories = Vec::new();
    for name in subdirs(kind_dir)? {
        if name == "nested" {
            for workspace in subdirs(&kind_dir.join("nested"))? {
                categories.push(Path::new("nested").join(workspace));
            }
        } else {
            categories.push(PathBuf::from(name));
        }
    }

    Ok(categories)
}

fn subdirs(dir: &Path) -> Result<Vec<String>> {
    let read_error = |source| ArchiveError::ReadDir {
        source,
        path: dir.to_path_buf(),
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        if entry.file_type().map_err(read_error)?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    Ok(names)
}

/// Remove empty directories from `start` upwards, stopping at `stop`.
fn prune_empty_parents(start: &Path, stop: &Path) {
    let mut current = start.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }

        // INVARIANT: Only empty directories are removed.
        match fs::remove_dir(dir) {
            Ok(()) => current = dir.parent(),
            Err(error) if error.kind() == ErrorKind::NotFound => current = dir.parent(),
            Err(_) => break,
        }
    }
}

fn remove_partial(partial: &Path) {
    if let Err(error) = fs::remove_file(partial) {
        if error.kind() != ErrorKind::NotFound {
            warn!("cannot remove partial archive {:?}: {error}", partial.display());
        }
    }
}

fn is_year(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|byte| byte.is_ascii_digit())
}

fn is_month(name: &str) -> bool {
    name.len() == 2
        && name.bytes().all(|byte| byte.is_ascii_digit())
        && matches!(name.parse::<u8>(), Ok(1..=12))
}

/// Archival error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to read backup directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error("failed to write archive {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Freshly written archive does not decode.
    #[error("archive {:?} failed verification", path.display())]
    Verify {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Freshly written archive decodes to nothing.
    #[error("archive {:?} holds no entries", path.display())]
    Empty { path: PathBuf },

    #[error("failed to remove archived originals at {:?}", path.display())]
    RemoveOriginal {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error("failed to update archive sentinel {:?}", path.display())]
    Sentinel {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{collections::BTreeMap, io::Read};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn seed(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read_archive(path: &Path) -> BTreeMap<String, String> {
        let mut reader = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        let mut files = BTreeMap::new();
        for entry in reader.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            files.insert(name, content);
        }
        files
    }

    #[test]
    fn finished_months_are_archived_and_removed() -> anyhow::Result<()> {
        let data = tempfile::tempdir()?;
        let layout = BackupLayout::new(data.path());
        let backup = layout.backup_dir();
        seed(&backup, "modified/mother/main/2025/01/05/101500/config.yml", "jan");
        seed(&backup, "modified/mother/main/2025/01/20/080000/nested/a.txt", "jan a");
        seed(&backup, "modified/mother/main/2025/03/01/090000/config.yml", "mar");
        seed(
            &backup,
            "patched/nested/packages_lib/feature_x/2025/02/11/120000/app.json.patch",
            "feb patch",
        );

        let report = Archiver::new(layout.clone(), date(2025, 3, 15)).run()?;

        let modified = layout.archive_dir(BackupKind::Modified, "mother").join("2025-01-main.tar.gz");
        let patched = layout
            .archive_dir(BackupKind::Patched, "nested/packages_lib")
            .join("2025-02-feature_x.tar.gz");
        assert_eq!(report.archived, vec![modified.clone(), patched.clone()]);
        assert_eq!(report.current, 1);

        let expect = BTreeMap::from([
            ("05/101500/config.yml".to_string(), "jan".to_string()),
            ("20/080000/nested/a.txt".to_string(), "jan a".to_string()),
        ]);
        assert_eq!(read_archive(&modified), expect);

        let expect = BTreeMap::from([(
            "11/120000/app.json.patch".to_string(),
            "feb patch".to_string(),
        )]);
        assert_eq!(read_archive(&patched), expect);

        assert!(!backup.join("modified/mother/main/2025/01").exists());
        assert!(backup.join("modified/mother/main/2025/03/01/090000/config.yml").is_file());
        assert!(!backup.join("patched/nested/packages_lib").exists());
        assert!(backup.join("patched").is_dir());

        Ok(())
    }

    #[test]
    fn current_month_only_is_left_alone() -> anyhow::Result<()> {
        let data = tempfile::tempdir()?;
        let layout = BackupLayout::new(data.path());
        seed(&layout.backup_dir(), "modified/mother/main/2025/03/01/090000/a", "a");

        let report = Archiver::new(layout.clone(), date(2025, 3, 31)).run()?;
        assert!(report.archived.is_empty());
        assert_eq!(report.current, 1);
        assert!(!layout.backup_dir().join("archived").exists());

        Ok(())
    }

    #[test]
    fn existing_archive_is_never_overwritten() -> anyhow::Result<()> {
        let data = tempfile::tempdir()?;
        let layout = BackupLayout::new(data.path());
        seed(&layout.backup_dir(), "modified/mother/main/2024/12/01/090000/a", "a");
        let archive = layout.archive_dir(BackupKind::Modified, "mother").join("2024-12-main.tar.gz");
        seed(archive.parent().unwrap(), "2024-12-main.tar.gz", "precious");

        let report = Archiver::new(layout.clone(), date(2025, 1, 2)).run()?;
        assert_eq!(report.existing, 1);
        assert_eq!(fs::read_to_string(&archive)?, "precious");
        assert!(layout.backup_dir().join("modified/mother/main/2024/12/01/090000/a").is_file());

        Ok(())
    }

    #[test]
    fn nothing_to_archive_without_backups() -> anyhow::Result<()> {
        let data = tempfile::tempdir()?;
        let report = Archiver::new(BackupLayout::new(data.path()), date(2025, 1, 2)).run()?;
        assert_eq!(report, ArchiveReport::default());

        Ok(())
    }

    #[test]
    fn verify_rejects_garbage_and_empty_archives() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;

        let garbage = work.path().join("garbage.tar.gz");
        fs::write(&garbage, "definitely not gzip")?;
        assert!(matches!(verify_archive(&garbage), Err(ArchiveError::Verify { .. })));

        let empty_dir = work.path().join("empty");
        fs::create_dir_all(&empty_dir)?;
        let empty = work.path().join("empty.tar.gz");
        write_archive(&empty_dir, &empty)?;
        assert!(matches!(verify_archive(&empty), Err(ArchiveError::Empty { .. })));

        Ok(())
    }

    #[test]
    fn verify_counts_every_entry() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        seed(work.path(), "tree/a.txt", "a");
        seed(work.path(), "tree/sub/b.txt", "b");

        let archive = work.path().join("tree.tar.gz");
        write_archive(work.path().join("tree"), &archive)?;
        assert_eq!(verify_archive(&archive)?, 3);

        let expect = BTreeMap::from([
            ("a.txt".to_string(), "a".to_string()),
            ("sub/b.txt".to_string(), "b".to_string()),
        ]);
        assert_eq!(read_archive(&archive), expect);

        Ok(())
    }

    #[test]
    fn sentinel_gate() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let sentinel = work.path().join(".nestsync/.last-archive-check");
        assert!(should_run(&sentinel, SystemTime::now()));

        mark_run(&sentinel, Local::now())?;
        let now = SystemTime::now();
        assert!(!should_run(&sentinel, now));

        let file = File::options().write(true).open(&sentinel)?;
        file.set_modified(now - Duration::from_secs(25 * 60 * 60))?;
        assert!(should_run(&sentinel, now));

        file.set_modified(now - Duration::from_secs(60 * 60))?;
        assert!(!should_run(&sentinel, now));

        file.set_modified(now + Duration::from_secs(60 * 60))?;
        assert!(should_run(&sentinel, now));

        Ok(())
    }
}
