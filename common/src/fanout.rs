//! Copying one source selection into many destination roots
//!
//! A fan-out copy enumerates the files selected by a [`CopySpec`] once and writes each of them into
//! every destination, keeping the file's path relative to the copy's base. Writes run as
//! independent tasks and report into a single [`completion::Completion`].

use anyhow::{Context, anyhow};
use async_recursion::async_recursion;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::instrument;

use crate::completion;
use crate::pattern::SourcePattern;

/// Error type for fan-out copies that preserves operation summary even on failure.
///
/// The Display implementation shows the full error chain.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

/// One logical copy: which files to take and which part of their path to keep
#[derive(Debug, Clone)]
pub struct CopySpec {
    pub source_root: std::path::PathBuf,
    pub pattern: SourcePattern,
    /// Matched files are written at their path relative to `base`
    pub base: std::path::PathBuf,
}

impl CopySpec {
    pub fn new(
        source_root: impl Into<std::path::PathBuf>,
        pattern: &str,
        base: impl Into<std::path::PathBuf>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            source_root: source_root.into(),
            pattern: SourcePattern::parse(pattern)?,
            base: base.into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of files open at the same time, None means no limit
    pub max_open_files: Option<Arc<tokio::sync::Semaphore>>,
}

impl Settings {
    /// `None` uses 80% of the process open files limit, `Some(0)` disables the limit
    pub fn with_max_open_files(max_open_files: Option<usize>) -> Self {
        Self {
            max_open_files: max_open_files
                .or_else(system_max_open_files)
                .filter(|&limit| limit > 0)
                .map(|limit| Arc::new(tokio::sync::Semaphore::new(limit))),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_max_open_files(None)
    }
}

fn open_files_budget(soft_limit: u64) -> Option<usize> {
    if soft_limit == nix::sys::resource::RLIM_INFINITY {
        return None;
    }
    let budget = usize::try_from(soft_limit.saturating_mul(8) / 10).unwrap_or(usize::MAX);
    Some(budget.clamp(1, tokio::sync::Semaphore::MAX_PERMITS))
}

/// 80% of the soft `RLIMIT_NOFILE` of this process, None if unlimited or unknown
pub fn system_max_open_files() -> Option<usize> {
    match nix::sys::resource::getrlimit(nix::sys::resource::Resource::RLIMIT_NOFILE) {
        Ok((soft_limit, _)) => open_files_budget(soft_limit),
        Err(error) => {
            tracing::warn!("cannot read the open files limit, not limiting: {error}");
            None
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_matched: usize,
    pub destinations: usize,
    pub files_copied: usize,
    pub bytes_copied: u64,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_matched: self.files_matched + other.files_matched,
            destinations: self.destinations + other.destinations,
            files_copied: self.files_copied + other.files_copied,
            bytes_copied: self.bytes_copied + other.bytes_copied,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files matched: {}\n\
            destinations: {}\n\
            files copied: {}\n\
            bytes copied: {}\n",
            self.files_matched,
            self.destinations,
            self.files_copied,
            bytesize::ByteSize(self.bytes_copied),
        )
    }
}

#[derive(Debug, Default)]
struct Tally {
    files_copied: AtomicUsize,
    bytes_copied: AtomicU64,
}

#[async_recursion]
async fn collect_files(
    root: &std::path::Path,
    dir: &std::path::Path,
    pattern: &SourcePattern,
    files: &mut Vec<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", &dir))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &dir))?
    {
        if !pattern.may_select(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed reading file type of {:?}", &path))?;
        if file_type.is_dir() {
            collect_files(root, &path, pattern, files).await?;
            continue;
        }
        if file_type.is_symlink() {
            // symlinks are copied as the file they point to, linked directories are not descended
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|metadata| metadata.is_file())
                .unwrap_or(false);
            if !is_file {
                tracing::debug!("skipping symlink {:?}", &path);
                continue;
            }
        }
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{:?} is outside of {:?}", &path, &root))?;
        if pattern.matches(relative) {
            files.push(path);
        }
    }
    Ok(())
}

/// Lists the files selected by `spec`, sorted for deterministic processing
#[instrument]
pub async fn matching_files(spec: &CopySpec) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let metadata = tokio::fs::metadata(&spec.source_root)
        .await
        .with_context(|| format!("failed reading metadata from source {:?}", &spec.source_root))?;
    if !metadata.is_dir() {
        return Err(anyhow!(
            "source {:?} is not a directory",
            &spec.source_root
        ));
    }
    let mut files = vec![];
    collect_files(&spec.source_root, &spec.source_root, &spec.pattern, &mut files).await?;
    files.sort();
    Ok(files)
}

async fn copy_one(
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    tally: &Tally,
) -> anyhow::Result<()> {
    let _open_file_permit = match &settings.max_open_files {
        Some(semaphore) => Some(semaphore.acquire().await?),
        None => None,
    };
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create directory {:?}", &parent))?;
    }
    let bytes = tokio::fs::copy(src, dst)
        .await
        .with_context(|| format!("failed copying {:?} to {:?}", &src, &dst))?;
    tally.files_copied.fetch_add(1, Ordering::Relaxed);
    tally.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    Ok(())
}

/// Copies every file selected by `spec` into each of `destinations`.
///
/// Files land at `destination/<path relative to spec.base>`, intermediate directories are created
/// and existing files are overwritten. Resolves once every write has finished, with the first error
/// if any write failed. Nothing is rolled back on failure, so destinations may be left partially
/// written. The source is enumerated before anything is written: a missing source root creates no
/// destination directories.
#[instrument(skip(settings))]
pub async fn copy_fan_out(
    spec: &CopySpec,
    destinations: &[std::path::PathBuf],
    settings: &Settings,
) -> Result<Summary, Error> {
    let files = matching_files(spec)
        .await
        .map_err(|err| Error::new(err, Default::default()))?;
    let mut summary = Summary {
        files_matched: files.len(),
        destinations: destinations.len(),
        ..Default::default()
    };
    tracing::debug!(
        "copying {} files matching {} into {} destinations",
        files.len(),
        &spec.pattern,
        destinations.len()
    );
    let mut relative_paths = Vec::with_capacity(files.len());
    for file in &files {
        let relative = file
            .strip_prefix(&spec.base)
            .with_context(|| format!("{:?} is not inside base {:?}", &file, &spec.base))
            .map_err(|err| Error::new(err, summary))?;
        relative_paths.push(relative.to_path_buf());
    }
    let tally = Arc::new(Tally::default());
    let (notifier, completion) = completion::completion(files.len() * destinations.len());
    for (file, relative) in files.iter().zip(&relative_paths) {
        for destination in destinations {
            let src = file.clone();
            let dst = destination.join(relative);
            let settings = settings.clone();
            let tally = tally.clone();
            let notifier = notifier.clone();
            tokio::spawn(async move {
                match copy_one(&src, &dst, &settings, &tally).await {
                    Ok(()) => notifier.item_done(),
                    Err(error) => notifier.item_failed(error),
                }
            });
        }
    }
    drop(notifier);
    let outcome = completion.wait().await;
    summary.files_copied = tally.files_copied.load(Ordering::Relaxed);
    summary.bytes_copied = tally.bytes_copied.load(Ordering::Relaxed);
    outcome.map_err(|err| Error::new(err, summary))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;
    use tracing_test::traced_test;

    async fn read(path: &std::path::Path) -> String {
        tokio::fs::read_to_string(path).await.unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn copies_every_file_into_every_destination() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let src = tmp_dir.join("src");
        tokio::fs::create_dir_all(src.join("sub")).await?;
        tokio::fs::write(src.join("a.png"), "a").await?;
        tokio::fs::write(src.join("sub").join("b.png"), "b").await?;
        let destinations = vec![tmp_dir.join("d1"), tmp_dir.join("d2")];
        let spec = CopySpec::new(&src, "**/*", &src)?;
        let summary = copy_fan_out(&spec, &destinations, &Settings::default()).await?;
        assert_eq!(
            summary,
            Summary {
                files_matched: 2,
                destinations: 2,
                files_copied: 4,
                bytes_copied: 4,
            }
        );
        for destination in &destinations {
            assert_eq!(read(&destination.join("a.png")).await, "a");
            assert_eq!(read(&destination.join("sub").join("b.png")).await, "b");
        }
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn keeps_path_relative_to_base() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        let out = tmp_dir.join("out");
        let spec = CopySpec::new(foo.join("bar"), "**/*", &tmp_dir)?;
        let summary =
            copy_fan_out(&spec, std::slice::from_ref(&out), &Settings::default()).await?;
        assert_eq!(summary.files_copied, 3);
        for name in ["1.txt", "2.txt", "3.txt"] {
            let copied = out.join("foo").join("bar").join(name);
            assert_eq!(read(&copied).await, read(&foo.join("bar").join(name)).await);
        }
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn files_times_destinations() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        let destinations: Vec<_> = ["en", "de", "fr"]
            .iter()
            .map(|key| tmp_dir.join("out").join(key))
            .collect();
        let spec = CopySpec::new(&foo, "**/*.txt", &foo)?;
        let summary = copy_fan_out(
            &spec,
            &destinations,
            &Settings::with_max_open_files(Some(2)),
        )
        .await?;
        // 0.txt, bar/{1,2,3}.txt, baz/4.txt and the symlinked baz/5.txt
        assert_eq!(summary.files_matched, 6);
        assert_eq!(summary.files_copied, 18);
        for destination in &destinations {
            assert_eq!(read(&destination.join("0.txt")).await, "0");
            assert_eq!(read(&destination.join("baz").join("5.txt")).await, "2");
            let metadata = tokio::fs::symlink_metadata(destination.join("baz").join("5.txt")).await?;
            assert!(metadata.is_file());
        }
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn hidden_entries_are_not_copied() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let src = tmp_dir.join("src");
        tokio::fs::create_dir_all(src.join(".git")).await?;
        tokio::fs::create_dir_all(src.join("images")).await?;
        tokio::fs::write(src.join(".DS_Store"), "finder").await?;
        tokio::fs::write(src.join(".git").join("config"), "[core]").await?;
        tokio::fs::write(src.join("images").join(".gitkeep"), "").await?;
        tokio::fs::write(src.join("images").join("bg.png"), "bg").await?;
        let out = tmp_dir.join("out");
        let spec = CopySpec::new(&src, "**/*", &src)?;
        let summary =
            copy_fan_out(&spec, std::slice::from_ref(&out), &Settings::default()).await?;
        assert_eq!(summary.files_matched, 1);
        assert!(out.join("images").join("bg.png").exists());
        assert!(!out.join(".DS_Store").exists());
        assert!(!out.join(".git").exists());
        assert!(!out.join("images").join(".gitkeep").exists());
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn top_level_pattern_skips_nested_files() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        let out = tmp_dir.join("out");
        let spec = CopySpec::new(&foo, "*.txt", &foo)?;
        let summary =
            copy_fan_out(&spec, std::slice::from_ref(&out), &Settings::default()).await?;
        assert_eq!(summary.files_copied, 1);
        assert!(out.join("0.txt").exists());
        assert!(!out.join("bar").exists());
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn overwrites_existing_files() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        let out = tmp_dir.join("out");
        tokio::fs::create_dir_all(&out).await?;
        tokio::fs::write(out.join("0.txt"), "stale contents").await?;
        let spec = CopySpec::new(&foo, "*.txt", &foo)?;
        copy_fan_out(&spec, std::slice::from_ref(&out), &Settings::default()).await?;
        assert_eq!(read(&out.join("0.txt")).await, "0");
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_source_creates_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let src = tmp_dir.join("missing");
        let destinations = vec![tmp_dir.join("d1"), tmp_dir.join("d2")];
        let spec = CopySpec::new(&src, "**/*", &src)?;
        let error = copy_fan_out(&spec, &destinations, &Settings::default())
            .await
            .expect_err("copying a missing source must fail");
        assert!(format!("{error}").contains("failed reading metadata from source"));
        assert_eq!(error.summary, Summary::default());
        for destination in &destinations {
            assert!(!destination.exists());
        }
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn file_outside_base_fails() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        let out = tmp_dir.join("out");
        let spec = CopySpec::new(&foo, "**/*", foo.join("bar"))?;
        let error = copy_fan_out(&spec, std::slice::from_ref(&out), &Settings::default())
            .await
            .expect_err("base must contain the matched files");
        assert!(format!("{error}").contains("is not inside base"));
        assert!(!out.exists());
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unwritable_destination_fails() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        // a regular file where a destination directory is expected
        let blocked = tmp_dir.join("blocked");
        tokio::fs::write(&blocked, "not a directory").await?;
        let spec = CopySpec::new(foo.join("bar"), "**/*", &foo)?;
        let error = copy_fan_out(
            &spec,
            &[tmp_dir.join("ok"), blocked.clone()],
            &Settings::default(),
        )
        .await
        .expect_err("writing below a file must fail");
        assert!(format!("{error}").contains("cannot create directory"));
        assert_eq!(error.summary.files_matched, 3);
        assert_eq!(read(&blocked).await, "not a directory");
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[test]
    fn open_files_limit() {
        assert!(Settings::with_max_open_files(Some(0)).max_open_files.is_none());
        let explicit = Settings::with_max_open_files(Some(3));
        assert_eq!(
            explicit.max_open_files.map(|sem| sem.available_permits()),
            Some(3)
        );
        assert_eq!(
            Settings::default()
                .max_open_files
                .map(|sem| sem.available_permits()),
            system_max_open_files()
        );
        assert_eq!(open_files_budget(1024), Some(819));
        assert_eq!(open_files_budget(1), Some(1));
        assert_eq!(open_files_budget(nix::sys::resource::RLIM_INFINITY), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn no_destinations_copies_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let foo = tmp_dir.join("foo");
        let spec = CopySpec::new(&foo, "**/*", &foo)?;
        let summary = copy_fan_out(&spec, &[], &Settings::default()).await?;
        assert_eq!(summary.files_matched, 6);
        assert_eq!(summary.files_copied, 0);
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }
}
