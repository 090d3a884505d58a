//! Removal of previous build output
//!
//! Roots are removed concurrently, each one as a concurrent walk of its tree. Anything that is
//! already gone, before or during the walk, counts as removed.

use anyhow::{Context, anyhow};
use async_recursion::async_recursion;
use tracing::instrument;

/// Error type for clean operations that preserves what was removed before the failure.
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

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_removed: usize,
    pub symlinks_removed: usize,
    pub directories_removed: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_removed: self.files_removed + other.files_removed,
            symlinks_removed: self.symlinks_removed + other.symlinks_removed,
            directories_removed: self.directories_removed + other.directories_removed,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files removed: {}\n\
            symlinks removed: {}\n\
            directories removed: {}\n",
            self.files_removed, self.symlinks_removed, self.directories_removed
        )
    }
}

fn is_not_found(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::NotFound
}

#[instrument]
#[async_recursion]
async fn remove_tree(path: &std::path::Path) -> Result<Summary, Error> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(error) if is_not_found(&error) => {
            tracing::debug!("already removed");
            return Ok(Summary::default());
        }
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::from(error)
                    .context(format!("failed reading metadata from {:?}", &path)),
                Default::default(),
            ));
        }
    };
    if !metadata.is_dir() {
        tracing::debug!("removing file");
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(error) if is_not_found(&error) => return Ok(Summary::default()),
            Err(error) => {
                return Err(Error::new(
                    anyhow::Error::from(error).context(format!("failed removing {:?}", &path)),
                    Default::default(),
                ));
            }
        }
        return Ok(if metadata.is_symlink() {
            Summary {
                symlinks_removed: 1,
                ..Default::default()
            }
        } else {
            Summary {
                files_removed: 1,
                ..Default::default()
            }
        });
    }
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(error) if is_not_found(&error) => return Ok(Summary::default()),
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::from(error)
                    .context(format!("cannot open directory {:?} for reading", &path)),
                Default::default(),
            ));
        }
    };
    let mut join_set = tokio::task::JoinSet::new();
    let mut success = true;
    let mut summary = Summary::default();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &path))
        .map_err(|err| Error::new(err, summary))?
    {
        let entry_path = entry.path();
        let do_remove = || async move { remove_tree(&entry_path).await };
        join_set.spawn(do_remove());
    }
    while let Some(res) = join_set.join_next().await {
        match res.map_err(|err| Error::new(err.into(), summary))? {
            Ok(entry_summary) => summary = summary + entry_summary,
            Err(error) => {
                tracing::error!("clean: {:?} failed with: {:#}", path, &error);
                summary = summary + error.summary;
                success = false;
            }
        }
    }
    if !success {
        return Err(Error::new(anyhow!("clean: {:?} failed!", &path), summary));
    }
    match tokio::fs::remove_dir(path).await {
        Ok(()) => summary.directories_removed += 1,
        Err(error) if is_not_found(&error) => {}
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::from(error)
                    .context(format!("failed removing directory {:?}", &path)),
                summary,
            ));
        }
    }
    Ok(summary)
}

/// Removes `dir` and everything below it.
///
/// A path that does not exist is already clean. A path that exists but is not a directory is an
/// error, build output roots are always directories.
#[instrument]
pub async fn clean_dir(dir: &std::path::Path) -> Result<Summary, Error> {
    let metadata = match tokio::fs::symlink_metadata(dir).await {
        Ok(metadata) => metadata,
        Err(error) if is_not_found(&error) => {
            tracing::debug!("nothing to clean");
            return Ok(Summary::default());
        }
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::from(error)
                    .context(format!("failed reading metadata from {:?}", &dir)),
                Default::default(),
            ));
        }
    };
    if !metadata.is_dir() {
        return Err(Error::new(
            anyhow!("cannot clean {:?}: not a directory", &dir),
            Default::default(),
        ));
    }
    remove_tree(dir).await
}

/// Drops duplicates and every root that lies inside another root, removing the outer one covers it
fn outermost(dirs: &[std::path::PathBuf]) -> Vec<std::path::PathBuf> {
    let mut dirs = dirs.to_vec();
    // parents sort before their children
    dirs.sort();
    dirs.dedup();
    let mut roots: Vec<std::path::PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if roots.iter().any(|root| dir.starts_with(root)) {
            tracing::debug!("{:?} is removed together with its parent", &dir);
            continue;
        }
        roots.push(dir);
    }
    roots
}

/// Removes all `dirs` concurrently, returns the first error after every removal has finished.
///
/// Repeated and nested roots are fine, each path is removed once.
#[instrument]
pub async fn clean(dirs: &[std::path::PathBuf]) -> Result<Summary, Error> {
    let dirs = outermost(dirs);
    tracing::info!("cleaning {} directories", dirs.len());
    let mut join_set = tokio::task::JoinSet::new();
    for dir in dirs {
        let do_clean = || async move { clean_dir(&dir).await };
        join_set.spawn(do_clean());
    }
    let mut summary = Summary::default();
    let mut first_error = None;
    while let Some(res) = join_set.join_next().await {
        match res.map_err(|err| Error::new(err.into(), summary))? {
            Ok(dir_summary) => summary = summary + dir_summary,
            Err(error) => {
                summary = summary + error.summary;
                if first_error.is_none() {
                    first_error = Some(error.source);
                } else {
                    tracing::error!("{:#}", &error);
                }
            }
        }
    }
    match first_error {
        Some(source) => Err(Error::new(source, summary)),
        None => Ok(summary),
    }
}
