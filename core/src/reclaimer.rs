//! Deletion of image files no recipe refers to anymore.
//!
//! All managed images live in one flat directory and are compared by file
//! name only, so the directory is never walked recursively.

use std::{
    collections::HashSet,
    convert::Infallible,
    io,
    path::{Path, PathBuf},
};

use recipe_api::{DeletionResult, FileFailure, Recipe};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    images::{is_managed_image, reference_file_name},
    scheduler::{WorkOutcome, Worker},
};

/// The only part of a record the reclaimer looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub id: i64,
    pub image_path: Option<String>,
}

/// One-shot snapshot of every record's image reference.
pub trait RecordSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_all_once(&self) -> Result<Vec<ImageReference>, Self::Error>;
}

impl RecordSource for [Recipe] {
    type Error = Infallible;

    fn fetch_all_once(&self) -> Result<Vec<ImageReference>, Self::Error> {
        Ok(self
            .iter()
            .map(|r| ImageReference {
                id: r.id,
                image_path: r.image_path.clone(),
            })
            .collect())
    }
}

impl RecordSource for Vec<Recipe> {
    type Error = Infallible;

    fn fetch_all_once(&self) -> Result<Vec<ImageReference>, Self::Error> {
        self.as_slice().fetch_all_once()
    }
}

/// A flat directory holding image files.
pub trait ImageDir {
    fn location(&self) -> &Path;

    /// Names of the regular files currently in the directory.
    fn list(&self) -> io::Result<Vec<String>>;

    fn remove(&self, name: &str) -> io::Result<()>;
}

/// [`ImageDir`] backed by a real directory.
#[derive(Debug, Clone)]
pub struct LocalImageDir {
    path: PathBuf,
}

impl LocalImageDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageDir for LocalImageDir {
    fn location(&self) -> &Path {
        &self.path
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            // nothing has been imported yet
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        std::fs::remove_file(self.path.join(name))
    }
}

#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("record store unavailable: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("cannot list image directory {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File names referenced by at least one record.
pub fn reference_set(references: &[ImageReference]) -> HashSet<String> {
    references
        .iter()
        .filter_map(|r| r.image_path.as_deref())
        .filter_map(reference_file_name)
        .map(str::to_owned)
        .collect()
}

/// Delete every managed image in `dir` that no record references.
///
/// Per-file deletion failures are collected in the result and never stop
/// the pass.
pub fn reclaim<S, D>(records: &S, dir: &D) -> Result<DeletionResult, ReclaimError>
where
    S: RecordSource + ?Sized,
    D: ImageDir + ?Sized,
{
    let references = records
        .fetch_all_once()
        .map_err(|e| ReclaimError::Store(Box::new(e)))?;
    let in_use = reference_set(&references);
    info!(references = in_use.len(), "found images in use by recipes");

    let mut candidates: Vec<String> = dir
        .list()
        .map_err(|source| ReclaimError::ListDir {
            path: dir.location().to_path_buf(),
            source,
        })?
        .into_iter()
        .filter(|name| is_managed_image(name))
        .collect();
    candidates.sort();
    info!(
        files = candidates.len(),
        dir = %dir.location().display(),
        "found image files in storage"
    );

    let mut result = DeletionResult {
        inspected: candidates.len(),
        ..Default::default()
    };
    for name in candidates {
        if in_use.contains(&name) {
            debug!(file = %name, "keeping image in use");
            result.retained += 1;
            continue;
        }
        match dir.remove(&name) {
            Ok(()) => {
                info!(file = %name, "deleted unused image");
                result.deleted += 1;
            }
            Err(err) => {
                warn!(file = %name, "failed to delete unused image: {err}");
                result.failures.push(FileFailure {
                    file_name: name,
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        inspected = result.inspected,
        deleted = result.deleted,
        retained = result.retained,
        failed = result.failed(),
        "image cleanup complete"
    );
    Ok(result)
}

/// Background unit of work pairing a record source with an image directory.
pub struct Reclaimer<S, D> {
    records: S,
    dir: D,
}

impl<S, D> Reclaimer<S, D>
where
    S: RecordSource,
    D: ImageDir,
{
    pub fn new(records: S, dir: D) -> Self {
        Self { records, dir }
    }

    /// Run a single pass now.
    pub fn run(&self) -> Result<DeletionResult, ReclaimError> {
        reclaim(&self.records, &self.dir)
    }
}

impl<S, D> Worker for Reclaimer<S, D>
where
    S: RecordSource + Send + Sync + 'static,
    D: ImageDir + Send + Sync + 'static,
{
    /// Every top-level fault is retried; the next pass recomputes
    /// everything from scratch.
    fn do_work(&self) -> WorkOutcome {
        match self.run() {
            Ok(_) => WorkOutcome::Success,
            Err(err) => {
                error!("error during image cleanup: {err}");
                WorkOutcome::Retry
            }
        }
    }
}
