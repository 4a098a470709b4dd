//! src/services/deployer.rs
//!
//! Deployer: walks the local root depth-first and pushes every regular file
//! to an `ObjectStore`, deleting the existing object before each put.
//! Strictly sequential: one file is finished before the next is looked at,
//! and the first error ends the run.

use crate::{
    errors::{DeployError, DeployResult},
    models::object_key::ObjectKey,
    services::object_store::{ObjectBody, ObjectStore},
};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tokio::fs;
use tracing::{debug, info, warn};

/// Totals for a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeployReport {
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

pub struct Deployer<S> {
    store: S,
    root: PathBuf,
    max_depth: usize,
    /// Receives one `[*] uploading <path>` line per file; stdout by default.
    progress: Mutex<Box<dyn Write + Send>>,
}

/// A path waiting on the work stack, with its depth below the root.
struct Pending {
    path: PathBuf,
    depth: usize,
}

impl<S: ObjectStore> Deployer<S> {
    pub fn new(store: S, root: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            store,
            root: root.into(),
            max_depth,
            progress: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Send progress lines to `writer` instead of stdout.
    pub fn with_progress(mut self, writer: impl Write + Send + 'static) -> Self {
        self.progress = Mutex::new(Box::new(writer));
        self
    }

    /// Deploy the whole tree below the root.
    pub async fn run(&self) -> DeployResult<DeployReport> {
        info!(root = %self.root.display(), "deploying");
        let report = self.traverse(&self.root).await?;
        info!(
            files = report.files,
            bytes = report.bytes,
            skipped = report.skipped,
            "deploy finished"
        );
        Ok(report)
    }

    /// Visit `directory` depth-first in directory-listing order.
    ///
    /// A file is uploaded as soon as it is reached; a subdirectory is fully
    /// processed before its next sibling. Uses an explicit stack. Entries
    /// directly in `directory` are at depth 1; a directory deeper than
    /// `max_depth` is an error.
    pub async fn traverse(&self, directory: &Path) -> DeployResult<DeployReport> {
        let mut report = DeployReport::default();
        let mut stack = Vec::new();
        push_entries(&mut stack, directory, 1).await?;

        while let Some(Pending { path, depth }) = stack.pop() {
            // Follows symlinks, like a plain is-file / is-dir check.
            let meta = fs::metadata(&path).await?;
            if meta.is_file() {
                report.bytes += self.upload(&path).await?;
                report.files += 1;
            } else if meta.is_dir() {
                if depth > self.max_depth {
                    return Err(DeployError::DepthLimitExceeded {
                        path,
                        max_depth: self.max_depth,
                    });
                }
                push_entries(&mut stack, &path, depth + 1).await?;
            } else {
                warn!(path = %path.display(), "skipping entry that is neither file nor directory");
                report.skipped += 1;
            }
        }

        Ok(report)
    }

    /// Replace the remote object for one local file; returns the bytes sent.
    pub async fn upload(&self, path: &Path) -> DeployResult<u64> {
        self.report_progress(path)?;
        let key = ObjectKey::from_path(&self.root, path)?;

        self.store.delete_object(&key).await?;
        let body = ObjectBody::from_file(path).await?;
        let size_bytes = body.size_bytes;
        self.store.put_object(&key, body).await?;

        debug!(%key, size_bytes, "uploaded");
        Ok(size_bytes)
    }

    fn report_progress(&self, path: &Path) -> DeployResult<()> {
        let mut out = self
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "[*] uploading {}", path.display())?;
        out.flush()?;
        Ok(())
    }
}

/// Push the entries of `dir` so they pop off the stack in listing order.
async fn push_entries(stack: &mut Vec<Pending>, dir: &Path, depth: usize) -> DeployResult<()> {
    let mut entries = fs::read_dir(dir).await?;
    let mut listed = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        listed.push(Pending {
            path: entry.path(),
            depth,
        });
    }
    stack.extend(listed.into_iter().rev());
    Ok(())
}
