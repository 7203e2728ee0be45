//! Filesystem backing for rendered artifacts.
//!
//! Every artifact lives in a single flat directory under a name of the form
//! `pressroom-<random>.<format>.printout`. Creation is exclusive at the OS
//! level, which is what makes handles unique.

use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    application::store::StorageReclaimer,
    domain::{
        artifact::{Artifact, StorageRef},
        error::DomainError,
        handle::{STORAGE_PREFIX, STORAGE_SUFFIX, handle_from_storage_name, storage_suffix},
    },
};

const RANDOM_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum TempStorageError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to keep artifact at {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Naming(#[from] DomainError),
}

/// Directory holding every artifact of this process.
#[derive(Debug)]
pub struct TempStorage {
    root: PathBuf,
}

impl TempStorage {
    /// Open storage rooted at `root`, creating the directory if necessary.
    pub fn new(root: PathBuf) -> Result<Self, io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty artifact file for the given format suffix.
    pub fn create(&self, file_suffix: &str) -> Result<PendingArtifact, TempStorageError> {
        let suffix = storage_suffix(file_suffix);
        let file = Builder::new()
            .prefix(STORAGE_PREFIX)
            .suffix(&suffix)
            .rand_bytes(RANDOM_LEN)
            .tempfile_in(&self.root)?;

        let storage_name = file
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                DomainError::invariant(format!(
                    "storage path {} has no UTF-8 file name",
                    file.path().display()
                ))
            })?;
        let handle = handle_from_storage_name(storage_name)?;

        debug!(
            target = "pressroom::storage",
            handle = %handle,
            path = %file.path().display(),
            "Created artifact file"
        );

        Ok(PendingArtifact { file, handle })
    }

    /// Open a backing file for streaming, along with its length.
    pub async fn open(&self, storage: &StorageRef) -> Result<(fs::File, u64), io::Error> {
        open_with_length(storage.path()).await
    }

    /// Remove a backing file. Failures are logged and reported as `false`.
    pub fn delete(&self, storage: &StorageRef) -> bool {
        match std::fs::remove_file(storage.path()) {
            Ok(()) => {
                debug!(
                    target = "pressroom::storage",
                    path = %storage.path().display(),
                    "Deleted artifact file"
                );
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(
                    target = "pressroom::storage",
                    path = %storage.path().display(),
                    error = %err,
                    "Failed to delete artifact file"
                );
                false
            }
        }
    }

    /// Delete artifact files left behind by a previous process.
    ///
    /// Only names following the artifact convention are touched.
    pub fn purge_leftovers(&self) -> Result<usize, io::Error> {
        let mut purged = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with(STORAGE_PREFIX) && name.ends_with(STORAGE_SUFFIX)) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }
            if self.delete(&StorageRef::new(entry.path())) {
                purged += 1;
            }
        }

        if purged > 0 {
            info!(
                target = "pressroom::storage",
                purged,
                root = %self.root.display(),
                "Purged leftover artifact files"
            );
        }
        Ok(purged)
    }
}

impl StorageReclaimer for TempStorage {
    fn reclaim(&self, artifact: &Artifact) {
        self.delete(&artifact.storage);
    }
}

/// Artifact file that is being written. Dropping it deletes the file.
#[derive(Debug)]
pub struct PendingArtifact {
    file: NamedTempFile,
    handle: String,
}

impl PendingArtifact {
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Async handle onto the same file for the renderer to write into.
    pub fn writer(&self) -> Result<fs::File, io::Error> {
        let std_file = self.file.as_file().try_clone()?;
        Ok(fs::File::from_std(std_file))
    }

    /// Independent read handle from the start of the file.
    pub async fn reader(&self) -> Result<(fs::File, u64), io::Error> {
        open_with_length(self.path()).await
    }

    /// Delete the file now.
    pub fn discard(self) {
        let path = self.file.path().to_path_buf();
        if let Err(err) = self.file.close() {
            warn!(
                target = "pressroom::storage",
                path = %path.display(),
                error = %err,
                "Failed to discard artifact file"
            );
        }
    }

    /// Keep the file on disk past this value and return its reference.
    pub fn persist(self) -> Result<StorageRef, TempStorageError> {
        let path = self.file.path().to_path_buf();
        let kept = self
            .file
            .into_temp_path()
            .keep()
            .map_err(|err| TempStorageError::Persist {
                path,
                source: err.error,
            })?;
        Ok(StorageRef::new(kept))
    }
}

async fn open_with_length(path: &Path) -> Result<(fs::File, u64), io::Error> {
    let file = fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    Ok((file, length))
}
