//! Local filesystem backend.
//!
//! Object references are absolute paths under the configured root. A
//! relative reference is resolved against the root; anything resolving
//! outside it is refused.

use async_trait::async_trait;
use bytes::Bytes;
use glob::{glob, Pattern};
use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::progress::{NoProgress, Progress};
use crate::storage::{ObjectRef, Storage};

const CHUNK_SIZE: usize = 64 * 1024;

pub struct LocalStorage {
    root: PathBuf,
    progress: Arc<dyn Progress>,
}

impl LocalStorage {
    /// Open a backend rooted at an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .map_err(|e| Error::config(format!("cannot open root `{}`: {e}", root.display())))?;
        if !root.is_dir() {
            return Err(Error::config(format!(
                "root `{}` is not a directory",
                root.display()
            )));
        }
        info!(root = %root.display(), "using local storage");
        Ok(Self {
            root,
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a reference to a path under the root. References that would
    /// leave the root are rejected.
    fn resolve(&self, object: &str) -> Result<PathBuf> {
        let path = Path::new(object);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(Error::backend(
                object,
                format!("outside storage root `{}`", self.root.display()),
            ));
        }
        Ok(path)
    }
}

fn io_error(object: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::not_found(object)
    } else {
        Error::backend(object, err)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_filtered(&self, extension: &str) -> Result<Vec<ObjectRef>> {
        let pattern = format!(
            "{}/**/*",
            Pattern::escape(&self.root.to_string_lossy())
        );
        let extension = extension.to_string();

        let objects = tokio::task::spawn_blocking(move || -> Result<Vec<ObjectRef>> {
            let entries = glob(&pattern)
                .map_err(|e| Error::config(format!("invalid glob pattern `{pattern}`: {e}")))?;

            let mut objects = Vec::new();
            for entry in entries {
                let path = match entry {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(path = %e.path().display(), error = %e.error(), "cannot read directory entry");
                        continue;
                    }
                };
                if !path.is_file() {
                    continue;
                }
                let object = path.to_string_lossy().into_owned();
                if object.ends_with(&extension) {
                    objects.push(object);
                }
            }
            objects.sort();
            Ok(objects)
        })
        .await??;

        debug!(root = %self.root.display(), count = objects.len(), "listed local objects");
        Ok(objects)
    }

    async fn read(&self, object: &str) -> Result<Bytes> {
        let path = self.resolve(object)?;
        let mut file = File::open(&path).await.map_err(|e| io_error(object, e))?;
        let capacity = match file.metadata().await {
            Ok(meta) => meta.len() as usize,
            Err(_) => 0,
        };

        let mut buffer = Vec::with_capacity(capacity);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut chunk).await.map_err(|e| io_error(object, e))?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            self.progress.on_bytes(n as u64);
        }
        Ok(Bytes::from(buffer))
    }

    async fn write(&self, object: &str, buffer: Bytes) -> Result<()> {
        let path = self.resolve(object)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend(object, e))?;
        }

        let mut file = File::create(&path)
            .await
            .map_err(|e| Error::backend(object, e))?;
        for chunk in buffer.chunks(CHUNK_SIZE) {
            file.write_all(chunk)
                .await
                .map_err(|e| Error::backend(object, e))?;
            self.progress.on_bytes(chunk.len() as u64);
        }
        file.flush().await.map_err(|e| Error::backend(object, e))?;
        file.sync_all().await.map_err(|e| Error::backend(object, e))?;
        Ok(())
    }

    async fn remove(&self, object: &str) -> Result<()> {
        let path = self.resolve(object)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error(object, e))
    }
}
