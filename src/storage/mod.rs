//! Storage backends the pipeline reads sources from and writes outputs to.
//!
//! Both backends expose the same four operations and the same error
//! mapping: a missing object is [`Error::NotFound`], anything else the
//! backend rejects is [`Error::Backend`].
//!
//! [`Error::NotFound`]: crate::Error::NotFound
//! [`Error::Backend`]: crate::Error::Backend

pub mod local;
pub mod remote;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::progress::Progress;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

/// Identifies one object in a backend: an absolute path for local storage,
/// a key (including prefix) for remote storage.
pub type ObjectRef = String;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Every object under the backend root whose reference ends with
    /// `extension` (case-sensitive), sorted.
    async fn list_filtered(&self, extension: &str) -> Result<Vec<ObjectRef>>;

    /// The complete contents of `object`.
    async fn read(&self, object: &str) -> Result<Bytes>;

    /// Create or replace `object` with `buffer`.
    async fn write(&self, object: &str, buffer: Bytes) -> Result<()>;

    /// Delete `object`. Missing objects are an error.
    async fn remove(&self, object: &str) -> Result<()>;
}

/// Open the backend described by `config`, reporting transfer bytes to `progress`.
pub fn connect(config: &BackendConfig, progress: Arc<dyn Progress>) -> Result<Arc<dyn Storage>> {
    match config {
        BackendConfig::Local { root } => {
            Ok(Arc::new(LocalStorage::new(root)?.with_progress(progress)))
        }
        BackendConfig::Remote(remote) => {
            Ok(Arc::new(RemoteStorage::connect(remote)?.with_progress(progress)))
        }
    }
}
