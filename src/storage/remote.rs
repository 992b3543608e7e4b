//! S3-compatible object store backend.
//!
//! The configured `path` is `bucket/prefix`. Object references are keys
//! inside the bucket, i.e. they include the prefix.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    aws::AmazonS3Builder, path::Path as ObjectPath, Attribute, Attributes, ClientOptions,
    MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOptions, PutOptions, PutPayload,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::convert::{JSON_EXTENSION, PARQUET_EXTENSION};
use crate::error::{Error, Result};
use crate::progress::{NoProgress, Progress};
use crate::storage::{ObjectRef, Storage};

/// Uploads above this size go through multipart upload in parts of this size.
pub const PART_SIZE: usize = 5 * 1024 * 1024;

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct RemoteStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    progress: Arc<dyn Progress>,
}

impl RemoteStorage {
    /// Build an S3 client for `config`. No request is made until first use.
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let (bucket, prefix) = split_bucket_path(&config.path)?;

        let client_options = ClientOptions::new()
            .with_allow_http(!config.secure)
            .with_allow_invalid_certificates(!config.verify_certificates)
            .with_timeout(Duration::from_secs(config.timeout_secs));

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&bucket)
            .with_endpoint(endpoint_url(&config.endpoint, config.secure))
            .with_region(&config.region)
            .with_virtual_hosted_style_request(false)
            .with_client_options(client_options);

        builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key),
            (None, None) => builder.with_skip_signature(true),
            _ => {
                return Err(Error::config(
                    "access_key and secret_key must be set together",
                ))
            }
        };

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("building client for bucket `{bucket}`: {e}")))?;

        info!(
            endpoint = %config.endpoint,
            bucket = %bucket,
            prefix = %prefix,
            "using remote storage"
        );
        Ok(Self::with_store(Arc::new(store), bucket, prefix))
    }

    /// Wrap an existing store, e.g. an in-memory one.
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn location(&self, object: &str) -> Result<ObjectPath> {
        ObjectPath::parse(object).map_err(|e| Error::backend(object, e))
    }

    /// Expected size of `object`. A failed probe falls back to the size
    /// reported with the download itself.
    async fn probe_size(&self, object: &str, location: &ObjectPath) -> Result<Option<u64>> {
        match self.store.head(location).await {
            Ok(meta) => Ok(Some(meta.size as u64)),
            Err(object_store::Error::NotFound { .. }) => Err(Error::not_found(object)),
            Err(e) => {
                warn!(object = %object, error = %e, "size probe failed, using response length");
                Ok(None)
            }
        }
    }

    async fn put_multipart(
        &self,
        object: &str,
        location: &ObjectPath,
        buffer: Bytes,
        attributes: Attributes,
    ) -> Result<()> {
        let opts = PutMultipartOptions {
            attributes,
            ..Default::default()
        };
        let mut upload = self
            .store
            .put_multipart_opts(location, opts)
            .await
            .map_err(|e| store_error(object, e))?;

        let mut offset = 0;
        while offset < buffer.len() {
            let end = (offset + PART_SIZE).min(buffer.len());
            let part = PutPayload::from(buffer.slice(offset..end));
            if let Err(e) = upload.put_part(part).await {
                if let Err(abort) = upload.abort().await {
                    warn!(object = %object, error = %abort, "aborting upload failed");
                }
                return Err(store_error(object, e));
            }
            self.progress.on_bytes((end - offset) as u64);
            offset = end;
        }

        upload
            .complete()
            .await
            .map_err(|e| store_error(object, e))?;
        Ok(())
    }
}

fn store_error(object: &str, err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { .. } => Error::not_found(object),
        other => Error::backend(object, other),
    }
}

/// Split `bucket/prefix` on the first `/`.
pub fn split_bucket_path(path: &str) -> Result<(String, String)> {
    let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
    if bucket.is_empty() {
        return Err(Error::config(format!(
            "remote path `{path}` must start with a bucket name"
        )));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

/// Prepend a scheme unless the endpoint already carries one.
pub fn endpoint_url(endpoint: &str, secure: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

pub fn content_type_for(object: &str) -> &'static str {
    if object.ends_with(PARQUET_EXTENSION) {
        PARQUET_CONTENT_TYPE
    } else if object.ends_with(JSON_EXTENSION) {
        JSON_CONTENT_TYPE
    } else {
        DEFAULT_CONTENT_TYPE
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn list_filtered(&self, extension: &str) -> Result<Vec<ObjectRef>> {
        let prefix = (!self.prefix.is_empty()).then(|| ObjectPath::from(self.prefix.as_str()));
        let listed: Vec<ObjectMeta> = self
            .store
            .list(prefix.as_ref())
            .try_collect()
            .await
            .map_err(|e| store_error(&self.prefix, e))?;

        let mut objects: Vec<ObjectRef> = listed
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.ends_with(extension))
            .collect();
        objects.sort();

        debug!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            count = objects.len(),
            "listed remote objects"
        );
        Ok(objects)
    }

    async fn read(&self, object: &str) -> Result<Bytes> {
        let location = self.location(object)?;
        let probed = self.probe_size(object, &location).await?;

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| store_error(object, e))?;
        let expected = probed.unwrap_or(result.meta.size as u64);

        let mut buffer = Vec::with_capacity(expected as usize);
        let mut stream = result.into_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| store_error(object, e))?
        {
            buffer.extend_from_slice(&chunk);
            self.progress.on_bytes(chunk.len() as u64);
        }

        if buffer.len() as u64 != expected {
            return Err(Error::backend(
                object,
                format!("short read: got {} of {expected} bytes", buffer.len()),
            ));
        }
        Ok(Bytes::from(buffer))
    }

    async fn write(&self, object: &str, buffer: Bytes) -> Result<()> {
        let location = self.location(object)?;
        let attributes = Attributes::from_iter([(Attribute::ContentType, content_type_for(object))]);

        if buffer.len() > PART_SIZE {
            return self
                .put_multipart(object, &location, buffer, attributes)
                .await;
        }

        let size = buffer.len() as u64;
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&location, PutPayload::from(buffer), opts)
            .await
            .map_err(|e| store_error(object, e))?;
        self.progress.on_bytes(size);
        Ok(())
    }

    async fn remove(&self, object: &str) -> Result<()> {
        let location = self.location(object)?;
        // S3 deletes are idempotent; probe so a missing object is reported.
        self.store
            .head(&location)
            .await
            .map_err(|e| store_error(object, e))?;
        self.store
            .delete(&location)
            .await
            .map_err(|e| store_error(object, e))
    }
}
