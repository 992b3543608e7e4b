//! Error types shared by the converters, the storage backends and the pipeline.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while converting or moving a single object.
#[derive(Debug, Error)]
pub enum Error {
    /// Input could not be parsed as a table or metadata block.
    #[error("Failed to parse input: {reason}")]
    Parse { reason: String },

    /// The freshly written Parquet did not decode back to the source table.
    #[error("Parquet verification failed: {reason}")]
    Verification { reason: String },

    /// Object does not exist in the backend.
    #[error("Object not found: {object}")]
    NotFound { object: String },

    /// Transport or permission failure inside a backend.
    #[error("Storage backend error on {object}")]
    Backend {
        object: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No converter is registered for the object's extension.
    #[error("Unsupported format: {object}")]
    UnsupportedFormat { object: String },

    /// Backend or batch configuration is unusable.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking conversion task panicked or was aborted.
    #[error("Conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn verification(reason: impl Into<String>) -> Self {
        Self::Verification {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    /// Wraps a transport error raised while handling `object`.
    pub fn backend(
        object: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            object: object.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The error and all of its sources joined with `: `.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
