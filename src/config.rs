//! Run configuration: which backend to talk to and how to run the batch.
//!
//! Values are resolved once (from a YAML file in the binary, or built
//! directly by a caller) and never change while a batch is running.

use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, path::PathBuf};

use crate::error::{Error, Result};

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Files under a directory on local disk.
    Local { root: PathBuf },
    /// Objects in an S3-compatible store.
    Remote(RemoteConfig),
}

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// `bucket/prefix`; the first `/` separates the bucket from the prefix.
    pub path: String,

    /// Host and port, optionally with a scheme.
    pub endpoint: String,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Use TLS.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Reject invalid TLS certificates.
    #[serde(default = "default_true")]
    pub verify_certificates: bool,

    #[serde(default = "default_region")]
    pub region: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("path", &self.path)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("secure", &self.secure)
            .field("verify_certificates", &self.verify_certificates)
            .field("region", &self.region)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Batch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Source extension to select, including the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delete each source after all of its outputs were written.
    #[serde(default)]
    pub remove_source: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            workers: default_workers(),
            remove_source: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_extension() -> String {
    ".csv".to_string()
}

fn default_workers() -> usize {
    4
}

/// Load and validate a YAML run configuration.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
    load_config_from_str(&text)
}

pub fn load_config_from_str(yaml: &str) -> Result<RunConfig> {
    let config: RunConfig =
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("parsing config: {e}")))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &RunConfig) -> Result<()> {
    match &config.backend {
        BackendConfig::Local { root } => {
            if root.as_os_str().is_empty() {
                return Err(Error::config("backend.root cannot be empty"));
            }
        }
        BackendConfig::Remote(remote) => {
            if remote.endpoint.trim().is_empty() {
                return Err(Error::config("backend.endpoint cannot be empty"));
            }
            if remote.path.split('/').next().unwrap_or("").is_empty() {
                return Err(Error::config("backend.path must start with a bucket name"));
            }
            if remote.access_key.is_some() != remote.secret_key.is_some() {
                return Err(Error::config(
                    "backend.access_key and backend.secret_key must be set together",
                ));
            }
        }
    }

    if config.batch.workers == 0 {
        return Err(Error::config("batch.workers cannot be 0"));
    }
    if !config.batch.extension.starts_with('.') {
        return Err(Error::config(format!(
            "batch.extension {:?} must start with '.'",
            config.batch.extension
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_remote_config_defaults() {
        let config = load_config_from_str(
            r#"
backend:
  kind: remote
  path: measurements/raw/2024
  endpoint: minio.lab:9000
  access_key: lab
  secret_key: hunter2
"#,
        )
        .unwrap();

        let BackendConfig::Remote(remote) = &config.backend else {
            panic!("expected remote backend");
        };
        assert_eq!(remote.path, "measurements/raw/2024");
        assert!(remote.secure);
        assert!(remote.verify_certificates);
        assert_eq!(remote.region, "us-east-1");
        assert_eq!(config.batch, BatchConfig::default());
    }

    #[test]
    fn test_local_config_with_batch() {
        let config = load_config_from_str(
            r#"
backend:
  kind: local
  root: /data/incoming
batch:
  extension: .lvm
  workers: 8
  remove_source: true
"#,
        )
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Local {
                root: PathBuf::from("/data/incoming")
            }
        );
        assert_eq!(config.batch.extension, ".lvm");
        assert_eq!(config.batch.workers, 8);
        assert!(config.batch.remove_source);
    }

    #[test]
    fn test_validation_errors() {
        let zero_workers = "backend:\n  kind: local\n  root: /data\nbatch:\n  workers: 0\n";
        assert!(matches!(
            load_config_from_str(zero_workers),
            Err(Error::Config { .. })
        ));

        let bad_extension = "backend:\n  kind: local\n  root: /data\nbatch:\n  extension: csv\n";
        assert!(load_config_from_str(bad_extension).is_err());

        let no_bucket = "backend:\n  kind: remote\n  path: /raw\n  endpoint: s3.local\n";
        assert!(load_config_from_str(no_bucket).is_err());

        let half_credentials =
            "backend:\n  kind: remote\n  path: b\n  endpoint: s3.local\n  access_key: a\n";
        assert!(load_config_from_str(half_credentials).is_err());

        let unknown_kind = "backend:\n  kind: ftp\n  root: /data\n";
        assert!(load_config_from_str(unknown_kind).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let remote = RemoteConfig {
            path: "b".to_string(),
            endpoint: "s3.local".to_string(),
            access_key: Some("id".to_string()),
            secret_key: Some("hunter2".to_string()),
            secure: true,
            verify_certificates: true,
            region: default_region(),
            timeout_secs: default_timeout_secs(),
        };
        let printed = format!("{remote:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "backend:\n  kind: local\n  root: /srv/files").unwrap();
        let config = load_config(file.path()).unwrap();
        assert!(matches!(config.backend, BackendConfig::Local { .. }));

        let err = load_config(Path::new("/nonexistent/parquetizer.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
