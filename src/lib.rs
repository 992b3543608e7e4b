//! Batch conversion of CSV and LabVIEW measurement files to Parquet, on
//! local disk or an S3-compatible object store.

pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod storage;

pub use error::{Error, Result};
