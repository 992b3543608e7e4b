//! Format converters: in-memory source buffers to Parquet (and JSON sidecars).

pub mod csv;
pub mod encode;
pub mod lvm;
pub mod table;

use bytes::Bytes;

use crate::error::{Error, Result};

pub use csv::csv_to_parquet;
pub use lvm::lvm_to_parquet;

pub const PARQUET_EXTENSION: &str = ".parquet";
pub const JSON_EXTENSION: &str = ".json";

/// Source formats the pipeline knows how to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Lvm,
}

impl SourceFormat {
    /// Route an object by its (case-sensitive) extension.
    pub fn from_object(object: &str) -> Result<Self> {
        if object.ends_with(Self::Csv.extension()) {
            Ok(Self::Csv)
        } else if object.ends_with(Self::Lvm.extension()) {
            Ok(Self::Lvm)
        } else {
            Err(Error::UnsupportedFormat {
                object: object.to_string(),
            })
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => ".csv",
            Self::Lvm => ".lvm",
        }
    }
}

/// One buffer produced from a source object.
#[derive(Debug, Clone)]
pub struct ConvertedOutput {
    pub extension: &'static str,
    pub buffer: Bytes,
}

/// Convert a fully read source buffer into every output it produces.
pub fn convert(format: SourceFormat, buffer: &[u8]) -> Result<Vec<ConvertedOutput>> {
    match format {
        SourceFormat::Csv => Ok(vec![ConvertedOutput {
            extension: PARQUET_EXTENSION,
            buffer: csv_to_parquet(buffer)?,
        }]),
        SourceFormat::Lvm => {
            let (parquet, json) = lvm_to_parquet(buffer)?;
            Ok(vec![
                ConvertedOutput {
                    extension: PARQUET_EXTENSION,
                    buffer: parquet,
                },
                ConvertedOutput {
                    extension: JSON_EXTENSION,
                    buffer: json,
                },
            ])
        }
    }
}

/// Swap the source extension of `object` for `extension`.
pub fn output_object(object: &str, format: SourceFormat, extension: &str) -> String {
    let stem = object
        .strip_suffix(format.extension())
        .unwrap_or(object);
    format!("{stem}{extension}")
}
