//! LabVIEW measurement (`.lvm`) files.
//!
//! An LVM file carries two header blocks, each closed by a
//! `***End_of_Header***` line, followed by a tab-separated data block whose
//! first line is dropped and whose second line names the columns.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Value};
use tracing::debug;

use crate::convert::{
    encode::{verify_round_trip, write_parquet},
    table::read_delimited,
};
use crate::error::{Error, Result};

pub const HEADER_MARKER: &str = "***End_of_Header***";

/// Convert an LVM buffer into (Parquet table, JSON metadata).
pub fn lvm_to_parquet(buffer: &[u8]) -> Result<(Bytes, Bytes)> {
    let text = std::str::from_utf8(buffer)
        .map_err(|e| Error::parse(format!("lvm is not valid UTF-8: {e}")))?;
    let (header, data) = split_sections(text)?;

    let metadata = parse_metadata(header);
    let table_text = match data.split_once('\n') {
        Some((_, rest)) => rest,
        None => "",
    };
    let table = read_delimited(table_text.as_bytes(), b'\t')?;

    let parquet = write_parquet(&table)?;
    verify_round_trip(&table, &parquet)?;
    let json = metadata_to_json(&metadata)?;

    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        metadata_keys = metadata.len(),
        "lvm converted"
    );
    Ok((parquet, json))
}

/// Split at the second header marker: everything up to and including it is
/// header text, the data block starts one character after it.
fn split_sections(text: &str) -> Result<(&str, &str)> {
    let (start, _) = text
        .match_indices(HEADER_MARKER)
        .nth(1)
        .ok_or_else(|| Error::parse(format!("missing second {HEADER_MARKER} marker")))?;
    let end = start + HEADER_MARKER.len();

    let mut rest = text[end..].chars();
    rest.next();
    Ok((&text[..end], rest.as_str()))
}

/// Collect `key<TAB>value...` lines in first-seen key order.
///
/// One value is kept as a string, several become a list of strings. Lines
/// without a tab and marker lines are ignored. A repeated key keeps its first
/// position and takes the latest value.
pub fn parse_metadata(header: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    for line in header.lines() {
        if line.trim_start().starts_with(HEADER_MARKER) {
            continue;
        }
        let Some((key, rest)) = line.split_once('\t') else {
            continue;
        };

        let mut values: Vec<Value> = rest
            .split('\t')
            .map(|v| Value::String(v.to_string()))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        metadata.insert(key.to_string(), value);
    }
    metadata
}

/// Pretty JSON with four-space indentation.
pub fn metadata_to_json(metadata: &Map<String, Value>) -> Result<Bytes> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    metadata.serialize(&mut serializer)?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::encode::read_parquet;
    use anyhow::Result;
    use arrow::array::{Array, Float64Array, StringArray};
    use arrow::datatypes::DataType;
    use std::collections::HashSet;

    const SAMPLE: &str = "LabVIEW Measurement\t\n\
Writer_Version\t2\n\
Separator\tTab\n\
Date\t2024/01/02\n\
***End_of_Header***\t\n\
\n\
Channels\t2\n\
X\t1\n\
Y\t10\t20\n\
Date\t2024/01/03\n\
no tab on this line\n\
***End_of_Header***\t\n\
X_Value\tVoltage\tCurrent\tComment\n\
0.0\t1.5\t0.25\t\n\
0.1\t1.75\t0.5\t\n";

    #[test]
    fn test_metadata_scalars_and_lists() -> Result<()> {
        let (_, json) = lvm_to_parquet(SAMPLE.as_bytes())?;
        let metadata: Value = serde_json::from_slice(&json)?;

        assert_eq!(metadata["X"], Value::from("1"));
        assert_eq!(metadata["Y"], serde_json::json!(["10", "20"]));
        assert_eq!(metadata["Separator"], Value::from("Tab"));
        assert_eq!(metadata["LabVIEW Measurement"], Value::from(""));
        assert!(metadata.get("no tab on this line").is_none());
        Ok(())
    }

    #[test]
    fn test_metadata_keys_once_in_first_seen_order() {
        let (header, _) = split_sections(SAMPLE).unwrap();
        let metadata = parse_metadata(header);
        let keys: Vec<&str> = metadata.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "LabVIEW Measurement",
                "Writer_Version",
                "Separator",
                "Date",
                "Channels",
                "X",
                "Y"
            ]
        );
        let unique: HashSet<&str> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
        // second header block wins for repeated keys
        assert_eq!(metadata["Date"], Value::from("2024/01/03"));
    }

    #[test]
    fn test_concrete_metadata_block() {
        let metadata = parse_metadata("X\t1\nY\t10\t20\n***End_of_Header***");
        assert_eq!(
            Value::Object(metadata),
            serde_json::json!({"X": "1", "Y": ["10", "20"]})
        );
    }

    #[test]
    fn test_json_is_four_space_indented() -> Result<()> {
        let metadata = parse_metadata("X\t1\n");
        let json = metadata_to_json(&metadata)?;
        assert_eq!(std::str::from_utf8(&json)?, "{\n    \"X\": \"1\"\n}");
        Ok(())
    }

    #[test]
    fn test_data_block_uses_second_line_as_header() -> Result<()> {
        let (parquet, _) = lvm_to_parquet(SAMPLE.as_bytes())?;
        let batch = read_parquet(parquet)?;
        let schema = batch.schema();

        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["X_Value", "Voltage", "Current", "Comment"]);
        assert_eq!(batch.num_rows(), 2);

        let voltage = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(voltage.values().to_vec(), vec![1.5, 1.75]);

        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
        let comment = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(comment.null_count(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_second_marker_fails() {
        let text = "A\t1\n***End_of_Header***\nx\ty\n1\t2\n";
        let err = lvm_to_parquet(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let err = lvm_to_parquet(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_skips_exactly_one_separator() {
        let text = "***End_of_Header***\n***End_of_Header***\tdropped\nkept\n";
        let (header, data) = split_sections(text).unwrap();
        assert!(header.ends_with(HEADER_MARKER));
        assert_eq!(data, "dropped\nkept\n");
    }
}
