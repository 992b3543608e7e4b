use arrow::{
    array::{Array, ArrayRef},
    compute::{concat_batches, kernels::cmp::not_distinct},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{Compression, GzipLevel},
    errors::ParquetError,
    file::properties::WriterProperties,
};

use crate::error::{Error, Result};

/// Serialize a batch into an in-memory gzip-compressed Parquet file.
pub fn write_parquet(batch: &RecordBatch) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(Compression::GZIP(GzipLevel::default()))
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    Ok(Bytes::from(buffer))
}

/// Decode a whole Parquet buffer back into one batch.
pub fn read_parquet(parquet: Bytes) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(parquet)?;
    let schema = builder.schema().clone();
    let batches = builder
        .build()?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ParquetError::ArrowError(e.to_string()))?;

    concat_batches(&schema, &batches)
        .map_err(|e| Error::Parquet(ParquetError::ArrowError(e.to_string())))
}

/// Decode `parquet` and require it to match `expected` exactly.
pub fn verify_round_trip(expected: &RecordBatch, parquet: &Bytes) -> Result<()> {
    let decoded = read_parquet(parquet.clone())
        .map_err(|e| Error::verification(format!("written parquet does not decode: {e}")))?;
    compare_batches(expected, &decoded)
}

/// Column names, order, types, row count and cell values must all agree.
/// Nulls compare equal to nulls.
pub fn compare_batches(expected: &RecordBatch, actual: &RecordBatch) -> Result<()> {
    let expected_schema = expected.schema();
    let actual_schema = actual.schema();

    if expected.num_columns() != actual.num_columns() {
        return Err(Error::verification(format!(
            "expected {} columns, found {}",
            expected.num_columns(),
            actual.num_columns()
        )));
    }

    for (idx, (want, got)) in expected_schema
        .fields()
        .iter()
        .zip(actual_schema.fields().iter())
        .enumerate()
    {
        if want.name() != got.name() {
            return Err(Error::verification(format!(
                "column {idx} is named {:?}, expected {:?}",
                got.name(),
                want.name()
            )));
        }
        if want.data_type() != got.data_type() {
            return Err(Error::verification(format!(
                "column {:?} has type {}, expected {}",
                want.name(),
                got.data_type(),
                want.data_type()
            )));
        }
    }

    if expected.num_rows() != actual.num_rows() {
        return Err(Error::verification(format!(
            "expected {} rows, found {}",
            expected.num_rows(),
            actual.num_rows()
        )));
    }

    for (field, (want, got)) in expected_schema
        .fields()
        .iter()
        .zip(expected.columns().iter().zip(actual.columns()))
    {
        if !columns_equal(want, got) {
            return Err(Error::verification(format!(
                "values differ in column {:?}",
                field.name()
            )));
        }
    }

    Ok(())
}

fn columns_equal(left: &ArrayRef, right: &ArrayRef) -> bool {
    match not_distinct(left, right) {
        Ok(mask) => mask.true_count() == mask.len(),
        // types without a comparison kernel fall back to structural equality
        Err(_) => left.to_data() == right.to_data(),
    }
}
