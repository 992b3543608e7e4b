use arrow::{
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{io::Cursor, sync::Arc};

use crate::error::{Error, Result};

const BATCH_SIZE: usize = 8192;

/// Parse delimited text with a header row into a single typed batch.
///
/// Column types come from arrow's content inference over every row.
/// Columns that never hold a value are read as nullable strings.
pub fn read_delimited(text: &[u8], delimiter: u8) -> Result<RecordBatch> {
    let format = Format::default()
        .with_header(true)
        .with_delimiter(delimiter);
    let (inferred, _) = format
        .infer_schema(Cursor::new(text), None)
        .map_err(|e| Error::parse(format!("inferring schema: {e}")))?;

    if inferred.fields().is_empty() {
        return Err(Error::parse("no header row"));
    }
    let schema = Arc::new(widen_null_columns(&inferred));

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(delimiter)
        .with_batch_size(BATCH_SIZE)
        .build(Cursor::new(text))
        .map_err(|e| Error::parse(format!("creating reader: {e}")))?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::parse(format!("reading rows: {e}")))?;

    concat_batches(&schema, &batches).map_err(|e| Error::parse(format!("joining batches: {e}")))
}

fn widen_null_columns(schema: &Schema) -> Schema {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| match f.data_type() {
            DataType::Null => Field::new(f.name(), DataType::Utf8, true),
            _ => f.as_ref().clone(),
        })
        .collect();
    Schema::new(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use arrow::array::{Array, BooleanArray, Float64Array, Int64Array, StringArray};

    #[test]
    fn test_infers_column_types() -> Result<()> {
        let batch = read_delimited(b"id,ratio,flag,name\n1,0.5,true,a\n2,1.5,false,b\n", b',')?;
        let schema = batch.schema();
        let types: Vec<&DataType> = schema.fields().iter().map(|f| f.data_type()).collect();
        assert_eq!(
            types,
            vec![
                &DataType::Int64,
                &DataType::Float64,
                &DataType::Boolean,
                &DataType::Utf8
            ]
        );

        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2]);
        let ratios = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(ratios.values().to_vec(), vec![0.5, 1.5]);
        let flags = batch.column(2).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(flags.value(0) && !flags.value(1));
        Ok(())
    }

    #[test]
    fn test_empty_column_becomes_nullable_string() -> Result<()> {
        let batch = read_delimited(b"a\tnote\n1\t\n2\t\n", b'\t')?;
        let field = batch.schema().field(1).clone();
        assert_eq!(field.data_type(), &DataType::Utf8);
        assert!(field.is_nullable());
        let notes = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(notes.null_count(), 2);
        Ok(())
    }

    #[test]
    fn test_header_only_gives_empty_table() -> Result<()> {
        let batch = read_delimited(b"a,b\n", b',')?;
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.num_rows(), 0);
        Ok(())
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        let err = read_delimited(b"", b',').unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_ragged_rows_are_parse_error() {
        let err = read_delimited(b"a,b\n1,2\n3,4,5\n", b',').unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "got {err:?}");
    }
}
