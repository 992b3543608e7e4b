use bytes::Bytes;
use tracing::debug;

use crate::convert::{
    encode::{verify_round_trip, write_parquet},
    table::read_delimited,
};
use crate::error::Result;

/// Convert a comma-separated buffer (header row first) into verified Parquet.
///
/// The Parquet output is decoded again and compared against the parsed table
/// before it is returned; any difference is an [`Error::Verification`].
///
/// [`Error::Verification`]: crate::Error::Verification
pub fn csv_to_parquet(buffer: &[u8]) -> Result<Bytes> {
    let table = read_delimited(buffer, b',')?;
    let parquet = write_parquet(&table)?;
    verify_round_trip(&table, &parquet)?;

    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        bytes = parquet.len(),
        "csv converted"
    );
    Ok(parquet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::encode::read_parquet;
    use crate::Error;
    use anyhow::Result;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};

    #[test]
    fn test_reads_back_identical_rows() -> Result<()> {
        let parquet = csv_to_parquet(b"a,b,c\n1,2.5,x\n2,3.5,y\n")?;
        let batch = read_parquet(parquet)?;
        let schema = batch.schema();

        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let a = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let b = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        let c = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(a.values().to_vec(), vec![1, 2]);
        assert_eq!(b.values().to_vec(), vec![2.5, 3.5]);
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![Some("x"), Some("y")]);
        Ok(())
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() -> Result<()> {
        let parquet = csv_to_parquet(b"name,count\n\"Smith, J\",3\n")?;
        let batch = read_parquet(parquet)?;
        let names = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "Smith, J");
        Ok(())
    }

    #[test]
    fn test_malformed_csv_fails_fast() {
        let err = csv_to_parquet(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "got {err:?}");
    }
}
