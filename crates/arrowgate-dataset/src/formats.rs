//! File readers for the supported dataset formats.
//!
//! All parsing is delegated to the `arrow` and `parquet` crates; this module
//! only routes by extension and normalizes the results into a schema plus an
//! ordered batch list.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrowgate_core::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::Path;
use std::sync::Arc;

/// Extensions the loader knows how to read, in lookup priority order.
pub const KNOWN_EXTENSIONS: [&str; 6] = ["parquet", "pq", "csv", "feather", "arrow", "json"];

/// Reads a dataset file into a schema and its ordered batches, routing by
/// extension.
pub fn read_dataset(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "parquet" | "pq" => read_parquet(path),
        "csv" => read_csv(path),
        "feather" | "arrow" => read_ipc_file(path),
        "json" => read_json(path),
        other => Err(Error::dataset(format!("unsupported dataset format: .{other}"))),
    }
}

fn read_parquet(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = File::open(path).map_err(Error::dataset)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(Error::dataset)?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(Error::dataset)?;
    let batches = reader
        .collect::<core::result::Result<Vec<_>, _>>()
        .map_err(Error::dataset)?;
    Ok((schema, batches))
}

fn read_csv(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let mut file = File::open(path).map_err(Error::dataset)?;
    let format = arrow::csv::reader::Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(&mut file, Some(1024))
        .map_err(Error::dataset)?;
    file.rewind().map_err(Error::dataset)?;

    let schema = Arc::new(schema);
    let reader = arrow::csv::ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(file)
        .map_err(Error::dataset)?;
    let batches = reader
        .collect::<core::result::Result<Vec<_>, _>>()
        .map_err(Error::dataset)?;
    Ok((schema, batches))
}

fn read_ipc_file(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path).map_err(Error::dataset)?;
    let reader = arrow::ipc::reader::FileReader::try_new(file, None).map_err(Error::dataset)?;
    let schema = reader.schema();
    let batches = reader
        .collect::<core::result::Result<Vec<_>, _>>()
        .map_err(Error::dataset)?;
    Ok((schema, batches))
}

fn read_json(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path).map_err(Error::dataset)?;
    let mut reader = BufReader::new(file);
    let (schema, _) = arrow::json::reader::infer_json_schema_from_seekable(&mut reader, None)
        .map_err(Error::dataset)?;
    reader.rewind().map_err(Error::dataset)?;

    let schema = Arc::new(schema);
    let json_reader = arrow::json::ReaderBuilder::new(schema.clone())
        .build(reader)
        .map_err(Error::dataset)?;
    let batches = json_reader
        .collect::<core::result::Result<Vec<_>, _>>()
        .map_err(Error::dataset)?;
    Ok((schema, batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("arrowgate-formats-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn reads_csv_with_header() {
        let path = temp_path("t1.csv");
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, "id,name").unwrap();
            writeln!(f, "1,foo").unwrap();
            writeln!(f, "2,bar").unwrap();
        }
        let (schema, batches) = read_dataset(&path).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn reads_ipc_file_round_trip() {
        use arrow::ipc::writer::FileWriter;

        let batch = crate::synthetic::sales_batch(64).unwrap();
        let path = temp_path("t2.arrow");
        {
            let file = File::create(&path).unwrap();
            let mut writer = FileWriter::try_new(file, &batch.schema()).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
        }
        let (schema, batches) = read_dataset(&path).unwrap();
        assert_eq!(schema, batch.schema());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 64);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn unsupported_extension_errors() {
        let err = read_dataset(Path::new("data.duckdb")).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
