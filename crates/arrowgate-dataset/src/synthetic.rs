//! Synthetic "sales" dataset generation.
//!
//! Used as the default dataset when no file has been loaded and as the
//! fallback when a requested file cannot be read. The shape mirrors a retail
//! sales feed: monotonic ids, random product/store assignment, a
//! second-resolution timestamp column, and a uniform amount distribution.

use arrow::array::{Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrowgate_core::{Error, Result};
use chrono::TimeDelta;
use rand::Rng;
use std::sync::Arc;

/// Name the resident dataset reports when it was generated rather than
/// loaded from a file.
pub const SYNTHETIC_NAME: &str = "__synthetic__";

const STORES: [&str; 4] = ["NYC-01", "LON-02", "TOK-03", "PAR-04"];
const STATUSES: [&str; 3] = ["completed", "pending", "refunded"];

/// Generates the synthetic sales table as a single record batch.
pub fn sales_batch(rows: usize) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("product_id", DataType::Int32, false),
        Field::new("store_id", DataType::Utf8, false),
        Field::new("date", DataType::Utf8, false),
        Field::new("amount", DataType::Float64, false),
        Field::new("status", DataType::Utf8, false),
    ]));

    let mut rng = rand::rng();

    let ids = Int64Array::from_iter_values(0..rows as i64);
    let product_ids =
        Int32Array::from_iter_values((0..rows).map(|_| rng.random_range(1..1000)));
    let store_ids =
        StringArray::from_iter_values((0..rows).map(|_| STORES[rng.random_range(0..STORES.len())]));

    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid base timestamp");
    let dates = StringArray::from_iter_values((0..rows).map(|i| {
        (base + TimeDelta::seconds(i as i64))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }));

    let amounts =
        Float64Array::from_iter_values((0..rows).map(|_| rng.random_range(10.5..999.9)));
    let statuses = StringArray::from_iter_values(
        (0..rows).map(|_| STATUSES[rng.random_range(0..STATUSES.len())]),
    );

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(product_ids),
            Arc::new(store_ids),
            Arc::new(dates),
            Arc::new(amounts),
            Arc::new(statuses),
        ],
    )
    .map_err(Error::dataset)
}
