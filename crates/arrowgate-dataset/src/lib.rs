#![doc = include_str!("../README.md")]

mod codec;
mod formats;
mod synthetic;

pub use codec::EncodedBatch;
pub use synthetic::SYNTHETIC_NAME;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrowgate_core::{Result, wire::Compression};
use bytes::Bytes;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// One consistent view of the resident dataset.
///
/// Handlers resolve a snapshot once per request and keep reading from it even
/// if an administrative load swaps the resident dataset underneath them; the
/// swap only affects requests that start afterwards.
#[derive(Debug)]
pub struct ResidentDataset {
    name: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    total_rows: u64,
    total_bytes: u64,
}

impl ResidentDataset {
    fn new(name: String, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let total_rows = batches.iter().map(|b| b.num_rows() as u64).sum();
        let total_bytes = batches.iter().map(|b| b.get_array_memory_size() as u64).sum();
        Self { name, schema, batches, total_rows, total_bytes }
    }

    /// Logical dataset name; [`SYNTHETIC_NAME`] for generated data.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Serialized schema for wire metadata, passed through unexamined by the
    /// protocol layer.
    pub fn schema_bytes(&self) -> Result<Bytes> {
        codec::schema_ipc_bytes(&self.schema)
    }

    pub fn total_records(&self) -> u64 {
        self.total_rows
    }

    /// In-memory size of the resident table. Partition planning keys off this
    /// value because transfer cost tracks bytes, not rows.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Serializes the dataset as an ordered list of wire-ready chunks of at
    /// most `max_chunk_rows` rows each.
    ///
    /// The returned order is the partitioning contract: partition slices are
    /// contiguous ranges over exactly this list.
    pub fn ordered_batches(
        &self,
        max_chunk_rows: usize,
        compression: Compression,
    ) -> Result<Vec<EncodedBatch>> {
        let chunks = codec::chunk_batches(&self.batches, max_chunk_rows);
        let mut encoded = Vec::with_capacity(chunks.len());
        let mut ipc_bytes = 0usize;
        let mut wire_bytes = 0usize;
        for chunk in &chunks {
            let batch = codec::encode_batch(chunk, compression)?;
            ipc_bytes += chunk.get_array_memory_size();
            wire_bytes += batch.data.len();
            encoded.push(batch);
        }
        tracing::debug!(
            dataset = %self.name,
            chunks = encoded.len(),
            ipc_bytes,
            wire_bytes,
            compression = %compression,
            "serialized resident dataset"
        );
        Ok(encoded)
    }
}

/// The dataset provider: owns the resident table and its load/generate
/// lifecycle.
///
/// All reads are snapshots ("current as of this call"); loads replace the
/// resident `Arc` atomically under the lock, so concurrent workers never
/// observe a half-swapped dataset.
pub struct DataLoader {
    datasets_dir: PathBuf,
    default_rows: usize,
    resident: RwLock<Option<Arc<ResidentDataset>>>,
}

impl DataLoader {
    pub fn new(datasets_dir: impl Into<PathBuf>, default_rows: usize) -> Self {
        Self {
            datasets_dir: datasets_dir.into(),
            default_rows,
            resident: RwLock::new(None),
        }
    }

    /// Current resident dataset, if any.
    pub fn snapshot(&self) -> Option<Arc<ResidentDataset>> {
        self.resident.read().clone()
    }

    /// Current resident dataset, generating the default synthetic table
    /// first when nothing is resident yet.
    pub fn ensure_resident(&self) -> Arc<ResidentDataset> {
        if let Some(snapshot) = self.snapshot() {
            return snapshot;
        }
        self.load_or_generate(None);
        self.snapshot().expect("dataset resident after generation")
    }

    /// Loads a dataset from the dataset directory. Returns `false` when the
    /// file is missing or unreadable; the caller decides the fallback.
    pub fn load_from_file(&self, dataset_name: &str) -> bool {
        let (stem, preferred_ext) = normalize_name(dataset_name);

        if let Some(current) = self.snapshot() {
            if current.name() == stem {
                tracing::info!(dataset = %stem, "dataset already resident");
                return true;
            }
        }

        let Some(path) = self.locate(&stem, preferred_ext) else {
            tracing::warn!(
                dataset = %stem,
                dir = %self.datasets_dir.display(),
                "dataset not found"
            );
            return false;
        };

        let started = Instant::now();
        match formats::read_dataset(&path) {
            Ok((schema, batches)) => {
                let dataset = Arc::new(ResidentDataset::new(stem.clone(), schema, batches));
                tracing::info!(
                    dataset = %stem,
                    path = %path.display(),
                    rows = dataset.total_records(),
                    bytes = dataset.total_bytes(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "dataset loaded"
                );
                *self.resident.write() = Some(dataset);
                true
            }
            Err(err) => {
                tracing::error!(dataset = %stem, path = %path.display(), %err, "dataset load failed");
                false
            }
        }
    }

    /// Generates the synthetic sales dataset at `rows` (or the configured
    /// default). Regeneration is skipped when the resident table is already
    /// the synthetic dataset at that row count.
    pub fn load_or_generate(&self, rows: Option<usize>) {
        let rows = rows.unwrap_or(self.default_rows);

        if let Some(current) = self.snapshot() {
            if current.name() == SYNTHETIC_NAME && current.total_records() == rows as u64 {
                return;
            }
        }

        let started = Instant::now();
        match synthetic::sales_batch(rows) {
            Ok(batch) => {
                let schema = batch.schema();
                let dataset =
                    Arc::new(ResidentDataset::new(SYNTHETIC_NAME.to_string(), schema, vec![batch]));
                tracing::info!(
                    rows,
                    bytes = dataset.total_bytes(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "synthetic dataset generated"
                );
                *self.resident.write() = Some(dataset);
            }
            Err(err) => {
                // Generation only fails on schema/array length mismatches,
                // which would be a bug here rather than an input problem.
                tracing::error!(%err, rows, "synthetic generation failed");
            }
        }
    }

    /// Dataset names available in the dataset directory.
    pub fn list_available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.datasets_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        formats::KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    })
            })
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Row count of the resident dataset; 0 when nothing is resident.
    pub fn total_records(&self) -> u64 {
        self.snapshot().map_or(0, |d| d.total_records())
    }

    /// Byte size of the resident dataset; 0 when nothing is resident.
    pub fn total_bytes(&self) -> u64 {
        self.snapshot().map_or(0, |d| d.total_bytes())
    }

    /// Name of the resident dataset, if any.
    pub fn current_dataset(&self) -> Option<String> {
        self.snapshot().map(|d| d.name().to_string())
    }

    fn locate(&self, stem: &str, preferred_ext: Option<&'static str>) -> Option<PathBuf> {
        let mut order: Vec<&str> = Vec::with_capacity(formats::KNOWN_EXTENSIONS.len());
        if let Some(preferred) = preferred_ext {
            order.push(preferred);
        }
        order.extend(
            formats::KNOWN_EXTENSIONS
                .iter()
                .filter(|ext| Some(**ext) != preferred_ext),
        );

        order.into_iter().find_map(|ext| {
            let candidate = self.datasets_dir.join(format!("{stem}.{ext}"));
            candidate.exists().then_some(candidate)
        })
    }
}

/// Splits a requested name into its stem and, when the request spelled out an
/// extension, the format to prioritize during lookup.
fn normalize_name(dataset_name: &str) -> (String, Option<&'static str>) {
    let lower = dataset_name.to_ascii_lowercase();
    for ext in formats::KNOWN_EXTENSIONS {
        if let Some(stem) = lower
            .strip_suffix(ext)
            .and_then(|rest| rest.strip_suffix('.'))
        {
            // Preserve the caller's casing for the stem, only the extension
            // match is case-insensitive.
            return (dataset_name[..stem.len()].to_string(), Some(ext));
        }
    }
    (dataset_name.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arrowgate-loader-{tag}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn generates_default_when_nothing_resident() {
        let loader = DataLoader::new(temp_dir("gen"), 128);
        assert!(loader.snapshot().is_none());
        let dataset = loader.ensure_resident();
        assert_eq!(dataset.name(), SYNTHETIC_NAME);
        assert_eq!(dataset.total_records(), 128);
        assert!(dataset.total_bytes() > 0);
    }

    #[test]
    fn regeneration_skipped_at_same_row_count() {
        let loader = DataLoader::new(temp_dir("skip"), 64);
        loader.load_or_generate(Some(100));
        let first = loader.snapshot().unwrap();
        loader.load_or_generate(Some(100));
        let second = loader.snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        loader.load_or_generate(Some(200));
        let third = loader.snapshot().unwrap();
        assert_eq!(third.total_records(), 200);
    }

    #[test]
    fn loads_csv_and_reports_name() {
        let dir = temp_dir("csv");
        let path = dir.join("orders.csv");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "id,qty").unwrap();
            writeln!(f, "1,10").unwrap();
            writeln!(f, "2,20").unwrap();
            writeln!(f, "3,30").unwrap();
        }

        let loader = DataLoader::new(&dir, 16);
        assert!(loader.load_from_file("orders"));
        assert_eq!(loader.current_dataset().as_deref(), Some("orders"));
        assert_eq!(loader.total_records(), 3);

        // Requesting with an explicit extension hits the same file.
        assert!(loader.load_from_file("orders.csv"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_dataset_returns_false_and_keeps_resident() {
        let loader = DataLoader::new(temp_dir("missing"), 32);
        loader.load_or_generate(None);
        let before = loader.snapshot().unwrap();
        assert!(!loader.load_from_file("does-not-exist"));
        let after = loader.snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn snapshot_survives_swap() {
        let loader = DataLoader::new(temp_dir("swap"), 8);
        loader.load_or_generate(Some(10));
        let snapshot = loader.snapshot().unwrap();
        loader.load_or_generate(Some(20));
        // The old snapshot still reads consistently.
        assert_eq!(snapshot.total_records(), 10);
        assert_eq!(loader.total_records(), 20);
    }

    #[test]
    fn ordered_batches_respects_chunk_cap() {
        let loader = DataLoader::new(temp_dir("chunks"), 100);
        let dataset = loader.ensure_resident();
        let batches = dataset
            .ordered_batches(30, Compression::None)
            .unwrap();
        assert_eq!(batches.len(), 4);
        assert_eq!(batches.iter().map(|b| b.num_rows).sum::<usize>(), 100);
        assert!(batches[..3].iter().all(|b| b.num_rows == 30));
    }

    #[test]
    fn normalize_strips_known_extensions_only() {
        assert_eq!(normalize_name("sales.parquet"), ("sales".to_string(), Some("parquet")));
        assert_eq!(normalize_name("sales.PQ"), ("sales".to_string(), Some("pq")));
        assert_eq!(normalize_name("sales"), ("sales".to_string(), None));
        assert_eq!(normalize_name("report.v2"), ("report.v2".to_string(), None));
    }
}
