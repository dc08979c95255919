//! Metadata handler for `get_flight_info`.
//!
//! Resolves which dataset the request refers to, (re)loading or generating
//! through the provider as needed, and answers with the dataset's schema,
//! size totals, and the recommended partition count. This is the only place
//! a partition count is ever decided; streaming requests just follow the
//! ticket minted from this answer.

use crate::connector::dispatch::ConnectionContext;
use arrowgate_core::partition::partition_count;
use arrowgate_core::wire::{ControlFrame, FlightInfoData};
use arrowgate_dataset::{DataLoader, ResidentDataset, SYNTHETIC_NAME};
use std::sync::Arc;
use std::time::Instant;

/// Capability name under which the synthetic dataset is advertised; a
/// request for it keeps whatever is resident rather than forcing a reload.
pub const DEFAULT_CAPABILITY: &str = "sales";

pub async fn handle(
    ctx: Arc<ConnectionContext>,
    request_id: String,
    path: Vec<String>,
    rows: Option<u64>,
) {
    let started = Instant::now();
    tracing::debug!(
        worker = ctx.worker_id,
        request_id = %request_id,
        path = ?path,
        rows,
        "handling metadata request"
    );

    // Dataset resolution may hit the filesystem or generate millions of
    // rows; hop off the async runtime for it.
    let loader = Arc::clone(&ctx.loader);
    let default_rows = ctx.config.default_synthetic_rows;
    let resolved = tokio::task::spawn_blocking(move || {
        resolve_dataset(&loader, &path, rows, default_rows)
    })
    .await;

    let dataset = match resolved {
        Ok(dataset) => dataset,
        Err(err) => {
            ctx.metrics.record_error();
            respond_error(&ctx, &request_id, format!("dataset resolution failed: {err}")).await;
            return;
        }
    };

    let schema = match dataset.schema_bytes() {
        Ok(schema) => schema,
        Err(err) => {
            ctx.metrics.record_error();
            respond_error(&ctx, &request_id, err.to_string()).await;
            return;
        }
    };

    let partitions = partition_count(dataset.total_bytes(), ctx.config.partitioning);
    let data = FlightInfoData {
        schema,
        total_records: dataset.total_records(),
        total_bytes: dataset.total_bytes(),
        dataset: dataset.name().to_string(),
        partitions,
    };

    tracing::info!(
        worker = ctx.worker_id,
        request_id = %request_id,
        dataset = %data.dataset,
        rows = data.total_records,
        bytes = data.total_bytes,
        partitions,
        "flight info resolved"
    );

    if let Err(err) = ctx
        .tunnel
        .send_control(ControlFrame::FlightInfo { request_id, data })
        .await
    {
        tracing::debug!(worker = ctx.worker_id, %err, "flight info response failed");
        return;
    }

    ctx.metrics
        .record_query_processed(Some(started.elapsed().as_secs_f64() * 1000.0));
}

/// Applies the resolution policy and returns a consistent snapshot.
///
/// In order: a named dataset (other than the synthetic capability) is loaded
/// from file, falling back to synthetic generation when that fails; a bare
/// row count requests synthetic generation at that count; otherwise whatever
/// is resident is kept, generating the default only when nothing is resident
/// yet.
fn resolve_dataset(
    loader: &DataLoader,
    path: &[String],
    rows: Option<u64>,
    default_rows: usize,
) -> Arc<ResidentDataset> {
    let dataset_name = path.first().filter(|name| !name.is_empty());

    match dataset_name {
        Some(name) if name.as_str() != DEFAULT_CAPABILITY && name.as_str() != SYNTHETIC_NAME => {
            if !loader.load_from_file(name) {
                tracing::warn!(dataset = %name, "dataset not found, generating synthetic data");
                loader.load_or_generate(Some(rows.map_or(default_rows, |r| r as usize)));
            }
        }
        _ => match rows {
            Some(rows) => loader.load_or_generate(Some(rows as usize)),
            None => {}
        },
    }

    loader.ensure_resident()
}

async fn respond_error(ctx: &ConnectionContext, request_id: &str, error: String) {
    tracing::error!(worker = ctx.worker_id, request_id = %request_id, %error, "metadata request failed");
    let frame = ControlFrame::FlightInfoError { request_id: request_id.to_string(), error };
    if let Err(err) = ctx.tunnel.send_control(frame).await {
        tracing::debug!(worker = ctx.worker_id, %err, "error response failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrowgate_dataset::DataLoader;
    use std::io::Write;

    fn loader_with_dir(tag: &str) -> (DataLoader, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("arrowgate-metadata-{tag}"));
        std::fs::create_dir_all(&dir).unwrap();
        (DataLoader::new(&dir, 40), dir)
    }

    #[test]
    fn named_dataset_loads_from_file() {
        let (loader, dir) = loader_with_dir("named");
        let path = dir.join("inventory.csv");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "sku,count").unwrap();
            writeln!(f, "a,1").unwrap();
        }

        let dataset = resolve_dataset(&loader, &["inventory".to_string()], None, 40);
        assert_eq!(dataset.name(), "inventory");
        assert_eq!(dataset.total_records(), 1);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_named_dataset_falls_back_to_synthetic() {
        let (loader, _dir) = loader_with_dir("fallback");
        let dataset = resolve_dataset(&loader, &["nope".to_string()], Some(25), 40);
        assert_eq!(dataset.name(), SYNTHETIC_NAME);
        assert_eq!(dataset.total_records(), 25);
    }

    #[test]
    fn bare_row_count_generates_at_that_count() {
        let (loader, _dir) = loader_with_dir("rows");
        let dataset = resolve_dataset(&loader, &[], Some(12), 40);
        assert_eq!(dataset.total_records(), 12);
    }

    #[test]
    fn empty_request_keeps_resident_dataset() {
        let (loader, _dir) = loader_with_dir("keep");
        loader.load_or_generate(Some(17));
        let resident = loader.snapshot().unwrap();
        let dataset = resolve_dataset(&loader, &[], None, 40);
        assert!(Arc::ptr_eq(&resident, &dataset));
    }

    #[test]
    fn default_capability_name_keeps_resident() {
        let (loader, _dir) = loader_with_dir("cap");
        loader.load_or_generate(Some(9));
        let dataset =
            resolve_dataset(&loader, &[DEFAULT_CAPABILITY.to_string()], None, 40);
        assert_eq!(dataset.total_records(), 9);
    }
}
