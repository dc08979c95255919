//! Streaming handler for `do_get`.
//!
//! Frames one partition of the resident dataset onto the tunnel:
//!
//! 1. decode the ticket into a partition assignment (leniently - see
//!    [`arrowgate_core::ticket`])
//! 2. emit `stream_start` carrying the schema, the partition coordinates,
//!    and the transfer-compression label
//! 3. serialize the ordered batch list, slice out this partition, and send
//!    each chunk as one payload unit, yielding between units so a large
//!    stream never starves other work on the worker
//! 4. close with `stream_end` carrying the byte total, or a stream-end error
//!    frame on request-local failure
//!
//! Failures here never tear down the connection: provider and codec errors
//! are reported in-band, and transport errors are left for the connection
//! worker's read loop to notice on its own.

use crate::connector::dispatch::ConnectionContext;
use arrowgate_core::partition::partition_slice;
use arrowgate_core::ticket;
use arrowgate_core::wire::ControlFrame;
use std::sync::Arc;
use std::time::Instant;

pub async fn handle(ctx: Arc<ConnectionContext>, request_id: String, ticket: String) {
    let started = Instant::now();

    // Linear transports ship payload frames with no request identity; hold
    // the connection's stream lock so two streams can never interleave.
    let _guard = match &ctx.stream_lock {
        Some(lock) => Some(Arc::clone(lock).lock_owned().await),
        None => None,
    };

    let assignment = ticket::decode(&ticket);
    tracing::info!(
        worker = ctx.worker_id,
        request_id = %request_id,
        partition = assignment.partition,
        total_partitions = assignment.total_partitions,
        "starting data transfer"
    );

    let loader = Arc::clone(&ctx.loader);
    let dataset = match tokio::task::spawn_blocking(move || loader.ensure_resident()).await {
        Ok(dataset) => dataset,
        Err(err) => {
            ctx.metrics.record_error();
            abort(&ctx, &request_id, format!("dataset unavailable: {err}")).await;
            return;
        }
    };

    let schema = match dataset.schema_bytes() {
        Ok(schema) => schema,
        Err(err) => {
            ctx.metrics.record_error();
            abort(&ctx, &request_id, err.to_string()).await;
            return;
        }
    };

    let start_frame = ControlFrame::StreamStart {
        request_id: request_id.clone(),
        schema,
        partition: assignment.partition,
        total_partitions: assignment.total_partitions,
        compression: ctx.config.compression,
    };
    if let Err(err) = ctx.tunnel.send_control(start_frame).await {
        // The connection is going down; the read loop will reconnect.
        tracing::debug!(worker = ctx.worker_id, %err, "stream start failed");
        return;
    }

    // Serialization is CPU-bound; run it off the async runtime. The snapshot
    // keeps this request consistent even if the resident dataset is swapped
    // while we stream.
    let max_chunk_rows = ctx.config.max_chunk_size;
    let compression = ctx.config.compression;
    let encode_dataset = Arc::clone(&dataset);
    let encoded = tokio::task::spawn_blocking(move || {
        encode_dataset.ordered_batches(max_chunk_rows, compression)
    })
    .await;

    let batches = match encoded {
        Ok(Ok(batches)) => batches,
        Ok(Err(err)) => {
            ctx.metrics.record_error();
            abort(&ctx, &request_id, err.to_string()).await;
            return;
        }
        Err(err) => {
            ctx.metrics.record_error();
            abort(&ctx, &request_id, format!("serialization task failed: {err}")).await;
            return;
        }
    };

    let range = partition_slice(assignment.partition, assignment.total_partitions, batches.len());
    let slice = &batches[range];

    let mut sent_bytes = 0u64;
    let mut sent_rows = 0u64;
    for batch in slice {
        if ctx.cancel.is_cancelled() {
            tracing::debug!(
                worker = ctx.worker_id,
                request_id = %request_id,
                "connection torn down mid-stream"
            );
            return;
        }

        if let Err(err) = ctx
            .tunnel
            .send_payload(&request_id, assignment.partition, batch.data.clone())
            .await
        {
            tracing::debug!(worker = ctx.worker_id, %err, "payload send failed");
            return;
        }

        sent_bytes += batch.data.len() as u64;
        sent_rows += batch.num_rows as u64;
        ctx.metrics.record_bytes_sent(batch.data.len() as u64);

        // Keep the worker responsive to other in-flight requests.
        tokio::task::yield_now().await;
    }

    let end_frame = ControlFrame::StreamEnd {
        request_id: request_id.clone(),
        partition: assignment.partition,
        total_bytes: sent_bytes,
    };
    if let Err(err) = ctx.tunnel.send_control(end_frame).await {
        tracing::debug!(worker = ctx.worker_id, %err, "stream end failed");
        return;
    }

    ctx.metrics.record_records_sent(sent_rows);
    ctx.metrics
        .record_query_processed(Some(started.elapsed().as_secs_f64() * 1000.0));

    tracing::info!(
        worker = ctx.worker_id,
        request_id = %request_id,
        partition = assignment.partition,
        chunks = slice.len(),
        bytes = sent_bytes,
        "partition transfer complete"
    );
}

/// Reports a request-local failure in-band and stops this stream. The
/// connection stays active.
async fn abort(ctx: &ConnectionContext, request_id: &str, error: String) {
    tracing::error!(worker = ctx.worker_id, request_id = %request_id, %error, "streaming request failed");
    let frame = ControlFrame::StreamAbort { request_id: request_id.to_string(), error };
    if let Err(err) = ctx.tunnel.send_control(frame).await {
        tracing::debug!(worker = ctx.worker_id, %err, "stream abort frame failed");
    }
}
