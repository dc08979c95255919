//! Transport-neutral command and frame types.
//!
//! The tunnel protocol survives two wire encodings: a linear WebSocket tunnel
//! (JSON text frames for control, raw binary frames for payload) and a
//! multiplexed gRPC tunnel (self-describing protobuf envelopes). Everything
//! above the transport layer - dispatcher, handlers, planner - operates on
//! the [`Command`] and [`ControlFrame`] types defined here and never learns
//! which encoding carried them.
//!
//! The mappings onto both encodings live here as well, next to the types, so
//! a change to the contract cannot drift between transports:
//!
//! - [`Command::from_ws_text`] / [`Command::from_envelope`] for inbound units
//! - [`ControlFrame::to_ws_text`] / [`ControlFrame::into_envelope`] for
//!   outbound control
//! - [`payload_envelope`] for outbound payload chunks on the multiplexed
//!   tunnel (the linear tunnel ships payload as bare binary frames)
//!
//! JSON field names and protobuf field numbers are the compatibility
//! contract with deployed gateways; they change only with a protocol rev.

use crate::common::proto;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Value, json};

/// Version string the connector reports during registration.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// External transfer compression applied to payload chunks after columnar
/// serialization.
///
/// This is independent of the columnar codec's own optional internal
/// compression, which receiver-side ecosystems may not support. The label
/// travels in the stream-start frame so the receiver knows what to undo; the
/// connector core only attaches the label and passes encoded bytes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Payload chunks are raw columnar IPC bytes.
    None,
    /// Payload chunks are zstd-wrapped columnar IPC bytes.
    #[default]
    Zstd,
}

impl Compression {
    /// Wire label carried in stream-start frames.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zstd => "zstd",
        }
    }
}

impl core::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "zstd" => Ok(Self::Zstd),
            other => Err(format!("unknown compression label: {other}")),
        }
    }
}

impl core::fmt::Display for Compression {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// A command pushed down the tunnel by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Outcome of the registration handshake.
    RegisterAck {
        status: String,
        session_id: Option<String>,
        error: Option<String>,
    },
    /// Metadata request for a dataset.
    GetFlightInfo {
        request_id: String,
        path: Vec<String>,
        rows: Option<u64>,
    },
    /// Streaming request for one partition of a dataset.
    DoGet { request_id: String, ticket: String },
    /// Liveness probe; echoed back immediately with the tenant id.
    Heartbeat { request_id: String, timestamp: i64 },
    /// Anything this connector version does not recognize. Ignored, never an
    /// error: the protocol favors forward compatibility over rejection.
    Unknown { action: String },
}

impl Command {
    /// Decodes a JSON text frame from the linear tunnel.
    ///
    /// Returns `None` only for frames that are not JSON objects at all;
    /// recognizable-but-unknown actions decode to [`Command::Unknown`].
    pub fn from_ws_text(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let obj = value.as_object()?;

        let Some(action) = obj.get("action").and_then(Value::as_str) else {
            // The registration ack is the one inbound frame without an
            // action field; it carries a bare status instead.
            if let Some(status) = obj.get("status").and_then(Value::as_str) {
                return Some(Self::RegisterAck {
                    status: status.to_string(),
                    session_id: string_field(obj, "session_id"),
                    error: string_field(obj, "error"),
                });
            }
            return None;
        };

        let request_id = string_field(obj, "request_id").unwrap_or_default();

        match action {
            "get_flight_info" => {
                let descriptor = obj.get("descriptor").and_then(Value::as_object);
                let path = descriptor
                    .and_then(|d| d.get("path"))
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let rows = descriptor.and_then(|d| d.get("rows")).and_then(lenient_u64);
                Some(Self::GetFlightInfo { request_id, path, rows })
            }
            "do_get" => {
                let ticket = descriptor_ticket(obj).unwrap_or_default();
                Some(Self::DoGet { request_id, ticket })
            }
            "heartbeat" => {
                let timestamp = obj.get("timestamp").and_then(lenient_i64).unwrap_or(0);
                Some(Self::Heartbeat { request_id, timestamp })
            }
            other => Some(Self::Unknown { action: other.to_string() }),
        }
    }

    /// Decodes an envelope from the multiplexed tunnel.
    pub fn from_envelope(command: proto::GatewayCommand) -> Self {
        use proto::gateway_command::Body;

        let request_id = command.request_id;
        match command.body {
            Some(Body::RegisterResponse(resp)) => Self::RegisterAck {
                status: resp.status,
                session_id: non_empty(resp.session_id),
                error: non_empty(resp.error),
            },
            Some(Body::GetFlightInfo(req)) => Self::GetFlightInfo {
                request_id,
                path: req.path,
                rows: (req.rows > 0).then_some(req.rows),
            },
            Some(Body::DoGet(req)) => Self::DoGet { request_id, ticket: req.ticket },
            Some(Body::Heartbeat(hb)) => Self::Heartbeat { request_id, timestamp: hb.timestamp },
            None => Self::Unknown { action: String::new() },
        }
    }
}

/// Metadata payload of a successful flight-info response.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightInfoData {
    pub schema: Bytes,
    pub total_records: u64,
    pub total_bytes: u64,
    pub dataset: String,
    pub partitions: u32,
}

/// A control unit sent up the tunnel by the connector.
///
/// Payload chunks are not control frames; they travel as binary frames on the
/// linear tunnel and as [`proto::ArrowChunk`] envelopes on the multiplexed
/// one.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    /// Registration handshake, sent exactly once per connection.
    Register {
        tenant_id: String,
        version: String,
        datasets: Vec<String>,
    },
    /// Echo of a gateway heartbeat.
    HeartbeatReply {
        request_id: String,
        tenant_id: String,
        timestamp: i64,
    },
    /// Successful metadata response.
    FlightInfo { request_id: String, data: FlightInfoData },
    /// Request-local metadata failure.
    FlightInfoError { request_id: String, error: String },
    /// Opening bracket of one streamed partition.
    StreamStart {
        request_id: String,
        schema: Bytes,
        partition: u32,
        total_partitions: u32,
        compression: Compression,
    },
    /// Closing bracket of a successfully streamed partition.
    StreamEnd {
        request_id: String,
        partition: u32,
        total_bytes: u64,
    },
    /// Closing bracket of a failed partition stream. Request-local: the
    /// connection stays up.
    StreamAbort { request_id: String, error: String },
}

impl ControlFrame {
    /// Encodes this frame as a JSON text frame for the linear tunnel.
    pub fn to_ws_text(&self) -> String {
        let value = match self {
            Self::Register { tenant_id, version, datasets } => json!({
                "action": "register",
                "tenant_id": tenant_id,
                "version": version,
                "datasets": datasets,
            }),
            Self::HeartbeatReply { request_id, tenant_id, timestamp } => {
                let mut value = json!({
                    "action": "heartbeat",
                    "tenant_id": tenant_id,
                    "timestamp": timestamp,
                });
                if !request_id.is_empty() {
                    value["request_id"] = json!(request_id);
                }
                value
            }
            Self::FlightInfo { request_id, data } => json!({
                "request_id": request_id,
                "status": "ok",
                "data": {
                    "schema": STANDARD.encode(&data.schema),
                    "total_records": data.total_records,
                    "total_bytes": data.total_bytes,
                    "dataset": data.dataset,
                    "partitions": data.partitions,
                },
            }),
            Self::FlightInfoError { request_id, error } => json!({
                "request_id": request_id,
                "status": "error",
                "error": error,
            }),
            Self::StreamStart { request_id, schema, partition, total_partitions, compression } => {
                json!({
                    "request_id": request_id,
                    "status": "ok",
                    "type": "stream_start",
                    "schema": STANDARD.encode(schema),
                    "partition": partition,
                    "total_partitions": total_partitions,
                    "compression": compression.label(),
                })
            }
            Self::StreamEnd { request_id, partition, total_bytes } => json!({
                "request_id": request_id,
                "status": "ok",
                "type": "stream_end",
                "partition": partition,
                "total_bytes": total_bytes,
            }),
            Self::StreamAbort { request_id, error } => json!({
                "request_id": request_id,
                "status": "error",
                "type": "stream_end",
                "error": error,
            }),
        };
        value.to_string()
    }

    /// Encodes this frame as an envelope for the multiplexed tunnel.
    pub fn into_envelope(self) -> proto::ConnectorMessage {
        use proto::connector_message::Body;

        let (request_id, body) = match self {
            Self::Register { tenant_id, version, datasets } => (
                String::new(),
                Body::Register(proto::RegisterRequest { tenant_id, version, datasets }),
            ),
            Self::HeartbeatReply { request_id, tenant_id, timestamp } => (
                request_id,
                Body::Heartbeat(proto::HeartbeatReply { tenant_id, timestamp }),
            ),
            Self::FlightInfo { request_id, data } => (
                request_id,
                Body::FlightInfo(proto::FlightInfoResponse {
                    status: "ok".to_string(),
                    schema: data.schema,
                    total_records: data.total_records,
                    total_bytes: data.total_bytes,
                    dataset: data.dataset,
                    partitions: data.partitions,
                    error: String::new(),
                }),
            ),
            Self::FlightInfoError { request_id, error } => (
                request_id,
                Body::FlightInfo(proto::FlightInfoResponse {
                    status: "error".to_string(),
                    schema: Bytes::new(),
                    total_records: 0,
                    total_bytes: 0,
                    dataset: String::new(),
                    partitions: 0,
                    error,
                }),
            ),
            Self::StreamStart { request_id, schema, partition, total_partitions, compression } => (
                request_id,
                Body::StreamStatus(proto::StreamStatus {
                    r#type: "stream_start".to_string(),
                    schema,
                    partition,
                    total_partitions,
                    total_bytes: 0,
                    compression: compression.label().to_string(),
                    error: String::new(),
                }),
            ),
            Self::StreamEnd { request_id, partition, total_bytes } => (
                request_id,
                Body::StreamStatus(proto::StreamStatus {
                    r#type: "stream_end".to_string(),
                    schema: Bytes::new(),
                    partition,
                    total_partitions: 0,
                    total_bytes,
                    compression: String::new(),
                    error: String::new(),
                }),
            ),
            Self::StreamAbort { request_id, error } => (
                request_id,
                Body::StreamStatus(proto::StreamStatus {
                    r#type: "stream_end".to_string(),
                    schema: Bytes::new(),
                    partition: 0,
                    total_partitions: 0,
                    total_bytes: 0,
                    compression: String::new(),
                    error,
                }),
            ),
        };

        proto::ConnectorMessage { request_id, body: Some(body) }
    }
}

/// Wraps one payload chunk in an envelope for the multiplexed tunnel.
pub fn payload_envelope(request_id: &str, partition: u32, data: Bytes) -> proto::ConnectorMessage {
    proto::ConnectorMessage {
        request_id: request_id.to_string(),
        body: Some(proto::connector_message::Body::ArrowChunk(proto::ArrowChunk {
            data,
            partition,
        })),
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Ticket may arrive at the top level or nested in the descriptor, depending
/// on the gateway version.
fn descriptor_ticket(obj: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(ticket) = obj.get("ticket").and_then(Value::as_str) {
        return Some(ticket.to_string());
    }
    obj.get("descriptor")
        .and_then(Value::as_object)
        .and_then(|d| d.get("ticket"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Gateways have shipped row counts both as numbers and as strings.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
