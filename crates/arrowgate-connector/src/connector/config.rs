//! Runtime configuration for the `arrowgate-connector` binary.
//!
//! All values are parsed from CLI arguments or environment variables (with a
//! `.env` file honored at startup), validated once, and threaded into each
//! component's constructor as one immutable [`ConnectorConfig`]. Nothing
//! reads configuration from ambient global state during request handling.

use anyhow::bail;
use arrowgate_core::wire::Compression;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Which tunnel encoding to dial the gateway with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Linear tunnel: JSON text control frames, raw binary payload frames.
    Websocket,
    /// Multiplexed tunnel: self-describing protobuf envelopes over one
    /// bidirectional gRPC stream.
    Grpc,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "arrowgate-connector",
    version,
    about = "Reverse-tunnel data connector streaming Arrow datasets to a gateway"
)]
pub struct CliArgs {
    /// WebSocket endpoint of the gateway tunnel.
    ///
    /// Environment variable: `GATEWAY_WS_URL`
    #[arg(long, env = "GATEWAY_WS_URL", default_value_t = String::from("ws://localhost:8080/ws/connect"))]
    pub gateway_ws_url: String,

    /// gRPC endpoint of the gateway tunnel.
    ///
    /// Environment variable: `GATEWAY_GRPC_URI`
    #[arg(long, env = "GATEWAY_GRPC_URI", default_value_t = String::from("http://localhost:50051"))]
    pub gateway_grpc_uri: String,

    /// Tunnel encoding to use.
    ///
    /// Environment variable: `TRANSPORT_MODE`
    #[arg(long, env = "TRANSPORT_MODE", value_enum, default_value = "websocket")]
    pub transport: TransportKind,

    /// Tenant identity to register under, or "auto" to derive one from the
    /// host name.
    ///
    /// Environment variable: `TENANT_ID`
    #[arg(long, env = "TENANT_ID", default_value_t = String::from("auto"))]
    pub tenant_id: String,

    /// Number of parallel tunnel connections to hold open.
    ///
    /// Each connection runs its own register/serve/reconnect loop; the
    /// gateway can spread partition fetches across them.
    ///
    /// Environment variable: `PARALLEL_CONNECTIONS`
    #[arg(long, env = "PARALLEL_CONNECTIONS", default_value_t = 1)]
    pub parallel_connections: usize,

    /// Whether metadata responses advertise partitioned fetch. When false
    /// every dataset reports a single partition regardless of size.
    ///
    /// Environment variable: `PARALLEL_PARTITIONS`
    #[arg(long, env = "PARALLEL_PARTITIONS", default_value_t = true, action = clap::ArgAction::Set)]
    pub partitioning: bool,

    /// Maximum rows per streamed batch chunk.
    ///
    /// Environment variable: `MAX_CHUNK_SIZE`
    #[arg(long, env = "MAX_CHUNK_SIZE", default_value_t = 65_536)]
    pub max_chunk_size: usize,

    /// Seconds to wait between reconnect attempts after a tunnel drops.
    ///
    /// Environment variable: `RECONNECT_DELAY`
    #[arg(long, env = "RECONNECT_DELAY", default_value_t = 5)]
    pub reconnect_delay_secs: u64,

    /// Bound, in seconds, on the tunnel dial and on the wait for a
    /// registration response. A stalled gateway must not wedge the
    /// reconnect loop.
    ///
    /// Environment variable: `CONNECT_TIMEOUT`
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// External transfer compression applied to payload chunks after Arrow
    /// IPC serialization: "zstd" or "none".
    ///
    /// Environment variable: `TRANSFER_COMPRESSION`
    #[arg(long, env = "TRANSFER_COMPRESSION", default_value_t = String::from("zstd"))]
    pub transfer_compression: String,

    /// Directory scanned for loadable dataset files.
    ///
    /// Environment variable: `DATASETS_DIR`
    #[arg(long, env = "DATASETS_DIR", default_value = "datasets")]
    pub datasets_dir: PathBuf,

    /// Row count for the default synthetic dataset.
    ///
    /// Environment variable: `DEFAULT_SYNTHETIC_ROWS`
    #[arg(long, env = "DEFAULT_SYNTHETIC_ROWS", default_value_t = 1_000_000)]
    pub default_synthetic_rows: usize,

    /// Base URL of the metrics plane; unset disables metrics upload.
    ///
    /// Environment variable: `METRICS_URL`
    #[arg(long, env = "METRICS_URL")]
    pub metrics_url: Option<String>,

    /// Seconds between metrics uploads.
    ///
    /// Environment variable: `METRICS_INTERVAL`
    #[arg(long, env = "METRICS_INTERVAL", default_value_t = 30)]
    pub metrics_interval_secs: u64,
}

/// Validated, immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub gateway_ws_url: String,
    pub gateway_grpc_uri: String,
    pub transport: TransportKind,
    pub tenant_id: String,
    pub parallel_connections: usize,
    pub partitioning: bool,
    pub max_chunk_size: usize,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub compression: Compression,
    pub datasets_dir: PathBuf,
    pub default_synthetic_rows: usize,
    pub metrics_url: Option<String>,
    pub metrics_interval: Duration,
}

impl TryFrom<CliArgs> for ConnectorConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.parallel_connections == 0 {
            bail!("PARALLEL_CONNECTIONS must be greater than 0");
        }
        if args.max_chunk_size == 0 {
            bail!("MAX_CHUNK_SIZE must be greater than 0");
        }
        if args.connect_timeout_secs == 0 {
            bail!("CONNECT_TIMEOUT must be greater than 0");
        }

        let compression = args
            .transfer_compression
            .parse::<Compression>()
            .map_err(|err| anyhow::anyhow!("TRANSFER_COMPRESSION: {err}"))?;

        let tenant_id = if args.tenant_id == "auto" {
            format!("tenant_{}", hostname().replace('-', "_").to_lowercase())
        } else {
            args.tenant_id
        };

        Ok(Self {
            gateway_ws_url: args.gateway_ws_url,
            gateway_grpc_uri: args.gateway_grpc_uri,
            transport: args.transport,
            tenant_id,
            parallel_connections: args.parallel_connections,
            partitioning: args.partitioning,
            max_chunk_size: args.max_chunk_size,
            reconnect_delay: Duration::from_secs(args.reconnect_delay_secs),
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            compression,
            datasets_dir: args.datasets_dir,
            default_synthetic_rows: args.default_synthetic_rows,
            metrics_url: args.metrics_url,
            metrics_interval: Duration::from_secs(args.metrics_interval_secs),
        })
    }
}

/// Host name for tenant derivation and metrics reporting.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["arrowgate-connector"])
    }

    #[test]
    fn defaults_validate() {
        let config = ConnectorConfig::try_from(base_args()).unwrap();
        assert_eq!(config.transport, TransportKind::Websocket);
        assert_eq!(config.parallel_connections, 1);
        assert!(config.partitioning);
        assert_eq!(config.max_chunk_size, 65_536);
        assert_eq!(config.compression, Compression::Zstd);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn auto_tenant_derives_from_host() {
        let config = ConnectorConfig::try_from(base_args()).unwrap();
        assert!(config.tenant_id.starts_with("tenant_"));
        assert!(!config.tenant_id.contains('-'));
        assert_eq!(config.tenant_id, config.tenant_id.to_lowercase());
    }

    #[test]
    fn explicit_tenant_passes_through() {
        let mut args = base_args();
        args.tenant_id = "tenant_custom".to_string();
        let config = ConnectorConfig::try_from(args).unwrap();
        assert_eq!(config.tenant_id, "tenant_custom");
    }

    #[test]
    fn zero_connections_rejected() {
        let mut args = base_args();
        args.parallel_connections = 0;
        assert!(ConnectorConfig::try_from(args).is_err());
    }

    #[test]
    fn bad_compression_rejected() {
        let mut args = base_args();
        args.transfer_compression = "lz4".to_string();
        assert!(ConnectorConfig::try_from(args).is_err());
    }
}
