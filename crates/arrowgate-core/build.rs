//! Builds the gRPC client and server bindings for the `arrowgate.proto`
//! definition using `tonic-prost-build`.
//!
//! Payload-bearing fields (`ArrowChunk.data`, the serialized schema fields)
//! are configured to deserialize as `Bytes` rather than `Vec<u8>` so chunks
//! can move through the tunnel without copies.

fn main() {
    let mut config = tonic_prost_build::Config::new();

    // Treat every `bytes` field under the package as `Bytes`, not `Vec<u8>`.
    config.bytes([".arrowgate.v1"]);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/arrowgate.proto"], &["proto"])
        .unwrap();
}
