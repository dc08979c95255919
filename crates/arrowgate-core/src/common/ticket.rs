//! Partition ticket codec.
//!
//! The metadata response advertises N partitions; the gateway later fetches
//! each one by sending back a ticket the connector minted. The ticket is a
//! base64-wrapped JSON object carrying the partition assignment, treated as
//! an opaque string by the gateway.
//!
//! Decoding is deliberately infallible. Older and alternate callers put a
//! bare dataset name in the ticket slot, so anything that does not parse as
//! the structured form falls back to "the whole dataset, partition 0 of 1"
//! instead of failing the request. The two failure shapes are logged at
//! different levels so a genuinely malformed structured ticket is
//! distinguishable from the legacy plain-name case.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Partition assignment carried by a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInfo {
    /// Index of the partition to stream.
    #[serde(default)]
    pub partition: u32,
    /// Total number of partitions the dataset was split into.
    #[serde(default = "default_total_partitions")]
    pub total_partitions: u32,
}

fn default_total_partitions() -> u32 {
    1
}

impl Default for TicketInfo {
    fn default() -> Self {
        Self { partition: 0, total_partitions: 1 }
    }
}

/// Encodes a partition assignment as an opaque ticket string.
pub fn encode(info: TicketInfo) -> String {
    // Serializing a two-field struct cannot fail.
    let json = serde_json::to_vec(&info).expect("ticket serialization is infallible");
    STANDARD.encode(json)
}

/// Decodes a ticket string, falling back to partition 0 of 1 for anything
/// that is not a structured partition token.
pub fn decode(ticket: &str) -> TicketInfo {
    if ticket.is_empty() {
        return TicketInfo::default();
    }
    match STANDARD.decode(ticket) {
        Ok(raw) => match serde_json::from_slice::<TicketInfo>(&raw) {
            Ok(info) => info,
            Err(err) => {
                // Valid base64 that is not the partition object smells like a
                // corrupted structured ticket, not a plain dataset name.
                tracing::warn!(
                    ticket = %preview(ticket),
                    %err,
                    "ticket decoded as base64 but not as a partition token; streaming whole dataset"
                );
                TicketInfo::default()
            }
        },
        Err(_) => {
            tracing::debug!(ticket = %preview(ticket), "ticket is a plain dataset name");
            TicketInfo::default()
        }
    }
}

/// Truncated view of a ticket for log lines.
fn preview(ticket: &str) -> &str {
    let end = ticket
        .char_indices()
        .nth(48)
        .map_or(ticket.len(), |(idx, _)| idx);
    &ticket[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for (partition, total) in [(0, 1), (1, 2), (3, 4), (7, 8)] {
            let encoded = encode(TicketInfo { partition, total_partitions: total });
            let decoded = decode(&encoded);
            assert_eq!(decoded.partition, partition);
            assert_eq!(decoded.total_partitions, total);
        }
    }

    #[test]
    fn plain_dataset_name_defaults() {
        assert_eq!(decode("sales"), TicketInfo::default());
    }

    #[test]
    fn empty_ticket_defaults() {
        assert_eq!(decode(""), TicketInfo::default());
    }

    #[test]
    fn garbage_base64_defaults() {
        // Valid base64, invalid JSON inside.
        let encoded = STANDARD.encode(b"not json at all");
        assert_eq!(decode(&encoded), TicketInfo::default());
    }

    #[test]
    fn missing_fields_default() {
        let encoded = STANDARD.encode(b"{}");
        let decoded = decode(&encoded);
        assert_eq!(decoded.partition, 0);
        assert_eq!(decoded.total_partitions, 1);

        let encoded = STANDARD.encode(br#"{"partition": 2}"#);
        let decoded = decode(&encoded);
        assert_eq!(decoded.partition, 2);
        assert_eq!(decoded.total_partitions, 1);
    }
}
