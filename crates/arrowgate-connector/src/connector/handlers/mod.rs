//! Request handlers for gateway commands.
//!
//! ## Structure
//!
//! - [`metadata`] - `get_flight_info`: dataset resolution and partition
//!   planning.
//! - [`streaming`] - `do_get`: ticket decode, partition slicing, and the
//!   stream-start / payload / stream-end framing sequence.

pub mod metadata;
pub mod streaming;
