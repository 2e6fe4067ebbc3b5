//! Tracker announce protocol.
//!
//! The tracker is reached over HTTP: an announce GET carries the info
//! hash, our peer id and listen port, and the cumulative transfer
//! counters; the bencoded response carries interval hints, optional
//! swarm statistics, and the peer list in its dictionary-list form.
//! [`AnnounceResponse::from_bytes`] is the schema reader;
//! [`HttpTracker`] is the thin HTTP glue in front of it.

mod error;
mod http;
mod response;

pub use error::TrackerError;
pub use http::HttpTracker;
pub use response::{AnnounceResponse, TrackerEvent, TrackerPeer};
