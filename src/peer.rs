//! Peer wire protocol.
//!
//! One [`PeerSession`] runs per connected peer: a fixed-format
//! handshake, then length-prefixed framed messages driving the
//! choke/interest negotiation, block-level piece exchange, and
//! integrity verification. Sessions share a [`PeerRegistry`] and its
//! upload-slot counter; the [`ChokeScheduler`] periodically moves
//! scarce slots toward the peers that recently moved the most bytes,
//! with one random grant per round so newcomers get a chance.

mod choking;
mod error;
mod listener;
mod message;
mod peer_id;
mod registry;
mod session;
mod state;
mod transport;

pub use choking::ChokeScheduler;
pub use error::PeerError;
pub use listener::PeerListener;
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN, PROTOCOL};
pub use peer_id::PeerId;
pub use registry::{PeerRegistry, UnchokeSlots};
pub use session::{PeerSession, SessionContext, SessionHandle};
pub use state::{ChokeFlags, InFlight, SessionState};
pub use transport::{split, MessageReader, MessageWriter};
