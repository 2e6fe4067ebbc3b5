//! skein - a single-file BitTorrent client engine
//!
//! This library implements the core of a peer-to-peer file-sharing
//! client: the strict bencode grammar, torrent metadata and tracker
//! response readers, a crash-resumable piece store with rarest-first
//! selection, per-peer wire-protocol sessions, and the upload-slot
//! scheduler that arbitrates which peers may download from us.
//!
//! # Modules
//!
//! - [`bencode`] - strict streaming bencode decoder and encoder
//! - [`metainfo`] - torrent metadata files and the info hash
//! - [`tracker`] - announce requests and response decoding
//! - [`store`] - piece lifecycle, rarity, and on-disk persistence
//! - [`peer`] - handshake, wire messages, sessions, choking, listener
//! - [`bitfield`] - the bit set underlying piece bookkeeping
//! - [`constants`] - protocol constants and tuning parameters

pub mod bencode;
pub mod bitfield;
pub mod constants;
pub mod metainfo;
pub mod peer;
pub mod store;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value};
pub use bitfield::Bitfield;
pub use metainfo::{Info, InfoHash, Metainfo, MetainfoError};
pub use peer::{
    ChokeScheduler, Handshake, Message, PeerError, PeerId, PeerListener, PeerRegistry,
    PeerSession, SessionContext, SessionHandle, UnchokeSlots,
};
pub use store::{PieceState, PieceStore, StoreError};
pub use tracker::{AnnounceResponse, HttpTracker, TrackerError, TrackerEvent, TrackerPeer};
