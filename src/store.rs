//! The piece store.
//!
//! [`PieceStore`] is the single owner of piece buffers, piece lifecycle
//! state, the rarity table, the local bitfield, byte counters, and the
//! on-disk layout (data file plus sidecar). Peer sessions claim pieces
//! from it, commit verified bytes back into it, and serve upload
//! requests out of its in-memory buffers; it is the only mutator of
//! piece state.
//!
//! Rarity counts feed rarest-first selection: grabbing the pieces the
//! fewest connected peers hold first reduces the chance that the last
//! copies of a rare piece vanish when their sole holders leave.

mod error;
mod piece_store;

pub use error::StoreError;
pub use piece_store::{PieceState, PieceStore};

#[cfg(test)]
mod tests;
