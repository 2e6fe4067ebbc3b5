//! Loop-owned session state and its pure transitions.
//!
//! Everything here mutates plain data in response to decoded messages,
//! with no sockets or locks involved, so the protocol rules are
//! testable in isolation. The session loop supplies the store-dependent
//! inputs and performs the side effects the transitions report back.

use super::error::PeerError;
use crate::bitfield::Bitfield;
use crate::constants::BLOCK_SIZE;

/// Flags shared between a session's own loop and externally driven
/// choke/unchoke calls (see `SessionHandle`).
#[derive(Debug, Clone, Copy)]
pub struct ChokeFlags {
    /// We are choking the peer: no upload slot granted.
    pub am_choking: bool,
    /// The peer has declared interest in our pieces.
    pub peer_interested: bool,
}

impl Default for ChokeFlags {
    fn default() -> Self {
        Self {
            am_choking: true,
            peer_interested: false,
        }
    }
}

/// The single in-flight piece download of a session.
#[derive(Debug)]
pub struct InFlight {
    /// Piece index being downloaded.
    pub piece: u32,
    /// Accumulates the piece's bytes; sized at claim time.
    pub buf: Vec<u8>,
    /// Bytes received so far; also the `begin` of the next block.
    pub done: usize,
    /// A request is outstanding and its `piece` reply has not arrived.
    pub awaiting: bool,
}

impl InFlight {
    pub fn new(piece: u32, size: usize) -> Self {
        Self {
            piece,
            buf: vec![0; size],
            done: 0,
            awaiting: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.done == self.buf.len()
    }

    /// Length of the next block request, capped at [`BLOCK_SIZE`].
    pub fn next_block_len(&self) -> u32 {
        ((self.buf.len() - self.done) as u32).min(BLOCK_SIZE)
    }

    /// Discards received bytes to re-download the piece from offset 0.
    pub fn restart(&mut self) {
        self.done = 0;
    }
}

/// State owned exclusively by the session's own loop.
#[derive(Debug)]
pub struct SessionState {
    /// The peer is choking us.
    pub peer_choking: bool,
    /// We have declared interest in the peer's pieces.
    pub am_interested: bool,
    /// No framed message has been received yet; `bitfield` is legal
    /// only while this holds.
    pub first_message: bool,
    /// The peer has at least one piece we are missing.
    pub has_useful: bool,
    /// The peer's announced bitfield, absent until it says otherwise.
    pub peer_bits: Option<Bitfield>,
    /// Pieces the peer knows we have; drives `have` announcements.
    pub known_bits: Bitfield,
    pub in_flight: Option<InFlight>,
}

impl SessionState {
    /// Initial state on connect: both sides choking, neither side
    /// interested, nothing known and nothing in flight.
    pub fn new(piece_count: usize) -> Self {
        Self {
            peer_choking: true,
            am_interested: false,
            first_message: true,
            has_useful: false,
            peer_bits: None,
            known_bits: Bitfield::new(piece_count),
            in_flight: None,
        }
    }

    /// The peer choked us. Any in-flight piece is lost; returns its
    /// index so the caller can release the claim.
    pub fn on_choke(&mut self) -> Option<u32> {
        self.peer_choking = true;
        self.in_flight.take().map(|flight| flight.piece)
    }

    pub fn on_unchoke(&mut self) {
        self.peer_choking = false;
    }

    /// Records a `have` announcement.
    ///
    /// `missing_locally` is the store's view of the announced piece; it
    /// flips `has_useful` when the peer just became worth asking.
    pub fn on_have(
        &mut self,
        piece: u32,
        piece_count: usize,
        missing_locally: bool,
    ) -> Result<(), PeerError> {
        if piece as usize >= piece_count {
            return Err(PeerError::Protocol("have index out of range"));
        }

        self.peer_bits
            .get_or_insert_with(|| Bitfield::new(piece_count))
            .set(piece as usize);

        if missing_locally {
            self.has_useful = true;
        }
        Ok(())
    }

    /// Validates a `bitfield` payload.
    ///
    /// Legal only as the very first message (`first`); the payload must
    /// be the exact wire size with zero spare bits. Returns the parsed
    /// field so the caller can update rarity before storing it via
    /// [`SessionState::set_peer_bits`].
    pub fn parse_bitfield(
        payload: &[u8],
        piece_count: usize,
        first: bool,
    ) -> Result<Bitfield, PeerError> {
        if !first {
            return Err(PeerError::Protocol("bitfield after first message"));
        }
        Bitfield::from_message_bytes(payload, piece_count)
            .ok_or(PeerError::Protocol("malformed bitfield payload"))
    }

    pub fn set_peer_bits(&mut self, bits: Bitfield, has_useful: bool) {
        self.peer_bits = Some(bits);
        self.has_useful = has_useful;
    }

    /// Copies a received block into the in-flight buffer.
    ///
    /// The block must answer the one outstanding request exactly: same
    /// piece, `begin` equal to the bytes already done, and no overrun of
    /// the piece size.
    pub fn accept_block(&mut self, index: u32, begin: u32, data: &[u8]) -> Result<(), PeerError> {
        let flight = self
            .in_flight
            .as_mut()
            .filter(|flight| flight.awaiting)
            .ok_or(PeerError::Protocol("piece without outstanding request"))?;
        flight.awaiting = false;

        if index != flight.piece {
            return Err(PeerError::Protocol("piece for wrong index"));
        }
        if begin as usize != flight.done {
            return Err(PeerError::Protocol("piece block out of sequence"));
        }
        if flight.done + data.len() > flight.buf.len() {
            return Err(PeerError::Protocol("piece data overruns buffer"));
        }

        flight.buf[flight.done..flight.done + data.len()].copy_from_slice(data);
        flight.done += data.len();
        Ok(())
    }
}
