use super::error::PeerError;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use super::registry::{PeerRegistry, UnchokeSlots};
use super::state::{ChokeFlags, InFlight, SessionState};
use super::transport::{split, MessageReader, MessageWriter};
use crate::constants::BLOCK_SIZE;
use crate::metainfo::Metainfo;
use crate::store::{PieceState, PieceStore};
use crate::tracker::TrackerPeer;
use bytes::Bytes;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

/// Everything a session needs, passed explicitly on construction.
#[derive(Clone)]
pub struct SessionContext {
    pub metainfo: Arc<Metainfo>,
    pub store: Arc<PieceStore>,
    pub registry: Arc<PeerRegistry>,
    pub local_id: PeerId,
}

/// The externally visible half of a peer session.
///
/// Lives in the [`PeerRegistry`] so the choke scheduler can observe and
/// steer sessions it does not own. The writer sits behind an async lock
/// shared with the session loop's own send path: a scheduler-driven
/// choke and a loop-driven `piece` can never interleave bytes on the
/// socket. The choke/interest flags sit behind a session-local lock
/// taken inside the writer lock, so a flag change and its wire message
/// stay consistent.
pub struct SessionHandle {
    addr: SocketAddr,
    peer_id: [u8; 20],
    writer: TokioMutex<MessageWriter>,
    flags: Mutex<ChokeFlags>,
    recent_down: AtomicU64,
    recent_up: AtomicU64,
    reset_pending: AtomicBool,
    connected: AtomicBool,
}

impl SessionHandle {
    fn new(addr: SocketAddr, peer_id: [u8; 20], writer: MessageWriter) -> Self {
        Self {
            addr,
            peer_id,
            writer: TokioMutex::new(writer),
            flags: Mutex::new(ChokeFlags::default()),
            recent_down: AtomicU64::new(0),
            recent_up: AtomicU64::new(0),
            reset_pending: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The wire-reported peer id, authoritative once handshaken.
    pub fn peer_id(&self) -> &[u8; 20] {
        &self.peer_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    /// True when this peer currently holds an upload slot.
    pub fn is_granted(&self) -> bool {
        !self.flags.lock().am_choking
    }

    pub fn is_interested(&self) -> bool {
        self.flags.lock().peer_interested
    }

    /// Bytes moved in either direction since the last counter reset;
    /// the scheduler's measure of a peer's worth.
    pub fn recent_bytes(&self) -> u64 {
        self.recent_down.load(Ordering::Relaxed) + self.recent_up.load(Ordering::Relaxed)
    }

    /// Asks the session loop to zero its recent counters at the next
    /// pass. Deferred so a reset never races an in-flight increment.
    pub fn request_reset(&self) {
        self.reset_pending.store(true, Ordering::Relaxed);
    }

    fn apply_reset(&self) {
        if self.reset_pending.swap(false, Ordering::Relaxed) {
            self.recent_down.store(0, Ordering::Relaxed);
            self.recent_up.store(0, Ordering::Relaxed);
        }
    }

    fn add_recent_down(&self, amount: u64) {
        self.recent_down.fetch_add(amount, Ordering::Relaxed);
    }

    fn add_recent_up(&self, amount: u64) {
        self.recent_up.fetch_add(amount, Ordering::Relaxed);
    }

    fn flags_snapshot(&self) -> ChokeFlags {
        *self.flags.lock()
    }

    fn set_peer_interested(&self, value: bool) {
        self.flags.lock().peer_interested = value;
    }

    async fn send(&self, message: &Message) -> Result<(), PeerError> {
        let mut writer = self.writer.lock().await;
        writer.send(message).await
    }

    /// Scheduler path: revokes this peer's upload slot without touching
    /// the global counter (the scheduler moves the slot elsewhere).
    ///
    /// Returns false if the session vanished or holds no slot, in which
    /// case the caller skips its round.
    pub async fn choke(&self) -> bool {
        let mut writer = self.writer.lock().await;
        {
            let mut flags = self.flags.lock();
            if !self.is_connected() || flags.am_choking {
                return false;
            }
            flags.am_choking = true;
        }
        if writer.send(&Message::Choke).await.is_err() {
            self.mark_disconnected();
        }
        true
    }

    /// Scheduler path: grants an upload slot without touching the
    /// global counter. Requires the peer to be interested and currently
    /// choked.
    pub async fn unchoke(&self) -> bool {
        let mut writer = self.writer.lock().await;
        {
            let mut flags = self.flags.lock();
            if !self.is_connected() || !flags.am_choking || !flags.peer_interested {
                return false;
            }
            flags.am_choking = false;
        }
        if writer.send(&Message::Unchoke).await.is_err() {
            self.mark_disconnected();
        }
        true
    }

    /// Session-loop path: grants a slot to an interested, choked peer
    /// if the global counter admits one.
    async fn maybe_grant(&self, slots: &UnchokeSlots) -> Result<(), PeerError> {
        let mut writer = self.writer.lock().await;
        let granted = {
            let mut flags = self.flags.lock();
            if flags.peer_interested && flags.am_choking && slots.try_acquire() {
                flags.am_choking = false;
                true
            } else {
                false
            }
        };
        if granted {
            debug!(addr = %self.addr, "granting upload slot");
            writer.send(&Message::Unchoke).await?;
        }
        Ok(())
    }

    /// Session-loop path: the peer withdrew interest; revoke any slot
    /// it held and return it to the global pool.
    async fn peer_not_interested(&self, slots: &UnchokeSlots) -> Result<(), PeerError> {
        let mut writer = self.writer.lock().await;
        let had_slot = {
            let mut flags = self.flags.lock();
            flags.peer_interested = false;
            if !flags.am_choking {
                flags.am_choking = true;
                true
            } else {
                false
            }
        };
        if had_slot {
            slots.release();
            debug!(addr = %self.addr, "revoking upload slot, peer lost interest");
            writer.send(&Message::Choke).await?;
        }
        Ok(())
    }
}

/// One session per connected peer: handshake, then the message state
/// machine until the socket dies.
pub struct PeerSession {
    ctx: SessionContext,
    reader: MessageReader,
    handle: Arc<SessionHandle>,
    state: SessionState,
}

impl PeerSession {
    /// Dials a peer from a tracker's address list and handshakes.
    pub async fn connect(peer: &TrackerPeer, ctx: SessionContext) -> Result<Self, PeerError> {
        let stream = TcpStream::connect((peer.ip.as_str(), peer.port)).await?;
        Self::handshake(stream, ctx, Some(&peer.id)).await
    }

    /// Answers an inbound connection's handshake.
    pub async fn accept(stream: TcpStream, ctx: SessionContext) -> Result<Self, PeerError> {
        Self::handshake(stream, ctx, None).await
    }

    async fn handshake(
        stream: TcpStream,
        ctx: SessionContext,
        promised_id: Option<&Bytes>,
    ) -> Result<Self, PeerError> {
        let addr = stream.peer_addr()?;
        let (mut reader, mut writer) = split(stream);

        let ours = Handshake::new(*ctx.metainfo.info_hash.as_bytes(), *ctx.local_id.as_bytes());
        writer.send_handshake(&ours).await?;

        let theirs = reader.read_handshake().await?;
        if theirs.info_hash != *ctx.metainfo.info_hash.as_bytes() {
            return Err(PeerError::InfoHashMismatch);
        }
        if theirs.reserved != [0u8; 8] {
            warn!(%addr, "nonzero reserved bytes in handshake");
        }
        if let Some(promised) = promised_id {
            // The wire-reported id wins; the tracker's copy may be stale.
            if !promised.is_empty() && promised.as_ref() != &theirs.peer_id[..] {
                warn!(%addr, "peer id differs from tracker-announced id");
            }
        }

        let handle = Arc::new(SessionHandle::new(addr, theirs.peer_id, writer));
        ctx.registry.register(handle.clone());
        info!(%addr, "handshake complete");

        let state = SessionState::new(ctx.store.piece_count());
        Ok(Self {
            ctx,
            reader,
            handle,
            state,
        })
    }

    /// The handle other components use to observe and steer this
    /// session.
    pub fn handle(&self) -> Arc<SessionHandle> {
        self.handle.clone()
    }

    /// Runs the session until the peer disconnects or violates the
    /// protocol, then cleans up. Failures stay with this session.
    pub async fn run(mut self) {
        let addr = self.handle.addr();
        match self.message_loop().await {
            Ok(()) => {}
            Err(PeerError::ConnectionClosed) => debug!(%addr, "peer disconnected"),
            Err(PeerError::Timeout) => debug!(%addr, "peer timed out"),
            Err(PeerError::Store(err)) => error!(%addr, %err, "store failure during session"),
            Err(err) => warn!(%addr, %err, "peer session failed"),
        }
        self.teardown();
    }

    async fn message_loop(&mut self) -> Result<(), PeerError> {
        loop {
            self.handle.apply_reset();
            self.handle.maybe_grant(self.ctx.registry.slots()).await?;
            self.announce_new_pieces().await?;

            if !self.state.am_interested && self.state.has_useful {
                self.state.am_interested = true;
                self.handle.send(&Message::Interested).await?;
            } else if !self.state.peer_choking && self.state.am_interested {
                if !self.state.has_useful {
                    self.state.am_interested = false;
                    self.handle.send(&Message::NotInterested).await?;
                } else if self.state.in_flight.is_none() {
                    self.begin_next_piece().await?;
                } else if self.state.in_flight.as_ref().is_some_and(|f| f.awaiting) {
                    self.read_one().await?;
                } else if self.state.in_flight.as_ref().is_some_and(|f| f.is_full()) {
                    self.finish_piece().await?;
                } else {
                    self.request_next_block().await?;
                }
            } else {
                self.read_one().await?;
            }
        }
    }

    /// Tells the peer about pieces completed since the last pass.
    async fn announce_new_pieces(&mut self) -> Result<(), PeerError> {
        let local = self.ctx.store.bitfield();
        for index in local.ones() {
            if !self.state.known_bits.has(index) {
                self.state.known_bits.set(index);
                self.handle.send(&Message::Have { piece: index as u32 }).await?;
            }
        }
        Ok(())
    }

    /// Picks, claims, and starts requesting the next piece.
    async fn begin_next_piece(&mut self) -> Result<(), PeerError> {
        let selected = self
            .state
            .peer_bits
            .as_ref()
            .and_then(|bits| self.ctx.store.select_piece(bits));

        let Some(piece) = selected else {
            self.state.has_useful = false;
            self.state.am_interested = false;
            self.handle.send(&Message::NotInterested).await?;
            return Ok(());
        };

        if !self.ctx.store.try_begin_download(piece) {
            // another session claimed it between select and claim
            return Ok(());
        }

        let Some(size) = self.ctx.store.piece_size(piece) else {
            self.ctx.store.abandon_download(piece);
            return Ok(());
        };

        debug!(addr = %self.handle.addr(), piece, "starting piece download");
        self.state.in_flight = Some(InFlight::new(piece, size as usize));
        self.request_next_block().await
    }

    async fn request_next_block(&mut self) -> Result<(), PeerError> {
        let Some(flight) = self.state.in_flight.as_mut() else {
            return Ok(());
        };

        let request = Message::Request {
            index: flight.piece,
            begin: flight.done as u32,
            length: flight.next_block_len(),
        };
        flight.awaiting = true;
        self.handle.send(&request).await
    }

    /// Hash-checks a filled piece buffer: commit on match, restart the
    /// same piece from scratch on mismatch.
    async fn finish_piece(&mut self) -> Result<(), PeerError> {
        let Some(flight) = self.state.in_flight.as_mut() else {
            return Ok(());
        };

        let mut hasher = Sha1::new();
        hasher.update(&flight.buf);
        let digest: [u8; 20] = hasher.finalize().into();

        if self.ctx.metainfo.info.piece_hash(flight.piece) == Some(&digest) {
            let piece = flight.piece;
            let data = Bytes::from(std::mem::take(&mut flight.buf));
            self.state.in_flight = None;

            self.ctx.store.commit_piece(piece, data).await?;
            info!(
                piece,
                have = self.ctx.store.complete_count(),
                total = self.ctx.store.piece_count(),
                "downloaded and verified piece"
            );
        } else {
            warn!(
                addr = %self.handle.addr(),
                piece = flight.piece,
                "piece failed verification, downloading again"
            );
            flight.restart();
        }
        Ok(())
    }

    /// Reads one message and applies its effect.
    async fn read_one(&mut self) -> Result<(), PeerError> {
        let message = self.reader.read_message().await?;
        let first = self.state.first_message;
        self.state.first_message = false;

        match message {
            Message::KeepAlive => {}
            Message::Choke => {
                if let Some(piece) = self.state.on_choke() {
                    self.ctx.store.abandon_download(piece);
                }
            }
            Message::Unchoke => self.state.on_unchoke(),
            Message::Interested => {
                debug!(addr = %self.handle.addr(), "peer interested");
                self.handle.set_peer_interested(true);
            }
            Message::NotInterested => {
                debug!(addr = %self.handle.addr(), "peer not interested");
                self.handle
                    .peer_not_interested(self.ctx.registry.slots())
                    .await?;
            }
            Message::Have { piece } => {
                let missing = self.ctx.store.piece_state(piece) == Some(PieceState::Missing);
                self.state
                    .on_have(piece, self.ctx.store.piece_count(), missing)?;
                self.ctx.store.increment_rarity(piece);
            }
            Message::Bitfield(payload) => {
                let count = self.ctx.store.piece_count();
                let bits = SessionState::parse_bitfield(&payload, count, first)?;
                for index in bits.ones() {
                    self.ctx.store.increment_rarity(index as u32);
                }
                let useful = self
                    .ctx
                    .store
                    .useful_bits(&bits)
                    .ok_or(PeerError::Protocol("malformed bitfield payload"))?;
                self.state.set_peer_bits(bits, useful.any());
                debug!(addr = %self.handle.addr(), "received peer bitfield");
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                self.serve_request(index, begin, length).await?;
            }
            Message::Piece { index, begin, data } => {
                self.state.accept_block(index, begin, &data)?;
                let n = data.len() as u64;
                self.ctx.store.add_downloaded(n);
                self.handle.add_recent_down(n);
            }
        }
        Ok(())
    }

    /// Validates and answers an upload request.
    ///
    /// A request from a peer we are choking is merely ignored (the
    /// choke may still be in flight toward it); every other violation
    /// disconnects.
    async fn serve_request(&mut self, index: u32, begin: u32, length: u32) -> Result<(), PeerError> {
        let flags = self.handle.flags_snapshot();
        if flags.am_choking {
            debug!(addr = %self.handle.addr(), index, "ignoring request from choked peer");
            return Ok(());
        }
        if !flags.peer_interested {
            return Err(PeerError::Protocol("request from peer that is not interested"));
        }
        if index as usize >= self.ctx.store.piece_count() {
            return Err(PeerError::Protocol("request index out of range"));
        }
        if length == 0 || length > BLOCK_SIZE {
            return Err(PeerError::Protocol("request length out of bounds"));
        }
        if self.ctx.store.piece_state(index) != Some(PieceState::Complete) {
            return Err(PeerError::Protocol("request for incomplete piece"));
        }
        let size = self
            .ctx
            .store
            .piece_size(index)
            .ok_or(PeerError::Protocol("request index out of range"))?;
        if begin.checked_add(length).is_none_or(|end| end > size) {
            return Err(PeerError::Protocol("request beyond piece bounds"));
        }
        if self
            .state
            .peer_bits
            .as_ref()
            .is_some_and(|bits| bits.has(index as usize))
        {
            return Err(PeerError::Protocol("request for piece the peer already has"));
        }

        let data = self
            .ctx
            .store
            .read_block(index, begin, length)
            .ok_or(PeerError::Protocol("request for unavailable block"))?;

        let sent = data.len() as u64;
        self.handle.send(&Message::Piece { index, begin, data }).await?;
        self.handle.add_recent_up(sent);
        self.ctx.store.add_uploaded(sent);
        debug!(addr = %self.handle.addr(), index, begin, length, "served block");
        Ok(())
    }

    /// Releases everything this session held: its piece claim, its
    /// upload slot, and its contribution to the rarity table.
    fn teardown(&mut self) {
        if let Some(flight) = self.state.in_flight.take() {
            self.ctx.store.abandon_download(flight.piece);
        }

        let had_slot = {
            let mut flags = self.handle.flags.lock();
            if !flags.am_choking {
                flags.am_choking = true;
                true
            } else {
                false
            }
        };
        if had_slot {
            self.ctx.registry.slots().release();
        }

        if let Some(bits) = &self.state.peer_bits {
            for index in bits.ones() {
                self.ctx.store.decrement_rarity(index as u32);
            }
        }

        self.handle.mark_disconnected();
        self.ctx.registry.remove(&self.handle);
        debug!(addr = %self.handle.addr(), "session closed");
    }
}
