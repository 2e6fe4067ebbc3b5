use thiserror::Error;

/// Errors that end a peer session.
///
/// Each of these disconnects the one offending session; none is fatal to
/// the rest of the swarm, except a store I/O failure bubbling up through
/// [`PeerError::Store`].
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent an invalid handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The peer's info hash does not match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message id.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// The peer broke a wire-protocol contract.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read or write exceeded its timeout; the peer is presumed dead.
    #[error("timeout")]
    Timeout,

    /// The piece store failed underneath the session.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}
