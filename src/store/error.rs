use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Disk I/O failed. Further progress cannot be persisted, so this
    /// is fatal for the download as a whole.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("piece {piece} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        piece: u32,
        expected: u32,
        actual: usize,
    },

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    /// The sidecar next to an existing data file is unreadable or does
    /// not match the torrent geometry.
    #[error("corrupt sidecar metadata")]
    CorruptSidecar,
}
