use thiserror::Error;

use crate::bencode::BencodeError;

/// Errors that can occur when parsing a torrent metadata file.
///
/// A failed parse never yields partial metadata; callers get either a
/// complete [`Metainfo`](super::Metainfo) or one of these.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The file contains invalid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A required field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The number of piece hashes does not match the file and piece
    /// lengths.
    #[error("piece hash count {found} does not match expected {expected}")]
    PieceCountMismatch { expected: u64, found: usize },

    /// An info hash was built from a slice that is not 20 bytes.
    #[error("invalid info hash length")]
    InvalidInfoHashLength,
}
