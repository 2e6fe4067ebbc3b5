//! Torrent metadata handling.
//!
//! A torrent metadata file describes a single file to be shared: the
//! tracker to announce to, the file's name and length, the piece size,
//! and a SHA-1 digest per piece. The [`Metainfo`] struct is the parsed
//! form; it is built once and immutable afterwards.
//!
//! The info hash — the torrent's identity on the wire and toward the
//! tracker — is a SHA-1 digest of the exact raw bytes the `info`
//! dictionary occupies in the file, so it is stable regardless of any
//! surrounding keys.

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{Info, Metainfo};

#[cfg(test)]
mod tests;
