use sha1::{Digest, Sha1};

use super::*;
use crate::bencode::BencodeError;

/// Builds a single-file torrent with the given geometry. Piece hashes
/// are filler; only their count matters to the parser.
fn torrent_bytes(total: u64, piece_length: u32, hash_count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"d8:announce22:http://tracker.test/an4:info");
    out.extend_from_slice(info_bytes(total, piece_length, hash_count).as_slice());
    out.push(b'e');
    out
}

fn info_bytes(total: u64, piece_length: u32, hash_count: usize) -> Vec<u8> {
    let hashes: Vec<u8> = (0..hash_count * 20).map(|i| (i % 251) as u8).collect();
    let mut out = Vec::new();
    out.extend_from_slice(format!("d6:lengthi{}e4:name8:test.bin", total).as_bytes());
    out.extend_from_slice(format!("12:piece lengthi{}e", piece_length).as_bytes());
    out.extend_from_slice(format!("6:pieces{}:", hashes.len()).as_bytes());
    out.extend_from_slice(&hashes);
    out.push(b'e');
    out
}

#[test]
fn test_parse_valid_torrent() {
    let data = torrent_bytes(10, 4, 3);
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(metainfo.announce, "http://tracker.test/an");
    assert_eq!(metainfo.info.name, "test.bin");
    assert_eq!(metainfo.info.total_length, 10);
    assert_eq!(metainfo.info.piece_length, 4);
    assert_eq!(metainfo.info.piece_count(), 3);
}

#[test]
fn test_piece_hashes_split_in_order() {
    let data = torrent_bytes(10, 4, 3);
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    let hashes: Vec<u8> = (0..60).map(|i| (i % 251) as u8).collect();
    assert_eq!(metainfo.info.pieces[0], hashes[0..20]);
    assert_eq!(metainfo.info.pieces[1], hashes[20..40]);
    assert_eq!(metainfo.info.pieces[2], hashes[40..60]);
}

#[test]
fn test_info_hash_covers_raw_info_span() {
    let data = torrent_bytes(10, 4, 3);
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    let mut hasher = Sha1::new();
    hasher.update(info_bytes(10, 4, 3));
    let expected: [u8; 20] = hasher.finalize().into();

    assert_eq!(metainfo.info_hash.as_bytes(), &expected);
}

#[test]
fn test_info_hash_independent_of_surrounding_keys() {
    let plain = torrent_bytes(10, 4, 3);

    // Same info dictionary with extra top-level keys on either side.
    let mut wrapped = Vec::new();
    wrapped.extend_from_slice(b"d8:announce22:http://tracker.test/an7:comment3:abc4:info");
    wrapped.extend_from_slice(info_bytes(10, 4, 3).as_slice());
    wrapped.extend_from_slice(b"4:zzzzi9ee");

    let a = Metainfo::from_bytes(&plain).unwrap();
    let b = Metainfo::from_bytes(&wrapped).unwrap();
    assert_eq!(a.info_hash, b.info_hash);
}

#[test]
fn test_missing_announce() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d4:info");
    data.extend_from_slice(info_bytes(10, 4, 3).as_slice());
    data.push(b'e');

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::MissingField("announce"))
    ));
}

#[test]
fn test_pieces_not_multiple_of_twenty() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce22:http://tracker.test/an4:info");
    data.extend_from_slice(b"d6:lengthi10e4:name8:test.bin12:piece lengthi4e6:pieces21:");
    data.extend_from_slice(&[7u8; 21]);
    data.extend_from_slice(b"ee");

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_piece_count_mismatch() {
    // 10 bytes at piece length 4 needs 3 hashes, not 2.
    let data = torrent_bytes(10, 4, 2);
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::PieceCountMismatch {
            expected: 3,
            found: 2
        })
    ));
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut data = torrent_bytes(10, 4, 3);
    data.push(b'x');
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::Bencode(BencodeError::TrailingData { .. }))
    ));
}

#[test]
fn test_unknown_keys_skipped() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce22:http://tracker.test/an10:created by5:skein4:info");
    data.extend_from_slice(info_bytes(10, 4, 3).as_slice());
    data.push(b'e');

    assert!(Metainfo::from_bytes(&data).is_ok());
}

#[test]
fn test_last_piece_size_exact_multiple() {
    // 1 MiB at 256 KiB pieces: exactly 4 pieces, no remainder.
    let info = Info {
        name: "a".into(),
        piece_length: 262_144,
        total_length: 1_048_576,
        pieces: vec![[0u8; 20]; 4],
    };
    assert_eq!(info.piece_count(), 4);
    for i in 0..4 {
        assert_eq!(info.piece_size(i), 262_144);
    }
}

#[test]
fn test_last_piece_size_with_remainder() {
    let info = Info {
        name: "a".into(),
        piece_length: 262_144,
        total_length: 1_000_000,
        pieces: vec![[0u8; 20]; 4],
    };
    assert_eq!(info.piece_count(), 4);
    assert_eq!(info.piece_size(0), 262_144);
    assert_eq!(info.piece_size(3), 213_568);
}

#[test]
fn test_info_hash_url_encoding() {
    let hash = InfoHash::new([
        0x00, b'a', b'Z', b'9', b'~', b'-', b'_', b'.', 0xff, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00,
    ]);
    assert!(hash.url_encoded().starts_with("%00aZ9~-_.%FF%20"));
    assert_eq!(hash.to_hex().len(), 40);
}
