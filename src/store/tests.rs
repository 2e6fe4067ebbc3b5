use super::*;
use crate::bitfield::Bitfield;
use crate::metainfo::Info;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use tempfile::TempDir;

fn test_info(total: u64, piece_length: u32) -> Info {
    let count = total.div_ceil(piece_length as u64) as usize;
    Info {
        name: "test.bin".into(),
        piece_length,
        total_length: total,
        pieces: vec![[0u8; 20]; count],
    }
}

fn full_bits(len: usize) -> Bitfield {
    let mut bits = Bitfield::new(len);
    for i in 0..len {
        bits.set(i);
    }
    bits
}

#[tokio::test]
async fn test_open_presizes_file_and_sidecar() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.bin");
    let store = PieceStore::open(&path, &test_info(100, 32)).await.unwrap();
    assert_eq!(store.piece_count(), 4);

    let data_len = tokio::fs::metadata(&path).await.unwrap().len();
    assert_eq!(data_len, 100);

    // Two u64 counters plus one bitfield byte.
    let meta_len = tokio::fs::metadata(temp.path().join("test.bin.meta"))
        .await
        .unwrap()
        .len();
    assert_eq!(meta_len, 17);
}

#[tokio::test]
async fn test_piece_lifecycle() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(100, 32))
        .await
        .unwrap();

    assert_eq!(store.piece_state(0), Some(PieceState::Missing));
    assert!(store.try_begin_download(0));
    assert_eq!(store.piece_state(0), Some(PieceState::Downloading));

    // A second claim loses the race.
    assert!(!store.try_begin_download(0));

    store.abandon_download(0);
    assert_eq!(store.piece_state(0), Some(PieceState::Missing));
    assert!(store.try_begin_download(0));

    store.commit_piece(0, Bytes::from(vec![1u8; 32])).await.unwrap();
    assert_eq!(store.piece_state(0), Some(PieceState::Complete));

    // Complete is terminal; abandoning is a no-op.
    store.abandon_download(0);
    assert_eq!(store.piece_state(0), Some(PieceState::Complete));
    assert!(!store.try_begin_download(0));
}

#[tokio::test]
async fn test_commit_rejects_wrong_size() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(100, 32))
        .await
        .unwrap();

    let result = store.commit_piece(0, Bytes::from(vec![0u8; 31])).await;
    assert!(matches!(
        result,
        Err(StoreError::SizeMismatch {
            piece: 0,
            expected: 32,
            actual: 31
        })
    ));
}

#[tokio::test]
async fn test_last_piece_size() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(100, 32))
        .await
        .unwrap();

    assert_eq!(store.piece_size(0), Some(32));
    assert_eq!(store.piece_size(3), Some(4));
    assert_eq!(store.piece_size(4), None);

    // The last piece commits at its own size, not the full length.
    assert!(store
        .commit_piece(3, Bytes::from(vec![9u8; 4]))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_commit_then_reopen_restores_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("t");
    let info = test_info(100, 32);

    {
        let store = PieceStore::open(&path, &info).await.unwrap();
        store.add_downloaded(64);
        store.add_uploaded(32);
        for index in 0..4u32 {
            let size = store.piece_size(index).unwrap() as usize;
            assert!(store.try_begin_download(index));
            store
                .commit_piece(index, Bytes::from(vec![index as u8; size]))
                .await
                .unwrap();
        }
        assert!(store.is_complete());
    }

    let store = PieceStore::open(&path, &info).await.unwrap();
    assert!(store.is_complete());
    assert_eq!(store.complete_count(), 4);
    assert_eq!(store.downloaded(), 64);
    assert_eq!(store.uploaded(), 32);
    assert_eq!(store.bytes_left(), 0);

    // Resumed pieces serve uploads from memory again.
    let block = store.read_block(2, 0, 32).unwrap();
    assert_eq!(block.as_ref(), &[2u8; 32]);
}

#[tokio::test]
async fn test_partial_resume() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("t");
    let info = test_info(100, 32);

    {
        let store = PieceStore::open(&path, &info).await.unwrap();
        store.commit_piece(1, Bytes::from(vec![7u8; 32])).await.unwrap();
    }

    let store = PieceStore::open(&path, &info).await.unwrap();
    assert_eq!(store.complete_count(), 1);
    assert_eq!(store.piece_state(0), Some(PieceState::Missing));
    assert_eq!(store.piece_state(1), Some(PieceState::Complete));
    assert_eq!(store.bytes_left(), 3 * 32);
    assert!(store.try_begin_download(0));
    assert!(!store.try_begin_download(1));
}

#[tokio::test]
async fn test_select_piece_honors_state_and_peer_bits() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(256, 32))
        .await
        .unwrap();

    // Piece 0 complete, piece 1 downloading, peer lacks piece 2.
    store.commit_piece(0, Bytes::from(vec![0u8; 32])).await.unwrap();
    assert!(store.try_begin_download(1));
    let mut peer_bits = full_bits(8);
    peer_bits.clear(2);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let choice = store.select_piece_with(&peer_bits, &mut rng).unwrap();
        assert_ne!(choice, 0);
        assert_ne!(choice, 1);
        assert_ne!(choice, 2);
    }
}

#[tokio::test]
async fn test_select_piece_prefers_rarest() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(256, 32))
        .await
        .unwrap();

    for index in 0..8 {
        store.increment_rarity(index);
        store.increment_rarity(index);
    }
    store.decrement_rarity(5);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        assert_eq!(
            store.select_piece_with(&full_bits(8), &mut rng),
            Some(5)
        );
    }
}

#[tokio::test]
async fn test_select_piece_spreads_ties() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(256, 32))
        .await
        .unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let mut seen = HashSet::new();
    for _ in 0..200 {
        seen.insert(store.select_piece_with(&full_bits(8), &mut rng).unwrap());
    }
    // All eight tied pieces should be hit with a fair coin.
    assert_eq!(seen.len(), 8);
}

#[tokio::test]
async fn test_select_piece_none_when_nothing_useful() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(64, 32))
        .await
        .unwrap();

    assert_eq!(store.select_piece(&Bitfield::new(2)), None);

    store.commit_piece(0, Bytes::from(vec![0u8; 32])).await.unwrap();
    store.commit_piece(1, Bytes::from(vec![0u8; 32])).await.unwrap();
    assert_eq!(store.select_piece(&full_bits(2)), None);
}

#[tokio::test]
async fn test_useful_bits_length_check() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(64, 32))
        .await
        .unwrap();

    assert!(store.useful_bits(&Bitfield::new(3)).is_none());

    let useful = store.useful_bits(&full_bits(2)).unwrap();
    assert_eq!(useful.count_ones(), 2);
}

#[tokio::test]
async fn test_read_block_bounds() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::open(temp.path().join("t"), &test_info(64, 32))
        .await
        .unwrap();

    // Not complete yet.
    assert!(store.read_block(0, 0, 8).is_none());

    let payload: Vec<u8> = (0..32).collect();
    store.commit_piece(0, Bytes::from(payload)).await.unwrap();

    assert_eq!(store.read_block(0, 4, 4).unwrap().as_ref(), &[4, 5, 6, 7]);
    assert!(store.read_block(0, 28, 8).is_none());
    assert!(store.read_block(1, 0, 8).is_none());
}
