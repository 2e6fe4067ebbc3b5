use super::error::StoreError;
use crate::bitfield::Bitfield;
use crate::metainfo::Info;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

/// Lifecycle state of one piece.
///
/// A piece moves `Missing → Downloading → Complete`, or back to
/// `Missing` when its downloader gives up or the hash check fails.
/// `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
    Missing,
    Downloading,
    Complete,
}

struct StoreState {
    states: Vec<PieceState>,
    buffers: Vec<Option<Bytes>>,
    bitfield: Bitfield,
    complete: usize,
}

struct DiskFiles {
    data: File,
    sidecar: File,
}

/// Owns the piece buffers, piece lifecycle, rarity table, local
/// bitfield, byte counters, and the on-disk layout.
///
/// The data file is pre-sized to the total length with piece `i` at
/// offset `i * piece_length`. A sidecar file next to it records the
/// cumulative downloaded and uploaded byte counts (two big-endian
/// `u64`s) followed by the raw local bitfield; it is rewritten on every
/// committed piece so a restart recognizes completed pieces without
/// re-downloading or re-verifying them.
pub struct PieceStore {
    piece_length: u32,
    total_length: u64,
    piece_count: usize,
    state: Mutex<StoreState>,
    rarity: Mutex<Vec<u32>>,
    downloaded: AtomicU64,
    uploaded: AtomicU64,
    disk: TokioMutex<DiskFiles>,
}

impl PieceStore {
    /// Opens the store at `path`, resuming from the sidecar if the data
    /// file already exists with nonzero length.
    ///
    /// Resumed pieces are re-read from disk into memory and marked
    /// `Complete` without hashing: they were verified when first
    /// written.
    pub async fn open(path: impl AsRef<Path>, torrent: &Info) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let piece_count = torrent.piece_count();

        let mut data = open_rw(path).await?;
        let mut sidecar = open_rw(&sidecar_path(path)).await?;
        let existing = data.metadata().await?.len();

        let mut state = StoreState {
            states: vec![PieceState::Missing; piece_count],
            buffers: vec![None; piece_count],
            bitfield: Bitfield::new(piece_count),
            complete: 0,
        };
        let mut downloaded = 0u64;
        let mut uploaded = 0u64;

        if existing == 0 {
            data.set_len(torrent.total_length).await?;
            write_sidecar(&mut sidecar, 0, 0, state.bitfield.as_bytes()).await?;
        } else {
            let (down, up, bits) = read_sidecar(&mut sidecar, state.bitfield.byte_len()).await?;
            downloaded = down;
            uploaded = up;

            let bitfield = Bitfield::from_message_bytes(&bits, piece_count)
                .ok_or(StoreError::CorruptSidecar)?;
            for index in bitfield.ones() {
                let size = torrent.piece_size(index as u32) as usize;
                data.seek(SeekFrom::Start(
                    index as u64 * torrent.piece_length as u64,
                ))
                .await?;
                let mut buf = vec![0u8; size];
                data.read_exact(&mut buf).await?;

                state.buffers[index] = Some(Bytes::from(buf));
                state.states[index] = PieceState::Complete;
                state.complete += 1;
            }
            state.bitfield = bitfield;
            info!(
                resumed = state.complete,
                total = piece_count,
                "resumed piece store from sidecar"
            );
        }

        Ok(Self {
            piece_length: torrent.piece_length,
            total_length: torrent.total_length,
            piece_count,
            state: Mutex::new(state),
            rarity: Mutex::new(vec![0; piece_count]),
            downloaded: AtomicU64::new(downloaded),
            uploaded: AtomicU64::new(uploaded),
            disk: TokioMutex::new(DiskFiles { data, sidecar }),
        })
    }

    /// Claims a `Missing` piece for download.
    ///
    /// Returns false if another session already claimed it, in which
    /// case the caller must pick a different piece.
    pub fn try_begin_download(&self, index: u32) -> bool {
        let mut state = self.state.lock();
        match state.states.get(index as usize) {
            Some(PieceState::Missing) => {
                state.states[index as usize] = PieceState::Downloading;
                true
            }
            _ => false,
        }
    }

    /// Returns a `Downloading` piece to `Missing`. No-op if the piece is
    /// already `Complete`.
    pub fn abandon_download(&self, index: u32) {
        let mut state = self.state.lock();
        if let Some(slot) = state.states.get_mut(index as usize) {
            if *slot != PieceState::Complete {
                *slot = PieceState::Missing;
            }
        }
    }

    /// Stores a verified piece: memory, local bitfield, data file, and
    /// sidecar.
    pub async fn commit_piece(&self, index: u32, data: Bytes) -> Result<(), StoreError> {
        let expected = self
            .piece_size(index)
            .ok_or(StoreError::InvalidPieceIndex(index))?;
        if data.len() != expected as usize {
            return Err(StoreError::SizeMismatch {
                piece: index,
                expected,
                actual: data.len(),
            });
        }

        let bits = {
            let mut state = self.state.lock();
            let i = index as usize;
            if state.states[i] != PieceState::Complete {
                state.states[i] = PieceState::Complete;
                state.bitfield.set(i);
                state.complete += 1;
            }
            state.buffers[i] = Some(data.clone());
            state.bitfield.to_bytes()
        };

        let downloaded = self.downloaded.load(Ordering::Relaxed);
        let uploaded = self.uploaded.load(Ordering::Relaxed);

        let mut disk = self.disk.lock().await;
        disk.data
            .seek(SeekFrom::Start(index as u64 * self.piece_length as u64))
            .await?;
        disk.data.write_all(&data).await?;
        disk.data.flush().await?;
        write_sidecar(&mut disk.sidecar, downloaded, uploaded, &bits).await?;

        debug!(piece = index, "committed piece");
        Ok(())
    }

    /// Rarest-first piece selection.
    ///
    /// Among pieces the peer has and we are `Missing`, finds the
    /// minimum rarity count and picks uniformly at random among the
    /// ties. Random choice spreads sessions across equally rare pieces
    /// instead of stampeding the same one.
    pub fn select_piece(&self, peer_bits: &Bitfield) -> Option<u32> {
        self.select_piece_with(peer_bits, &mut rand::rng())
    }

    pub fn select_piece_with<R: Rng + ?Sized>(
        &self,
        peer_bits: &Bitfield,
        rng: &mut R,
    ) -> Option<u32> {
        let state = self.state.lock();
        let rarity = self.rarity.lock();

        let mut min = u32::MAX;
        let mut tied: Vec<u32> = Vec::new();
        for i in 0..self.piece_count {
            if peer_bits.has(i) && state.states[i] == PieceState::Missing {
                match rarity[i].cmp(&min) {
                    std::cmp::Ordering::Less => {
                        min = rarity[i];
                        tied.clear();
                        tied.push(i as u32);
                    }
                    std::cmp::Ordering::Equal => tied.push(i as u32),
                    std::cmp::Ordering::Greater => {}
                }
            }
        }

        if tied.is_empty() {
            None
        } else {
            Some(tied[rng.random_range(0..tied.len())])
        }
    }

    /// Notes that one more connected peer has `index`.
    pub fn increment_rarity(&self, index: u32) {
        let mut rarity = self.rarity.lock();
        if let Some(count) = rarity.get_mut(index as usize) {
            *count += 1;
        }
    }

    /// Notes that a peer holding `index` went away.
    pub fn decrement_rarity(&self, index: u32) {
        let mut rarity = self.rarity.lock();
        if let Some(count) = rarity.get_mut(index as usize) {
            *count = count.saturating_sub(1);
        }
    }

    /// Pieces the peer has that we lack. `None` when the peer's field
    /// length does not match ours.
    pub fn useful_bits(&self, peer_bits: &Bitfield) -> Option<Bitfield> {
        self.state.lock().bitfield.useful_bits(peer_bits)
    }

    /// State of the piece at `index`.
    pub fn piece_state(&self, index: u32) -> Option<PieceState> {
        self.state.lock().states.get(index as usize).copied()
    }

    /// Byte size of the piece at `index`.
    pub fn piece_size(&self, index: u32) -> Option<u32> {
        if (index as usize) >= self.piece_count {
            return None;
        }
        if index as usize + 1 == self.piece_count {
            Some(match (self.total_length % self.piece_length as u64) as u32 {
                0 => self.piece_length,
                rem => rem,
            })
        } else {
            Some(self.piece_length)
        }
    }

    /// A sub-range of a `Complete` piece, served from memory.
    pub fn read_block(&self, index: u32, begin: u32, length: u32) -> Option<Bytes> {
        let state = self.state.lock();
        let buf = state.buffers.get(index as usize)?.as_ref()?;
        let begin = begin as usize;
        let end = begin.checked_add(length as usize)?;
        if end > buf.len() {
            return None;
        }
        Some(buf.slice(begin..end))
    }

    /// Snapshot of the local bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.state.lock().bitfield.clone()
    }

    pub fn add_downloaded(&self, amount: u64) {
        self.downloaded.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn add_uploaded(&self, amount: u64) {
        self.uploaded.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    /// Bytes still needed, counted in whole missing pieces; reported to
    /// the tracker as `left`.
    pub fn bytes_left(&self) -> u64 {
        let complete = self.state.lock().complete;
        (self.piece_count - complete) as u64 * self.piece_length as u64
    }

    pub fn complete_count(&self) -> usize {
        self.state.lock().complete
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().complete == self.piece_count
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".meta");
    PathBuf::from(name)
}

async fn open_rw(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?)
}

async fn read_sidecar(
    file: &mut File,
    bitfield_len: usize,
) -> Result<(u64, u64, Vec<u8>), StoreError> {
    file.seek(SeekFrom::Start(0)).await?;

    let mut header = [0u8; 16];
    file.read_exact(&mut header)
        .await
        .map_err(|_| StoreError::CorruptSidecar)?;

    let mut bits = vec![0u8; bitfield_len];
    file.read_exact(&mut bits)
        .await
        .map_err(|_| StoreError::CorruptSidecar)?;

    let mut down = [0u8; 8];
    let mut up = [0u8; 8];
    down.copy_from_slice(&header[..8]);
    up.copy_from_slice(&header[8..]);

    Ok((u64::from_be_bytes(down), u64::from_be_bytes(up), bits))
}

async fn write_sidecar(
    file: &mut File,
    downloaded: u64,
    uploaded: u64,
    bits: &[u8],
) -> Result<(), StoreError> {
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(&downloaded.to_be_bytes()).await?;
    file.write_all(&uploaded.to_be_bytes()).await?;
    file.write_all(bits).await?;
    file.flush().await?;
    Ok(())
}
