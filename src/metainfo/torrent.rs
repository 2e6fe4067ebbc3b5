use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{Decoder, Value};
use sha1::{Digest, Sha1};

/// A parsed single-file torrent metadata file.
///
/// # Examples
///
/// ```no_run
/// use skein::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = Metainfo::from_bytes(&data)?;
///
/// println!("Name: {}", metainfo.info.name);
/// println!("Size: {} bytes", metainfo.info.total_length);
/// println!("Info hash: {}", metainfo.info_hash);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// Tracker announce URL.
    pub announce: String,
    /// The info dictionary contents.
    pub info: Info,
    /// SHA-1 of the raw `info` dictionary bytes.
    pub info_hash: InfoHash,
}

/// The decoded `info` dictionary of a single-file torrent.
#[derive(Debug, Clone)]
pub struct Info {
    /// Name the file will be saved as.
    pub name: String,
    /// Number of bytes per piece (the last piece may be shorter).
    pub piece_length: u32,
    /// Total length of the file in bytes.
    pub total_length: u64,
    /// SHA-1 hash of each piece, in file order.
    pub pieces: Vec<[u8; 20]>,
}

impl Metainfo {
    /// Parses a torrent metadata file from raw bytes.
    ///
    /// The top level must be a dictionary with an `announce` string and
    /// an `info` dictionary carrying `length`, `name`, `piece length`,
    /// and `pieces`; unknown keys at either level are skipped. Trailing
    /// bytes after the top dictionary are an error.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let mut dec = Decoder::new(data);
        dec.begin_dict()?;

        let mut announce = None;
        let mut info = None;

        let mut last_key = None;
        while let Some(key) = dec.dict_key(&mut last_key)? {
            match key.as_ref() {
                b"announce" => {
                    let url = dec.read_byte_string()?;
                    let url = std::str::from_utf8(&url)
                        .map_err(|_| MetainfoError::InvalidField("announce"))?;
                    announce = Some(url.to_string());
                }
                b"info" => {
                    // The info hash covers the exact raw byte span the
                    // dictionary occupies, `d`/`e` delimiters included.
                    let start = dec.position();
                    let value = dec.decode_value()?;
                    let end = dec.position();

                    let mut hasher = Sha1::new();
                    hasher.update(&data[start..end]);
                    info = Some((value, InfoHash::new(hasher.finalize().into())));
                }
                _ => {
                    dec.decode_value()?;
                }
            }
        }
        dec.expect_eof()?;

        let announce = announce.ok_or(MetainfoError::MissingField("announce"))?;
        let (info_value, info_hash) = info.ok_or(MetainfoError::MissingField("info"))?;
        let info = parse_info(&info_value)?;

        Ok(Self {
            announce,
            info,
            info_hash,
        })
    }
}

impl Info {
    /// Number of pieces in the file.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Byte size of the piece at `index`.
    ///
    /// Every piece is `piece_length` bytes except the last, which holds
    /// the remainder (or a full `piece_length` when the file length is
    /// an exact multiple).
    pub fn piece_size(&self, index: u32) -> u32 {
        if index as usize + 1 == self.pieces.len() {
            match (self.total_length % self.piece_length as u64) as u32 {
                0 => self.piece_length,
                rem => rem,
            }
        } else {
            self.piece_length
        }
    }

    /// Expected SHA-1 digest for the piece at `index`.
    pub fn piece_hash(&self, index: u32) -> Option<&[u8; 20]> {
        self.pieces.get(index as usize)
    }
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .and_then(|v| v.as_str())
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();
    if name.is_empty() {
        return Err(MetainfoError::InvalidField("name"));
    }

    let total_length = dict
        .get(b"length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("length"))?;
    if total_length < 1 {
        return Err(MetainfoError::InvalidField("length"));
    }
    let total_length = total_length as u64;

    let piece_length = dict
        .get(b"piece length".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(MetainfoError::MissingField("piece length"))?;
    if piece_length < 1 || piece_length > u32::MAX as i64 {
        return Err(MetainfoError::InvalidField("piece length"));
    }
    let piece_length = piece_length as u32;

    let pieces_bytes = dict
        .get(b"pieces".as_slice())
        .and_then(|v| v.as_bytes())
        .ok_or(MetainfoError::MissingField("pieces"))?;
    if pieces_bytes.is_empty() || pieces_bytes.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let pieces: Vec<[u8; 20]> = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect();

    let expected = total_length.div_ceil(piece_length as u64);
    if pieces.len() as u64 != expected {
        return Err(MetainfoError::PieceCountMismatch {
            expected,
            found: pieces.len(),
        });
    }

    Ok(Info {
        name,
        piece_length,
        total_length,
        pieces,
    })
}
