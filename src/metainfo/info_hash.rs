use super::error::MetainfoError;
use std::fmt;

/// The 20-byte SHA-1 identity of a torrent.
///
/// Computed over the exact raw byte span the `info` dictionary occupies
/// in the metadata file. Peers agree on content by comparing this hash
/// during the handshake, and the tracker receives it percent-encoded in
/// the announce query.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    pub fn new(digest: [u8; 20]) -> Self {
        Self(digest)
    }

    /// Creates an info hash from a 20-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        if bytes.len() != 20 {
            return Err(MetainfoError::InvalidInfoHashLength);
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(40), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
    }

    /// Percent-encoded form for tracker announce URLs.
    ///
    /// RFC 3986 unreserved characters pass through literally; every
    /// other byte becomes `%XX` with uppercase hex digits.
    pub fn url_encoded(&self) -> String {
        self.0
            .iter()
            .map(|&b| {
                if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
                    (b as char).to_string()
                } else {
                    format!("%{:02X}", b)
                }
            })
            .collect()
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
