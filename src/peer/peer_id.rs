use std::fmt;

use rand::Rng as _;

/// Client name and version embedded in generated ids.
const CLIENT_TAG: &[u8; 8] = b"-SK0001-";

/// A 20-byte peer identifier: the Azureus-style client tag followed by
/// twelve random bytes.
///
/// Sent in the handshake and in tracker announces. Ids arriving on the
/// wire are arbitrary bytes; only our own follow the tag convention.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Generates a fresh id for this session.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        let (tag, noise) = id.split_at_mut(CLIENT_TAG.len());
        tag.copy_from_slice(CLIENT_TAG);
        rand::rng().fill(noise);
        Self(id)
    }

    /// Wraps a 20-byte slice; `None` for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The six-character client tag, when the id follows the Azureus
    /// `-XXnnnn-` convention.
    pub fn client_id(&self) -> Option<&str> {
        if self.0[0] == b'-' && self.0[7] == b'-' {
            std::str::from_utf8(&self.0[1..7]).ok()
        } else {
            None
        }
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.client_id() {
            Some(client) => write!(f, "PeerId({})", client),
            None => write!(f, "PeerId({:02x?})", &self.0[..8]),
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            match byte {
                b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' | b'-' => {
                    write!(f, "{}", byte as char)?;
                }
                _ => write!(f, "%{:02x}", byte)?,
            }
        }
        Ok(())
    }
}
