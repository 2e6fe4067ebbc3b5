use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};
use crate::constants::{MAX_MESSAGE_SIZE, READ_TIMEOUT, WRITE_TIMEOUT};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Splits a connected stream into the session's framed halves.
///
/// The reader stays with the session loop; the writer goes behind the
/// session handle's lock so externally driven choke/unchoke sends never
/// interleave with the loop's own writes.
pub fn split(stream: TcpStream) -> (MessageReader, MessageWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        MessageReader {
            stream: read_half,
            buf: BytesMut::with_capacity(32 * 1024),
        },
        MessageWriter { stream: write_half },
    )
}

/// Buffered, length-prefix framed reader over the receive half.
///
/// Every read carries the fixed timeout: a peer that stays silent past
/// it (not even a keep-alive) is presumed dead and the session ends.
pub struct MessageReader {
    stream: OwnedReadHalf,
    buf: BytesMut,
}

impl MessageReader {
    async fn fill(&mut self, needed: usize) -> Result<(), PeerError> {
        while self.buf.len() < needed {
            let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .map_err(|_| PeerError::Timeout)??;

            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
        }
        Ok(())
    }

    pub async fn read_handshake(&mut self) -> Result<Handshake, PeerError> {
        self.fill(HANDSHAKE_LEN).await?;
        let data = self.buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    pub async fn read_message(&mut self) -> Result<Message, PeerError> {
        self.fill(4).await?;

        let length = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(PeerError::InvalidMessage(format!(
                "message too large: {}",
                length
            )));
        }

        self.fill(4 + length).await?;
        let frame = self.buf.split_to(4 + length);
        Message::decode(frame.freeze())
    }
}

/// Framed writer over the send half.
pub struct MessageWriter {
    stream: OwnedWriteHalf,
}

impl MessageWriter {
    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        let data = handshake.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }
}
