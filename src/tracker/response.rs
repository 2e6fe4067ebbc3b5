use super::error::TrackerError;
use crate::bencode::{Decoder, Value};
use bytes::Bytes;
use tracing::debug;

/// A peer entry from a tracker's announce response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerPeer {
    /// The peer's self-reported 20-byte id (arbitrary bytes).
    pub id: Bytes,
    /// Host name or IP address, as sent by the tracker.
    pub ip: String,
    /// TCP port the peer listens on.
    pub port: u16,
}

/// The announce event reported to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    Started,
    Stopped,
    Completed,
}

impl TrackerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerEvent::Started => "started",
            TrackerEvent::Stopped => "stopped",
            TrackerEvent::Completed => "completed",
        }
    }
}

/// A decoded tracker announce response.
///
/// Produced fresh for every tracker round-trip and discarded after the
/// peer list has been consumed.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait between announces.
    pub interval: u32,
    /// Optional lower bound on the announce interval.
    pub min_interval: Option<u32>,
    /// Number of seeders, if the tracker reports it.
    pub complete: Option<u32>,
    /// Number of leechers, if the tracker reports it.
    pub incomplete: Option<u32>,
    /// Completed-download count, if the tracker reports it.
    pub downloaded: Option<u32>,
    pub warning_message: Option<String>,
    pub tracker_id: Option<String>,
    /// Peers to connect to. May legitimately be empty.
    pub peers: Vec<TrackerPeer>,
}

impl AnnounceResponse {
    /// Decodes a raw tracker response body.
    ///
    /// The response is valid only when no `failure reason` is present
    /// and both `interval` and `peers` were found; different trackers
    /// omit different optional statistics, so those degrade gracefully.
    /// A `failure reason` short-circuits: the dictionary must close
    /// immediately after it and nothing may follow.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TrackerError> {
        let mut dec = Decoder::new(data);
        dec.begin_dict()?;

        let mut interval = None;
        let mut min_interval = None;
        let mut complete = None;
        let mut incomplete = None;
        let mut downloaded = None;
        let mut warning_message = None;
        let mut tracker_id = None;
        let mut peers = None;

        let mut last_key = None;
        while let Some(key) = dec.dict_key(&mut last_key)? {
            match key.as_ref() {
                b"failure reason" => {
                    let reason = read_string(&mut dec, "failure reason")?;
                    if dec.dict_key(&mut last_key)?.is_some() {
                        return Err(TrackerError::InvalidResponse(
                            "data after failure reason".into(),
                        ));
                    }
                    dec.expect_eof()?;
                    return Err(TrackerError::Rejected(reason));
                }
                b"interval" => interval = Some(read_u32(&mut dec, "interval")?),
                b"min interval" => min_interval = Some(read_u32(&mut dec, "min interval")?),
                b"complete" => complete = Some(read_u32(&mut dec, "complete")?),
                b"incomplete" => incomplete = Some(read_u32(&mut dec, "incomplete")?),
                b"downloaded" => downloaded = Some(read_u32(&mut dec, "downloaded")?),
                b"warning message" => {
                    warning_message = Some(read_string(&mut dec, "warning message")?);
                }
                b"tracker id" => tracker_id = Some(read_string(&mut dec, "tracker id")?),
                b"peers" => peers = Some(read_peer_list(&mut dec)?),
                other => {
                    debug!(
                        key = %String::from_utf8_lossy(other),
                        "skipping unknown tracker response key"
                    );
                    dec.decode_value()?;
                }
            }
        }
        dec.expect_eof()?;

        let interval =
            interval.ok_or_else(|| TrackerError::InvalidResponse("missing interval".into()))?;
        let peers = peers.ok_or_else(|| TrackerError::InvalidResponse("missing peers".into()))?;

        if let Some(ref warning) = warning_message {
            debug!(warning, "tracker sent warning message");
        }

        Ok(Self {
            interval,
            min_interval,
            complete,
            incomplete,
            downloaded,
            warning_message,
            tracker_id,
            peers,
        })
    }
}

fn read_string(dec: &mut Decoder<'_>, field: &str) -> Result<String, TrackerError> {
    let bytes = dec.read_byte_string()?;
    std::str::from_utf8(&bytes)
        .map(String::from)
        .map_err(|_| TrackerError::InvalidResponse(format!("{} is not valid utf-8", field)))
}

fn read_u32(dec: &mut Decoder<'_>, field: &str) -> Result<u32, TrackerError> {
    let value = dec.read_integer()?;
    u32::try_from(value)
        .map_err(|_| TrackerError::InvalidResponse(format!("{} out of range", field)))
}

/// Reads the `peers` value: a list of per-peer dictionaries, each
/// requiring `peer id`, `ip`, and `port`. Any other payload shape is a
/// hard failure.
fn read_peer_list(dec: &mut Decoder<'_>) -> Result<Vec<TrackerPeer>, TrackerError> {
    let value = dec.decode_value()?;
    let list = value
        .as_list()
        .ok_or_else(|| TrackerError::InvalidResponse("peers is not a list".into()))?;

    let mut peers = Vec::with_capacity(list.len());
    for entry in list {
        peers.push(read_peer(entry)?);
    }
    Ok(peers)
}

fn read_peer(value: &Value) -> Result<TrackerPeer, TrackerError> {
    let dict = value
        .as_dict()
        .ok_or_else(|| TrackerError::InvalidResponse("peer entry is not a dictionary".into()))?;

    let id = dict
        .get(b"peer id".as_slice())
        .and_then(|v| v.as_bytes())
        .cloned()
        .ok_or_else(|| TrackerError::InvalidResponse("peer entry missing peer id".into()))?;

    let ip = dict
        .get(b"ip".as_slice())
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| TrackerError::InvalidResponse("peer entry missing ip".into()))?;

    let port = dict
        .get(b"port".as_slice())
        .and_then(|v| v.as_integer())
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| TrackerError::InvalidResponse("peer entry missing valid port".into()))?;

    Ok(TrackerPeer { id, ip, port })
}
