use super::error::TrackerError;
use super::response::{AnnounceResponse, TrackerEvent};
use crate::metainfo::InfoHash;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP announce client.
///
/// Builds the announce GET from the engine-supplied transfer counters
/// and hands the raw response body to [`AnnounceResponse::from_bytes`].
/// Retry cadence on failure is the caller's decision.
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn announce(
        &self,
        info_hash: &InfoHash,
        peer_id: &[u8; 20],
        port: u16,
        uploaded: u64,
        downloaded: u64,
        left: u64,
        event: TrackerEvent,
    ) -> Result<AnnounceResponse, TrackerError> {
        let url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&event={}",
            self.url,
            info_hash.url_encoded(),
            url_encode(peer_id),
            port,
            uploaded,
            downloaded,
            left,
            event.as_str()
        );

        debug!(event = event.as_str(), "sending tracker announce");

        let response = self.client.get(&url).send().await?;
        let bytes = response.bytes().await?;

        AnnounceResponse::from_bytes(&bytes)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn url_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
                format!("{}", b as char)
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
