use super::session::{PeerSession, SessionContext};
use crate::constants::LISTEN_PORTS;
use std::io;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Accepts inbound peer connections.
///
/// Binds the first free port in the conventional BitTorrent range; the
/// bound port is what gets reported to the tracker.
pub struct PeerListener {
    listener: TcpListener,
    port: u16,
}

impl PeerListener {
    pub async fn bind() -> io::Result<Self> {
        for port in LISTEN_PORTS {
            match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => {
                    info!(port, "listening for peer connections");
                    return Ok(Self { listener, port });
                }
                Err(_) => continue,
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            "no free port in listen range",
        ))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept loop: one session task per inbound connection. A failed
    /// inbound handshake is logged and affects nobody else.
    pub async fn run(self, ctx: SessionContext) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "inbound peer connection");
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        match PeerSession::accept(stream, ctx).await {
                            Ok(session) => session.run().await,
                            Err(err) => warn!(%addr, %err, "inbound peer failed to connect"),
                        }
                    });
                }
                Err(err) => {
                    warn!(%err, "accept failed");
                }
            }
        }
    }
}
