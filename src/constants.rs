//! Protocol constants and tuning parameters.

use std::ops::RangeInclusive;
use std::time::Duration;

// ============================================================================
// Block and message sizes
// ============================================================================

/// Largest block a `request` may ask for, and the size we request.
pub const BLOCK_SIZE: u32 = 16384;

/// Frame-size sanity bound applied before allocation. Generous on
/// purpose; per-message validation is much stricter.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Peer read timeout. Keep-alives only matter because a peer silent for
/// longer than this is treated as dead.
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Peer write timeout.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Ports
// ============================================================================

/// Conventional BitTorrent listen range; the listener binds the first
/// free port in it.
pub const LISTEN_PORTS: RangeInclusive<u16> = 6881..=6889;

// ============================================================================
// Choking
// ============================================================================

/// Upload slots available across all peers.
pub const MAX_UNCHOKED: usize = 3;

/// Scheduler tick; short so the scheduler task cancels promptly.
pub const CHOKE_TICK: Duration = Duration::from_millis(1500);

/// Ticks per rebalance round (30 seconds per round).
pub const CHOKE_TICKS_PER_ROUND: u32 = 20;
