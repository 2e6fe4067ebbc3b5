use super::registry::PeerRegistry;
use crate::constants::{CHOKE_TICK, CHOKE_TICKS_PER_ROUND};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Scheduling inputs snapshotted from one session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotCandidate {
    pub granted: bool,
    pub interested: bool,
    pub recent_bytes: u64,
}

/// One round's decision: which session loses its slot, and which (if
/// any) inherits it.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Rotation {
    pub revoke: usize,
    pub grant: Option<usize>,
}

/// The slot-rotation policy, free of I/O so it can be tested directly.
///
/// Only rotates when the granted count has reached the cap: the session
/// with the smallest recent byte total loses its slot, and one session
/// chosen uniformly at random among the interested-and-choked (the
/// fresh victim included) inherits it. Under the cap, sessions grant
/// themselves slots as peers declare interest, so there is nothing to
/// do here.
pub(crate) fn plan_rotation<R: Rng + ?Sized>(
    candidates: &[SlotCandidate],
    cap: usize,
    rng: &mut R,
) -> Option<Rotation> {
    let granted_count = candidates.iter().filter(|c| c.granted).count();
    if granted_count < cap {
        return None;
    }

    let revoke = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.granted)
        .min_by_key(|(_, c)| c.recent_bytes)
        .map(|(i, _)| i)?;

    let eligible: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| c.interested && (!c.granted || *i == revoke))
        .map(|(i, _)| i)
        .collect();

    let grant = if eligible.is_empty() {
        None
    } else {
        Some(eligible[rng.random_range(0..eligible.len())])
    };

    Some(Rotation { revoke, grant })
}

/// Periodically re-partitions the upload slots among interested peers.
///
/// Runs on short ticks so the owning task can be dropped promptly;
/// every [`CHOKE_TICKS_PER_ROUND`] ticks it prunes dead sessions and
/// rotates one slot away from the worst recent contributor.
pub struct ChokeScheduler {
    registry: Arc<PeerRegistry>,
}

impl ChokeScheduler {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    /// Runs forever; abort the owning task to stop it.
    pub async fn run(self) {
        let mut tick = tokio::time::interval(CHOKE_TICK);
        loop {
            for _ in 0..CHOKE_TICKS_PER_ROUND {
                tick.tick().await;
                self.registry.prune();
            }
            self.rotate().await;
        }
    }

    async fn rotate(&self) {
        let peers = self.registry.snapshot();
        if peers.is_empty() {
            return;
        }

        let candidates: Vec<SlotCandidate> = peers
            .iter()
            .map(|peer| SlotCandidate {
                granted: peer.is_granted(),
                interested: peer.is_interested(),
                recent_bytes: peer.recent_bytes(),
            })
            .collect();

        let Some(rotation) =
            plan_rotation(&candidates, self.registry.slots().cap(), &mut rand::rng())
        else {
            return;
        };

        if !peers[rotation.revoke].choke().await {
            // the victim vanished mid-round; try again next period
            return;
        }
        debug!(
            addr = %peers[rotation.revoke].addr(),
            "revoked upload slot from worst recent contributor"
        );

        // Fresh measurement window for the next round.
        for peer in &peers {
            peer.request_reset();
        }

        let granted = match rotation.grant {
            Some(index) => {
                let ok = peers[index].unchoke().await;
                if ok {
                    debug!(addr = %peers[index].addr(), "granted upload slot");
                }
                ok
            }
            None => false,
        };

        if !granted {
            // A slot was revoked but nobody inherited it; return it to
            // the pool so the counter does not drift.
            self.registry.slots().release();
        }
    }
}
