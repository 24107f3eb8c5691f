//! Peer discovery sink
//!
//! Accepted sessions hand their seed record to this task instead of writing
//! the directory themselves. Seeds are collected, de-duplicated by
//! `(ip, wsPort)` and merged with one `merge_seeds` batch per flush interval,
//! so a reconnecting peer keeps the height and broadhash already known.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::directory::{DirectoryError, PeerStore};
use crate::types::PeerRecord;

pub type DiscoverySender = mpsc::UnboundedSender<PeerRecord>;
pub type DiscoveryReceiver = mpsc::UnboundedReceiver<PeerRecord>;

pub fn channel() -> (DiscoverySender, DiscoveryReceiver) {
    mpsc::unbounded_channel()
}

/// Seeds waiting for the next flush, last write wins per natural key
#[derive(Default)]
pub struct PendingPeers {
    peers: HashMap<(String, u16), PeerRecord>,
}

impl PendingPeers {
    pub fn push(&mut self, peer: PeerRecord) {
        self.peers.insert(peer.key(), peer);
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Merge everything pending into the directory in one batch
    ///
    /// The pending set is emptied whether or not the write succeeds; a failed
    /// batch is reported to the caller and not retried here.
    pub fn flush(&mut self, store: &dyn PeerStore) -> Result<usize, DirectoryError> {
        if self.peers.is_empty() {
            return Ok(0);
        }

        let batch: Vec<PeerRecord> = self.peers.drain().map(|(_, peer)| peer).collect();
        store.merge_seeds(&batch)
    }
}

/// Drain the discovery channel into the directory until every sender is gone
pub async fn run_discovery(
    mut rx: DiscoveryReceiver,
    store: Arc<dyn PeerStore>,
    metrics: Arc<Metrics>,
    flush_interval_secs: u64,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(flush_interval_secs));
    let mut pending = PendingPeers::default();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(peer) => pending.push(peer),
                None => {
                    flush_pending(&mut pending, store.as_ref(), &metrics);
                    info!("Discovery channel closed");
                    return Ok(());
                }
            },
            _ = interval.tick() => flush_pending(&mut pending, store.as_ref(), &metrics),
        }
    }
}

fn flush_pending(pending: &mut PendingPeers, store: &dyn PeerStore, metrics: &Metrics) {
    let queued = pending.len();
    match pending.flush(store) {
        Ok(0) => {}
        Ok(written) => {
            metrics.add_peers_discovered(written as u64);
            debug!("📇 Recorded {} discovered peers", written);
        }
        Err(e) => warn!("Failed to record {} discovered peers: {}", queued, e),
    }
}
