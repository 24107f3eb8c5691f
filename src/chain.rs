//! Local chain state
//!
//! The RPC surface only needs the tip: height plus broadhash. Both live under
//! one lock so a reader can never pair a height with a broadhash it did not
//! coexist with.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{BlockHeight, Broadhash, ChainSnapshot};

/// Read access to the local chain tip
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Height and broadhash as of one ordering point
    async fn snapshot(&self) -> ChainSnapshot;
}

/// In-process chain tip, updated by block processing
pub struct LocalChain {
    tip: RwLock<ChainSnapshot>,
}

impl LocalChain {
    /// Start from the genesis view: the broadhash is the network hash
    pub fn genesis(nethash: Broadhash, initial_height: BlockHeight) -> Self {
        Self {
            tip: RwLock::new(ChainSnapshot {
                height: initial_height,
                broadhash: nethash,
            }),
        }
    }

    /// Move the tip
    pub async fn update(&self, height: BlockHeight, broadhash: Broadhash) {
        let mut tip = self.tip.write().await;
        *tip = ChainSnapshot { height, broadhash };
        debug!("Chain tip moved to height={} broadhash={}", height, broadhash);
    }
}

#[async_trait]
impl ChainState for LocalChain {
    async fn snapshot(&self) -> ChainSnapshot {
        *self.tip.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_genesis_snapshot() {
        let chain = LocalChain::genesis(Broadhash([7u8; 32]), 1);
        let snapshot = chain.snapshot().await;

        assert_eq!(snapshot.height, 1);
        assert_eq!(snapshot.broadhash, Broadhash([7u8; 32]));
    }

    #[tokio::test]
    async fn test_update_is_seen_as_a_pair() {
        let chain = Arc::new(LocalChain::genesis(Broadhash([0u8; 32]), 1));

        let writer = {
            let chain = chain.clone();
            tokio::spawn(async move {
                for h in 2..200u64 {
                    chain.update(h, Broadhash([h as u8; 32])).await;
                }
            })
        };

        for _ in 0..200 {
            let snapshot = chain.snapshot().await;
            if snapshot.height > 1 {
                assert_eq!(snapshot.broadhash, Broadhash([snapshot.height as u8; 32]));
            }
        }

        writer.await.unwrap();
        assert_eq!(chain.snapshot().await.height, 199);
    }
}
