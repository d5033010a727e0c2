use std::sync::Arc;

use crate::rpc::ChainRpc;

/// One destination-chain block, mapped onto the relayer turn schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    /// The finalized block height the round was derived from.
    pub block_height: u64,
    /// `block_height % total_relayers`.
    pub block_round: u64,
}

impl Round {
    /// A round that belongs to no relayer. Returned when the chain could not
    /// be reached, so callers just sleep and retry.
    pub fn sentinel() -> Self {
        Self { block_height: 0, block_round: u64::MAX }
    }
}

/// Maps the finalized head of the destination chain to the current relayer
/// turn.
#[derive(Debug, Clone)]
pub struct RoundClock<R> {
    rpc: Arc<R>,
    total_relayers: u64,
}

impl<R: ChainRpc> RoundClock<R> {
    /// A clock over `total_relayers` turns.
    pub fn new(rpc: Arc<R>, total_relayers: u64) -> Self {
        Self { rpc, total_relayers }
    }

    /// The current round, derived from the finalized head.
    ///
    /// Fails soft: any RPC failure yields [`Round::sentinel`].
    pub async fn current_round(&self) -> Round {
        match self.fetch_round().await {
            Ok(round) => round,
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch the finalized round");
                Round::sentinel()
            }
        }
    }

    async fn fetch_round(&self) -> crate::Result<Round> {
        let head = self.rpc.finalized_head().await?;
        let header = self.rpc.header(head).await?;
        Ok(Round {
            block_height: header.number,
            block_round: header.number % self.total_relayers,
        })
    }
}
