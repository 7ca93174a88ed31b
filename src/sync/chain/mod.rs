use thiserror::Error;

use crate::sync::index::types::{BlockHeight, Transaction, TxId};

pub mod memory;
pub mod rpc;

pub use memory::InMemoryChain;
pub use rpc::RpcChainSource;

/// Header-level view of a block: its height and the ordered ids of its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub height: BlockHeight,
    pub tx_ids: Vec<TxId>,
}

#[derive(Error, Debug)]
pub enum ChainSourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl ChainSourceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Source of already decoded chain data. Retries and timeouts are the implementation's concern.
pub trait ChainSource {
    fn fetch_block(&self, height: BlockHeight) -> Result<ChainBlock, ChainSourceError>;

    fn fetch_transaction(
        &self,
        tx_id: &TxId,
        height: BlockHeight,
    ) -> Result<Transaction, ChainSourceError>;

    /// Height of the current chain tip.
    fn chain_head_height(&self) -> Result<BlockHeight, ChainSourceError>;
}

impl<C: ChainSource + ?Sized> ChainSource for &C {
    fn fetch_block(&self, height: BlockHeight) -> Result<ChainBlock, ChainSourceError> {
        (**self).fetch_block(height)
    }

    fn fetch_transaction(
        &self,
        tx_id: &TxId,
        height: BlockHeight,
    ) -> Result<Transaction, ChainSourceError> {
        (**self).fetch_transaction(tx_id, height)
    }

    fn chain_head_height(&self) -> Result<BlockHeight, ChainSourceError> {
        (**self).chain_head_height()
    }
}
