use std::collections::{BTreeMap, HashMap};

use crate::sync::index::types::{BlockHeight, Transaction, TxId};

use super::{ChainBlock, ChainSource, ChainSourceError};

/// Chain held entirely in memory, for replaying fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChain {
    blocks: BTreeMap<BlockHeight, Vec<TxId>>,
    txs: HashMap<TxId, Transaction>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block containing `txs` (in the given order) at `height`, replacing any block
    /// previously stored there.
    pub fn add_block(&mut self, height: BlockHeight, txs: Vec<Transaction>) {
        let tx_ids = txs.iter().map(|tx| tx.id.clone()).collect();

        for tx in txs {
            self.txs.insert(tx.id.clone(), tx);
        }

        self.blocks.insert(height, tx_ids);
    }

    /// Builder style [`InMemoryChain::add_block`].
    pub fn with_block(mut self, height: BlockHeight, txs: Vec<Transaction>) -> Self {
        self.add_block(height, txs);
        self
    }

    /// Add an empty block at every height in the range which has no block yet.
    pub fn fill_empty(&mut self, from: BlockHeight, to: BlockHeight) {
        for height in from..=to {
            self.blocks.entry(height).or_default();
        }
    }
}

impl ChainSource for InMemoryChain {
    fn fetch_block(&self, height: BlockHeight) -> Result<ChainBlock, ChainSourceError> {
        self.blocks
            .get(&height)
            .map(|tx_ids| ChainBlock {
                height,
                tx_ids: tx_ids.clone(),
            })
            .ok_or_else(|| ChainSourceError::NotFound(format!("block at height {height}")))
    }

    fn fetch_transaction(
        &self,
        tx_id: &TxId,
        _height: BlockHeight,
    ) -> Result<Transaction, ChainSourceError> {
        self.txs
            .get(tx_id)
            .cloned()
            .ok_or_else(|| ChainSourceError::NotFound(format!("transaction {tx_id}")))
    }

    fn chain_head_height(&self) -> Result<BlockHeight, ChainSourceError> {
        self.blocks
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| ChainSourceError::NotFound("empty chain".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::index::types::TxInput;

    #[test]
    fn serves_blocks_and_transactions() {
        let tx = Transaction::new("a", vec![TxInput::new("z", 0)], vec![10, 20]);
        let mut chain = InMemoryChain::new().with_block(7, vec![tx.clone()]);
        chain.fill_empty(5, 8);

        let block = chain.fetch_block(7).unwrap();
        assert_eq!(block.tx_ids, vec![TxId::from("a")]);
        assert_eq!(chain.fetch_transaction(&"a".into(), 7).unwrap(), tx);
        assert!(chain.fetch_block(6).unwrap().tx_ids.is_empty());
        assert_eq!(chain.chain_head_height().unwrap(), 8);
    }

    #[test]
    fn missing_data_is_not_found() {
        let chain = InMemoryChain::new();

        let err = chain.fetch_block(1).unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(
            chain.fetch_transaction(&"nope".into(), 1),
            Err(ChainSourceError::NotFound(_))
        ));
    }
}
