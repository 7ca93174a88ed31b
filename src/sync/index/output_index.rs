use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Error;

use super::types::{Amount, BlockHeight, Output, SpendInfo, TxId, TxoRef};

/// Token value removed from circulation by a transaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct Burn {
    pub height: BlockHeight,
    pub amount: Amount,
}

/// Supply totals derived from the index.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize)]
pub struct IndexStats {
    /// Sum of all genesis outputs
    pub genesis_supply: Amount,
    /// Sum of all burns
    pub burned: Amount,
    /// Sum of unspent token outputs
    pub unspent: Amount,
    /// Number of unspent token outputs
    pub utxo_count: usize,
}

/// Maps transaction outputs to their token state.
///
/// Entries are owned by the index and only ever replaced as a whole, keyed by [`TxoRef`]. Insertion
/// order is preserved so iteration (and therefore snapshots) are deterministic.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct OutputIndex {
    outputs: IndexMap<TxoRef, Output>,
    burns: IndexMap<TxId, Burn>,
    // highest height which has been fully processed
    block_height: Option<BlockHeight>,
}

impl OutputIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, txo_ref: &TxoRef) -> Option<&Output> {
        self.outputs.get(txo_ref)
    }

    pub fn contains(&self, txo_ref: &TxoRef) -> bool {
        self.outputs.contains_key(txo_ref)
    }

    /// Insert or replace the entry for the output.
    pub fn put(&mut self, output: Output) {
        self.outputs.insert(output.txo_ref.clone(), output);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    pub fn burns(&self) -> impl Iterator<Item = (&TxId, &Burn)> {
        self.burns.iter()
    }

    pub fn block_height(&self) -> Option<BlockHeight> {
        self.block_height
    }

    pub fn set_block_height(&mut self, height: BlockHeight) {
        self.block_height = Some(height);
    }

    /// Height at which scanning should continue, or `None` if nothing was processed yet.
    pub fn next_height(&self) -> Option<BlockHeight> {
        self.block_height.map(|h| h + 1)
    }

    /// Mark an output as consumed, returning its value.
    ///
    /// Spend info can only be set once; a second attempt is an invariant violation.
    pub fn set_spend_info(&mut self, txo_ref: &TxoRef, spend_info: SpendInfo) -> Result<Amount, Error> {
        let height = spend_info.height;

        let Some(existing) = self.outputs.get(txo_ref) else {
            return Err(Error::Invariant {
                height,
                message: format!("spending unknown output {txo_ref}"),
            });
        };

        if existing.spend_info.is_some() {
            return Err(Error::SpendInfoAlreadySet {
                txo_ref: txo_ref.clone(),
                height,
            });
        }

        let mut updated = existing.clone();
        updated.spend_info = Some(spend_info);
        let value = updated.value;

        self.put(updated);

        Ok(value)
    }

    pub fn record_burn(&mut self, tx_id: TxId, height: BlockHeight, amount: Amount) {
        self.burns.insert(tx_id, Burn { height, amount });
    }

    pub fn burned_value(&self, tx_id: &TxId) -> Option<Amount> {
        self.burns.get(tx_id).map(|b| b.amount)
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();

        for output in self.outputs.values() {
            if output.genesis {
                stats.genesis_supply = stats.genesis_supply.saturating_add(output.value);
            }

            if output.is_token_utxo() {
                stats.unspent = stats.unspent.saturating_add(output.value);
                stats.utxo_count += 1;
            }
        }

        stats.burned = self
            .burns
            .values()
            .fold(0, |total: Amount, b| total.saturating_add(b.amount));

        stats
    }

    /// Copy of the index as it was after processing `height`.
    ///
    /// Entries produced above `height` are left out and spends recorded above it are cleared, so
    /// the copy never reflects a block beyond the boundary. The copy shares nothing with `self`.
    pub fn cloned_up_to_height(&self, height: BlockHeight) -> OutputIndex {
        let outputs = self
            .outputs
            .iter()
            .filter(|(_, output)| output.height <= height)
            .map(|(txo_ref, output)| {
                let mut output = output.clone();
                if output.spend_info.as_ref().is_some_and(|s| s.height > height) {
                    output.spend_info = None;
                }
                (txo_ref.clone(), output)
            })
            .collect();

        let burns = self
            .burns
            .iter()
            .filter(|(_, burn)| burn.height <= height)
            .map(|(tx_id, burn)| (tx_id.clone(), *burn))
            .collect();

        OutputIndex {
            outputs,
            burns,
            block_height: self.block_height.map(|h| h.min(height)),
        }
    }

    /// Truncate the index in place so it reflects the state after processing `height`.
    pub fn rollback_to(&mut self, height: BlockHeight) {
        self.outputs.retain(|_, output| output.height <= height);

        for output in self.outputs.values_mut() {
            if output.spend_info.as_ref().is_some_and(|s| s.height > height) {
                output.spend_info = None;
            }
        }

        self.burns.retain(|_, burn| burn.height <= height);

        self.block_height = self.block_height.map(|h| h.min(height));
    }
}
