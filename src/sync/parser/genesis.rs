use serde::Deserialize;
use tracing::info;

use crate::{
    error::Error,
    sync::index::{
        OutputIndex,
        types::{Amount, Block, BlockHeight, Output, Transaction, TxId},
    },
};

/// Location of the transaction which seeds all token supply.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Genesis {
    pub height: BlockHeight,
    pub tx_id: TxId,
}

impl Genesis {
    pub fn new(height: BlockHeight, tx_id: impl Into<TxId>) -> Self {
        Self {
            height,
            tx_id: tx_id.into(),
        }
    }

    /// Find the genesis transaction in the block, checking it sits at the configured height.
    pub fn find_in<'a>(&self, block: &'a Block) -> Result<Option<&'a Transaction>, Error> {
        let Some(tx) = block.txs.iter().find(|tx| tx.id == self.tx_id) else {
            return Ok(None);
        };

        if block.height != self.height {
            return Err(Error::GenesisMismatch {
                tx_id: self.tx_id.clone(),
                expected_height: self.height,
                found_height: block.height,
            });
        }

        Ok(Some(tx))
    }
}

/// Every output of the genesis transaction is a token output, whatever its value.
pub fn parse_genesis_tx(tx: &Transaction, height: BlockHeight, index: &mut OutputIndex) {
    let mut supply: Amount = 0;

    for (txo_index, tx_output) in tx.outputs.iter().enumerate() {
        let mut output = Output::new(tx.txo_ref(txo_index), height, tx_output.value);
        output.verified = true;
        output.genesis = true;

        supply = supply.saturating_add(tx_output.value);

        index.put(output);
    }

    info!(
        height,
        tx_id = %tx.id,
        outputs = tx.outputs.len(),
        supply,
        "seeded genesis outputs"
    );
}
