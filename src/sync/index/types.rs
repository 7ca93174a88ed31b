use std::fmt;

use serde::{Deserialize, Serialize};

pub type BlockHeight = u64;

/// Base-unit denominated value (satoshis).
pub type Amount = u64;

/// Opaque transaction identifier as delivered by the chain.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TxId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<bitcoin::Txid> for TxId {
    fn from(txid: bitcoin::Txid) -> Self {
        Self(txid.to_string())
    }
}

/// Reference to a transaction output: the id of the producing transaction and the output index.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
pub struct TxoRef {
    pub tx_id: TxId,
    pub txo_index: u32,
}

impl TxoRef {
    pub fn new(tx_id: impl Into<TxId>, txo_index: u32) -> Self {
        Self {
            tx_id: tx_id.into(),
            txo_index,
        }
    }
}

impl fmt::Display for TxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.txo_index)
    }
}

/// Where and by whom an output was consumed.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct SpendInfo {
    /// Height of the block containing the spending transaction
    pub height: BlockHeight,
    /// Transaction consuming the output
    pub tx_id: TxId,
    /// Index of the consuming input within the spending transaction
    pub input_index: u32,
}

/// A transaction output as tracked by the output index.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Output {
    pub txo_ref: TxoRef,
    /// Height of the block which produced the output
    pub height: BlockHeight,
    pub value: Amount,
    /// Output carries token value
    pub verified: bool,
    /// Output was seeded by the genesis transaction
    pub genesis: bool,
    pub spend_info: Option<SpendInfo>,
    /// Token value which entered the producing transaction but was not assigned to any output
    pub destroyed_value: Option<Amount>,
}

impl Output {
    pub fn new(txo_ref: TxoRef, height: BlockHeight, value: Amount) -> Self {
        Self {
            txo_ref,
            height,
            value,
            verified: false,
            genesis: false,
            spend_info: None,
            destroyed_value: None,
        }
    }

    pub fn is_unspent(&self) -> bool {
        self.spend_info.is_none()
    }

    /// Unspent output carrying token value.
    pub fn is_token_utxo(&self) -> bool {
        self.verified && self.is_unspent()
    }
}

/// Input of a transaction, pointing at a previously produced output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TxInput {
    /// Id of the transaction which produced the output being spent
    pub spending_tx_id: TxId,
    pub spending_txo_index: u32,
}

impl TxInput {
    pub fn new(spending_tx_id: impl Into<TxId>, spending_txo_index: u32) -> Self {
        Self {
            spending_tx_id: spending_tx_id.into(),
            spending_txo_index,
        }
    }

    pub fn txo_ref(&self) -> TxoRef {
        TxoRef {
            tx_id: self.spending_tx_id.clone(),
            txo_index: self.spending_txo_index,
        }
    }
}

/// A transaction output as delivered by the chain, before any token state is attached.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TxOutput {
    pub value: Amount,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
    pub id: TxId,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(id: impl Into<TxId>, inputs: Vec<TxInput>, outputs: Vec<Amount>) -> Self {
        Self {
            id: id.into(),
            inputs,
            outputs: outputs.into_iter().map(|value| TxOutput { value }).collect(),
        }
    }

    pub fn txo_ref(&self, txo_index: usize) -> TxoRef {
        TxoRef {
            tx_id: self.id.clone(),
            txo_index: txo_index as u32,
        }
    }
}

/// A block being parsed. Only held for the duration of one height.
#[derive(Clone, Debug)]
pub struct Block {
    pub height: BlockHeight,
    pub tx_ids: Vec<TxId>,
    pub txs: Vec<Transaction>,
}

impl Block {
    pub fn new(height: BlockHeight, tx_ids: Vec<TxId>) -> Self {
        let txs = Vec::with_capacity(tx_ids.len());

        Self {
            height,
            tx_ids,
            txs,
        }
    }

    pub fn add_tx(&mut self, tx: Transaction) {
        self.txs.push(tx);
    }
}
