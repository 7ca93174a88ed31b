use thiserror::Error;

use crate::{
    DecodingError,
    sync::{
        chain::ChainSourceError,
        index::types::{BlockHeight, TxId, TxoRef},
    },
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("chain data error at height {height}: {source}")]
    ChainData {
        height: BlockHeight,
        #[source]
        source: ChainSourceError,
    },

    #[error(
        "genesis tx {tx_id} found at height {found_height} but configured genesis height is {expected_height}"
    )]
    GenesisMismatch {
        tx_id: TxId,
        expected_height: BlockHeight,
        found_height: BlockHeight,
    },

    #[error(
        "intra-block resolution at height {height} did not converge after {depth} passes ({unresolved} txs unresolved)"
    )]
    RecursionExhausted {
        height: BlockHeight,
        depth: usize,
        unresolved: usize,
    },

    #[error("invariant violated at height {height}: spend info already set for {txo_ref}")]
    SpendInfoAlreadySet { txo_ref: TxoRef, height: BlockHeight },

    #[error("invariant violated at height {height}: {message}")]
    Invariant { height: BlockHeight, message: String },

    #[error("decoding error: {0}")]
    Decoding(#[from] DecodingError),

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(error: impl std::fmt::Display) -> Error {
        Error::Custom(error.to_string())
    }

    /// Height of the block whose processing failed, if the error is tied to one.
    pub fn height(&self) -> Option<BlockHeight> {
        match self {
            Error::ChainData { height, .. }
            | Error::RecursionExhausted { height, .. }
            | Error::SpendInfoAlreadySet { height, .. }
            | Error::Invariant { height, .. } => Some(*height),
            Error::GenesisMismatch { found_height, .. } => Some(*found_height),
            _ => None,
        }
    }
}

impl From<Box<dyn std::error::Error>> for Error {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        Error::custom(err)
    }
}
