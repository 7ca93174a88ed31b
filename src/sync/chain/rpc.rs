use std::sync::Mutex;

use bitcoin::{BlockHash, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi, jsonrpc};
use tracing::{debug, trace};

use crate::sync::index::types::{BlockHeight, Transaction, TxId, TxInput, TxOutput};

use super::{ChainBlock, ChainSource, ChainSourceError};

// bitcoind RPC_INVALID_ADDRESS_OR_KEY / RPC_INVALID_PARAMETER
const RPC_NOT_FOUND_CODES: [i32; 2] = [-5, -8];

/// Chain source backed by a bitcoind JSON-RPC endpoint.
pub struct RpcChainSource {
    client: Client,
    // hash of the most recently fetched block, passed along with transaction lookups so nodes
    // without `txindex` can serve them
    last_block: Mutex<Option<(BlockHeight, BlockHash)>>,
}

impl RpcChainSource {
    pub fn new(rpc_address: &str, rpc_user: String, rpc_pass: String) -> Result<Self, ChainSourceError> {
        let client = Client::new(rpc_address, Auth::UserPass(rpc_user, rpc_pass))
            .map_err(map_rpc_error)?;

        debug!("created rpc client for {rpc_address}");

        Ok(Self {
            client,
            last_block: Mutex::new(None),
        })
    }

    fn block_hash_hint(&self, height: BlockHeight) -> Option<BlockHash> {
        self.last_block
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .and_then(|(h, hash)| (h == height).then_some(hash))
    }
}

impl ChainSource for RpcChainSource {
    fn fetch_block(&self, height: BlockHeight) -> Result<ChainBlock, ChainSourceError> {
        let hash = self.client.get_block_hash(height).map_err(map_rpc_error)?;
        let info = self.client.get_block_info(&hash).map_err(map_rpc_error)?;

        if info.height as u64 != height {
            return Err(ChainSourceError::Transient(format!(
                "node returned block {hash} at height {} when asked for {height}",
                info.height
            )));
        }

        if let Ok(mut guard) = self.last_block.lock() {
            *guard = Some((height, hash));
        }

        trace!(height, txs = info.tx.len(), "fetched block");

        Ok(ChainBlock {
            height,
            tx_ids: info.tx.into_iter().map(TxId::from).collect(),
        })
    }

    fn fetch_transaction(
        &self,
        tx_id: &TxId,
        height: BlockHeight,
    ) -> Result<Transaction, ChainSourceError> {
        let txid: Txid = tx_id
            .as_str()
            .parse()
            .map_err(|e| ChainSourceError::NotFound(format!("invalid txid {tx_id}: {e}")))?;

        let hint = self.block_hash_hint(height);

        let tx = self
            .client
            .get_raw_transaction(&txid, hint.as_ref())
            .map_err(map_rpc_error)?;

        Ok(Transaction::from(&tx))
    }

    fn chain_head_height(&self) -> Result<BlockHeight, ChainSourceError> {
        self.client.get_block_count().map_err(map_rpc_error)
    }
}

impl From<&bitcoin::Transaction> for Transaction {
    fn from(tx: &bitcoin::Transaction) -> Self {
        let inputs = tx
            .input
            .iter()
            // coinbase inputs do not reference a previous output
            .filter(|input| !input.previous_output.is_null())
            .map(|input| TxInput::new(input.previous_output.txid, input.previous_output.vout))
            .collect();

        let outputs = tx
            .output
            .iter()
            .map(|output| TxOutput {
                value: output.value.to_sat(),
            })
            .collect();

        Transaction {
            id: tx.compute_txid().into(),
            inputs,
            outputs,
        }
    }
}

fn map_rpc_error(err: bitcoincore_rpc::Error) -> ChainSourceError {
    match &err {
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::error::Error::Rpc(rpc_err))
            if RPC_NOT_FOUND_CODES.contains(&rpc_err.code) =>
        {
            ChainSourceError::NotFound(rpc_err.message.clone())
        }
        _ => ChainSourceError::Transient(err.to_string()),
    }
}
