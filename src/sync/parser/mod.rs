use std::time::Instant;

use tracing::{debug, error, info};

use crate::{
    error::Error,
    sync::{
        chain::ChainSource,
        index::{
            OutputIndex,
            types::{Block, BlockHeight},
        },
        snapshot::{SnapshotPolicy, SnapshotSink},
    },
};

pub mod genesis;
pub mod propagate;
pub mod resolver;

pub use genesis::{Genesis, parse_genesis_tx};
pub use propagate::{ValueFlow, parse_transaction};
pub use resolver::{ResolutionReport, parse_transactions};

/// Worst case every transaction in a block depends on the previous one, so one resolves per pass.
/// The smallest transactions are ~189 bytes, so a 1 MB block holds at most ~5300.
pub const DEFAULT_MAX_RECURSIONS: usize = 5300;

/// Depth beyond which each pass is logged. Real blocks rarely exceed a few dozen.
pub const DEFAULT_RECURSION_WARN_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Fail when intra-block resolution does not converge instead of accepting a partial result
    pub strict_mode: bool,
    pub max_recursions: usize,
    pub recursion_warn_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_recursions: DEFAULT_MAX_RECURSIONS,
            recursion_warn_depth: DEFAULT_RECURSION_WARN_DEPTH,
        }
    }
}

/// Totals over a scanned range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub blocks: u64,
    pub transactions: u64,
    pub snapshots: u64,
}

/// Replays blocks from a chain source into an [`OutputIndex`].
pub struct BsqParser<C, P> {
    chain: C,
    snapshot_policy: P,
    config: ParserConfig,
}

impl<C: ChainSource, P: SnapshotPolicy> BsqParser<C, P> {
    pub fn new(chain: C, snapshot_policy: P, config: ParserConfig) -> Self {
        Self {
            chain,
            snapshot_policy,
            config,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Parse every block from `start_height` to `chain_head_height` (inclusive) in order.
    ///
    /// After each block the index's processed height is advanced, and if the snapshot policy
    /// triggers at that height a bounded clone of the index is handed to `snapshot_sink`. The first
    /// failure aborts the range; blocks completed before it remain in the index.
    ///
    /// Heights at or below the index's processed height are rejected, since replaying them would
    /// seed genesis or spend outputs a second time.
    pub fn parse_range<S: SnapshotSink>(
        &self,
        start_height: BlockHeight,
        chain_head_height: BlockHeight,
        genesis: &Genesis,
        index: &mut OutputIndex,
        snapshot_sink: &mut S,
    ) -> Result<ScanSummary, Error> {
        if let Some(processed) = index.block_height().filter(|h| start_height <= *h) {
            return Err(Error::Invariant {
                height: start_height,
                message: format!("index already holds blocks up to {processed}"),
            });
        }

        info!(start_height, chain_head_height, "parsing blocks");

        let range_start = Instant::now();
        let mut summary = ScanSummary::default();

        for height in start_height..=chain_head_height {
            let block_start = Instant::now();

            let (block, report) = match self.parse_height(height, genesis, index) {
                Ok(x) => x,
                Err(e) => {
                    error!(height, "parsing failed: {e}");
                    return Err(e);
                }
            };

            index.set_block_height(height);

            summary.blocks += 1;
            summary.transactions += block.txs.len() as u64;

            if self.snapshot_policy.should_snapshot(height) {
                let snapshot_height = self.snapshot_policy.snapshot_height_for(height);

                debug!(height, snapshot_height, "taking snapshot");

                snapshot_sink.accept(index.cloned_up_to_height(snapshot_height));
                summary.snapshots += 1;
            }

            info!(
                height,
                txs = block.txs.len(),
                passes = report.passes,
                token_outputs = report.token_outputs,
                burned = report.burned,
                unresolved = report.unresolved.len(),
                elapsed = ?block_start.elapsed(),
                "parsed block",
            );
        }

        info!(
            start_height,
            chain_head_height,
            blocks = summary.blocks,
            elapsed = ?range_start.elapsed(),
            "finished parsing range"
        );

        Ok(summary)
    }

    fn parse_height(
        &self,
        height: BlockHeight,
        genesis: &Genesis,
        index: &mut OutputIndex,
    ) -> Result<(Block, ResolutionReport), Error> {
        let block = self.fetch_block(height)?;
        let report = self.parse_block(&block, genesis, index)?;

        Ok((block, report))
    }

    /// Fetch a block and all its transactions, in block order.
    pub fn fetch_block(&self, height: BlockHeight) -> Result<Block, Error> {
        let chain_err = |source| Error::ChainData { height, source };

        let chain_block = self.chain.fetch_block(height).map_err(chain_err)?;

        if chain_block.height != height {
            return Err(Error::Invariant {
                height,
                message: format!("chain source returned block at height {}", chain_block.height),
            });
        }

        let mut block = Block::new(chain_block.height, chain_block.tx_ids);

        for tx_id in &block.tx_ids {
            let tx = self
                .chain
                .fetch_transaction(tx_id, height)
                .map_err(chain_err)?;

            block.txs.push(tx);
        }

        Ok(block)
    }

    /// Parse one fully populated block: seed genesis if present, then resolve its transactions.
    pub fn parse_block(
        &self,
        block: &Block,
        genesis: &Genesis,
        index: &mut OutputIndex,
    ) -> Result<ResolutionReport, Error> {
        debug!(height = block.height, "parsing block");

        if let Some(genesis_tx) = genesis.find_in(block)? {
            parse_genesis_tx(genesis_tx, block.height, index);
        }

        parse_transactions(&block.txs, index, block.height, &self.config)
    }
}
