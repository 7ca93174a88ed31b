use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::sync::index::{OutputIndex, types::BlockHeight};

pub const DEFAULT_SNAPSHOT_GRID: u64 = 100;

/// Decides at which heights the scanner hands a snapshot of the output index to its sink.
pub trait SnapshotPolicy {
    fn should_snapshot(&self, height: BlockHeight) -> bool;

    /// Height the snapshot triggered at `height` is bounded to.
    fn snapshot_height_for(&self, height: BlockHeight) -> BlockHeight;
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct SnapshotConfig {
    /// Distance in blocks between snapshots
    pub grid: Option<u64>,
}

/// Snapshots on every multiple of `grid`, bounded one grid below the trigger height so that the
/// stored state is buried under at least `grid` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSnapshotPolicy {
    genesis_height: BlockHeight,
    grid: u64,
}

impl GridSnapshotPolicy {
    pub fn new(genesis_height: BlockHeight, grid: u64) -> Self {
        Self {
            genesis_height,
            grid: grid.max(1),
        }
    }

    pub fn from_config(genesis_height: BlockHeight, config: Option<&SnapshotConfig>) -> Self {
        let grid = config
            .and_then(|c| c.grid)
            .unwrap_or(DEFAULT_SNAPSHOT_GRID);

        Self::new(genesis_height, grid)
    }
}

impl SnapshotPolicy for GridSnapshotPolicy {
    fn should_snapshot(&self, height: BlockHeight) -> bool {
        height % self.grid == 0 && height >= self.genesis_height + self.grid
    }

    fn snapshot_height_for(&self, height: BlockHeight) -> BlockHeight {
        (height - height % self.grid)
            .saturating_sub(self.grid)
            .max(self.genesis_height)
    }
}

/// Never snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSnapshots;

impl SnapshotPolicy for NoSnapshots {
    fn should_snapshot(&self, _height: BlockHeight) -> bool {
        false
    }

    fn snapshot_height_for(&self, height: BlockHeight) -> BlockHeight {
        height
    }
}

/// One-way receiver of bounded output index clones. The scanner never waits on the outcome.
pub trait SnapshotSink {
    fn accept(&mut self, snapshot: OutputIndex);
}

impl<F> SnapshotSink for F
where
    F: FnMut(OutputIndex),
{
    fn accept(&mut self, snapshot: OutputIndex) {
        self(snapshot)
    }
}

impl SnapshotSink for Vec<OutputIndex> {
    fn accept(&mut self, snapshot: OutputIndex) {
        self.push(snapshot)
    }
}

impl SnapshotSink for UnboundedSender<OutputIndex> {
    fn accept(&mut self, snapshot: OutputIndex) {
        if let Err(e) = self.send(snapshot) {
            warn!(
                height = ?e.0.block_height(),
                "snapshot consumer has gone away, dropping snapshot"
            );
        }
    }
}
