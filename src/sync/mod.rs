use serde::Deserialize;

use parser::{DEFAULT_MAX_RECURSIONS, DEFAULT_RECURSION_WARN_DEPTH, Genesis, ParserConfig};
use snapshot::SnapshotConfig;

pub mod chain;
pub mod index;
pub mod parser;
pub mod snapshot;

/// Poll interval while waiting for new blocks at the chain tip
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub genesis: Genesis,
    pub snapshot: Option<SnapshotConfig>,

    /// Abort when intra-block dependencies cannot be resolved within `max_recursions` passes
    #[serde(default)]
    pub strict_mode: bool,
    pub max_recursions: Option<usize>,
    pub recursion_warn_depth: Option<usize>,

    /// Keep polling the node for new blocks after reaching the chain tip
    #[serde(default)]
    pub follow: bool,
    pub poll_interval_secs: Option<u64>,

    /// Stop once this height has been parsed
    pub stop_after: Option<u64>,
}

impl Config {
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            strict_mode: self.strict_mode,
            max_recursions: self.max_recursions.unwrap_or(DEFAULT_MAX_RECURSIONS),
            recursion_warn_depth: self
                .recursion_warn_depth
                .unwrap_or(DEFAULT_RECURSION_WARN_DEPTH),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        )
    }
}

#[derive(Deserialize, Clone)]
pub struct NodeConfig {
    pub rpc_address: String,
    pub rpc_user: String,
    pub rpc_pass: String,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("rpc_address", &self.rpc_address)
            .field("rpc_user", &self.rpc_user)
            .finish_non_exhaustive()
    }
}
