use std::{path::PathBuf, sync::Arc};

use bsq_ledger::{
    Error,
    storage::{self, SnapshotStore},
    sync::{
        self,
        chain::{ChainSource, RpcChainSource},
        index::{OutputIndex, types::BlockHeight},
        parser::BsqParser,
        snapshot::GridSnapshotPolicy,
    },
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod shutdown;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();

    let shutdown = shutdown::ShutdownManager::new();

    let result = match args.command {
        Command::Run => shutdown.run_until_shutdown(run(args.config)).await,
        Command::Dump(dump_args) => dump(args.config, dump_args),
    };

    if let Err(e) = result {
        error!(height = ?e.height(), "{e}");
        std::process::exit(1);
    }
}

async fn run(config_path: Option<PathBuf>) -> Result<(), Error> {
    let config = Config::new(&config_path)?;

    info!("running bsq-ledger with config: {config:?}");

    let sync_config = config
        .sync
        .ok_or_else(|| Error::custom("missing [sync] section in config"))?;

    let store = Arc::new(config.storage.open()?);

    let genesis_height = sync_config.genesis.height;

    let index = match store.load_snapshot()? {
        Some(index) => {
            info!(
                height = ?index.block_height(),
                outputs = index.len(),
                "resuming from stored snapshot"
            );
            index
        }
        None => {
            info!(genesis_height, "no stored snapshot, starting at genesis");
            OutputIndex::new()
        }
    };

    let chain = RpcChainSource::new(
        &sync_config.node.rpc_address,
        sync_config.node.rpc_user.clone(),
        sync_config.node.rpc_pass.clone(),
    )
    .map_err(|source| Error::ChainData {
        height: genesis_height,
        source,
    })?;

    let policy = GridSnapshotPolicy::from_config(genesis_height, sync_config.snapshot.as_ref());
    let parser = BsqParser::new(chain, policy, sync_config.parser_config());

    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

    let consumer = tokio::spawn(persist_snapshots(store.clone(), snapshot_rx));

    let scanned = tokio::task::spawn_blocking(move || scan(parser, sync_config, index, snapshot_tx))
        .await
        .map_err(Error::custom)?;

    // the scan has dropped its sender, so the consumer finishes once the queue drains
    consumer.await.map_err(Error::custom)??;

    let index = scanned?;

    if index.block_height().is_some() {
        store.write_snapshot(&index)?;
    }

    let stats = index.stats();
    info!(
        height = ?index.block_height(),
        genesis_supply = stats.genesis_supply,
        unspent = stats.unspent,
        burned = stats.burned,
        utxos = stats.utxo_count,
        "scan finished"
    );

    store.flush_and_compact()
}

/// Parse from where `index` left off up to the chain head, then keep polling in follow mode.
fn scan(
    parser: BsqParser<RpcChainSource, GridSnapshotPolicy>,
    config: sync::Config,
    mut index: OutputIndex,
    mut snapshot_tx: UnboundedSender<OutputIndex>,
) -> Result<OutputIndex, Error> {
    let genesis = &config.genesis;

    loop {
        let next = index.next_height().unwrap_or(genesis.height);

        if config.stop_after.is_some_and(|stop| next > stop) {
            info!(next, "reached configured stop height");
            break;
        }

        let head = match parser.chain().chain_head_height() {
            Ok(head) => head,
            Err(source) if config.follow && source.is_transient() => {
                warn!(next, "could not fetch chain head, retrying: {source}");
                std::thread::sleep(config.poll_interval());
                continue;
            }
            Err(source) => return Err(Error::ChainData { height: next, source }),
        };

        let target = config.stop_after.map_or(head, |stop| stop.min(head));

        if next <= target {
            let result =
                parser.parse_range(next, target, genesis, &mut index, &mut snapshot_tx);

            match result {
                Ok(summary) => debug!(?summary, "parsed range"),
                Err(Error::ChainData { height, source }) if config.follow && source.is_transient() => {
                    warn!(height, "chain data unavailable, retrying: {source}");
                }
                Err(e) => return Err(e),
            }
        }

        if !config.follow {
            break;
        }

        std::thread::sleep(config.poll_interval());
    }

    Ok(index)
}

async fn persist_snapshots(
    store: Arc<SnapshotStore>,
    mut rx: UnboundedReceiver<OutputIndex>,
) -> Result<(), Error> {
    let mut stored_height: Option<BlockHeight> = store.load_meta()?.map(|m| m.height);

    while let Some(snapshot) = rx.recv().await {
        let height = snapshot.block_height();

        if height < stored_height {
            debug!(?height, ?stored_height, "skipping snapshot older than the stored one");
            continue;
        }

        let store = store.clone();
        let meta = tokio::task::spawn_blocking(move || {
            let meta = store.write_snapshot(&snapshot)?;
            store.log_stats()?;
            Ok::<_, Error>(meta)
        })
        .await
        .map_err(Error::custom)??;

        stored_height = Some(meta.height);
    }

    Ok(())
}

fn dump(config_path: Option<PathBuf>, args: DumpArgs) -> Result<(), Error> {
    let config = Config::new(&config_path)?;
    let store = config.storage.open()?;

    let (Some(meta), Some(index)) = (store.load_meta()?, store.load_snapshot()?) else {
        println!("no snapshot stored");
        return Ok(());
    };

    let stats = index.stats();

    if args.json {
        let header = serde_json::json!({
            "height": meta.height,
            "written_at": meta.written_at().map(|t| t.to_rfc3339()),
            "stats": stats,
        });
        println!("{header}");

        for output in index.iter() {
            println!("{}", serde_json::to_string(output).map_err(Error::custom)?);
        }
    } else {
        println!("snapshot at height {}", meta.height);
        if let Some(written_at) = meta.written_at() {
            println!("written at {written_at}");
        }
        println!(
            "genesis supply {}, unspent {} in {} outputs, burned {}",
            stats.genesis_supply, stats.unspent, stats.utxo_count, stats.burned
        );

        for output in index.iter() {
            let state = match (&output.spend_info, output.verified) {
                (Some(spend), _) => format!("spent by {}:{}", spend.tx_id, spend.input_index),
                (None, true) => "unspent".to_string(),
                (None, false) => "invalid".to_string(),
            };

            println!(
                ">> {} @{} -> {} ({state}{})",
                output.txo_ref,
                output.height,
                output.value,
                output
                    .destroyed_value
                    .map(|v| format!(", tx burned {v}"))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay blocks from the node into the output index
    Run,
    /// Print the stored snapshot
    Dump(DumpArgs),
}

#[derive(Debug, clap::Args)]
pub struct DumpArgs {
    /// Print JSON lines instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
#[clap(name = "bsq-ledger")]
#[clap(bin_name = "bsq-ledger")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    config: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub sync: Option<sync::Config>,
    #[serde(default)]
    pub storage: storage::Config,
}

impl Config {
    pub fn new(config_path: &Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        s = s.add_source(config::File::with_name("bsq-ledger.toml").required(false));

        if let Some(explicit) = config_path.as_ref().and_then(|x| x.to_str()) {
            s = s.add_source(config::File::with_name(explicit).required(true));
        }

        s = s.add_source(
            config::Environment::with_prefix("BSQ_LEDGER")
                .prefix_separator("_")
                .separator("__"),
        );

        s.build()?.try_deserialize()
    }
}
