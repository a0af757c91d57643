//! Binary entry point for chaind.
//!
//! Wires the chain engine, the account-transfer executor, and the manager
//! together, then runs a simple mining loop. Actual peer transport (TCP
//! framing, connection handling) is out of this crate's scope — see
//! `network::protocol`/`network::dispatcher` for the message-level surface
//! a transport would drive.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use chaind::blockchain::executor::ValueTransferExecutor;
use chaind::blockchain::{Block, BlockHeader, ChainEngine};
use chaind::config::Config;
use chaind::crypto::{Address, Hash256};
use chaind::database::MemoryRepository;
use chaind::manager::Manager;

struct Cli {
    config: Config,
}

impl Cli {
    fn from_env_args() -> Self {
        let mut config = Config::default();
        let mut args = env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mining-interval-secs" => {
                    if let Some(val) = args.next() {
                        match u64::from_str(&val) {
                            Ok(n) => config.mining.target_spacing_secs = n,
                            Err(_) => eprintln!("invalid --mining-interval-secs: {val}"),
                        }
                    }
                }
                "--mine" => config.mining.enabled = true,
                "--help" | "-h" => print_help_and_exit(),
                other => {
                    eprintln!("unknown argument: {other}");
                    print_help_and_exit();
                }
            }
        }

        Self { config }
    }
}

fn print_help_and_exit() -> ! {
    eprintln!(
        "\
chaind

USAGE:
  chaind [FLAGS]

FLAGS:
  --mine                          Start mining on launch
  --mining-interval-secs <u64>    Target block spacing in seconds (default 10)
  -h, --help                      Show this help and exit
"
    );
    std::process::exit(0);
}

fn genesis_block(difficulty_compact: u64, timestamp: u32) -> Block {
    Block {
        header: BlockHeader {
            version: 1,
            height: 0,
            parent_hash: Hash256::ZERO,
            coinbase: Address::ZERO,
            timestamp,
            difficulty_compact,
            nonce: 0,
            total_difficulty: 0,
            state_root: Hash256::ZERO,
            trx_trie_root: Hash256::ZERO,
        },
        transactions: Vec::new(),
        gas_limit_bytes: Vec::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().try_init();

    let cli = Cli::from_env_args();
    log::info!("starting chaind on {:?}", cli.config.network);

    let repo = Arc::new(MemoryRepository::new());
    let executor = Arc::new(ValueTransferExecutor::new());
    let genesis = genesis_block(
        cli.config.mining.genesis_difficulty_compact as u64,
        cli.config.network.genesis_timestamp(),
    );
    let chain = Arc::new(ChainEngine::new(repo, executor, genesis)?);

    let coinbase = Address::ZERO;
    let manager = Arc::new(Manager::new(Arc::clone(&chain), coinbase));

    if cli.config.mining.enabled {
        manager.start_mining()?;
        log::info!("mining started");
    }

    let mining_manager = Arc::clone(&manager);
    let mining_interval = Duration::from_secs(cli.config.mining.target_spacing_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(mining_interval);
        loop {
            interval.tick().await;
            if !mining_manager.is_mining() && !mining_manager.is_syncing() {
                if let Err(e) = mining_manager.start_mining() {
                    log::warn!("failed to start mining: {e}");
                }
            }
        }
    });

    let status_manager = Arc::clone(&manager);
    let status_chain = Arc::clone(&chain);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;
            match status_chain.get_best_block() {
                Ok(best) => log::info!(
                    "best height={} total_difficulty={} peers={} mining={} syncing={}",
                    best.header.height,
                    best.header.total_difficulty,
                    status_manager.peers().len(),
                    status_manager.is_mining(),
                    status_manager.is_syncing(),
                ),
                Err(e) => log::warn!("failed to read best block: {e}"),
            }
        }
    });

    log::info!("node running. press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    log::info!("shutdown signal received, exiting");
    manager.stop_mining();
    Ok(())
}
