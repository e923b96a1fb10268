//! The validator node binary: CLI, config loading and process wiring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use concord_consensus::RoundMachine;
use concord_crypto::load_or_generate_keypair;
use concord_executor::Executor;
use concord_mempool::Conveyer;
use concord_storage::{PoolStore, TransactionsIndex, WalletIndex};
use concord_telemetry::{init_tracing, install_metrics, serve_metrics};
use concord_transport::Transport;
use concord_types::config::NodeConfig;
use concord_types::PublicKey;

mod remote_stub;
mod round_loop;

#[derive(Parser, Debug)]
#[clap(name = "concord-node", version, about = "The Concord validator node")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generates a node identity if one doesn't already exist at the given paths.
    Keygen {
        #[clap(long, default_value = "NodePublic.txt")]
        public_key_path: PathBuf,
        #[clap(long, default_value = "NodePrivate.txt")]
        private_key_path: PathBuf,
    },
    /// Runs the node against a TOML configuration file.
    Run {
        #[clap(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen {
            public_key_path,
            private_key_path,
        } => keygen(&public_key_path, &private_key_path),
        Command::Run { config } => run(&config).await,
    }
}

fn keygen(public_key_path: &PathBuf, private_key_path: &PathBuf) -> Result<()> {
    let keypair = load_or_generate_keypair(public_key_path, private_key_path).context("generating node identity")?;
    println!("{}", bs58::encode(keypair.public_key.0).into_string());
    Ok(())
}

async fn run(config_path: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(config_path).with_context(|| format!("reading config {}", config_path.display()))?;
    let config = NodeConfig::from_toml_str(&raw).context("parsing node config")?;

    init_tracing(&config.telemetry.log_level, config.telemetry.json_logs).context("initializing tracing")?;
    let metrics = install_metrics().context("installing metrics")?;

    let keypair = load_or_generate_keypair(&config.public_key_path, &config.private_key_path).context("loading node identity")?;
    tracing::info!(target: "node", public_key = %bs58::encode(keypair.public_key.0).into_string(), "node identity loaded");

    std::fs::create_dir_all(&config.data_dir).with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let pool = PoolStore::open(config.data_dir.join("pool.redb")).context("opening block pool")?;
    let wallets = WalletIndex::open(config.data_dir.join("wallets.redb")).context("opening wallet index")?;
    let tx_index = TransactionsIndex::open(config.data_dir.join("tx_index.redb")).context("opening transactions index")?;

    let conveyer = Arc::new(Conveyer::new(config.meta_capacity));
    let pool = Arc::new(pool);
    let config = Arc::new(config);

    let (result_tx, mut result_rx) = mpsc::channel(64);
    let remote: Arc<dyn concord_executor::RemoteExecutor> = Arc::new(remote_stub::UnavailableRemoteExecutor);
    const RUNNING_TIMEOUT_ROUNDS: u64 = 10;
    let executor = Arc::new(Executor::new(RUNNING_TIMEOUT_ROUNDS, remote, result_tx));

    let transport = Arc::new(Transport::bind(config.listen_addr, config.timeouts.state_expiry()).await.context("binding transport socket")?);

    if let Some(bind_addr) = config.telemetry.metrics_bind_addr {
        tokio::spawn(async move {
            if let Err(error) = serve_metrics(bind_addr).await {
                tracing::error!(target: "telemetry", %error, "metrics server exited");
            }
        });
    }

    tracing::info!(
        target: "node",
        listen_addr = %config.listen_addr,
        min_trusted = config.min_trusted_nodes,
        max_trusted = config.max_trusted_nodes,
        "node started"
    );
    metrics.set_connected_peers(transport.neighbours().confirmed_addrs().len() as i64);

    // Watcher tasks spawned by `Executor::dispatch_ready` report each
    // invocation's outcome here rather than applying it directly (spec
    // §5 "Executor watchers"); this is the only place queue heads are
    // marked `Finished`.
    let executor_for_results = executor.clone();
    let drain = tokio::spawn(async move {
        while let Some(result) = result_rx.recv().await {
            match result.outcome {
                Ok(outcome) => {
                    if let Err(error) = executor_for_results.queue.finish(result.contract_address, result.invocation, outcome) {
                        tracing::debug!(target: "node", %error, "failed to record smart-contract result");
                    }
                }
                Err(error) => {
                    tracing::warn!(target: "node", %error, contract_address = ?result.contract_address, "smart-contract execution failed");
                }
            }
        }
    });

    let authority = match &config.big_bang_authority {
        Some(encoded) => decode_authority_key(encoded).context("parsing big_bang_authority")?,
        None => PublicKey::default(),
    };

    let machine = RoundMachine::new(keypair.public_key, config.min_trusted_nodes);
    let round_loop = tokio::spawn(round_loop::drive(transport.clone(), pool.clone(), conveyer.clone(), executor.clone(), keypair, machine, authority, metrics, config.clone()));

    let _ = (&wallets, &tx_index);

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!(target: "node", "shutdown signal received, stopping");
    drain.abort();
    round_loop.abort();

    Ok(())
}

fn decode_authority_key(encoded: &str) -> Result<PublicKey> {
    let bytes = bs58::decode(encoded).into_vec().context("invalid base58")?;
    let array: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("big_bang_authority must be 32 bytes"))?;
    Ok(PublicKey(array))
}
