//! Issuance core command line.
//!
//! # Commands
//! - `predict`: print the address a factory will deploy to
//! - `track`: follow a transaction hash against the configured node and index
//! - `reconcile`: run the reconciler against the persisted store until Ctrl-C
//! - `simulate`: run a full create flow in-process against a simulated ledger

use alloy::primitives::{Address, TxHash, B256};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use issuance_core::blockchain::{BlockchainClient, RpcLedger, Wallet};
use issuance_core::config::{load_config, OrchestratorConfig};
use issuance_core::ledger::{HttpIndex, SimulatedIndex, SimulatedLedger};
use issuance_core::observability::{logging, metrics};
use issuance_core::operation::CreationParams;
use issuance_core::orchestrator::{OperationContext, Orchestrator, Reconciler};
use issuance_core::prediction::AddressPredictor;
use issuance_core::store::MemoryStore;
use issuance_core::submission::TransactionSubmitter;
use issuance_core::tracking::{StatusEvent, TransactionTracker};
use issuance_core::verification::{EnrollmentStore, LocalVerificationIssuer, Secret};
use issuance_core::Shutdown;

#[derive(Parser)]
#[command(name = "issuance-core")]
#[command(about = "Transaction orchestration and verification core", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the address of a resource before creating it
    Predict {
        #[arg(long)]
        factory: Address,
        #[arg(long)]
        sender: Address,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Track a submitted transaction until it settles
    Track {
        #[arg(long)]
        hash: TxHash,
        /// Operation kind, selects the tracking budget
        #[arg(long, default_value = "create")]
        kind: String,
    },
    /// Resume and settle provisional records until interrupted
    Reconcile,
    /// Run a create flow against an in-memory ledger
    Simulate {
        #[arg(long, default_value = "0x00000000000000000000000000000000000000fa")]
        factory: Address,
        #[arg(long, default_value = "0x0000000000000000000000000000000000000001")]
        sender: Address,
        #[arg(long, default_value = "123456")]
        pin: String,
        /// Polls before the simulated block includes the transaction
        #[arg(long, default_value_t = 2)]
        mine_after: u32,
        /// Polls before the simulated index catches up
        #[arg(long, default_value_t = 2)]
        index_after: u32,
        #[command(flatten)]
        params: ParamArgs,
    },
}

/// Creation parameters given as `key=value` pairs.
#[derive(Args)]
struct ParamArgs {
    #[arg(long = "text", value_name = "KEY=VALUE")]
    text: Vec<String>,
    #[arg(long = "number", value_name = "KEY=VALUE")]
    number: Vec<String>,
    #[arg(long = "address", value_name = "KEY=VALUE")]
    address: Vec<String>,
    #[arg(long = "flag", value_name = "KEY=true|false")]
    flag: Vec<String>,
}

impl ParamArgs {
    fn to_params(&self) -> Result<CreationParams, Box<dyn std::error::Error>> {
        let mut params = CreationParams::new();
        for pair in &self.text {
            let (k, v) = split_pair(pair)?;
            params = params.text(k, v);
        }
        for pair in &self.number {
            let (k, v) = split_pair(pair)?;
            params = params.number(k, v);
        }
        for pair in &self.address {
            let (k, v) = split_pair(pair)?;
            params = params.address(k, v);
        }
        for pair in &self.flag {
            let (k, v) = split_pair(pair)?;
            params = params.flag(k, v.trim().parse::<bool>()?);
        }
        Ok(params)
    }
}

fn split_pair(pair: &str) -> Result<(&str, &str), Box<dyn std::error::Error>> {
    pair.split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", pair).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => OrchestratorConfig::default(),
    };
    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Predict {
            factory,
            sender,
            params,
        } => {
            let client = match config.prediction.init_code_hash {
                Some(_) => None,
                None => Some(BlockchainClient::new(config.blockchain.clone(), None).await?),
            };
            let predictor = AddressPredictor::from_config(&config.prediction, client)?;
            let predicted = predictor.predict(factory, sender, &params.to_params()?).await?;
            println!("{}", serde_json::to_string_pretty(&predicted)?);
        }
        Commands::Track { hash, kind } => {
            let client = BlockchainClient::new(config.blockchain.clone(), None).await?;
            let tracker = TransactionTracker::new(
                Arc::new(RpcLedger::new(client)),
                Arc::new(HttpIndex::new(&config.index)?),
                config.tracker.clone(),
            );
            let mut stream = tracker.open(hash, &kind);
            while let Some(event) = stream.next().await {
                println!("{}", serde_json::to_string(&event)?);
                eprintln!("{}", event.message());
            }
        }
        Commands::Reconcile => run_reconciler(&config).await?,
        Commands::Simulate {
            factory,
            sender,
            pin,
            mine_after,
            index_after,
            params,
        } => {
            simulate(
                &config,
                factory,
                sender,
                &pin,
                SimulatedLedger::with_auto_mine(mine_after),
                SimulatedIndex::with_auto_index(index_after),
                params.to_params()?,
            )
            .await?
        }
    }

    Ok(())
}

async fn run_reconciler(config: &OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = match &config.store.persistence_path {
        Some(path) => MemoryStore::load_from_file(path)?,
        None => {
            tracing::warn!("No store.persistence_path configured; nothing to reconcile");
            MemoryStore::new(None)
        }
    };

    let wallet = Wallet::from_env(config.blockchain.chain_id).ok();
    let client = BlockchainClient::new(config.blockchain.clone(), wallet).await?;
    client.is_healthy().await;
    let tracker = TransactionTracker::new(
        Arc::new(RpcLedger::new(client)),
        Arc::new(HttpIndex::new(&config.index)?),
        config.tracker.clone(),
    );

    let shutdown = Shutdown::new();
    let reconciler = Reconciler::new(Arc::new(store), tracker, config.reconciler.clone());
    let task = tokio::spawn(reconciler.run(shutdown.subscribe()));

    shutdown.trigger_on_ctrl_c().await?;
    task.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn simulate(
    config: &OrchestratorConfig,
    factory: Address,
    sender: Address,
    pin: &str,
    ledger: SimulatedLedger,
    index: SimulatedIndex,
    params: CreationParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = match &config.prediction.init_code_hash {
        Some(_) => AddressPredictor::from_config(&config.prediction, None)?,
        None => AddressPredictor::create2(B256::repeat_byte(0x11)),
    };

    let issuer = LocalVerificationIssuer::new(config.verification.clone(), EnrollmentStore::new());
    issuer.enroll_pin(sender, pin)?;
    let submitter = TransactionSubmitter::new(Arc::new(ledger.clone()), issuer.challenges());
    let tracker = TransactionTracker::new(
        Arc::new(ledger),
        Arc::new(index),
        config.tracker.clone(),
    );
    let store = MemoryStore::new(config.store.persistence_path.clone());
    let orchestrator = Orchestrator::new(
        predictor,
        Arc::new(issuer),
        submitter,
        tracker,
        Arc::new(store.clone()),
    )
    .with_config(config);

    let (sink, mut events) = mpsc::unbounded_channel::<StatusEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            eprintln!("[{}] {}", event.status, event.message());
        }
    });

    let ctx = OperationContext::new(sender).with_sink(Arc::new(sink));
    let record = orchestrator
        .create(&ctx, factory, &params, Secret::pin(pin))
        .await?;
    drop(ctx);
    drop(orchestrator);
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&record)?);
    store.save_to_file()?;
    Ok(())
}
