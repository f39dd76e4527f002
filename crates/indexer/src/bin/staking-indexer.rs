// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{path::PathBuf, sync::Arc};

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use clap::Parser;
use liquid_staking_indexer::{BlockRangeScanner, ScannerConfig, ScannerDb};
use liquid_staking_rewards::{AlloyChainReader, SystemClock};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Arguments of the snapshot indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    rpc_url: Url,
    /// Address of the liquid staking pool contract.
    #[clap(long, env)]
    pool_address: Address,
    /// Address of the pool share token.
    #[clap(long, env)]
    share_token_address: Address,
    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,
    /// Optional TOML file with scanner settings. Flags below override it.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Checkpoint row owned by this scanner.
    #[clap(long)]
    scanner_id: Option<String>,
    /// Block to start from when no checkpoint exists.
    #[clap(long)]
    start_block: Option<u64>,
    /// Blocks behind the chain head treated as final.
    #[clap(long)]
    confirmation_delay: Option<u64>,
    /// Interval in seconds between scans.
    #[clap(long)]
    interval: Option<u64>,
    /// Number of retries before quitting after an error.
    #[clap(long)]
    retries: Option<u32>,
    /// Run a single scan and exit.
    #[clap(long, default_value_t = false)]
    once: bool,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = MainArgs::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let mut config = match &args.config {
        Some(path) => ScannerConfig::load(path).await?,
        None => ScannerConfig::default(),
    };
    if let Some(scanner_id) = args.scanner_id {
        config.scanner_id = scanner_id;
    }
    if let Some(start_block) = args.start_block {
        config.start_block = start_block;
    }
    if let Some(confirmation_delay) = args.confirmation_delay {
        config.confirmation_delay = confirmation_delay;
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }

    let reader = Arc::new(AlloyChainReader::connect(
        args.rpc_url,
        args.pool_address,
        args.share_token_address,
        config.rpc_timeout(),
    ));
    let db = Arc::new(ScannerDb::new(&args.db).await.context("Failed to connect to database")?);

    tracing::info!(
        "Starting scanner {} [confirmation_delay={}, interval={}s]",
        config.scanner_id,
        config.confirmation_delay,
        config.interval_secs
    );
    let scanner =
        BlockRangeScanner::new(reader, db.clone(), db, Arc::new(SystemClock), config);

    if args.once {
        let result = match scanner.run_once().await {
            Ok(result) => result,
            Err(err) => bail!("FATAL: Error running the scanner: {err}"),
        };
        if !result.failed_addresses.is_empty() {
            bail!(
                "Scan of blocks {} to {} failed for {} addresses",
                result.from_block,
                result.target_block,
                result.failed_addresses.len()
            );
        }
        tracing::info!("Scanner completed successfully");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
    });

    if let Err(err) = scanner.run(cancel).await {
        bail!("FATAL: Error running the scanner: {err}");
    }

    Ok(())
}
