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

use std::{sync::Arc, time::Duration};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use liquid_staking_rewards::{
    load_positions, AggregateRewardsView, AlloyChainReader, ChainReader, Clock,
    RewardParameterFetcher, SystemClock,
};
use url::Url;

/// Print the estimated profit of every stake position of an address.
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
    /// Staker to report on.
    #[clap(long)]
    owner: Address,
    /// Timeout in seconds for each chain read.
    #[clap(long, default_value = "20")]
    rpc_timeout: u64,
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

    let reader: Arc<dyn ChainReader> = Arc::new(AlloyChainReader::connect(
        args.rpc_url,
        args.pool_address,
        args.share_token_address,
        Duration::from_secs(args.rpc_timeout),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let head = reader.latest_block().await.context("Failed to read latest block")?;
    let params = RewardParameterFetcher::new(reader.clone(), clock.clone())
        .fetch_at(head)
        .await
        .context("Failed to read reward parameters")?;
    let positions = load_positions(reader.as_ref(), args.owner, head)
        .await
        .context("Failed to load stake positions")?;

    let mut view = AggregateRewardsView::new(args.owner);
    let total = view.refresh(&positions, &params, head, clock.now());

    println!("owner {:#x} at block {} ({} positions)", args.owner, head, positions.len());
    for position in &positions {
        match view.estimate_for(position.id) {
            Some(est) => println!(
                "  #{:<4} {:<8} principal {} pending {} profit {} [{:?}]",
                position.id,
                est.tier.as_str(),
                position.principal,
                est.pending_reward,
                est.estimated_profit,
                est.status
            ),
            None => println!("  #{:<4} withdrawn", position.id),
        }
    }
    println!("total estimated profit {}", total);

    Ok(())
}
