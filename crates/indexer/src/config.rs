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

//! Scanner configuration, loaded from an optional TOML file.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub mod defaults {
    pub fn scanner_id() -> String {
        "balance-snapshots".to_string()
    }

    pub const fn start_block() -> u64 {
        0
    }

    pub const fn confirmation_delay() -> u64 {
        12
    }

    /// Blocks per `eth_getLogs` query during holder discovery.
    pub const fn chunk_size() -> u64 {
        5_000
    }

    pub const fn address_concurrency() -> usize {
        8
    }

    pub const fn rpc_timeout_secs() -> u64 {
        20
    }

    pub const fn interval_secs() -> u64 {
        3_600
    }

    pub const fn retries() -> u32 {
        10
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Name of the checkpoint row owned by this scanner.
    #[serde(default = "defaults::scanner_id")]
    pub scanner_id: String,
    /// Block to scan from when no checkpoint exists yet.
    #[serde(default = "defaults::start_block")]
    pub start_block: u64,
    /// Blocks behind the chain head considered safe from reorgs.
    #[serde(default = "defaults::confirmation_delay")]
    pub confirmation_delay: u64,
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: u64,
    /// Addresses snapshotted concurrently within one run.
    #[serde(default = "defaults::address_concurrency")]
    pub address_concurrency: usize,
    /// Bound on each per-address chain read.
    #[serde(default = "defaults::rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,
    /// Consecutive failed runs tolerated by the run loop.
    #[serde(default = "defaults::retries")]
    pub retries: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scanner_id: defaults::scanner_id(),
            start_block: defaults::start_block(),
            confirmation_delay: defaults::confirmation_delay(),
            chunk_size: defaults::chunk_size(),
            address_concurrency: defaults::address_concurrency(),
            rpc_timeout_secs: defaults::rpc_timeout_secs(),
            interval_secs: defaults::interval_secs(),
            retries: defaults::retries(),
        }
    }
}

impl ScannerConfig {
    /// Load the config from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ScannerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ScannerConfig::default());
        assert_eq!(config.scanner_id, "balance-snapshots");
        assert_eq!(config.confirmation_delay, 12);
        assert_eq!(config.chunk_size, 5_000);
    }

    #[tokio::test]
    async fn load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scanner_id = \"staging\"\nconfirmation_delay = 64\nrpc_timeout_secs = 5")
            .unwrap();

        let config = ScannerConfig::load(file.path()).await.unwrap();
        assert_eq!(config.scanner_id, "staging");
        assert_eq!(config.confirmation_delay, 64);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(5));
        assert_eq!(config.address_concurrency, defaults::address_concurrency());
    }

    #[tokio::test]
    async fn load_rejects_bad_types() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "start_block = \"soon\"").unwrap();
        assert!(ScannerConfig::load(file.path()).await.is_err());
    }
}
