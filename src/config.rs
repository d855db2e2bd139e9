//! Sweep configuration file.
//!
//! ```json
//! {
//!   "helper_bytecode": "helper.hex",
//!   "runs": [
//!     { "name": "testnet", "chain": "bsc-testnet", "transfers": 1000, "backend": "both" },
//!     { "chain": { "custom": { "chain_id": 1337, "base_fee": 7, "gas_price": 7 } }, "batch": true }
//!   ]
//! }
//! ```

use crate::abi::parse_bytecode;
use crate::chain::{ChainConfig, CustomChain};
use crate::driver::RunConfig;
use crate::error::{HarnessError, Result};
use crate::evm::BackendKind;
use crate::fixtures::BATCH_HELPER_BYTECODE;
use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TRANSFERS: u64 = 1000;

/// Which realizations a run targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    Embedded,
    Bridged,
    #[default]
    Both,
}

impl BackendSelection {
    pub fn kinds(self) -> &'static [BackendKind] {
        match self {
            Self::Embedded => &[BackendKind::Embedded],
            Self::Bridged => &[BackendKind::Bridged],
            Self::Both => &BackendKind::ALL,
        }
    }
}

/// A preset name or explicit chain parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainEntry {
    Preset(String),
    Custom { custom: CustomChain },
}

impl ChainEntry {
    pub fn resolve(&self) -> Result<ChainConfig> {
        match self {
            Self::Preset(name) => ChainConfig::from_name(name),
            Self::Custom { custom } => ChainConfig::custom(*custom),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Preset(name) => name.clone(),
            Self::Custom { custom } => format!("custom-{}", custom.chain_id),
        }
    }
}

/// One entry of the `runs` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub chain: ChainEntry,
    #[serde(default = "default_transfers")]
    pub transfers: u64,
    #[serde(default)]
    pub backend: BackendSelection,
    #[serde(default)]
    pub batch: bool,
}

fn default_transfers() -> u64 {
    DEFAULT_TRANSFERS
}

/// Contents of a sweep configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFile {
    /// Hex file with the batching helper's creation code, relative to the sweep file.
    /// Batched runs use the built-in helper when absent.
    #[serde(default)]
    pub helper_bytecode: Option<PathBuf>,
    pub runs: Vec<RunEntry>,
}

impl SweepFile {
    /// Read and parse a sweep file. Relative helper paths are resolved against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read(path)?;
        let mut sweep: SweepFile = serde_json::from_str(&contents)?;
        if let (Some(helper), Some(dir)) = (sweep.helper_bytecode.as_mut(), path.parent()) {
            if helper.is_relative() {
                *helper = dir.join(&*helper);
            }
        }
        Ok(sweep)
    }

    /// Expand every entry into one [`RunConfig`] per selected backend, in file order.
    ///
    /// `helper_override` takes precedence over the file's own `helper_bytecode`.
    pub fn into_run_configs(self, helper_override: Option<Bytes>) -> Result<Vec<RunConfig>> {
        let helper = match (helper_override, &self.helper_bytecode) {
            (Some(code), _) => code,
            (None, Some(path)) => load_bytecode(path)?,
            (None, None) => BATCH_HELPER_BYTECODE,
        };

        let mut configs = Vec::new();
        for entry in self.runs {
            let chain = entry.chain.resolve()?;
            let helper_bytecode = entry.batch.then(|| helper.clone());
            let name = entry.name.unwrap_or_else(|| entry.chain.label());

            for &backend in entry.backend.kinds() {
                configs.push(RunConfig {
                    name: format!("{name}/{backend}"),
                    chain: chain.clone(),
                    backend,
                    transfers: entry.transfers,
                    helper_bytecode: helper_bytecode.clone(),
                });
            }
        }
        Ok(configs)
    }
}

/// Read a hex bytecode file.
pub fn load_bytecode(path: &Path) -> Result<Bytes> {
    parse_bytecode(&read(path)?)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| HarnessError::Io { path: path.display().to_string(), source })
}
