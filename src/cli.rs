use crate::chain::{ChainConfig, ChainPreset, CustomChain};
use crate::config::{load_bytecode, BackendSelection, SweepFile, DEFAULT_TRANSFERS};
use crate::driver::RunConfig;
use crate::error::{HarnessError, Result};
use crate::fixtures::BATCH_HELPER_BYTECODE;
use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the transfer benchmark
#[derive(Parser, Debug)]
#[command(name = "evm-transfer-bench", about = "ERC-20 transfer throughput on revm, in-process and over the C ABI")]
pub struct Cli {
    /// Number of token transfers per run
    #[arg(long, default_value_t = DEFAULT_TRANSFERS)]
    pub transfers: u64,

    /// Chain preset to run against. Repeat to sweep several chains.
    #[arg(long = "preset", default_value = "bsc-testnet")]
    pub presets: Vec<ChainPreset>,

    /// Chain ID for the `custom` preset
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Backend realization(s) to benchmark
    #[arg(long, value_enum, default_value_t = BackendSelection::Both)]
    pub backend: BackendSelection,

    /// Send all transfers through one call to the batching helper contract
    #[arg(long)]
    pub batch: bool,

    /// Hex file with the batching helper's creation code. Defaults to the built-in helper.
    #[arg(long)]
    pub helper_bytecode: Option<PathBuf>,

    /// JSON sweep file. When given, the run flags above are ignored.
    #[arg(long, env = "BENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print run reports as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Resolve the arguments into the ordered list of runs to execute.
    pub fn run_configs(&self) -> Result<Vec<RunConfig>> {
        let helper = self.helper_bytecode.as_deref().map(load_bytecode).transpose()?;

        if let Some(path) = &self.config {
            return SweepFile::load(path)?.into_run_configs(helper);
        }

        let helper = helper.unwrap_or(BATCH_HELPER_BYTECODE);
        let mut configs = Vec::new();
        for &preset in &self.presets {
            let chain = self.chain(preset)?;
            for &backend in self.backend.kinds() {
                configs.push(RunConfig {
                    name: format!("{preset}/{backend}"),
                    chain: chain.clone(),
                    backend,
                    transfers: self.transfers,
                    helper_bytecode: self.batch.then(|| helper.clone()),
                });
            }
        }
        Ok(configs)
    }

    fn chain(&self, preset: ChainPreset) -> Result<ChainConfig> {
        match (preset, self.chain_id) {
            (ChainPreset::Custom, Some(chain_id)) => ChainConfig::custom(CustomChain::new(chain_id)),
            (ChainPreset::Custom, None) => {
                Err(HarnessError::Configuration("the custom preset requires --chain-id".into()))
            }
            (preset, _) => ChainConfig::from_preset(preset),
        }
    }
}
