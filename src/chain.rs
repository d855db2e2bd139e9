//! Chain environment construction.
//!
//! Every preset models a chain that has always run the latest rules: the whole hardfork
//! schedule up to Cancun (which includes Shanghai's `PUSH0`) is active at block 0 and
//! timestamp 0. No fork is ever gated by block number at runtime.

use crate::error::{HarnessError, Result};
use alloy_evm::revm::context::BlockEnv;
use alloy_evm::revm::primitives::hardfork::SpecId;
use alloy_evm::EvmEnv;
use alloy_primitives::{Address, B256, U256};
use reth_ethereum_forks::{EthereumHardfork, ForkCondition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Block number every transaction executes in.
pub const DEFAULT_BLOCK_NUMBER: u64 = 1;
/// Fixed block timestamp, so that runs are reproducible across backends.
pub const DEFAULT_TIMESTAMP: u64 = 1_700_000_000;
/// Base fee per gas.
pub const DEFAULT_BASE_FEE: u64 = 1;
/// Gas price used by every transaction; never below the base fee.
pub const DEFAULT_GAS_PRICE: u64 = 1;
/// Block gas limit, high enough for a batched run of thousands of transfers.
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 1_000_000_000;

/// Hardforks in activation order, with the revm spec each one introduces.
const HARDFORK_SPECS: [(EthereumHardfork, SpecId); 17] = [
    (EthereumHardfork::Frontier, SpecId::FRONTIER),
    (EthereumHardfork::Homestead, SpecId::HOMESTEAD),
    (EthereumHardfork::Dao, SpecId::DAO_FORK),
    (EthereumHardfork::Tangerine, SpecId::TANGERINE),
    (EthereumHardfork::SpuriousDragon, SpecId::SPURIOUS_DRAGON),
    (EthereumHardfork::Byzantium, SpecId::BYZANTIUM),
    (EthereumHardfork::Constantinople, SpecId::CONSTANTINOPLE),
    (EthereumHardfork::Petersburg, SpecId::PETERSBURG),
    (EthereumHardfork::Istanbul, SpecId::ISTANBUL),
    (EthereumHardfork::MuirGlacier, SpecId::MUIR_GLACIER),
    (EthereumHardfork::Berlin, SpecId::BERLIN),
    (EthereumHardfork::London, SpecId::LONDON),
    (EthereumHardfork::ArrowGlacier, SpecId::ARROW_GLACIER),
    (EthereumHardfork::GrayGlacier, SpecId::GRAY_GLACIER),
    (EthereumHardfork::Paris, SpecId::MERGE),
    (EthereumHardfork::Shanghai, SpecId::SHANGHAI),
    (EthereumHardfork::Cancun, SpecId::CANCUN),
];

/// Named chain presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainPreset {
    /// Ethereum mainnet, chain id 1
    Mainnet,
    /// BNB Smart Chain testnet, chain id 97
    BscTestnet,
    /// BNB Smart Chain mainnet, chain id 56
    BscMainnet,
    /// Explicit parameters, see [`CustomChain`]
    Custom,
}

impl ChainPreset {
    /// Chain id of a named preset; `None` for [`ChainPreset::Custom`].
    pub const fn chain_id(self) -> Option<u64> {
        match self {
            Self::Mainnet => Some(1),
            Self::BscTestnet => Some(97),
            Self::BscMainnet => Some(56),
            Self::Custom => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::BscTestnet => "bsc-testnet",
            Self::BscMainnet => "bsc-mainnet",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ChainPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChainPreset {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "mainnet" | "ethereum" => Ok(Self::Mainnet),
            "bsc-testnet" => Ok(Self::BscTestnet),
            "bsc-mainnet" | "bsc" => Ok(Self::BscMainnet),
            "custom" => Ok(Self::Custom),
            _ => Err(HarnessError::Configuration(format!("unknown chain preset {s:?}"))),
        }
    }
}

/// Explicit parameters for a [`ChainPreset::Custom`] chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomChain {
    pub chain_id: u64,
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub base_fee: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<u64>,
}

impl CustomChain {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, gas_limit: None, base_fee: None, gas_price: None }
    }
}

/// Default block context applied to every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDefaults {
    pub number: u64,
    pub coinbase: Address,
    pub timestamp: u64,
    pub base_fee: u64,
    pub gas_limit: u64,
    pub difficulty: U256,
}

impl Default for BlockDefaults {
    fn default() -> Self {
        Self {
            number: DEFAULT_BLOCK_NUMBER,
            coinbase: Address::ZERO,
            timestamp: DEFAULT_TIMESTAMP,
            base_fee: DEFAULT_BASE_FEE,
            gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            difficulty: U256::ZERO,
        }
    }
}

/// Immutable VM configuration for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    preset: ChainPreset,
    chain_id: u64,
    hardforks: Vec<(EthereumHardfork, ForkCondition)>,
    block: BlockDefaults,
    gas_price: u64,
}

impl ChainConfig {
    /// Build the configuration of a named preset.
    pub fn from_preset(preset: ChainPreset) -> Result<Self> {
        let chain_id = preset.chain_id().ok_or_else(|| {
            HarnessError::Configuration("custom chain requires explicit parameters".into())
        })?;
        Ok(Self {
            preset,
            chain_id,
            hardforks: genesis_hardforks(),
            block: BlockDefaults::default(),
            gas_price: DEFAULT_GAS_PRICE,
        })
    }

    /// Build a configuration from explicit parameters.
    pub fn custom(params: CustomChain) -> Result<Self> {
        if params.chain_id == 0 {
            return Err(HarnessError::Configuration("chain id must be non-zero".into()));
        }

        let mut block = BlockDefaults::default();
        if let Some(gas_limit) = params.gas_limit {
            if gas_limit == 0 {
                return Err(HarnessError::Configuration("block gas limit must be non-zero".into()));
            }
            block.gas_limit = gas_limit;
        }
        if let Some(base_fee) = params.base_fee {
            block.base_fee = base_fee;
        }
        let gas_price = params.gas_price.unwrap_or(DEFAULT_GAS_PRICE);
        if gas_price < block.base_fee {
            return Err(HarnessError::Configuration(format!(
                "gas price {gas_price} is below base fee {}",
                block.base_fee
            )));
        }

        Ok(Self {
            preset: ChainPreset::Custom,
            chain_id: params.chain_id,
            hardforks: genesis_hardforks(),
            block,
            gas_price,
        })
    }

    /// Parse a preset name and build its configuration.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::from_preset(name.parse()?)
    }

    pub fn preset(&self) -> ChainPreset {
        self.preset
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn block(&self) -> &BlockDefaults {
        &self.block
    }

    pub fn gas_price(&self) -> u64 {
        self.gas_price
    }

    /// The activation schedule, in fork order.
    pub fn hardforks(&self) -> &[(EthereumHardfork, ForkCondition)] {
        &self.hardforks
    }

    /// Whether `fork` is active from the first block.
    pub fn is_active_at_genesis(&self, fork: EthereumHardfork) -> bool {
        self.hardforks
            .iter()
            .any(|(f, condition)| *f == fork && active_at_genesis(condition))
    }

    /// The revm spec of the newest fork active at genesis.
    pub fn spec(&self) -> SpecId {
        HARDFORK_SPECS
            .iter()
            .filter(|(fork, _)| self.is_active_at_genesis(*fork))
            .map(|(_, spec)| *spec)
            .last()
            .unwrap_or(SpecId::FRONTIER)
    }

    /// The EVM environment every transaction of the run executes in.
    pub fn evm_env(&self) -> EvmEnv<SpecId, BlockEnv> {
        let mut env = EvmEnv::<SpecId, BlockEnv>::default();
        env.cfg_env.chain_id = self.chain_id;
        env.cfg_env.spec = self.spec();

        env.block_env.number = U256::from(self.block.number);
        env.block_env.beneficiary = self.block.coinbase;
        env.block_env.timestamp = U256::from(self.block.timestamp);
        env.block_env.gas_limit = self.block.gas_limit;
        env.block_env.basefee = self.block.base_fee;
        env.block_env.difficulty = self.block.difficulty;
        env.block_env.prevrandao = Some(B256::ZERO);
        env
    }
}

/// Every known fork up to Cancun, active from genesis.
fn genesis_hardforks() -> Vec<(EthereumHardfork, ForkCondition)> {
    HARDFORK_SPECS
        .iter()
        .map(|(fork, _)| {
            let condition = match fork {
                EthereumHardfork::Shanghai | EthereumHardfork::Cancun => ForkCondition::Timestamp(0),
                _ => ForkCondition::Block(0),
            };
            (*fork, condition)
        })
        .collect()
}

fn active_at_genesis(condition: &ForkCondition) -> bool {
    condition.active_at_block(0) || condition.active_at_timestamp(0)
}
