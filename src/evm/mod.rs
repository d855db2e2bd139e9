//! VM backends.
//!
//! [`VmBackend`] is the capability interface the driver scripts against. Two realizations
//! exist: [`EmbeddedBackend`] drives revm in-process, [`BridgedBackend`] reaches the same
//! engine through the `revm_*` C ABI with every argument marshaled to hex. Given the same
//! ordered operations, both must leave identical account state behind.

pub mod bridged;
pub mod embedded;

#[cfg(test)]
mod bench;

pub use bridged::BridgedBackend;
pub use embedded::EmbeddedBackend;

use crate::chain::ChainConfig;
use crate::error::Result;
use alloy_primitives::{Address, Bytes, Log, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single message call, built per call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub caller: Address,
    pub callee: Address,
    pub input: Bytes,
    pub value: U256,
    pub gas_limit: u64,
}

impl CallFrame {
    /// A zero-value call.
    pub fn new(caller: Address, callee: Address, input: Bytes, gas_limit: u64) -> Self {
        Self { caller, callee, input, value: U256::ZERO, gas_limit }
    }
}

/// Outcome of an executed call or transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub gas_used: u64,
    /// Refund already credited against `gas_used`; zero unless the call succeeded
    pub gas_refunded: u64,
    pub output: Bytes,
    /// Events emitted by a successful call, in emission order
    pub logs: Vec<Log>,
    /// Decoded `Error(string)` / `Panic(uint256)` payload of a revert
    pub revert_reason: Option<String>,
}

/// Outcome of a successful contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub contract_address: Address,
    pub gas_used: u64,
    pub deployed_code: Bytes,
}

/// Uniform account and execution operations over a VM instance.
///
/// Every method blocks until the engine returns. Reverts are not errors: `call` and
/// `transfer` report them through [`ExecutionResult::success`]. Errors mean the engine
/// refused the transaction or the backend itself failed.
pub trait VmBackend {
    /// Which realization this is.
    fn kind(&self) -> BackendKind;

    /// Chain id the instance was configured with.
    fn chain_id(&mut self) -> Result<u64>;

    /// Commit a contract creation from `deployer` using its current nonce.
    fn deploy(&mut self, deployer: Address, initcode: Bytes, gas_limit: u64) -> Result<DeploymentResult>;

    /// Commit a message call.
    fn call(&mut self, frame: &CallFrame) -> Result<ExecutionResult>;

    /// Execute a call without committing any state change.
    fn query(&mut self, caller: Address, callee: Address, input: Bytes, gas_limit: u64) -> Result<ExecutionResult>;

    /// Commit a plain value transfer.
    fn transfer(&mut self, from: Address, to: Address, value: U256, gas_limit: u64) -> Result<ExecutionResult>;

    fn set_balance(&mut self, address: Address, balance: U256) -> Result<()>;

    fn get_balance(&mut self, address: Address) -> Result<U256>;

    fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()>;

    fn get_nonce(&mut self, address: Address) -> Result<u64>;

    fn set_storage(&mut self, address: Address, slot: U256, value: U256) -> Result<()>;

    fn get_storage(&mut self, address: Address, slot: U256) -> Result<U256>;

    /// Runtime code at `address`; empty for accounts without code.
    fn get_code(&mut self, address: Address) -> Result<Bytes>;
}

/// Backend realization selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Embedded,
    Bridged,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Embedded, BackendKind::Bridged];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Bridged => "bridged",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = crate::error::HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "bridged" => Ok(Self::Bridged),
            _ => Err(crate::error::HarnessError::Configuration(format!("unknown backend {s:?}"))),
        }
    }
}

/// Construct a fresh backend instance of the requested kind.
pub fn open_backend(kind: BackendKind, chain: &ChainConfig) -> Result<Box<dyn VmBackend>> {
    Ok(match kind {
        BackendKind::Embedded => Box::new(EmbeddedBackend::new(chain)),
        BackendKind::Bridged => Box::new(BridgedBackend::new(chain)?),
    })
}
