//! In-process backend: revm through `alloy-evm`'s Ethereum factory over an in-memory cache DB.

use super::{BackendKind, CallFrame, DeploymentResult, ExecutionResult, VmBackend};
use crate::abi::decode_revert_reason;
use crate::chain::ChainConfig;
use crate::error::{HarnessError, Result};
use alloy_evm::revm::context::result::ExecutionResult as RevmResult;
use alloy_evm::revm::context::TxEnv;
use alloy_evm::revm::database::{CacheDB, EmptyDB};
use alloy_evm::revm::inspector::NoOpInspector;
use alloy_evm::revm::primitives::TxKind;
use alloy_evm::revm::state::AccountInfo;
use alloy_evm::revm::Database;
use alloy_evm::{EthEvmFactory, Evm, EvmFactory};
use alloy_primitives::{Address, Bytes, U256};
use reth_tracing::tracing::{debug, trace};
use std::convert::Infallible;
use std::fmt;

type EmbeddedDb = CacheDB<EmptyDB>;
type EmbeddedEvm = <EthEvmFactory as EvmFactory>::Evm<EmbeddedDb, NoOpInspector>;

/// A transaction as staged by callers that need full control over its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub caller: Address,
    pub kind: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    /// Defaults to the chain's gas price
    pub gas_price: Option<u64>,
    /// Defaults to the caller's current nonce
    pub nonce: Option<u64>,
}

impl TxRequest {
    pub fn call(caller: Address, to: Address, data: Bytes, value: U256, gas_limit: u64) -> Self {
        Self { caller, kind: TxKind::Call(to), value, data, gas_limit, gas_price: None, nonce: None }
    }

    pub fn create(caller: Address, initcode: Bytes, gas_limit: u64) -> Self {
        Self {
            caller,
            kind: TxKind::Create,
            value: U256::ZERO,
            data: initcode,
            gas_limit,
            gas_price: None,
            nonce: None,
        }
    }
}

/// Result of [`EmbeddedBackend::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub result: ExecutionResult,
    /// Address of the created contract, for successful creates
    pub created: Option<Address>,
}

impl<H: fmt::Debug> From<RevmResult<H>> for Executed {
    fn from(result: RevmResult<H>) -> Self {
        let gas_used = result.gas_used();
        let created = result.created_address();
        let result = match result {
            RevmResult::Success { output, gas_refunded, logs, .. } => ExecutionResult {
                success: true,
                gas_used,
                gas_refunded,
                output: output.into_data(),
                logs,
                revert_reason: None,
            },
            RevmResult::Revert { output, .. } => ExecutionResult {
                gas_used,
                revert_reason: decode_revert_reason(&output),
                output,
                ..Default::default()
            },
            RevmResult::Halt { reason, .. } => {
                ExecutionResult { gas_used, revert_reason: Some(format!("{reason:?}")), ..Default::default() }
            }
        };
        Self { result, created }
    }
}

/// revm running in-process. State lives in a [`CacheDB`] owned by the EVM.
pub struct EmbeddedBackend {
    evm: EmbeddedEvm,
    chain_id: u64,
    gas_price: u64,
}

impl fmt::Debug for EmbeddedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedBackend")
            .field("chain_id", &self.chain_id)
            .field("gas_price", &self.gas_price)
            .finish_non_exhaustive()
    }
}

impl EmbeddedBackend {
    pub fn new(chain: &ChainConfig) -> Self {
        let evm = EthEvmFactory::default().create_evm(EmbeddedDb::default(), chain.evm_env());
        Self { evm, chain_id: chain.chain_id(), gas_price: chain.gas_price() }
    }

    /// Execute a staged transaction, committing its state changes only when `commit` is set.
    pub fn execute(&mut self, request: TxRequest, commit: bool) -> Result<Executed> {
        let tx = self.build_tx(request);
        trace!(target: "bench::embedded", caller = %tx.caller, nonce = tx.nonce, commit, "executing");

        let result = if commit {
            self.evm.transact_commit(tx)
        } else {
            self.evm.transact(tx).map(|outcome| outcome.result)
        }
        .map_err(|err| HarnessError::TransactionRejected(err.to_string()))?;

        Ok(Executed::from(result))
    }

    fn build_tx(&mut self, request: TxRequest) -> TxEnv {
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => self.account(request.caller).nonce,
        };

        let mut tx = TxEnv::default();
        tx.caller = request.caller;
        tx.kind = request.kind;
        tx.value = request.value;
        tx.data = request.data;
        tx.gas_limit = request.gas_limit;
        tx.gas_price = u128::from(request.gas_price.unwrap_or(self.gas_price));
        tx.nonce = nonce;
        tx.chain_id = Some(self.chain_id);
        tx
    }

    fn account(&mut self, address: Address) -> AccountInfo {
        infallible(self.evm.db_mut().basic(address)).unwrap_or_default()
    }

    fn update_account(&mut self, address: Address, f: impl FnOnce(&mut AccountInfo)) {
        let mut info = self.account(address);
        f(&mut info);
        self.evm.db_mut().insert_account_info(address, info);
    }
}

impl VmBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn chain_id(&mut self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn deploy(&mut self, deployer: Address, initcode: Bytes, gas_limit: u64) -> Result<DeploymentResult> {
        let Executed { result, created } =
            self.execute(TxRequest::create(deployer, initcode, gas_limit), true)?;

        if !result.success {
            let reason = result.revert_reason.unwrap_or_else(|| "create reverted".to_string());
            return Err(HarnessError::DeploymentFailure(reason));
        }
        let contract_address = created
            .ok_or_else(|| HarnessError::DeploymentFailure("no contract address returned".into()))?;
        let deployed_code = self.get_code(contract_address)?;

        debug!(target: "bench::embedded", %contract_address, gas_used = result.gas_used, "deployed");
        Ok(DeploymentResult { contract_address, gas_used: result.gas_used, deployed_code })
    }

    fn call(&mut self, frame: &CallFrame) -> Result<ExecutionResult> {
        let request = TxRequest::call(
            frame.caller,
            frame.callee,
            frame.input.clone(),
            frame.value,
            frame.gas_limit,
        );
        Ok(self.execute(request, true)?.result)
    }

    fn query(&mut self, caller: Address, callee: Address, input: Bytes, gas_limit: u64) -> Result<ExecutionResult> {
        let request = TxRequest::call(caller, callee, input, U256::ZERO, gas_limit);
        Ok(self.execute(request, false)?.result)
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256, gas_limit: u64) -> Result<ExecutionResult> {
        let request = TxRequest::call(from, to, Bytes::new(), value, gas_limit);
        Ok(self.execute(request, true)?.result)
    }

    fn set_balance(&mut self, address: Address, balance: U256) -> Result<()> {
        self.update_account(address, |info| info.balance = balance);
        Ok(())
    }

    fn get_balance(&mut self, address: Address) -> Result<U256> {
        Ok(self.account(address).balance)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
        self.update_account(address, |info| info.nonce = nonce);
        Ok(())
    }

    fn get_nonce(&mut self, address: Address) -> Result<u64> {
        Ok(self.account(address).nonce)
    }

    fn set_storage(&mut self, address: Address, slot: U256, value: U256) -> Result<()> {
        infallible(self.evm.db_mut().insert_account_storage(address, slot, value));
        Ok(())
    }

    fn get_storage(&mut self, address: Address, slot: U256) -> Result<U256> {
        Ok(infallible(self.evm.db_mut().storage(address, slot)))
    }

    fn get_code(&mut self, address: Address) -> Result<Bytes> {
        let info = self.account(address);
        let code = match info.code {
            Some(code) => code,
            None => infallible(self.evm.db_mut().code_by_hash(info.code_hash)),
        };
        Ok(code.original_bytes())
    }
}

/// The in-memory database cannot fail.
fn infallible<T>(result: std::result::Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
