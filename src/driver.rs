//! End-to-end benchmark driver.
//!
//! One run walks a fixed state machine against a single, exclusively owned backend:
//!
//! ```text
//! INIT -> ACCOUNTS_FUNDED -> CONTRACT_DEPLOYED -> SUPPLY_MINTED -> BALANCES_DISTRIBUTED
//!      -> TRANSFERRING -> VERIFIED -> DONE
//! ```
//!
//! The first error from any collaborator moves the run to `FAILED`; nothing is retried.
//! Only the transfer loop is timed for the throughput figures.

use crate::abi::{decode_word, encode_call, is_truthy, selectors, AbiArg, Selector};
use crate::chain::ChainConfig;
use crate::deployer::deploy_contract;
use crate::error::{HarnessError, Result};
use crate::evm::{open_backend, BackendKind, CallFrame, ExecutionResult, VmBackend};
use crate::fixtures::{
    Fixtures, BATCH_GAS_PER_TRANSFER, DEPLOY_GAS_LIMIT, MINT_GAS_LIMIT, QUERY_GAS_LIMIT, TRANSFER_GAS_LIMIT,
};
use alloy_primitives::{Address, Bytes, U256};
use reth_tracing::tracing::{info, trace, warn};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::{Duration, Instant};

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    AccountsFunded,
    ContractDeployed,
    SupplyMinted,
    BalancesDistributed,
    Transferring,
    Verified,
    Done,
    Failed,
}

impl Phase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The only non-failure successor of each state.
    pub const fn next(self) -> Option<Phase> {
        match self {
            Self::Init => Some(Self::AccountsFunded),
            Self::AccountsFunded => Some(Self::ContractDeployed),
            Self::ContractDeployed => Some(Self::SupplyMinted),
            Self::SupplyMinted => Some(Self::BalancesDistributed),
            Self::BalancesDistributed => Some(Self::Transferring),
            Self::Transferring => Some(Self::Verified),
            Self::Verified => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::AccountsFunded => "ACCOUNTS_FUNDED",
            Self::ContractDeployed => "CONTRACT_DEPLOYED",
            Self::SupplyMinted => "SUPPLY_MINTED",
            Self::BalancesDistributed => "BALANCES_DISTRIBUTED",
            Self::Transferring => "TRANSFERRING",
            Self::Verified => "VERIFIED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One benchmark configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub name: String,
    pub chain: ChainConfig,
    pub backend: BackendKind,
    pub transfers: u64,
    /// Batching helper creation code; `None` runs the per-transfer loop
    pub helper_bytecode: Option<Bytes>,
}

/// Wall-clock time spent reaching `phase` from the previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    #[serde(rename = "elapsed_ms", serialize_with = "millis")]
    pub elapsed: Duration,
}

/// Throughput figures of the timed transfer loop. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransferStats {
    pub transfers: u64,
    #[serde(rename = "duration_ms", serialize_with = "millis")]
    pub duration: Duration,
    /// Transfers per second
    pub throughput: f64,
    #[serde(rename = "avg_per_transfer_us", serialize_with = "micros")]
    pub avg_per_transfer: Duration,
    pub gas_used: u64,
}

impl TransferStats {
    pub fn new(transfers: u64, duration: Duration, gas_used: u64) -> Self {
        let (throughput, avg_per_transfer) = if transfers == 0 {
            (0.0, Duration::ZERO)
        } else {
            (transfers as f64 / duration.as_secs_f64(), duration.div_f64(transfers as f64))
        };
        Self { transfers, duration, throughput, avg_per_transfer, gas_used }
    }
}

/// Token balance of one account, read after the transfer loop finished or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceEntry {
    #[serde(serialize_with = "display")]
    pub account: Address,
    #[serde(serialize_with = "display")]
    pub balance: U256,
}

/// Why and where a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// State the run was in when the error occurred
    pub phase: Phase,
    /// 1-based index of the failing transfer, for per-transfer loop failures
    pub transfer_index: Option<u64>,
    pub error: String,
}

/// Outcome of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub name: String,
    pub backend: BackendKind,
    pub chain_id: u64,
    pub batched: bool,
    pub transfers_requested: u64,
    pub transfers_completed: u64,
    /// `DONE` or `FAILED`
    pub phase: Phase,
    #[serde(serialize_with = "display_opt")]
    pub token: Option<Address>,
    pub deploy_gas: Option<u64>,
    pub timings: Vec<PhaseTiming>,
    pub stats: Option<TransferStats>,
    /// Sender and recipients, once the transfer phase has been entered
    pub balances: Vec<BalanceEntry>,
    pub failure: Option<Failure>,
}

impl RunReport {
    fn new(name: &str, backend: BackendKind, chain_id: u64, transfers: u64, batched: bool) -> Self {
        Self {
            name: name.to_string(),
            backend,
            chain_id,
            batched,
            transfers_requested: transfers,
            transfers_completed: 0,
            phase: Phase::Init,
            token: None,
            deploy_gas: None,
            timings: Vec::new(),
            stats: None,
            balances: Vec::new(),
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Token balance recorded for `account`.
    pub fn balance_of(&self, account: Address) -> Option<U256> {
        self.balances.iter().find(|entry| entry.account == account).map(|entry| entry.balance)
    }
}

/// Error raised inside a run, with the failing transfer index when the loop produced it.
#[derive(Debug)]
struct Abort {
    error: HarnessError,
    transfer_index: Option<u64>,
}

impl From<HarnessError> for Abort {
    fn from(error: HarnessError) -> Self {
        Self { error, transfer_index: None }
    }
}

/// Drives one configuration from `INIT` to `DONE` or `FAILED`.
pub struct BenchmarkDriver {
    backend: Box<dyn VmBackend>,
    fixtures: Fixtures,
    phase: Phase,
    last_transition: Instant,
    report: RunReport,
}

impl fmt::Debug for BenchmarkDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkDriver")
            .field("backend", &self.backend.kind())
            .field("phase", &self.phase)
            .field("report", &self.report.name)
            .finish_non_exhaustive()
    }
}

impl BenchmarkDriver {
    /// `chain_id` is what the backend was configured with; the run checks the backend agrees.
    pub fn new(name: &str, chain_id: u64, backend: Box<dyn VmBackend>, fixtures: Fixtures, transfers: u64) -> Self {
        let report = RunReport::new(name, backend.kind(), chain_id, transfers, false);
        Self { backend, fixtures, phase: Phase::Init, last_transition: Instant::now(), report }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the whole state machine. Never panics on collaborator errors; they end up in
    /// [`RunReport::failure`].
    pub fn run(mut self, helper_bytecode: Option<&Bytes>) -> RunReport {
        let transfers = self.report.transfers_requested;
        self.report.batched = helper_bytecode.is_some();
        if let Err(abort) = self.execute(transfers, helper_bytecode) {
            warn!(
                target: "bench::driver",
                run = %self.report.name,
                phase = %self.phase,
                transfer = ?abort.transfer_index,
                error = %abort.error,
                "run failed"
            );
            self.report.failure = Some(Failure {
                phase: self.phase,
                transfer_index: abort.transfer_index,
                error: abort.error.to_string(),
            });
            self.phase = Phase::Failed;
        }
        self.report.phase = self.phase;
        self.report
    }

    fn execute(&mut self, transfers: u64, helper_bytecode: Option<&Bytes>) -> std::result::Result<(), Abort> {
        let fixtures = self.fixtures.clone();

        let reported = self.backend.chain_id()?;
        if reported != self.report.chain_id {
            return Err(HarnessError::Configuration(format!(
                "backend reports chain id {reported}, expected {}",
                self.report.chain_id
            ))
            .into());
        }

        for (account, balance) in fixtures.native_funding() {
            self.backend.set_balance(account, balance)?;
        }
        self.advance(Phase::AccountsFunded);

        // the helper pulls tokens through transferFrom, which the plain token lacks
        let token_bytecode =
            if helper_bytecode.is_some() { &fixtures.batch_token_bytecode } else { &fixtures.token_bytecode };
        let token = deploy_contract(self.backend.as_mut(), fixtures.deployer, token_bytecode, &[], DEPLOY_GAS_LIMIT)?;
        self.report.token = Some(token.contract_address);
        self.report.deploy_gas = Some(token.gas_used);
        let token = token.contract_address;
        self.advance(Phase::ContractDeployed);

        self.call_token(
            fixtures.deployer,
            token,
            selectors::MINT,
            &[fixtures.deployer.into(), fixtures.total_supply.into()],
            MINT_GAS_LIMIT,
        )?;
        let supply = self.query_word(token, selectors::TOTAL_SUPPLY, &[])?;
        verify(token, fixtures.total_supply, supply)?;
        let minted = self.token_balance(token, fixtures.deployer)?;
        verify(fixtures.deployer, fixtures.total_supply, minted)?;
        self.advance(Phase::SupplyMinted);

        self.transfer_token(fixtures.deployer, token, fixtures.sender, fixtures.sender_allocation)?;
        let allocated = self.token_balance(token, fixtures.sender)?;
        verify(fixtures.sender, fixtures.sender_allocation, allocated)?;

        let helper = match helper_bytecode {
            Some(bytecode) => Some(self.prepare_helper(token, bytecode)?),
            None => None,
        };
        self.advance(Phase::BalancesDistributed);

        let sender_before = allocated;
        let recipients_before = [
            self.token_balance(token, fixtures.recipients[0])?,
            self.token_balance(token, fixtures.recipients[1])?,
        ];

        self.advance(Phase::Transferring);
        let outcome = match helper {
            Some(helper) => self.run_batch(helper, transfers),
            None => self.run_loop(token, transfers),
        };
        let (completed, duration, gas_used) = match outcome {
            Ok(outcome) => outcome,
            Err(abort) => {
                self.record_balances(token, [fixtures.sender, fixtures.recipients[0], fixtures.recipients[1]]);
                return Err(abort);
            }
        };
        self.report.stats = Some(TransferStats::new(completed, duration, gas_used));

        let moved = fixtures.transfer_amount * U256::from(transfers);
        let received = if helper.is_some() {
            [moved, U256::ZERO]
        } else {
            fixtures.expected_recipient_balances(transfers)
        };
        let expected = [
            (fixtures.sender, sender_before.checked_sub(moved).unwrap_or_default()),
            (fixtures.recipients[0], recipients_before[0] + received[0]),
            (fixtures.recipients[1], recipients_before[1] + received[1]),
        ];
        for (account, expected) in expected {
            let actual = self.token_balance(token, account)?;
            self.report.balances.push(BalanceEntry { account, balance: actual });
            verify(account, expected, actual)?;
        }
        self.advance(Phase::Verified);

        self.advance(Phase::Done);
        Ok(())
    }

    /// Per-transfer loop: even index to the first recipient, odd index to the second.
    fn run_loop(&mut self, token: Address, transfers: u64) -> std::result::Result<(u64, Duration, u64), Abort> {
        let sender = self.fixtures.sender;
        let amount = self.fixtures.transfer_amount;
        let mut gas_used = 0u64;

        let start = Instant::now();
        for index in 0..transfers {
            let recipient = self.fixtures.recipient(index);
            match self.transfer_token(sender, token, recipient, amount) {
                Ok(gas) => {
                    gas_used += gas;
                    self.report.transfers_completed = index + 1;
                    trace!(target: "bench::driver", index, %recipient, gas, "transfer");
                }
                Err(error) => {
                    self.report.stats = Some(TransferStats::new(index, start.elapsed(), gas_used));
                    return Err(Abort { error, transfer_index: Some(index + 1) });
                }
            }
        }
        Ok((transfers, start.elapsed(), gas_used))
    }

    /// Best-effort balance snapshot after an aborted transfer phase. Query errors are logged
    /// and the account is left out.
    fn record_balances(&mut self, token: Address, accounts: [Address; 3]) {
        for account in accounts {
            match self.token_balance(token, account) {
                Ok(balance) => self.report.balances.push(BalanceEntry { account, balance }),
                Err(err) => warn!(target: "bench::driver", %account, %err, "balance unavailable after abort"),
            }
        }
    }

    /// Deploy the batching helper against `token` and give it an unlimited allowance.
    fn prepare_helper(&mut self, token: Address, bytecode: &Bytes) -> Result<Address> {
        let helper = deploy_contract(
            self.backend.as_mut(),
            self.fixtures.deployer,
            bytecode,
            &[token.into()],
            DEPLOY_GAS_LIMIT,
        )?
        .contract_address;
        let sender = self.fixtures.sender;
        self.call_truthy(sender, token, selectors::APPROVE, &[helper.into(), U256::MAX.into()], TRANSFER_GAS_LIMIT)?;
        info!(target: "bench::driver", %helper, "batching helper ready");
        Ok(helper)
    }

    /// All transfers in one helper call. Atomic: either every transfer lands or none does.
    fn run_batch(&mut self, helper: Address, transfers: u64) -> std::result::Result<(u64, Duration, u64), Abort> {
        let gas_limit = transfers.checked_mul(BATCH_GAS_PER_TRANSFER).ok_or_else(|| {
            HarnessError::Configuration(format!("{transfers} transfers overflow the batch gas limit"))
        })?;
        let sender = self.fixtures.sender;
        let args: [AbiArg; 4] = [
            sender.into(),
            self.fixtures.recipients[0].into(),
            self.fixtures.transfer_amount.into(),
            U256::from(transfers).into(),
        ];

        let start = Instant::now();
        let gas_used = self.call_truthy(sender, helper, selectors::BENCHMARK_TRANSFERS, &args, gas_limit)?;
        let duration = start.elapsed();
        self.report.transfers_completed = transfers;
        Ok((transfers, duration, gas_used))
    }

    fn advance(&mut self, next: Phase) {
        debug_assert_eq!(self.phase.next(), Some(next), "illegal transition {} -> {next}", self.phase);
        let now = Instant::now();
        let elapsed = now - self.last_transition;
        self.last_transition = now;
        self.phase = next;
        self.report.timings.push(PhaseTiming { phase: next, elapsed });
        info!(target: "bench::driver", run = %self.report.name, phase = %next, ?elapsed, "phase complete");
    }

    /// Token `transfer`, requiring success and a truthy return word. Returns gas used.
    fn transfer_token(&mut self, from: Address, token: Address, to: Address, amount: U256) -> Result<u64> {
        self.call_truthy(from, token, selectors::TRANSFER, &[to.into(), amount.into()], TRANSFER_GAS_LIMIT)
    }

    fn call_token(
        &mut self,
        caller: Address,
        target: Address,
        selector: Selector,
        args: &[AbiArg],
        gas_limit: u64,
    ) -> Result<ExecutionResult> {
        let frame = CallFrame::new(caller, target, encode_call(selector, args), gas_limit);
        let result = self.backend.call(&frame)?;
        if !result.success {
            return Err(HarnessError::CallFailure { reason: result.revert_reason });
        }
        Ok(result)
    }

    /// A call whose single-word return must have its lowest bit set.
    fn call_truthy(
        &mut self,
        caller: Address,
        target: Address,
        selector: Selector,
        args: &[AbiArg],
        gas_limit: u64,
    ) -> Result<u64> {
        let result = self.call_token(caller, target, selector, args, gas_limit)?;
        if !is_truthy(decode_word(&result.output)?) {
            return Err(HarnessError::CallFailure { reason: Some("call returned false".into()) });
        }
        Ok(result.gas_used)
    }

    fn query_word(&mut self, target: Address, selector: Selector, args: &[AbiArg]) -> Result<U256> {
        let caller = self.fixtures.view_caller;
        let result = self.backend.query(caller, target, encode_call(selector, args), QUERY_GAS_LIMIT)?;
        if !result.success {
            return Err(HarnessError::CallFailure { reason: result.revert_reason });
        }
        decode_word(&result.output)
    }

    fn token_balance(&mut self, token: Address, account: Address) -> Result<U256> {
        self.query_word(token, selectors::BALANCE_OF, &[account.into()])
    }
}

fn verify(account: Address, expected: U256, actual: U256) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(HarnessError::VerificationFailure { account, expected, actual })
    }
}

/// Run one configuration against a freshly constructed backend.
pub fn run_configuration(config: &RunConfig, fixtures: &Fixtures) -> RunReport {
    let batched = config.helper_bytecode.is_some();
    info!(
        target: "bench::driver",
        run = %config.name,
        backend = %config.backend,
        chain_id = config.chain.chain_id(),
        transfers = config.transfers,
        batched,
        "starting run"
    );

    match open_backend(config.backend, &config.chain) {
        Ok(backend) => {
            BenchmarkDriver::new(&config.name, config.chain.chain_id(), backend, fixtures.clone(), config.transfers)
                .run(config.helper_bytecode.as_ref())
        }
        Err(err) => {
            warn!(target: "bench::driver", run = %config.name, %err, "backend construction failed");
            let mut report =
                RunReport::new(&config.name, config.backend, config.chain.chain_id(), config.transfers, batched);
            report.failure = Some(Failure { phase: Phase::Init, transfer_index: None, error: err.to_string() });
            report.phase = Phase::Failed;
            report
        }
    }
}

/// Run configurations strictly one after another. A failed run does not stop the sweep.
pub fn run_sweep(configs: &[RunConfig], fixtures: &Fixtures) -> Vec<RunReport> {
    configs.iter().map(|config| run_configuration(config, fixtures)).collect()
}

// ── Serialization helpers ──────────────────────────────────────────────────

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1e3)
}

fn micros<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1e6)
}

fn display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn display_opt<T: fmt::Display, S: Serializer>(
    value: &Option<T>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::argument_slot;
    use crate::chain::{ChainPreset, CustomChain};
    use crate::evm::DeploymentResult;
    use crate::fixtures::{ALICE, BOB, CHARLIE, DEPLOYER, TRANSFER_AMOUNT};
    use std::collections::HashMap;

    // ── Scripted token backend ─────────────────────────────────────────────

    /// Models the token and batching helper at the ABI level, with hooks to inject failures.
    #[derive(Debug, Default)]
    struct ScriptedBackend {
        native: HashMap<Address, U256>,
        nonces: HashMap<Address, u64>,
        code: HashMap<Address, Bytes>,
        tokens: HashMap<Address, U256>,
        supply: U256,
        token: Option<Address>,
        helper: Option<Address>,
        /// Every committed call, in order
        calls: Vec<Selector>,
        fail_deploy: bool,
        /// Return `false` (instead of reverting) from the n-th token transfer, 1-based
        falsy_transfer: Option<usize>,
        transfers_seen: usize,
    }

    fn word(value: &[u8]) -> U256 {
        U256::from_be_slice(value)
    }

    fn arg_address(input: &[u8], index: usize) -> Address {
        Address::from_slice(&argument_slot(input, index).unwrap()[12..])
    }

    fn arg_word(input: &[u8], index: usize) -> U256 {
        word(argument_slot(input, index).unwrap())
    }

    fn ok_word(value: U256) -> ExecutionResult {
        ExecutionResult {
            success: true,
            gas_used: 30_000,
            output: Bytes::from(value.to_be_bytes::<32>().to_vec()),
            ..Default::default()
        }
    }

    fn reverted(reason: &str) -> ExecutionResult {
        ExecutionResult { gas_used: 25_000, revert_reason: Some(reason.into()), ..Default::default() }
    }

    impl ScriptedBackend {
        fn move_tokens(&mut self, from: Address, to: Address, amount: U256) -> ExecutionResult {
            let balance = self.tokens.get(&from).copied().unwrap_or_default();
            if balance < amount {
                return reverted("Insufficient balance");
            }
            self.tokens.insert(from, balance - amount);
            *self.tokens.entry(to).or_default() += amount;
            ok_word(U256::from(1))
        }
    }

    impl VmBackend for ScriptedBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Embedded
        }

        fn chain_id(&mut self) -> Result<u64> {
            Ok(97)
        }

        fn deploy(&mut self, deployer: Address, initcode: Bytes, _gas_limit: u64) -> Result<DeploymentResult> {
            if self.fail_deploy {
                return Err(HarnessError::DeploymentFailure("scripted".into()));
            }
            let nonce = self.nonces.entry(deployer).or_default();
            let contract_address = deployer.create(*nonce);
            *nonce += 1;
            if self.token.is_none() {
                self.token = Some(contract_address);
            } else {
                // helper constructor argument is the token address
                assert_eq!(&initcode[initcode.len() - 20..], self.token.unwrap().as_slice());
                self.helper = Some(contract_address);
            }
            self.code.insert(contract_address, Bytes::from_static(&[0x00]));
            Ok(DeploymentResult { contract_address, gas_used: 500_000, deployed_code: Bytes::new() })
        }

        fn call(&mut self, frame: &CallFrame) -> Result<ExecutionResult> {
            *self.nonces.entry(frame.caller).or_default() += 1;
            let selector: Selector = frame.input[..4].try_into().unwrap();
            self.calls.push(selector);
            let input = &frame.input;

            Ok(match selector {
                selectors::MINT => {
                    let amount = arg_word(input, 1);
                    *self.tokens.entry(arg_address(input, 0)).or_default() += amount;
                    self.supply += amount;
                    ExecutionResult { success: true, gas_used: 50_000, ..Default::default() }
                }
                selectors::TRANSFER => {
                    self.transfers_seen += 1;
                    if self.falsy_transfer == Some(self.transfers_seen) {
                        return Ok(ok_word(U256::from(2)));
                    }
                    self.move_tokens(frame.caller, arg_address(input, 0), arg_word(input, 1))
                }
                selectors::APPROVE => ok_word(U256::from(1)),
                selectors::BENCHMARK_TRANSFERS => {
                    assert_eq!(Some(frame.callee), self.helper);
                    let (from, to) = (arg_address(input, 0), arg_address(input, 1));
                    let (amount, count) = (arg_word(input, 2), arg_word(input, 3));
                    assert_eq!(frame.gas_limit, count.to::<u64>() * BATCH_GAS_PER_TRANSFER);
                    self.move_tokens(from, to, amount * count)
                }
                _ => reverted("unknown selector"),
            })
        }

        fn query(&mut self, _caller: Address, _callee: Address, input: Bytes, _gas_limit: u64) -> Result<ExecutionResult> {
            let selector: Selector = input[..4].try_into().unwrap();
            Ok(match selector {
                selectors::BALANCE_OF => ok_word(self.tokens.get(&arg_address(&input, 0)).copied().unwrap_or_default()),
                selectors::TOTAL_SUPPLY => ok_word(self.supply),
                _ => reverted("unknown selector"),
            })
        }

        fn transfer(&mut self, _from: Address, _to: Address, _value: U256, _gas_limit: u64) -> Result<ExecutionResult> {
            unreachable!("the driver never moves native value")
        }

        fn set_balance(&mut self, address: Address, balance: U256) -> Result<()> {
            self.native.insert(address, balance);
            Ok(())
        }

        fn get_balance(&mut self, address: Address) -> Result<U256> {
            Ok(self.native.get(&address).copied().unwrap_or_default())
        }

        fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
            self.nonces.insert(address, nonce);
            Ok(())
        }

        fn get_nonce(&mut self, address: Address) -> Result<u64> {
            Ok(self.nonces.get(&address).copied().unwrap_or_default())
        }

        fn set_storage(&mut self, _address: Address, _slot: U256, _value: U256) -> Result<()> {
            Ok(())
        }

        fn get_storage(&mut self, _address: Address, _slot: U256) -> Result<U256> {
            Ok(U256::ZERO)
        }

        fn get_code(&mut self, address: Address) -> Result<Bytes> {
            Ok(self.code.get(&address).cloned().unwrap_or_default())
        }
    }

    fn small_fixtures(allocation_tokens: u64) -> Fixtures {
        Fixtures { sender_allocation: TRANSFER_AMOUNT * U256::from(allocation_tokens), ..Fixtures::default() }
    }

    fn scripted_run(backend: ScriptedBackend, fixtures: Fixtures, transfers: u64, helper: Option<&Bytes>) -> RunReport {
        BenchmarkDriver::new("scripted", 97, Box::new(backend), fixtures, transfers).run(helper)
    }

    // ── State machine ──────────────────────────────────────────────────────

    #[test]
    fn test_phase_order() {
        let mut phase = Phase::Init;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                Phase::Init,
                Phase::AccountsFunded,
                Phase::ContractDeployed,
                Phase::SupplyMinted,
                Phase::BalancesDistributed,
                Phase::Transferring,
                Phase::Verified,
                Phase::Done,
            ]
        );
        assert!(Phase::Failed.is_terminal());
        assert_eq!(Phase::Failed.next(), None);
    }

    #[test]
    fn test_successful_run_records_every_transition() {
        let report = scripted_run(ScriptedBackend::default(), Fixtures::default(), 10, None);

        assert!(report.succeeded(), "{:?}", report.failure);
        assert_eq!(report.transfers_completed, 10);
        let phases: Vec<_> = report.timings.iter().map(|t| t.phase).collect();
        assert_eq!(phases.first(), Some(&Phase::AccountsFunded));
        assert_eq!(phases.last(), Some(&Phase::Done));
        assert_eq!(phases.len(), 7);

        assert_eq!(report.balance_of(BOB), Some(TRANSFER_AMOUNT * U256::from(5)));
        assert_eq!(report.balance_of(CHARLIE), Some(TRANSFER_AMOUNT * U256::from(5)));
        let stats = report.stats.unwrap();
        assert_eq!(stats.transfers, 10);
        assert_eq!(stats.gas_used, 300_000);
    }

    #[test]
    fn test_provisioning_failure_stops_at_deploy() {
        let backend = ScriptedBackend { fail_deploy: true, ..Default::default() };
        let report = scripted_run(backend, Fixtures::default(), 10, None);

        assert_eq!(report.phase, Phase::Failed);
        let failure = report.failure.unwrap();
        assert_eq!(failure.phase, Phase::AccountsFunded);
        assert_eq!(failure.transfer_index, None);
        assert!(failure.error.contains("Deployment failed"));
        assert_eq!(report.transfers_completed, 0);
        assert!(report.stats.is_none());
        assert!(report.balances.is_empty());
    }

    #[test]
    fn test_chain_id_mismatch_fails_before_funding() {
        let report = BenchmarkDriver::new("scripted", 56, Box::<ScriptedBackend>::default(), Fixtures::default(), 3)
            .run(None);

        assert_eq!(report.chain_id, 56);
        let failure = report.failure.unwrap();
        assert_eq!(failure.phase, Phase::Init);
        assert!(failure.error.contains("chain id 97"), "{}", failure.error);
        assert!(report.timings.is_empty());
    }

    #[test]
    fn test_insufficient_balance_fails_fast_at_index() {
        // the sender holds 6 tokens, so the 7th transfer reverts
        let report = scripted_run(ScriptedBackend::default(), small_fixtures(6), 10, None);

        let failure = report.failure.clone().unwrap();
        assert_eq!(failure.phase, Phase::Transferring);
        assert_eq!(failure.transfer_index, Some(7));
        assert!(failure.error.contains("Insufficient balance"), "{}", failure.error);
        assert_eq!(report.transfers_completed, 6);
        assert_eq!(report.stats.unwrap().transfers, 6);

        // balances are still reported for the partial run
        assert_eq!(report.balance_of(ALICE), Some(U256::ZERO));
        assert_eq!(report.balance_of(BOB), Some(TRANSFER_AMOUNT * U256::from(3)));
        assert_eq!(report.balance_of(CHARLIE), Some(TRANSFER_AMOUNT * U256::from(3)));
    }

    #[test]
    fn test_falsy_return_word_is_failure() {
        // 2 has its lowest bit clear
        let backend = ScriptedBackend { falsy_transfer: Some(4), ..Default::default() };
        let report = scripted_run(backend, Fixtures::default(), 5, None);

        // the distribution transfer is the first one the backend sees
        let failure = report.failure.unwrap();
        assert_eq!(failure.transfer_index, Some(3));
        assert!(failure.error.contains("returned false"));
        assert_eq!(report.transfers_completed, 2);
    }

    #[test]
    fn test_batch_mode_sends_everything_to_first_recipient() {
        let helper = Bytes::from_static(&[0x60, 0x00]);
        let report = scripted_run(ScriptedBackend::default(), Fixtures::default(), 25, Some(&helper));

        assert!(report.succeeded(), "{:?}", report.failure);
        assert!(report.batched);
        assert_eq!(report.transfers_completed, 25);
        assert_eq!(report.balance_of(BOB), Some(TRANSFER_AMOUNT * U256::from(25)));
        assert_eq!(report.balance_of(CHARLIE), Some(U256::ZERO));
    }

    #[test]
    fn test_batch_failure_has_no_transfer_index() {
        let helper = Bytes::from_static(&[0x60, 0x00]);
        let report = scripted_run(ScriptedBackend::default(), small_fixtures(3), 4, Some(&helper));

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.transfer_index, None);
        assert_eq!(report.transfers_completed, 0);
        // atomic: nothing moved
        assert_eq!(report.balance_of(ALICE), Some(TRANSFER_AMOUNT * U256::from(3)));
        assert_eq!(report.balance_of(BOB), Some(U256::ZERO));
    }

    #[test]
    fn test_zero_transfers_is_trivially_verified() {
        let report = scripted_run(ScriptedBackend::default(), Fixtures::default(), 0, None);
        assert!(report.succeeded());
        let stats = report.stats.unwrap();
        assert_eq!(stats.throughput, 0.0);
        assert_eq!(stats.avg_per_transfer, Duration::ZERO);
    }

    #[test]
    fn test_transfer_stats() {
        let stats = TransferStats::new(1_000, Duration::from_millis(500), 0);
        assert_eq!(stats.throughput, 2_000.0);
        assert_eq!(stats.avg_per_transfer, Duration::from_micros(500));
    }

    #[test]
    fn test_transfer_stats_beyond_u32_transfers() {
        // 2^33 transfers in 2^35 ns: 4 ns each
        let stats = TransferStats::new(1 << 33, Duration::from_nanos(1 << 35), 0);
        assert!(stats.avg_per_transfer.as_nanos().abs_diff(4) <= 1, "{:?}", stats.avg_per_transfer);
        assert!((stats.throughput - 2.5e8).abs() < 1.0);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = scripted_run(ScriptedBackend::default(), Fixtures::default(), 2, None);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["phase"], "DONE");
        assert_eq!(json["backend"], "embedded");
        assert_eq!(json["timings"][0]["phase"], "ACCOUNTS_FUNDED");
        assert!(json["timings"][0]["elapsed_ms"].is_number());
        assert_eq!(json["balances"][1]["balance"], "1000000000000000000");
        assert!(json["token"].as_str().unwrap().starts_with("0x"));
    }

    // ── Real backends ──────────────────────────────────────────────────────

    #[test]
    fn test_sweep_runs_each_config_on_fresh_backend() {
        let chain = ChainConfig::from_preset(ChainPreset::BscTestnet).unwrap();
        let configs: Vec<_> = BackendKind::ALL
            .into_iter()
            .map(|backend| RunConfig {
                name: format!("{backend}"),
                chain: chain.clone(),
                backend,
                transfers: 20,
                helper_bytecode: None,
            })
            .collect();
        // twice the same configs: a reused backend would fail at the second deploy address
        let configs = [configs.clone(), configs].concat();

        let reports = run_sweep(&configs, &Fixtures::default());
        assert_eq!(reports.len(), 4);
        for report in &reports {
            assert!(report.succeeded(), "{}: {:?}", report.name, report.failure);
            assert_eq!(report.chain_id, 97);
            assert_eq!(report.token, Some(DEPLOYER.create(0)));
            assert_eq!(report.balance_of(BOB), Some(TRANSFER_AMOUNT * U256::from(10)));
        }
    }

    #[test]
    fn test_failed_config_does_not_stop_sweep() {
        let chain = ChainConfig::custom(CustomChain::new(1337)).unwrap();
        let ok = RunConfig {
            name: "ok".into(),
            chain,
            backend: BackendKind::Embedded,
            transfers: 3,
            helper_bytecode: None,
        };
        // a helper that returns no code fails provisioning
        let broken = RunConfig { name: "broken".into(), helper_bytecode: Some(Bytes::from_static(&[0x00])), ..ok.clone() };

        let reports = run_sweep(&[broken, ok], &Fixtures::default());
        assert_eq!(reports[0].phase, Phase::Failed);
        assert_eq!(reports[0].failure.as_ref().unwrap().phase, Phase::SupplyMinted);
        assert!(reports[1].succeeded(), "{:?}", reports[1].failure);
        assert_eq!(reports[1].chain_id, 1337);
        assert_eq!(reports[1].balance_of(ALICE).map(|b| b > U256::ZERO), Some(true));
    }
}
