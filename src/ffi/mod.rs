//! The `revm_*` C ABI.
//!
//! Arguments are marshaled as hex strings (`0x` optional): addresses, words, calldata and
//! bytecode alike. Gas limits are plain integers. A null pointer or `REVM_ERR` return means
//! the operation failed; `revm_get_last_error` then holds the message until the next
//! operation on the same instance. Every returned object must be released exactly once
//! through its `revm_free*` function.

pub mod types;

pub use types::*;

use crate::abi::{format_word_hex, parse_address, parse_amount, parse_bytecode};
use crate::chain::{ChainConfig, ChainPreset, CustomChain};
use crate::error::{HarnessError, Result};
use crate::evm::embedded::TxRequest;
use crate::evm::{CallFrame, VmBackend};
use alloy_evm::revm::primitives::TxKind;
use reth_tracing::tracing::warn;
use std::ffi::{c_char, c_int, CStr};
use std::ptr;

// ── Marshaling helpers ─────────────────────────────────────────────────────

/// Borrow a caller-provided C string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string alive for `'a`.
unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(HarnessError::Boundary(format!("null {what}")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| HarnessError::Boundary(format!("{what} is not valid UTF-8")))
}

/// Run `op` against a live instance, recording any error as the instance's last error.
///
/// # Safety
///
/// `instance` must be null or a live pointer from one of the `revm_new*` constructors.
unsafe fn with_instance<T>(
    instance: *mut RevmInstance,
    on_error: T,
    op: impl FnOnce(&mut RevmInstance) -> Result<T>,
) -> T {
    let Some(instance) = instance.as_mut() else {
        return on_error;
    };
    instance.last_error = None;
    match op(instance) {
        Ok(value) => value,
        Err(err) => {
            warn!(target: "bench::ffi", %err, "boundary operation failed");
            instance.set_error(&err);
            on_error
        }
    }
}

fn new_instance(chain: Result<ChainConfig>) -> *mut RevmInstance {
    match chain {
        Ok(chain) => into_raw(RevmInstance::new(&chain)),
        Err(err) => {
            warn!(target: "bench::ffi", %err, "cannot construct instance");
            ptr::null_mut()
        }
    }
}

// ── Construction ───────────────────────────────────────────────────────────

/// New instance on Ethereum mainnet parameters.
#[no_mangle]
pub extern "C" fn revm_new() -> *mut RevmInstance {
    new_instance(ChainConfig::from_preset(ChainPreset::Mainnet))
}

/// New instance for one of the `REVM_PRESET_*` chains; null for an unknown preset.
#[no_mangle]
pub extern "C" fn revm_new_with_preset(preset: u32) -> *mut RevmInstance {
    let preset = match preset {
        REVM_PRESET_MAINNET => Ok(ChainPreset::Mainnet),
        REVM_PRESET_BSC_TESTNET => Ok(ChainPreset::BscTestnet),
        REVM_PRESET_BSC_MAINNET => Ok(ChainPreset::BscMainnet),
        other => Err(HarnessError::Configuration(format!("unknown preset id {other}"))),
    };
    new_instance(preset.and_then(ChainConfig::from_preset))
}

/// New instance from explicit chain parameters; null if they are unusable.
///
/// # Safety
///
/// `config` must be null or point to a valid [`FfiChainConfig`].
#[no_mangle]
pub unsafe extern "C" fn revm_new_with_config(config: *const FfiChainConfig) -> *mut RevmInstance {
    let Some(config) = config.as_ref() else {
        return ptr::null_mut();
    };
    let params = CustomChain {
        chain_id: config.chain_id,
        gas_limit: (config.block_gas_limit != 0).then_some(config.block_gas_limit),
        base_fee: Some(config.base_fee),
        gas_price: Some(config.gas_price),
    };
    new_instance(ChainConfig::custom(params))
}

/// Release an instance. Null is ignored.
///
/// # Safety
///
/// `instance` must come from a `revm_new*` constructor and not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn revm_free(instance: *mut RevmInstance) {
    release(instance);
}

// ── Staged transactions ────────────────────────────────────────────────────

/// Stage a transaction for `revm_execute` / `revm_execute_commit`.
///
/// `to` null means contract creation; `gas_price` and `nonce` null mean the chain's gas
/// price and the caller's current nonce.
///
/// # Safety
///
/// `instance` must be live; string arguments must be null or valid C strings.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn revm_set_tx(
    instance: *mut RevmInstance,
    caller: *const c_char,
    to: *const c_char,
    value: *const c_char,
    data: *const c_char,
    gas_limit: u64,
    gas_price: *const c_char,
    nonce: *const c_char,
) -> c_int {
    with_instance(instance, REVM_ERR, |instance| {
        let kind = if to.is_null() {
            TxKind::Create
        } else {
            TxKind::Call(parse_address(read_str(to, "to")?)?)
        };
        let value = if value.is_null() { Default::default() } else { parse_amount(read_str(value, "value")?)? };
        let data = if data.is_null() { Default::default() } else { parse_bytecode(read_str(data, "data")?)? };
        let gas_price = if gas_price.is_null() {
            None
        } else {
            Some(u64_arg(read_str(gas_price, "gas price")?)?)
        };
        let nonce = if nonce.is_null() { None } else { Some(u64_arg(read_str(nonce, "nonce")?)?) };

        instance.pending = Some(TxRequest {
            caller: parse_address(read_str(caller, "caller")?)?,
            kind,
            value,
            data,
            gas_limit,
            gas_price,
            nonce,
        });
        Ok(REVM_OK)
    })
}

/// Execute the staged transaction without committing state.
///
/// # Safety
///
/// `instance` must be live.
#[no_mangle]
pub unsafe extern "C" fn revm_execute(instance: *mut RevmInstance) -> *mut FfiExecutionResult {
    execute_pending(instance, false)
}

/// Execute the staged transaction and commit its state changes.
///
/// # Safety
///
/// `instance` must be live.
#[no_mangle]
pub unsafe extern "C" fn revm_execute_commit(instance: *mut RevmInstance) -> *mut FfiExecutionResult {
    execute_pending(instance, true)
}

unsafe fn execute_pending(instance: *mut RevmInstance, commit: bool) -> *mut FfiExecutionResult {
    with_instance(instance, ptr::null_mut(), |instance| {
        // the staged transaction stays in place so it can be replayed
        let request = instance
            .pending
            .clone()
            .ok_or_else(|| HarnessError::Boundary("no transaction staged".into()))?;
        let executed = instance.backend.execute(request, commit)?;
        Ok(into_raw(FfiExecutionResult::new(executed.result, executed.created)))
    })
}

// ── One-shot execution ─────────────────────────────────────────────────────

/// Deploy `bytecode` (hex init-code) from `deployer` and commit.
///
/// # Safety
///
/// `instance` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn revm_deploy_contract(
    instance: *mut RevmInstance,
    deployer: *const c_char,
    bytecode: *const c_char,
    gas_limit: u64,
) -> *mut FfiDeploymentResult {
    with_instance(instance, ptr::null_mut(), |instance| {
        let deployer = parse_address(read_str(deployer, "deployer")?)?;
        let initcode = parse_bytecode(read_str(bytecode, "bytecode")?)?;
        let deployed = instance.backend.deploy(deployer, initcode, gas_limit)?;
        Ok(into_raw(FfiDeploymentResult::new(deployed.contract_address, deployed.gas_used)))
    })
}

/// Commit a call of `to` with hex calldata `data`. `value` null means zero.
///
/// # Safety
///
/// `instance` must be live; string arguments must be null where allowed or valid C strings.
#[no_mangle]
pub unsafe extern "C" fn revm_call_contract(
    instance: *mut RevmInstance,
    caller: *const c_char,
    to: *const c_char,
    data: *const c_char,
    value: *const c_char,
    gas_limit: u64,
) -> *mut FfiExecutionResult {
    with_instance(instance, ptr::null_mut(), |instance| {
        let mut frame = CallFrame::new(
            parse_address(read_str(caller, "caller")?)?,
            parse_address(read_str(to, "to")?)?,
            parse_bytecode(read_str(data, "data")?)?,
            gas_limit,
        );
        if !value.is_null() {
            frame.value = parse_amount(read_str(value, "value")?)?;
        }
        let result = instance.backend.call(&frame)?;
        Ok(into_raw(FfiExecutionResult::new(result, None)))
    })
}

/// Commit a plain value transfer.
///
/// # Safety
///
/// `instance` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn revm_transfer(
    instance: *mut RevmInstance,
    from: *const c_char,
    to: *const c_char,
    value: *const c_char,
    gas_limit: u64,
) -> *mut FfiExecutionResult {
    with_instance(instance, ptr::null_mut(), |instance| {
        let from = parse_address(read_str(from, "from")?)?;
        let to = parse_address(read_str(to, "to")?)?;
        let value = parse_amount(read_str(value, "value")?)?;
        let result = instance.backend.transfer(from, to, value, gas_limit)?;
        Ok(into_raw(FfiExecutionResult::new(result, None)))
    })
}

// ── Account state ──────────────────────────────────────────────────────────

/// Balance of `address` as a hex string.
///
/// # Safety
///
/// `instance` must be live; `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn revm_get_balance(instance: *mut RevmInstance, address: *const c_char) -> *mut c_char {
    with_instance(instance, ptr::null_mut(), |instance| {
        let address = parse_address(read_str(address, "address")?)?;
        owned_string(format_word_hex(instance.backend.get_balance(address)?))
    })
}

/// # Safety
///
/// `instance` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn revm_set_balance(
    instance: *mut RevmInstance,
    address: *const c_char,
    balance: *const c_char,
) -> c_int {
    with_instance(instance, REVM_ERR, |instance| {
        let address = parse_address(read_str(address, "address")?)?;
        let balance = parse_amount(read_str(balance, "balance")?)?;
        instance.backend.set_balance(address, balance)?;
        Ok(REVM_OK)
    })
}

/// Write the nonce of `address` to `out`.
///
/// # Safety
///
/// `instance` must be live; `address` a valid C string; `out` writable.
#[no_mangle]
pub unsafe extern "C" fn revm_get_nonce(instance: *mut RevmInstance, address: *const c_char, out: *mut u64) -> c_int {
    with_instance(instance, REVM_ERR, |instance| {
        if out.is_null() {
            return Err(HarnessError::Boundary("null nonce output".into()));
        }
        let address = parse_address(read_str(address, "address")?)?;
        *out = instance.backend.get_nonce(address)?;
        Ok(REVM_OK)
    })
}

/// # Safety
///
/// `instance` must be live; `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn revm_set_nonce(instance: *mut RevmInstance, address: *const c_char, nonce: u64) -> c_int {
    with_instance(instance, REVM_ERR, |instance| {
        let address = parse_address(read_str(address, "address")?)?;
        instance.backend.set_nonce(address, nonce)?;
        Ok(REVM_OK)
    })
}

/// Storage word at (`address`, `slot`) as a hex string.
///
/// # Safety
///
/// `instance` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn revm_get_storage(
    instance: *mut RevmInstance,
    address: *const c_char,
    slot: *const c_char,
) -> *mut c_char {
    with_instance(instance, ptr::null_mut(), |instance| {
        let address = parse_address(read_str(address, "address")?)?;
        let slot = parse_amount(read_str(slot, "slot")?)?;
        owned_string(format_word_hex(instance.backend.get_storage(address, slot)?))
    })
}

/// # Safety
///
/// `instance` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn revm_set_storage(
    instance: *mut RevmInstance,
    address: *const c_char,
    slot: *const c_char,
    value: *const c_char,
) -> c_int {
    with_instance(instance, REVM_ERR, |instance| {
        let address = parse_address(read_str(address, "address")?)?;
        let slot = parse_amount(read_str(slot, "slot")?)?;
        let value = parse_amount(read_str(value, "value")?)?;
        instance.backend.set_storage(address, slot, value)?;
        Ok(REVM_OK)
    })
}

/// Runtime code of `address` as a `0x`-prefixed hex string (`0x` when empty).
///
/// # Safety
///
/// `instance` must be live; `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn revm_get_code(instance: *mut RevmInstance, address: *const c_char) -> *mut c_char {
    with_instance(instance, ptr::null_mut(), |instance| {
        let address = parse_address(read_str(address, "address")?)?;
        owned_string(format!("0x{}", hex::encode(instance.backend.get_code(address)?)))
    })
}

// ── Introspection ──────────────────────────────────────────────────────────

/// Chain id of the instance; 0 for a null instance.
///
/// # Safety
///
/// `instance` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn revm_get_chain_id(instance: *const RevmInstance) -> u64 {
    instance.as_ref().map_or(0, |instance| instance.chain_id)
}

/// revm spec id of the instance; `u8::MAX` for a null instance.
///
/// # Safety
///
/// `instance` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn revm_get_spec_id(instance: *const RevmInstance) -> u8 {
    instance.as_ref().map_or(u8::MAX, |instance| instance.spec as u8)
}

/// Message of the last failed operation, or null. Owned by the instance.
///
/// # Safety
///
/// `instance` must be null or live. The pointer is invalidated by the next operation.
#[no_mangle]
pub unsafe extern "C" fn revm_get_last_error(instance: *const RevmInstance) -> *const c_char {
    instance
        .as_ref()
        .and_then(|instance| instance.last_error.as_deref())
        .map_or(ptr::null(), CStr::as_ptr)
}

// ── Release ────────────────────────────────────────────────────────────────

/// # Safety
///
/// `s` must be null or a string returned by this library, not yet released.
#[no_mangle]
pub unsafe extern "C" fn revm_free_string(s: *mut c_char) {
    if !s.is_null() {
        track_release();
        drop(std::ffi::CString::from_raw(s));
    }
}

/// # Safety
///
/// `result` must be null or an execution result returned by this library, not yet released.
#[no_mangle]
pub unsafe extern "C" fn revm_free_execution_result(result: *mut FfiExecutionResult) {
    release(result);
}

/// # Safety
///
/// `result` must be null or a deployment result returned by this library, not yet released.
#[no_mangle]
pub unsafe extern "C" fn revm_free_deployment_result(result: *mut FfiDeploymentResult) {
    release(result);
}

fn u64_arg(input: &str) -> Result<u64> {
    let value = parse_amount(input)?;
    u64::try_from(value).map_err(|_| HarnessError::AmountFormat(input.to_string()))
}
