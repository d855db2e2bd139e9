//! Backend reached through the `revm_*` C ABI.
//!
//! Arguments go out as hex strings. Every object the boundary returns is wrapped in an
//! [`Owned`] guard as soon as it arrives, so it is released exactly once on every path,
//! including `?` early returns. A null return is turned into [`HarnessError::Boundary`]
//! with the instance's last error, read before anything else touches the instance.

use super::{BackendKind, CallFrame, DeploymentResult, ExecutionResult, VmBackend};
use crate::abi::{format_word_hex, parse_address, parse_amount, parse_bytecode};
use crate::chain::{ChainConfig, ChainPreset};
use crate::error::{HarnessError, Result};
use crate::ffi::{self, FfiChainConfig, FfiDeploymentResult, FfiExecutionResult, FfiLog, RevmInstance};
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use reth_tracing::tracing::{debug, warn};
use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr::{self, NonNull};

/// Something the boundary hands out and expects back through a `revm_free*` function.
trait BoundaryOwned {
    /// # Safety
    ///
    /// `ptr` must be a live object of this kind, never released before.
    unsafe fn release(ptr: *mut Self);
}

impl BoundaryOwned for FfiExecutionResult {
    unsafe fn release(ptr: *mut Self) {
        ffi::revm_free_execution_result(ptr);
    }
}

impl BoundaryOwned for FfiDeploymentResult {
    unsafe fn release(ptr: *mut Self) {
        ffi::revm_free_deployment_result(ptr);
    }
}

impl BoundaryOwned for c_char {
    unsafe fn release(ptr: *mut Self) {
        ffi::revm_free_string(ptr);
    }
}

/// Scoped ownership of one boundary object; releases it on drop.
struct Owned<T: BoundaryOwned> {
    ptr: NonNull<T>,
}

impl<T: BoundaryOwned> Owned<T> {
    fn get(&self) -> &T {
        // SAFETY: the pointer stays live until `drop` releases it.
        unsafe { self.ptr.as_ref() }
    }
}

impl Owned<c_char> {
    fn to_str(&self) -> Result<&str> {
        // SAFETY: boundary strings are NUL-terminated and live until released.
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
            .to_str()
            .map_err(|_| HarnessError::Boundary("boundary string is not valid UTF-8".into()))
    }
}

impl<T: BoundaryOwned> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: constructed only from a fresh non-null boundary pointer; dropped once.
        unsafe { T::release(self.ptr.as_ptr()) }
    }
}

/// revm behind the C ABI. Owns its instance and frees it on drop.
#[derive(Debug)]
pub struct BridgedBackend {
    instance: NonNull<RevmInstance>,
}

impl BridgedBackend {
    /// Construct an instance through `revm_new_with_preset` or `revm_new_with_config`.
    pub fn new(chain: &ChainConfig) -> Result<Self> {
        let raw = match chain.preset() {
            ChainPreset::Mainnet => ffi::revm_new_with_preset(ffi::REVM_PRESET_MAINNET),
            ChainPreset::BscTestnet => ffi::revm_new_with_preset(ffi::REVM_PRESET_BSC_TESTNET),
            ChainPreset::BscMainnet => ffi::revm_new_with_preset(ffi::REVM_PRESET_BSC_MAINNET),
            ChainPreset::Custom => {
                let config = FfiChainConfig {
                    chain_id: chain.chain_id(),
                    block_gas_limit: chain.block().gas_limit,
                    base_fee: chain.block().base_fee,
                    gas_price: chain.gas_price(),
                };
                // SAFETY: `config` outlives the call.
                unsafe { ffi::revm_new_with_config(&config) }
            }
        };
        let instance = NonNull::new(raw).ok_or_else(|| {
            HarnessError::Boundary(format!("failed to create instance for chain {}", chain.chain_id()))
        })?;
        debug!(target: "bench::bridged", chain_id = chain.chain_id(), "instance created");
        Ok(Self { instance })
    }

    /// Stage a transaction and dry-run it.
    fn staged_query(&mut self, caller: Address, callee: Address, input: &[u8], gas_limit: u64) -> Result<ExecutionResult> {
        let caller = address_arg(caller)?;
        let callee = address_arg(callee)?;
        let data = bytes_arg(input)?;

        // SAFETY: instance is live; argument strings outlive the call.
        let status = unsafe {
            ffi::revm_set_tx(
                self.raw(),
                caller.as_ptr(),
                callee.as_ptr(),
                ptr::null(),
                data.as_ptr(),
                gas_limit,
                ptr::null(),
                ptr::null(),
            )
        };
        self.check(status)?;

        // SAFETY: instance is live.
        let result = self.acquire(unsafe { ffi::revm_execute(self.raw()) })?;
        execution_result(result.get())
    }

    fn raw(&self) -> *mut RevmInstance {
        self.instance.as_ptr()
    }

    /// Take ownership of a boundary result, or fetch the last error if there is none.
    fn acquire<T: BoundaryOwned>(&self, ptr: *mut T) -> Result<Owned<T>> {
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Owned { ptr }),
            None => Err(self.last_error()),
        }
    }

    fn check(&self, status: c_int) -> Result<()> {
        if status == ffi::REVM_OK {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    fn last_error(&self) -> HarnessError {
        // SAFETY: instance is live; the message is copied out before any other call.
        let message = unsafe {
            let ptr = ffi::revm_get_last_error(self.raw());
            if ptr.is_null() {
                "unknown boundary error".to_string()
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        };
        warn!(target: "bench::bridged", %message, "boundary call failed");
        HarnessError::Boundary(message)
    }
}

impl Drop for BridgedBackend {
    fn drop(&mut self) {
        // SAFETY: the instance is owned exclusively by `self` and freed only here.
        unsafe { ffi::revm_free(self.raw()) }
    }
}

impl VmBackend for BridgedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bridged
    }

    fn chain_id(&mut self) -> Result<u64> {
        // SAFETY: instance is live.
        Ok(unsafe { ffi::revm_get_chain_id(self.raw()) })
    }

    fn deploy(&mut self, deployer: Address, initcode: Bytes, gas_limit: u64) -> Result<DeploymentResult> {
        let deployer = address_arg(deployer)?;
        let initcode = bytes_arg(&initcode)?;

        // SAFETY: instance is live; argument strings outlive the call.
        let raw = unsafe { ffi::revm_deploy_contract(self.raw(), deployer.as_ptr(), initcode.as_ptr(), gas_limit) };
        let deployed = self.acquire(raw)?;

        if deployed.get().contract_address.is_null() {
            return Err(HarnessError::Boundary("deployment result without contract address".into()));
        }
        let address = {
            // SAFETY: non-null and owned by `deployed`, which is still live here.
            let text = unsafe { CStr::from_ptr(deployed.get().contract_address) };
            let text = text
                .to_str()
                .map_err(|_| HarnessError::Boundary("contract address is not valid UTF-8".into()))?;
            parse_address(text)?
        };
        let gas_used = deployed.get().gas_used;
        drop(deployed);

        let deployed_code = self.get_code(address)?;
        Ok(DeploymentResult { contract_address: address, gas_used, deployed_code })
    }

    fn call(&mut self, frame: &CallFrame) -> Result<ExecutionResult> {
        let caller = address_arg(frame.caller)?;
        let callee = address_arg(frame.callee)?;
        let data = bytes_arg(&frame.input)?;
        let value = word_arg(frame.value)?;

        // SAFETY: instance is live; argument strings outlive the call.
        let raw = unsafe {
            ffi::revm_call_contract(
                self.raw(),
                caller.as_ptr(),
                callee.as_ptr(),
                data.as_ptr(),
                value.as_ptr(),
                frame.gas_limit,
            )
        };
        let result = self.acquire(raw)?;
        execution_result(result.get())
    }

    fn query(&mut self, caller: Address, callee: Address, input: Bytes, gas_limit: u64) -> Result<ExecutionResult> {
        self.staged_query(caller, callee, &input, gas_limit)
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256, gas_limit: u64) -> Result<ExecutionResult> {
        let from = address_arg(from)?;
        let to = address_arg(to)?;
        let value = word_arg(value)?;

        // SAFETY: instance is live; argument strings outlive the call.
        let raw = unsafe { ffi::revm_transfer(self.raw(), from.as_ptr(), to.as_ptr(), value.as_ptr(), gas_limit) };
        let result = self.acquire(raw)?;
        execution_result(result.get())
    }

    fn set_balance(&mut self, address: Address, balance: U256) -> Result<()> {
        let address = address_arg(address)?;
        let balance = word_arg(balance)?;
        // SAFETY: instance is live; argument strings outlive the call.
        let status = unsafe { ffi::revm_set_balance(self.raw(), address.as_ptr(), balance.as_ptr()) };
        self.check(status)
    }

    fn get_balance(&mut self, address: Address) -> Result<U256> {
        let address = address_arg(address)?;
        // SAFETY: instance is live; argument strings outlive the call.
        let balance = self.acquire(unsafe { ffi::revm_get_balance(self.raw(), address.as_ptr()) })?;
        parse_amount(balance.to_str()?)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
        let address = address_arg(address)?;
        // SAFETY: instance is live; argument strings outlive the call.
        let status = unsafe { ffi::revm_set_nonce(self.raw(), address.as_ptr(), nonce) };
        self.check(status)
    }

    fn get_nonce(&mut self, address: Address) -> Result<u64> {
        let address = address_arg(address)?;
        let mut nonce = 0u64;
        // SAFETY: instance is live; `nonce` is writable for the duration of the call.
        let status = unsafe { ffi::revm_get_nonce(self.raw(), address.as_ptr(), &mut nonce) };
        self.check(status)?;
        Ok(nonce)
    }

    fn set_storage(&mut self, address: Address, slot: U256, value: U256) -> Result<()> {
        let address = address_arg(address)?;
        let slot = word_arg(slot)?;
        let value = word_arg(value)?;
        // SAFETY: instance is live; argument strings outlive the call.
        let status = unsafe { ffi::revm_set_storage(self.raw(), address.as_ptr(), slot.as_ptr(), value.as_ptr()) };
        self.check(status)
    }

    fn get_storage(&mut self, address: Address, slot: U256) -> Result<U256> {
        let address = address_arg(address)?;
        let slot = word_arg(slot)?;
        // SAFETY: instance is live; argument strings outlive the call.
        let value = self.acquire(unsafe { ffi::revm_get_storage(self.raw(), address.as_ptr(), slot.as_ptr()) })?;
        parse_amount(value.to_str()?)
    }

    fn get_code(&mut self, address: Address) -> Result<Bytes> {
        let address = address_arg(address)?;
        // SAFETY: instance is live; argument strings outlive the call.
        let code = self.acquire(unsafe { ffi::revm_get_code(self.raw(), address.as_ptr()) })?;
        parse_bytecode(code.to_str()?)
    }
}

// ── Marshaling ─────────────────────────────────────────────────────────────

fn c_string(value: String) -> Result<CString> {
    CString::new(value).map_err(|e| HarnessError::Boundary(e.to_string()))
}

fn address_arg(address: Address) -> Result<CString> {
    c_string(address.to_checksum(None))
}

fn word_arg(value: U256) -> Result<CString> {
    c_string(format_word_hex(value))
}

fn bytes_arg(data: &[u8]) -> Result<CString> {
    c_string(format!("0x{}", hex::encode(data)))
}

/// Borrow a string nested in a live boundary result.
///
/// # Safety
///
/// `ptr` must be null or a NUL-terminated string owned by a result that is still live.
unsafe fn nested_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(HarnessError::Boundary(format!("{what} missing from result")));
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| HarnessError::Boundary(format!("{what} is not valid UTF-8")))
}

/// Copy a boundary execution result into an owned one.
fn execution_result(raw: &FfiExecutionResult) -> Result<ExecutionResult> {
    // SAFETY: `raw` is borrowed from a live `Owned` guard.
    let output = Bytes::copy_from_slice(unsafe { raw.output() });
    let revert_reason = if raw.revert_reason.is_null() {
        None
    } else {
        // SAFETY: non-null strings in a live result are NUL-terminated.
        Some(unsafe { CStr::from_ptr(raw.revert_reason) }.to_string_lossy().into_owned())
    };
    // SAFETY: as above.
    let logs = unsafe { raw.logs() }.iter().map(event_log).collect::<Result<Vec<_>>>()?;
    Ok(ExecutionResult {
        success: raw.success == 1,
        gas_used: raw.gas_used,
        gas_refunded: raw.gas_refunded,
        output,
        logs,
        revert_reason,
    })
}

fn event_log(raw: &FfiLog) -> Result<Log> {
    // SAFETY: `raw` lives inside a result held by an `Owned` guard.
    unsafe {
        let address = parse_address(nested_str(raw.address, "log address")?)?;
        let topics = raw
            .topics()
            .iter()
            .map(|&topic| {
                let word = parse_amount(nested_str(topic, "log topic")?)?;
                Ok(B256::from(word))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Log::new_unchecked(address, topics, Bytes::copy_from_slice(raw.data())))
    }
}
