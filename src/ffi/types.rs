//! C-compatible types crossing the `revm_*` boundary, and their ownership rules.
//!
//! Every pointer handed out by the boundary (instance, result, string) is owned by the
//! library until the caller passes it back to the matching `revm_free*` function exactly
//! once. A per-thread counter tracks how many are outstanding. Buffers nested inside a
//! result (output, strings, logs and their topics) are released with their parent and
//! tracked by a second counter.

use crate::chain::ChainConfig;
use crate::error::{HarnessError, Result};
use crate::evm::embedded::{EmbeddedBackend, TxRequest};
use crate::evm::ExecutionResult;
use alloy_evm::revm::primitives::hardfork::SpecId;
use alloy_primitives::{Address, Log};
use std::cell::Cell;
use std::ffi::{c_char, c_int, CString};
use std::ptr;

/// `revm_new_with_preset` argument for Ethereum mainnet.
pub const REVM_PRESET_MAINNET: u32 = 0;
/// `revm_new_with_preset` argument for BSC testnet.
pub const REVM_PRESET_BSC_TESTNET: u32 = 1;
/// `revm_new_with_preset` argument for BSC mainnet.
pub const REVM_PRESET_BSC_MAINNET: u32 = 2;

/// Status returned by `revm_*` setters.
pub const REVM_OK: c_int = 0;
pub const REVM_ERR: c_int = -1;

thread_local! {
    static LIVE_OBJECTS: Cell<i64> = const { Cell::new(0) };
    static LIVE_BUFFERS: Cell<i64> = const { Cell::new(0) };
}

/// Boundary-owned objects handed out on this thread and not yet released.
///
/// Negative means something was released more often than it was acquired.
pub fn live_objects() -> i64 {
    LIVE_OBJECTS.with(Cell::get)
}

pub(crate) fn track_acquire() {
    LIVE_OBJECTS.with(|live| live.set(live.get() + 1));
}

pub(crate) fn track_release() {
    LIVE_OBJECTS.with(|live| live.set(live.get() - 1));
}

/// Buffers nested inside results handed out on this thread and not yet released.
pub fn live_buffers() -> i64 {
    LIVE_BUFFERS.with(Cell::get)
}

fn buffer_acquired() {
    LIVE_BUFFERS.with(|live| live.set(live.get() + 1));
}

fn buffer_released() {
    LIVE_BUFFERS.with(|live| live.set(live.get() - 1));
}

/// Opaque VM instance behind a `*mut RevmInstance`.
pub struct RevmInstance {
    pub(crate) backend: EmbeddedBackend,
    pub(crate) chain_id: u64,
    pub(crate) spec: SpecId,
    /// Transaction staged by `revm_set_tx`
    pub(crate) pending: Option<TxRequest>,
    /// Valid until the next operation on this instance
    pub(crate) last_error: Option<CString>,
}

impl RevmInstance {
    pub(crate) fn new(chain: &ChainConfig) -> Self {
        Self {
            backend: EmbeddedBackend::new(chain),
            chain_id: chain.chain_id(),
            spec: chain.spec(),
            pending: None,
            last_error: None,
        }
    }

    pub(crate) fn set_error(&mut self, err: &HarnessError) {
        // interior NULs would truncate the message on the C side anyway
        let message = err.to_string().replace('\0', " ");
        self.last_error = CString::new(message).ok();
    }
}

/// Explicit chain parameters for `revm_new_with_config`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiChainConfig {
    pub chain_id: u64,
    /// Zero selects the default block gas limit
    pub block_gas_limit: u64,
    pub base_fee: u64,
    pub gas_price: u64,
}

/// Result of `revm_execute`, `revm_execute_commit`, `revm_call_contract` and `revm_transfer`.
#[repr(C)]
#[derive(Debug)]
pub struct FfiExecutionResult {
    /// 1 on success, 0 on revert or halt
    pub success: c_int,
    pub gas_used: u64,
    pub gas_refunded: u64,
    /// Null when the output is empty
    pub output_data: *mut u8,
    pub output_len: usize,
    /// Null unless the call reverted with a decodable reason
    pub revert_reason: *mut c_char,
    /// Null unless a contract was created
    pub created_address: *mut c_char,
    /// Null when no events were emitted
    pub logs: *mut FfiLog,
    pub logs_count: usize,
}

impl FfiExecutionResult {
    pub(crate) fn new(result: ExecutionResult, created: Option<Address>) -> Self {
        let logs: Vec<FfiLog> = result.logs.iter().map(FfiLog::new).collect();
        let logs_count = logs.len();

        Self {
            success: c_int::from(result.success),
            gas_used: result.gas_used,
            gas_refunded: result.gas_refunded,
            output_data: raw_array(result.output.to_vec()),
            output_len: result.output.len(),
            revert_reason: result.revert_reason.map_or(ptr::null_mut(), raw_string),
            created_address: created.map_or(ptr::null_mut(), |address| raw_string(address.to_checksum(None))),
            logs: raw_array(logs),
            logs_count,
        }
    }

    /// Output bytes; empty when `output_data` is null.
    ///
    /// # Safety
    ///
    /// `self` must have been produced by this library and not yet released.
    pub unsafe fn output(&self) -> &[u8] {
        borrow_array(self.output_data, self.output_len)
    }

    /// # Safety
    ///
    /// `self` must have been produced by this library and not yet released.
    pub unsafe fn logs(&self) -> &[FfiLog] {
        borrow_array(self.logs, self.logs_count)
    }
}

impl Drop for FfiExecutionResult {
    fn drop(&mut self) {
        // SAFETY: every field was allocated in `new` with the matching layout.
        unsafe {
            free_array(self.output_data, self.output_len);
            free_string(self.revert_reason);
            free_string(self.created_address);
            // drops every FfiLog, which frees its own buffers
            free_array(self.logs, self.logs_count);
        }
    }
}

/// One emitted event inside an [`FfiExecutionResult`].
#[repr(C)]
#[derive(Debug)]
pub struct FfiLog {
    /// Checksummed emitter address
    pub address: *mut c_char,
    /// `topics_count` strings, each a `0x`-prefixed 32-byte hex word; null when there are none
    pub topics: *mut *mut c_char,
    pub topics_count: usize,
    /// Null when the event carries no data
    pub data: *mut u8,
    pub data_len: usize,
}

impl FfiLog {
    fn new(log: &Log) -> Self {
        let topics: Vec<*mut c_char> =
            log.data.topics().iter().map(|topic| raw_string(format!("0x{}", hex::encode(topic)))).collect();
        let topics_count = topics.len();
        Self {
            address: raw_string(log.address.to_checksum(None)),
            topics: raw_array(topics),
            topics_count,
            data: raw_array(log.data.data.to_vec()),
            data_len: log.data.data.len(),
        }
    }

    /// # Safety
    ///
    /// The owning result must not have been released.
    pub unsafe fn topics(&self) -> &[*mut c_char] {
        borrow_array(self.topics, self.topics_count)
    }

    /// # Safety
    ///
    /// The owning result must not have been released.
    pub unsafe fn data(&self) -> &[u8] {
        borrow_array(self.data, self.data_len)
    }
}

impl Drop for FfiLog {
    fn drop(&mut self) {
        // SAFETY: every field was allocated in `new` with the matching layout.
        unsafe {
            free_string(self.address);
            for &topic in self.topics() {
                free_string(topic);
            }
            free_array(self.topics, self.topics_count);
            free_array(self.data, self.data_len);
        }
    }
}

/// Result of `revm_deploy_contract`.
#[repr(C)]
#[derive(Debug)]
pub struct FfiDeploymentResult {
    pub contract_address: *mut c_char,
    pub gas_used: u64,
}

impl FfiDeploymentResult {
    pub(crate) fn new(contract_address: Address, gas_used: u64) -> Self {
        Self { contract_address: raw_string(contract_address.to_checksum(None)), gas_used }
    }
}

impl Drop for FfiDeploymentResult {
    fn drop(&mut self) {
        // SAFETY: allocated by `raw_string` in `new`.
        unsafe { free_string(self.contract_address) };
    }
}

/// Move a value to the heap and hand its ownership to the caller.
pub(crate) fn into_raw<T>(value: T) -> *mut T {
    track_acquire();
    Box::into_raw(Box::new(value))
}

/// Take back ownership of a value handed out by [`into_raw`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must come from [`into_raw`] and must not have been released before.
pub(crate) unsafe fn release<T>(ptr: *mut T) {
    if !ptr.is_null() {
        track_release();
        drop(Box::from_raw(ptr));
    }
}

/// A top-level string returned to the caller, counted as a boundary-owned object.
pub(crate) fn owned_string(value: String) -> Result<*mut c_char> {
    let value = CString::new(value).map_err(|e| HarnessError::Boundary(e.to_string()))?;
    track_acquire();
    Ok(value.into_raw())
}

/// A string embedded in a result struct; released together with its parent.
fn raw_string(value: String) -> *mut c_char {
    match CString::new(value.replace('\0', " ")) {
        Ok(value) => {
            buffer_acquired();
            value.into_raw()
        }
        Err(_) => ptr::null_mut(),
    }
}

/// # Safety
///
/// `ptr` must be null or come from [`raw_string`], not yet freed.
unsafe fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        buffer_released();
        drop(CString::from_raw(ptr));
    }
}

/// An array embedded in a result struct; null when empty.
fn raw_array<T>(items: Vec<T>) -> *mut T {
    if items.is_empty() {
        return ptr::null_mut();
    }
    buffer_acquired();
    Box::into_raw(items.into_boxed_slice()).cast::<T>()
}

/// # Safety
///
/// `ptr` must be null or come from [`raw_array`] with exactly `len` items, not yet freed.
unsafe fn free_array<T>(ptr: *mut T, len: usize) {
    if !ptr.is_null() {
        buffer_released();
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// # Safety
///
/// `ptr` must be null or point to `len` live items that outlive `'a`.
unsafe fn borrow_array<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}
