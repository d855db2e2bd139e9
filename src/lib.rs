//! ERC-20 transfer throughput harness for revm.
//!
//! A [`driver::BenchmarkDriver`] deploys a fixed token contract, mints and distributes a
//! supply, then times a loop of `transfer` calls. The same script runs against two
//! [`evm::VmBackend`] realizations: revm embedded in-process, and revm reached through the
//! `revm_*` C ABI in [`ffi`].

pub mod abi;
pub mod chain;
pub mod cli;
pub mod config;
pub mod deployer;
pub mod driver;
pub mod error;
pub mod evm;
pub mod ffi;
pub mod fixtures;

pub use error::{HarnessError, Result};
