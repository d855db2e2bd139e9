//! Error taxonomy shared by every layer of the harness.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Errors that can occur while building, driving or verifying a benchmark run
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Unknown chain preset or unusable explicit chain parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Address input with the wrong length or non-hex characters
    #[error("Invalid address {input:?}: {reason}")]
    AddressFormat { input: String, reason: &'static str },

    /// Numeral that parses as neither `0x` hex nor decimal, or does not fit in a word
    #[error("Invalid amount {0:?}")]
    AmountFormat(String),

    /// Return data that is not exactly one 32-byte word
    #[error("Malformed return data: expected 32 bytes, got {0}")]
    MalformedReturnData(usize),

    /// Create reverted, halted, or succeeded without leaving code behind
    #[error("Deployment failed: {0}")]
    DeploymentFailure(String),

    /// Call finished with a non-success status
    #[error("Call failed{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    CallFailure { reason: Option<String> },

    /// The bridged backend returned no result; the message comes from `get_last_error`
    #[error("Boundary error: {0}")]
    Boundary(String),

    /// The engine refused the transaction before executing it
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    /// Final balances disagree with the transfers that were performed
    #[error("Balance of {account} is {actual}, expected {expected}")]
    VerificationFailure { account: Address, expected: U256, actual: U256 },

    /// Sweep configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Sweep configuration file is not valid JSON for the expected schema
    #[error("Invalid sweep configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn address(input: &str, reason: &'static str) -> Self {
        Self::AddressFormat { input: input.to_string(), reason }
    }
}
