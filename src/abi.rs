//! Fixed-width contract call encoding.
//!
//! Everything here works on the static ABI subset the benchmark needs: a 4-byte selector
//! followed by one 32-byte word per argument. Selectors are known literals, never hashed.
//!
//! ```text
//! selector(4) ++ arg_1(32) ++ ... ++ arg_k(32)
//! address arg: 12 zero bytes ++ 20 address bytes
//! word arg:    big-endian, left-zero-padded
//! ```

use crate::error::{HarnessError, Result};
use alloy_primitives::{Address, Bytes, U256};

/// A 4-byte function selector.
pub type Selector = [u8; 4];

/// Size of one ABI slot.
pub const WORD_SIZE: usize = 32;

/// Selectors of the token and helper contracts driven by the benchmark.
pub mod selectors {
    use super::Selector;

    /// `transfer(address,uint256)`
    pub const TRANSFER: Selector = [0xa9, 0x05, 0x9c, 0xbb];
    /// `mint(address,uint256)`
    pub const MINT: Selector = [0x40, 0xc1, 0x0f, 0x19];
    /// `balanceOf(address)`
    pub const BALANCE_OF: Selector = [0x70, 0xa0, 0x82, 0x31];
    /// `totalSupply()`
    pub const TOTAL_SUPPLY: Selector = [0x18, 0x16, 0x0d, 0xdd];
    /// `approve(address,uint256)`
    pub const APPROVE: Selector = [0x09, 0x5e, 0xa7, 0xb3];
    /// `transferFrom(address,address,uint256)`
    pub const TRANSFER_FROM: Selector = [0x23, 0xb8, 0x72, 0xdd];
    /// `allowance(address,address)`
    pub const ALLOWANCE: Selector = [0xdd, 0x62, 0xed, 0x3e];
    /// `benchmarkTransfers(address,address,uint256,uint256)` on the batching helper
    pub const BENCHMARK_TRANSFERS: Selector = [0x87, 0x2c, 0x70, 0x46];
    /// `Error(string)` revert payload
    pub const ERROR_STRING: Selector = [0x08, 0xc3, 0x79, 0xa0];
    /// `Panic(uint256)` revert payload
    pub const PANIC: Selector = [0x4e, 0x48, 0x7b, 0x71];
}

/// One statically-sized call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiArg {
    Address(Address),
    Word(U256),
}

impl AbiArg {
    /// Append this argument's 32-byte slot to `out`.
    fn write_slot(&self, out: &mut Vec<u8>) {
        match self {
            Self::Address(address) => {
                out.extend_from_slice(&[0u8; 12]);
                out.extend_from_slice(address.as_slice());
            }
            Self::Word(value) => out.extend_from_slice(&value.to_be_bytes::<WORD_SIZE>()),
        }
    }
}

impl From<Address> for AbiArg {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<U256> for AbiArg {
    fn from(value: U256) -> Self {
        Self::Word(value)
    }
}

/// Encode the argument slots alone, in declared order.
pub fn encode_args(args: &[AbiArg]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD_SIZE * args.len());
    for arg in args {
        arg.write_slot(&mut out);
    }
    out
}

/// Encode `selector ++ args`. The result is always `4 + 32 * args.len()` bytes.
pub fn encode_call(selector: Selector, args: &[AbiArg]) -> Bytes {
    let mut out = Vec::with_capacity(4 + WORD_SIZE * args.len());
    out.extend_from_slice(&selector);
    for arg in args {
        arg.write_slot(&mut out);
    }
    out.into()
}

/// Build init-code: creation bytecode followed by the constructor argument slots.
pub fn encode_initcode(bytecode: &[u8], constructor_args: &[AbiArg]) -> Bytes {
    let mut out = Vec::with_capacity(bytecode.len() + WORD_SIZE * constructor_args.len());
    out.extend_from_slice(bytecode);
    out.extend(encode_args(constructor_args));
    out.into()
}

/// Borrow the `index`-th argument slot of encoded calldata.
pub fn argument_slot(calldata: &[u8], index: usize) -> Option<&[u8]> {
    let start = 4 + index * WORD_SIZE;
    calldata.get(start..start + WORD_SIZE)
}

/// Decode return data that must be exactly one word.
pub fn decode_word(output: &[u8]) -> Result<U256> {
    if output.len() != WORD_SIZE {
        return Err(HarnessError::MalformedReturnData(output.len()));
    }
    Ok(U256::from_be_slice(output))
}

/// ERC-20 style boolean check: only the lowest-order bit of the word is inspected.
pub fn is_truthy(word: U256) -> bool {
    word.bit(0)
}

/// Parse a numeral given either as `0x`-prefixed hex or as plain decimal.
///
/// Values that do not fit in 256 bits are rejected rather than truncated.
pub fn parse_amount(input: &str) -> Result<U256> {
    let trimmed = input.trim();
    let (digits, radix) = match strip_hex_prefix(trimmed) {
        Some(hex_digits) => (hex_digits, 16),
        None => (trimmed, 10),
    };

    let valid = !digits.is_empty()
        && digits.chars().all(|c| if radix == 16 { c.is_ascii_hexdigit() } else { c.is_ascii_digit() });
    if !valid {
        return Err(HarnessError::AmountFormat(input.to_string()));
    }

    U256::from_str_radix(digits, radix).map_err(|_| HarnessError::AmountFormat(input.to_string()))
}

/// Parse an address from at most 40 hex digits, `0x` optional, any letter case.
///
/// Shorter inputs are left-zero-padded to 20 bytes.
pub fn parse_address(input: &str) -> Result<Address> {
    let digits = strip_hex_prefix(input).unwrap_or(input);

    if digits.is_empty() {
        return Err(HarnessError::address(input, "empty"));
    }
    if digits.len() > 40 {
        return Err(HarnessError::address(input, "more than 40 hex digits"));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HarnessError::address(input, "non-hex character"));
    }

    let padded = format!("{digits:0>40}");
    let bytes = hex::decode(padded).map_err(|_| HarnessError::address(input, "non-hex character"))?;
    Ok(Address::from_slice(&bytes))
}

/// Parse hex-encoded bytecode, `0x` optional. Odd-length input gets a leading zero nibble.
pub fn parse_bytecode(input: &str) -> Result<Bytes> {
    let trimmed = input.trim();
    let digits = strip_hex_prefix(trimmed).unwrap_or(trimmed);
    let decoded = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))
    } else {
        hex::decode(digits)
    };
    decoded
        .map(Bytes::from)
        .map_err(|e| HarnessError::Configuration(format!("invalid bytecode hex: {e}")))
}

/// Decode a revert payload into a readable reason, if it follows a known shape.
///
/// Handles `Error(string)` and `Panic(uint256)`; anything else yields `None`.
pub fn decode_revert_reason(output: &[u8]) -> Option<String> {
    let (selector, body) = output.split_first_chunk::<4>()?;

    if *selector == selectors::PANIC {
        let code = u64::try_from(decode_word(body.get(..WORD_SIZE)?).ok()?).ok()?;
        return Some(format!("Panic(0x{code:x})"));
    }
    if *selector != selectors::ERROR_STRING {
        return None;
    }

    let offset = usize::try_from(decode_word(body.get(..WORD_SIZE)?).ok()?).ok()?;
    let len_end = offset.checked_add(WORD_SIZE)?;
    let len = usize::try_from(decode_word(body.get(offset..len_end)?).ok()?).ok()?;
    let text = body.get(len_end..len_end.checked_add(len)?)?;
    Some(String::from_utf8_lossy(text).into_owned())
}

/// Render base units as a decimal token amount (18 decimals, at most 6 shown).
pub fn format_base_units(amount: U256) -> String {
    let unit = U256::from(10u64).pow(U256::from(18u64));
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }

    let fraction = format!("{:0>18}", fraction.to_string());
    let shown = fraction[..6].trim_end_matches('0');
    if shown.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{shown}")
    }
}

/// Canonical hex rendering of a word as it crosses the bridge: `0x`, no leading zeros.
pub fn format_word_hex(value: U256) -> String {
    let digits = hex::encode(value.to_be_bytes::<WORD_SIZE>());
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{trimmed}")
    }
}

fn strip_hex_prefix(input: &str) -> Option<&str> {
    input.strip_prefix("0x").or_else(|| input.strip_prefix("0X"))
}
