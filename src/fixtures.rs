//! Immutable benchmark fixtures: well-known accounts, the token contract and amounts.

use alloy_primitives::{address, bytes, uint, Address, Bytes, U256};

/// Deploys the token and mints the supply.
pub const DEPLOYER: Address = address!("742d35cc6634c0532925a3b8d4c9db96c4b4d8b6");
/// Sender of every benchmarked transfer.
pub const ALICE: Address = address!("8ba1f109551bd432803012645aac136c12345678");
/// Recipient of even-indexed transfers.
pub const BOB: Address = address!("1234567890123456789012345678901234567890");
/// Recipient of odd-indexed transfers.
pub const CHARLIE: Address = address!("abcdefabcdefabcdefabcdefabcdefabcdefabcd");
/// Caller used for read-only queries.
pub const VIEW_CALLER: Address = address!("0000000000000000000000000000000000000001");

/// 100 ETH, for accounts that pay for deployment and the transfer loop.
pub const FUNDED_BALANCE: U256 = uint!(0x56bc75e2d630e0000_U256);
/// 0.01 ETH, for everyone else.
pub const SMALL_BALANCE: U256 = uint!(0x2386f26fc10000_U256);

/// 1e9 tokens at 18 decimals.
pub const TOTAL_SUPPLY: U256 = uint!(1_000_000_000_000_000_000_000_000_000_U256);
/// One token.
pub const TRANSFER_AMOUNT: U256 = uint!(1_000_000_000_000_000_000_U256);

pub const DEPLOY_GAS_LIMIT: u64 = 3_000_000;
pub const MINT_GAS_LIMIT: u64 = 200_000;
pub const TRANSFER_GAS_LIMIT: u64 = 100_000;
pub const QUERY_GAS_LIMIT: u64 = 100_000;
pub const NATIVE_TRANSFER_GAS_LIMIT: u64 = 21_000;
/// Gas budget per transfer inside one batched helper call.
pub const BATCH_GAS_PER_TRANSFER: u64 = 100_000;

/// Mint-capable ERC-20 (`totalSupply`, `mint`, `balanceOf`, `transfer`), Solidity 0.8.28 output.
///
/// `transfer` reverts with `Error("Insufficient balance")` when the sender is short.
pub const TOKEN_BYTECODE: Bytes = bytes!(
    "6080604052348015600e575f5ffd5b506105348061001c5f395ff3fe608060405234801561000f575f5ffd5b50600436"
    "1061004a575f3560e01c806318160ddd1461004e57806340c10f191461006c57806370a0823114610088578063a9059c"
    "bb146100b8575b5f5ffd5b6100566100e8565b60405161006391906102b6565b60405180910390f35b61008660048036"
    "038101906100819190610357565b6100ee565b005b6100a2600480360381019061009d9190610395565b61015c565b60"
    "40516100af91906102b6565b60405180910390f35b6100d260048036038101906100cd9190610357565b610170565b60"
    "40516100df91906103da565b60405180910390f35b60015481565b8060015f8282546100ff9190610420565b92505081"
    "905550805f5f8473ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffff"
    "ffff1681526020019081526020015f205f8282546101519190610420565b925050819055505050565b5f602052805f52"
    "60405f205f915090505481565b5f815f5f3373ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffff"
    "ffffffffffffffffffffffffff1681526020019081526020015f205410156101f0576040517f08c379a0000000000000"
    "0000000000000000000000000000000000000000000081526004016101e7906104ad565b60405180910390fd5b815f5f"
    "3373ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff16815260"
    "20019081526020015f205f82825461023b91906104cb565b92505081905550815f5f8573ffffffffffffffffffffffff"
    "ffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff1681526020019081526020015f205f828254"
    "61028d9190610420565b925050819055506001905092915050565b5f819050919050565b6102b08161029e565b825250"
    "50565b5f6020820190506102c95f8301846102a7565b92915050565b5f5ffd5b5f73ffffffffffffffffffffffffffff"
    "ffffffffffff82169050919050565b5f6102fc826102d3565b9050919050565b61030c816102f2565b8114610316575f"
    "5ffd5b50565b5f8135905061032781610303565b92915050565b6103368161029e565b8114610340575f5ffd5b50565b"
    "5f813590506103518161032d565b92915050565b5f5f6040838503121561036d5761036c6102cf565b5b5f61037a8582"
    "8601610319565b925050602061038b85828601610343565b9150509250929050565b5f602082840312156103aa576103"
    "a96102cf565b5b5f6103b784828501610319565b91505092915050565b5f8115159050919050565b6103d4816103c056"
    "5b82525050565b5f6020820190506103ed5f8301846103cb565b92915050565b7f4e487b710000000000000000000000"
    "00000000000000000000000000000000005f52601160045260245ffd5b5f61042a8261029e565b91506104358361029e"
    "565b925082820190508082111561044d5761044c6103f3565b5b92915050565b5f82825260208201905092915050565b"
    "7f496e73756666696369656e742062616c616e63650000000000000000000000005f82015250565b5f61049760148361"
    "0453565b91506104a282610463565b602082019050919050565b5f6020820190508181035f8301526104c48161048b56"
    "5b9050919050565b5f6104d58261029e565b91506104e08361029e565b92508282039050818111156104f8576104f761"
    "03f3565b5b9291505056fea2646970667358221220cb19b4849bfce8663cd0287ac9f324dbeeb9b43d26a167e5a17d84"
    "52191f599d64736f6c634300081c0033"
);

/// ERC-20 with allowances, for batched runs: `totalSupply`, `mint`, `balanceOf`, `transfer`,
/// `approve`, `transferFrom` and `allowance`.
///
/// Balances live in the mapping at slot 0, the supply at slot 1 and allowances in the
/// nested mapping at slot 2. Every mutating function returns `true` and emits the standard
/// `Transfer` / `Approval` event. Shortfalls revert with `Error("Insufficient balance")` or
/// `Error("Insufficient allowance")`.
pub const BATCH_TOKEN_BYTECODE: Bytes = bytes!(
    "6102f88061000b5f395ff35f3560e01c806318160ddd1461005557806340c10f191461009757806370a082311461005f"
    "578063a9059cbb146100f0578063095ea7b31461015d57806323b872dd146101b1578063dd62ed3e14610075575f80fd"
    "5b6001545f5260205ff35b6004355f52600060205260405f20545f5260205ff35b6024356004355f5260026020526040"
    "5f206020525f5260405f20545f5260205ff35b6024356004355f52600060205260405f20805482019055506001546024"
    "35016001556024355f526004355f7fddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef60"
    "205fa360015f5260205ff35b602435335f52600060205260405f20805480831161024c57829003905550602435600435"
    "5f52600060205260405f20805482019055506024355f52600435337fddf252ad1be2c89b69c2b068fc378daa952ba7f1"
    "63c4a11628f55a4df523b3ef60205fa360015f5260205ff35b600435335f52600260205260405f206020525f5260405f"
    "2060243590556024355f52600435337f8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"
    "60205fa360015f5260205ff35b336004355f52600260205260405f206020525f5260405f20805480604435116102a257"
    "604435900390556044356004355f52600060205260405f20805480831161024c578290039055506044356024355f5260"
    "0060205260405f20805482019055506044355f526024356004357fddf252ad1be2c89b69c2b068fc378daa952ba7f163"
    "c4a11628f55a4df523b3ef60205fa360015f5260205ff35b7f08c379a000000000000000000000000000000000000000"
    "0000000000000000005f52602060045260146024527f496e73756666696369656e742062616c616e6365000000000000"
    "00000000000060445260645ffd5b7f08c379a0000000000000000000000000000000000000000000000000000000005f"
    "52602060045260166024527f496e73756666696369656e7420616c6c6f77616e63650000000000000000000060445260"
    "645ffd"
);

/// Batching helper. The constructor takes the token address as its only argument.
///
/// `benchmarkTransfers(from, to, amount, count)` performs `count` token `transferFrom` calls
/// inside one transaction and returns `true`. The first failing transfer reverts the whole
/// batch with the token's revert data.
pub const BATCH_HELPER_BYTECODE: Bytes = bytes!(
    "6020602038035f395f515f55610087806100175f395ff35f3560e01c8063872c704614610013575f80fd5b7f23b872dd"
    "000000000000000000000000000000000000000000000000000000005f52600435600452602435602452604435604452"
    "5f5b80606435901015610076576020608060645f5f5f545af11561007f576080511561007f5760010161004a565b6001"
    "5f5260205ff35b3d5f5f3e3d5ffd"
);

/// Accounts, code and amounts one benchmark configuration runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixtures {
    pub deployer: Address,
    pub sender: Address,
    /// Recipients alternated by transfer index parity: even, odd
    pub recipients: [Address; 2],
    pub view_caller: Address,
    pub token_bytecode: Bytes,
    /// Token deployed instead of `token_bytecode` when transfers go through the helper
    pub batch_token_bytecode: Bytes,
    pub total_supply: U256,
    /// Amount moved from the deployer to the sender before the loop
    pub sender_allocation: U256,
    pub transfer_amount: U256,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            deployer: DEPLOYER,
            sender: ALICE,
            recipients: [BOB, CHARLIE],
            view_caller: VIEW_CALLER,
            token_bytecode: TOKEN_BYTECODE,
            batch_token_bytecode: BATCH_TOKEN_BYTECODE,
            total_supply: TOTAL_SUPPLY,
            sender_allocation: TOTAL_SUPPLY,
            transfer_amount: TRANSFER_AMOUNT,
        }
    }
}

impl Fixtures {
    /// Native balances set before anything runs.
    pub fn native_funding(&self) -> [(Address, U256); 5] {
        [
            (self.deployer, FUNDED_BALANCE),
            (self.sender, FUNDED_BALANCE),
            (self.recipients[0], SMALL_BALANCE),
            (self.recipients[1], SMALL_BALANCE),
            (self.view_caller, SMALL_BALANCE),
        ]
    }

    /// Recipient of the transfer at zero-based `index`.
    pub fn recipient(&self, index: u64) -> Address {
        self.recipients[(index % 2) as usize]
    }

    /// Token balances each recipient should hold after `transfers` alternated transfers.
    pub fn expected_recipient_balances(&self, transfers: u64) -> [U256; 2] {
        let even = transfers.div_ceil(2);
        let odd = transfers / 2;
        [self.transfer_amount * U256::from(even), self.transfer_amount * U256::from(odd)]
    }
}
