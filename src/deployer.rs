//! Contract deployment through any [`VmBackend`].

use crate::abi::{encode_initcode, AbiArg};
use crate::error::{HarnessError, Result};
use crate::evm::{DeploymentResult, VmBackend};
use alloy_primitives::Address;
use reth_tracing::tracing::debug;

/// Deploy `bytecode` with `constructor_args` from `deployer`.
///
/// The backend advances the deployer's nonce as part of the create; it is only read here.
/// A create the backend reports as successful but which leaves no code behind is still a
/// [`HarnessError::DeploymentFailure`].
pub fn deploy_contract(
    backend: &mut dyn VmBackend,
    deployer: Address,
    bytecode: &[u8],
    constructor_args: &[AbiArg],
    gas_limit: u64,
) -> Result<DeploymentResult> {
    let nonce = backend.get_nonce(deployer)?;
    let initcode = encode_initcode(bytecode, constructor_args);
    debug!(target: "bench::deployer", %deployer, nonce, initcode_len = initcode.len(), "deploying");

    let mut deployed = backend.deploy(deployer, initcode, gas_limit)?;

    let code = backend.get_code(deployed.contract_address)?;
    if code.is_empty() {
        return Err(HarnessError::DeploymentFailure(format!(
            "no code at {} after create",
            deployed.contract_address
        )));
    }
    deployed.deployed_code = code;

    debug!(
        target: "bench::deployer",
        contract = %deployed.contract_address,
        gas_used = deployed.gas_used,
        code_len = deployed.deployed_code.len(),
        "deployed"
    );
    Ok(deployed)
}
