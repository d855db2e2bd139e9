//! Benchmark-style tests for the two backends.
//!
//! These are `#[test]` functions timed with `std::time::Instant` rather than a `criterion`
//! harness, so they run with the rest of the suite via `cargo test`. Besides printing
//! throughput they check that the embedded and bridged realizations agree.
//!
//! | Test | What it checks |
//! |------|----------------|
//! | `test_transfer_scenario_both_backends` | 1000 alternating transfers, final balances |
//! | `test_backends_agree_on_replayed_operations` | Identical results and state for the same script |
//! | `test_fail_fast_on_underfunded_sender` | Run stops at the first failing transfer |
//! | `test_batch_mode_both_backends` | One helper call moves every transfer, atomically |
//! | `test_bridge_releases_every_object` | No boundary object outlives a full run |
//! | `test_embedded_vs_bridged_comparison` | Print comparison table |

#[cfg(test)]
mod tests {
    use crate::abi::{decode_word, encode_call, selectors, AbiArg};
    use crate::chain::{ChainConfig, ChainPreset, CustomChain};
    use crate::driver::{run_configuration, run_sweep, Phase, RunConfig, RunReport};
    use crate::error::HarnessError;
    use crate::evm::{open_backend, BackendKind, CallFrame, ExecutionResult, VmBackend};
    use crate::ffi::live_objects;
    use crate::fixtures::{
        Fixtures, BATCH_HELPER_BYTECODE, DEPLOY_GAS_LIMIT, FUNDED_BALANCE, MINT_GAS_LIMIT, NATIVE_TRANSFER_GAS_LIMIT,
        QUERY_GAS_LIMIT, TOTAL_SUPPLY, TRANSFER_AMOUNT, TRANSFER_GAS_LIMIT,
    };
    use alloy_primitives::{keccak256, Address, Bytes, U256};
    use std::time::Instant;

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn ether(n: u64) -> U256 {
        TRANSFER_AMOUNT * U256::from(n)
    }

    /// Fixtures where the whole minted supply goes to the sender and covers exactly `transfers`.
    fn exact_fixtures(transfers: u64) -> Fixtures {
        Fixtures { total_supply: ether(transfers), sender_allocation: ether(transfers), ..Fixtures::default() }
    }

    fn config(backend: BackendKind, transfers: u64) -> RunConfig {
        RunConfig {
            name: format!("bench/{backend}"),
            chain: ChainConfig::from_preset(ChainPreset::BscTestnet).unwrap(),
            backend,
            transfers,
            helper_bytecode: None,
        }
    }

    fn batch_config(backend: BackendKind, transfers: u64) -> RunConfig {
        RunConfig { helper_bytecode: Some(BATCH_HELPER_BYTECODE), ..config(backend, transfers) }
    }

    /// Storage slot of `account` in a `mapping(address => uint256)` declared at slot 0.
    fn balance_slot(account: Address) -> U256 {
        let mut preimage = [0u8; 64];
        preimage[..32].copy_from_slice(account.into_word().as_slice());
        U256::from_be_bytes(keccak256(preimage).0)
    }

    fn assert_done(report: &RunReport) {
        assert!(report.succeeded(), "{} failed: {:?}", report.name, report.failure);
    }

    /// One step of the replay script, with everything it observed.
    #[derive(Debug, PartialEq, Eq)]
    enum Observed {
        Deployed(Address, u64),
        Executed(ExecutionResult),
        Rejected,
    }

    fn observe(result: crate::error::Result<ExecutionResult>) -> Observed {
        match result {
            Ok(result) => Observed::Executed(result),
            // the bridge reports rejections as boundary errors, so only the fact is compared
            Err(HarnessError::TransactionRejected(_) | HarnessError::Boundary(_)) => Observed::Rejected,
            Err(err) => panic!("unexpected backend error: {err}"),
        }
    }

    /// A fixed sequence of state changes and reads, identical for every backend.
    fn replay(backend: &mut dyn VmBackend, fixtures: &Fixtures) -> Vec<Observed> {
        let mut observed = Vec::new();
        let [bob, charlie] = fixtures.recipients;

        for (account, balance) in fixtures.native_funding() {
            backend.set_balance(account, balance).unwrap();
        }
        backend.set_nonce(fixtures.deployer, 3).unwrap();

        let deployed = backend.deploy(fixtures.deployer, fixtures.token_bytecode.clone(), DEPLOY_GAS_LIMIT).unwrap();
        let token = deployed.contract_address;
        observed.push(Observed::Deployed(token, deployed.gas_used));

        let mint = encode_call(selectors::MINT, &[AbiArg::from(fixtures.sender), AbiArg::from(ether(10))]);
        observed.push(observe(backend.call(&CallFrame::new(fixtures.deployer, token, mint, MINT_GAS_LIMIT))));

        for i in 0..7u64 {
            let to = if i % 2 == 0 { bob } else { charlie };
            let input = encode_call(selectors::TRANSFER, &[AbiArg::from(to), AbiArg::from(ether(1))]);
            observed.push(observe(backend.call(&CallFrame::new(fixtures.sender, token, input, TRANSFER_GAS_LIMIT))));
        }

        // more than the sender still holds: reverts with a reason
        let overdraw = encode_call(selectors::TRANSFER, &[AbiArg::from(bob), AbiArg::from(ether(100))]);
        observed.push(observe(backend.call(&CallFrame::new(fixtures.sender, token, overdraw, TRANSFER_GAS_LIMIT))));

        observed.push(observe(backend.transfer(fixtures.sender, bob, U256::from(12_345u64), NATIVE_TRANSFER_GAS_LIMIT)));
        // bob cannot pay for 1000 ether of value
        observed.push(observe(backend.transfer(bob, charlie, ether(1000), NATIVE_TRANSFER_GAS_LIMIT)));

        for account in [fixtures.sender, bob, charlie] {
            let input = encode_call(selectors::BALANCE_OF, &[AbiArg::from(account)]);
            observed.push(observe(backend.query(fixtures.view_caller, token, input, QUERY_GAS_LIMIT)));
        }
        let supply = encode_call(selectors::TOTAL_SUPPLY, &[]);
        observed.push(observe(backend.query(fixtures.view_caller, token, supply, QUERY_GAS_LIMIT)));

        // the allowance token emits events, so logs are compared too
        let deployed =
            backend.deploy(fixtures.deployer, fixtures.batch_token_bytecode.clone(), DEPLOY_GAS_LIMIT).unwrap();
        let batch_token = deployed.contract_address;
        observed.push(Observed::Deployed(batch_token, deployed.gas_used));
        let mint = encode_call(selectors::MINT, &[AbiArg::from(fixtures.sender), AbiArg::from(ether(5))]);
        observed.push(observe(backend.call(&CallFrame::new(fixtures.deployer, batch_token, mint, MINT_GAS_LIMIT))));
        let input = encode_call(selectors::TRANSFER, &[AbiArg::from(bob), AbiArg::from(ether(1))]);
        observed.push(observe(backend.call(&CallFrame::new(fixtures.sender, batch_token, input, TRANSFER_GAS_LIMIT))));

        backend.set_storage(token, U256::from(42u64), U256::from(7u64)).unwrap();
        observed
    }

    /// Account state read back after [`replay`].
    fn snapshot(backend: &mut dyn VmBackend, fixtures: &Fixtures, token: Address) -> Vec<(Address, U256, u64)> {
        let accounts = [fixtures.deployer, fixtures.sender, fixtures.recipients[0], fixtures.recipients[1], token];
        accounts
            .into_iter()
            .map(|account| (account, backend.get_balance(account).unwrap(), backend.get_nonce(account).unwrap()))
            .collect()
    }

    // ── Scenario ─────────────────────────────────────────────────────────────

    #[test]
    fn test_transfer_scenario_both_backends() {
        const TRANSFERS: u64 = 1_000;
        let fixtures = exact_fixtures(TRANSFERS);

        for backend in BackendKind::ALL {
            let report = run_configuration(&config(backend, TRANSFERS), &fixtures);
            assert_done(&report);

            let [bob, charlie] = fixtures.recipients;
            assert_eq!(report.transfers_completed, TRANSFERS);
            assert_eq!(report.balance_of(bob), Some(ether(500)), "{backend}");
            assert_eq!(report.balance_of(charlie), Some(ether(500)), "{backend}");
            assert_eq!(report.balance_of(fixtures.sender), Some(U256::ZERO), "{backend}");
            assert_eq!(report.token, Some(fixtures.deployer.create(0)));

            let stats = report.stats.unwrap();
            println!("=== ERC-20 Transfer Scenario ({backend}) ===");
            println!("  Transfers:    {TRANSFERS}");
            println!("  Loop time:    {:?}", stats.duration);
            println!("  Per transfer: {:.2} us", stats.avg_per_transfer.as_secs_f64() * 1e6);
            println!("  Throughput:   {:.0} tx/s", stats.throughput);
            println!("  Gas used:     {}", stats.gas_used);
            println!();

            assert!(stats.throughput > 0.0);
            assert!(stats.gas_used > 0);
        }
    }

    #[test]
    fn test_backends_agree_on_replayed_operations() {
        let fixtures = Fixtures::default();
        let chain = ChainConfig::custom(CustomChain { base_fee: Some(3), gas_price: Some(5), ..CustomChain::new(4242) })
            .unwrap();

        let mut embedded = open_backend(BackendKind::Embedded, &chain).unwrap();
        let mut bridged = open_backend(BackendKind::Bridged, &chain).unwrap();

        let left = replay(embedded.as_mut(), &fixtures);
        let right = replay(bridged.as_mut(), &fixtures);
        assert_eq!(left, right);

        let Observed::Deployed(token, _) = left[0] else { panic!("first step must be the deploy") };
        assert_eq!(token, fixtures.deployer.create(3));

        // the overdraw reverted with the token's reason on both sides
        match &left[9] {
            Observed::Executed(result) => {
                assert!(!result.success);
                assert_eq!(result.revert_reason.as_deref(), Some("Insufficient balance"));
            }
            other => panic!("expected a reverted call, got {other:?}"),
        }
        assert_eq!(left[11], Observed::Rejected);

        // 7 alternating transfers of 1 ether out of 10
        let Observed::Executed(sender_balance) = &left[12] else { panic!("expected balanceOf output") };
        assert_eq!(decode_word(&sender_balance.output).unwrap(), ether(3));

        let Observed::Deployed(batch_token, _) = left[16] else { panic!("expected the second deploy") };
        let Observed::Executed(transfer) = &left[18] else { panic!("expected a token transfer") };
        assert!(transfer.success);
        assert_eq!(transfer.logs.len(), 1);
        let event = &transfer.logs[0];
        assert_eq!(event.address, batch_token);
        assert_eq!(
            event.data.topics(),
            &[
                keccak256("Transfer(address,address,uint256)"),
                fixtures.sender.into_word(),
                fixtures.recipients[0].into_word()
            ]
        );
        assert_eq!(U256::from_be_slice(&event.data.data), ether(1));

        assert_eq!(
            snapshot(embedded.as_mut(), &fixtures, token),
            snapshot(bridged.as_mut(), &fixtures, token)
        );
        let [bob, charlie] = fixtures.recipients;
        let mut slots: Vec<U256> = [0u64, 1, 2, 3, 42].into_iter().map(U256::from).collect();
        slots.extend([fixtures.sender, bob, charlie].map(balance_slot));
        for contract in [token, batch_token] {
            for &slot in &slots {
                assert_eq!(
                    embedded.get_storage(contract, slot).unwrap(),
                    bridged.get_storage(contract, slot).unwrap(),
                    "{contract} slot {slot:#x}"
                );
            }
        }
        assert_eq!(embedded.get_storage(token, balance_slot(fixtures.sender)).unwrap(), ether(3));
        assert_eq!(embedded.get_storage(token, balance_slot(bob)).unwrap(), ether(4));
        assert_eq!(embedded.get_storage(token, balance_slot(charlie)).unwrap(), ether(3));
        assert_eq!(bridged.get_storage(batch_token, balance_slot(fixtures.sender)).unwrap(), ether(4));
        assert_eq!(bridged.get_storage(batch_token, balance_slot(bob)).unwrap(), ether(1));
        assert_eq!(embedded.get_code(token).unwrap(), bridged.get_code(token).unwrap());
        assert_eq!(embedded.chain_id().unwrap(), 4242);
        assert_eq!(bridged.chain_id().unwrap(), 4242);

        // deployer paid for the create and the mint at gas price 5
        assert!(embedded.get_balance(fixtures.deployer).unwrap() < FUNDED_BALANCE);
    }

    #[test]
    fn test_fail_fast_on_underfunded_sender() {
        const K: u64 = 7;
        let fixtures = Fixtures { sender_allocation: ether(K - 1), ..Fixtures::default() };

        for backend in BackendKind::ALL {
            let report = run_configuration(&config(backend, 50), &fixtures);

            assert_eq!(report.phase, Phase::Failed, "{backend}");
            let failure = report.failure.as_ref().unwrap();
            assert_eq!(failure.phase, Phase::Transferring);
            assert_eq!(failure.transfer_index, Some(K));
            assert_eq!(report.transfers_completed, K - 1);

            // the K-1 completed transfers alternated between the recipients
            let [bob, charlie] = fixtures.recipients;
            assert_eq!(report.balance_of(bob), Some(ether((K - 1).div_ceil(2))), "{backend}");
            assert_eq!(report.balance_of(charlie), Some(ether((K - 1) / 2)), "{backend}");
            assert_eq!(report.balance_of(fixtures.sender), Some(U256::ZERO), "{backend}");
        }
    }

    #[test]
    fn test_batch_mode_both_backends() {
        const TRANSFERS: u64 = 40;
        let fixtures = Fixtures::default();
        let [bob, charlie] = fixtures.recipients;

        let reports = run_sweep(
            &[batch_config(BackendKind::Embedded, TRANSFERS), batch_config(BackendKind::Bridged, TRANSFERS)],
            &fixtures,
        );
        for report in &reports {
            assert_done(report);
            assert!(report.batched);
            assert_eq!(report.transfers_completed, TRANSFERS);
            assert_eq!(report.balance_of(bob), Some(ether(TRANSFERS)), "{}", report.name);
            assert_eq!(report.balance_of(charlie), Some(U256::ZERO), "{}", report.name);
            assert_eq!(report.balance_of(fixtures.sender), Some(TOTAL_SUPPLY - ether(TRANSFERS)), "{}", report.name);
        }
        assert_eq!(reports[0].stats.unwrap().gas_used, reports[1].stats.unwrap().gas_used);

        // short by two tokens: the whole batch reverts and nothing moves
        let short = Fixtures { sender_allocation: ether(3), ..Fixtures::default() };
        for backend in BackendKind::ALL {
            let report = run_configuration(&batch_config(backend, 5), &short);
            assert_eq!(report.phase, Phase::Failed, "{backend}");
            let failure = report.failure.as_ref().unwrap();
            assert_eq!(failure.phase, Phase::Transferring);
            assert_eq!(failure.transfer_index, None);
            assert!(failure.error.contains("Insufficient balance"), "{}", failure.error);
            assert_eq!(report.transfers_completed, 0);
            assert_eq!(report.balance_of(short.sender), Some(ether(3)), "{backend}");
            assert_eq!(report.balance_of(bob), Some(U256::ZERO), "{backend}");
        }
        assert_eq!(live_objects(), 0);
    }

    #[test]
    fn test_bridge_releases_every_object() {
        assert_eq!(live_objects(), 0);

        let reports = run_sweep(&[config(BackendKind::Bridged, 20), config(BackendKind::Bridged, 5)], &exact_fixtures(20));
        assert_done(&reports[0]);
        // second run has more supply than it transfers; the sender keeps the rest
        assert_done(&reports[1]);
        assert_eq!(reports[1].balance_of(Fixtures::default().sender), Some(ether(15)));

        assert_eq!(live_objects(), 0, "boundary objects leaked across runs");

        let failing = Fixtures { sender_allocation: ether(2), ..Fixtures::default() };
        let report = run_configuration(&config(BackendKind::Bridged, 10), &failing);
        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(live_objects(), 0, "boundary objects leaked on failure");
    }

    #[test]
    fn test_embedded_vs_bridged_comparison() {
        const TRANSFERS: u64 = 500;
        let fixtures = exact_fixtures(TRANSFERS);

        let start = Instant::now();
        let reports = run_sweep(
            &[config(BackendKind::Embedded, TRANSFERS), config(BackendKind::Bridged, TRANSFERS)],
            &fixtures,
        );
        let wall = start.elapsed();

        println!("=== Embedded vs Bridged ({TRANSFERS} transfers) ===");
        println!("  {:<10} {:>12} {:>14} {:>12}", "backend", "loop", "per transfer", "tx/s");
        for report in &reports {
            assert_done(report);
            let stats = report.stats.unwrap();
            println!(
                "  {:<10} {:>10.2}ms {:>12.2}us {:>12.0}",
                report.backend.to_string(),
                stats.duration.as_secs_f64() * 1e3,
                stats.avg_per_transfer.as_secs_f64() * 1e6,
                stats.throughput
            );
        }
        println!("  sweep wall time: {wall:?}");
        println!();

        // same engine, same script: gas must match exactly even though timings differ
        assert_eq!(reports[0].stats.unwrap().gas_used, reports[1].stats.unwrap().gas_used);
        assert_eq!(reports[0].balances, reports[1].balances);
        assert_eq!(reports[0].deploy_gas, reports[1].deploy_gas);
    }

    #[test]
    fn test_native_transfer_gas_matches() {
        let chain = ChainConfig::from_preset(ChainPreset::Mainnet).unwrap();
        let from = Address::repeat_byte(0xaa);
        let to = Address::repeat_byte(0xbb);

        for kind in BackendKind::ALL {
            let mut backend = open_backend(kind, &chain).unwrap();
            backend.set_balance(from, FUNDED_BALANCE).unwrap();
            let result = backend.transfer(from, to, U256::from(1u64), NATIVE_TRANSFER_GAS_LIMIT).unwrap();

            assert!(result.success, "{kind}");
            assert_eq!(result.gas_used, 21_000);
            assert_eq!(result.output, Bytes::new());
            assert_eq!(backend.get_balance(to).unwrap(), U256::from(1u64));
            assert_eq!(backend.get_nonce(from).unwrap(), 1);
        }
    }
}
