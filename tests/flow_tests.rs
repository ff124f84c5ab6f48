//! Flow-level tests against a mock gateway and relay: best-effort policy,
//! chunk shapes, mandatory-create abort, and the RPC sweep paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;

use launch_bundler::bundle::{BundleError, BundleRelay};
use launch_bundler::config::Config;
use launch_bundler::flows::FlowRunner;
use launch_bundler::gateway::{ChainGateway, GatewayError, SimFailure, SimulationOutcome};
use launch_bundler::pump_program::{self, CurveAccount};
use launch_bundler::types::{
    BuyRequest, ConsolidateRequest, CreateRequest, SellRequest, SellWalletSpec, WalletStatus,
};

#[derive(Default)]
struct MockGateway {
    accounts: HashMap<Pubkey, Vec<u8>>,
    lamports: HashMap<Pubkey, u64>,
    fail_sim_payers: HashSet<Pubkey>,
    exhausted: bool,
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
        Ok(self.accounts.get(address).cloned())
    }

    async fn lamport_balance(&self, address: &Pubkey) -> Result<u64, GatewayError> {
        Ok(*self.lamports.get(address).unwrap_or(&0))
    }

    async fn latest_blockhash(&self) -> Result<Hash, GatewayError> {
        if self.exhausted {
            Err(GatewayError::NoEndpointAvailable)
        } else {
            Ok(Hash::new_unique())
        }
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, GatewayError> {
        let payer = tx.message.static_account_keys()[0];
        if self.fail_sim_payers.contains(&payer) {
            Ok(SimulationOutcome::Failed(SimFailure {
                instruction_index: Some(2),
                custom_code: Some(6004),
                message: "custom program error".to_string(),
                logs: vec!["Program log: ExceededSlippage".to_string()],
            }))
        } else {
            Ok(SimulationOutcome::Passed {
                units_consumed: Some(60_000),
            })
        }
    }

    async fn send_transaction(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<Signature, GatewayError> {
        Ok(Signature::new_unique())
    }
}

#[derive(Default)]
struct MockRelay {
    bundles: Mutex<Vec<Vec<String>>>,
    counter: AtomicUsize,
}

#[async_trait]
impl BundleRelay for MockRelay {
    async fn submit_bundle(&self, transactions: &[String]) -> Result<String, BundleError> {
        self.bundles.lock().unwrap().push(transactions.to_vec());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("bundle-{n}"))
    }
}

fn live_curve(mint: &Pubkey, creator: &Pubkey) -> (Pubkey, Vec<u8>) {
    let account = CurveAccount {
        virtual_token_reserves: 1_073_000_000_000_000,
        virtual_sol_reserves: 30_000_000_000,
        real_token_reserves: 793_100_000_000_000,
        real_sol_reserves: 0,
        token_total_supply: 1_000_000_000_000_000,
        complete: false,
        creator: Some(*creator),
    };
    (pump_program::curve_pda(mint), account.encode())
}

fn buyer_lines(buyers: &[Keypair], sol_each: f64) -> String {
    buyers
        .iter()
        .map(|kp| format!("{},{sol_each}", bs58::encode(kp.to_bytes()).into_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn runner(gateway: MockGateway, relay: Arc<MockRelay>) -> FlowRunner {
    FlowRunner::new(Arc::new(gateway), relay, Config::default()).unwrap()
}

#[tokio::test]
async fn best_effort_buy_bundle_survives_one_failed_wallet() {
    let mint = Pubkey::new_unique();
    let creator = Pubkey::new_unique();
    let buyers: Vec<Keypair> = (0..5).map(|_| Keypair::new()).collect();

    let mut gateway = MockGateway::default();
    let (curve_address, curve_data) = live_curve(&mint, &creator);
    gateway.accounts.insert(curve_address, curve_data);
    // wallet 3 of 5 fails simulation
    gateway.fail_sim_payers.insert(buyers[2].pubkey());

    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let report = runner
        .buy_bundle(&BuyRequest {
            mint: mint.to_string(),
            buyers: buyer_lines(&buyers, 0.1),
            slippage_pct: Some(10),
            bundle_size: None,
        })
        .await
        .unwrap();

    assert!(report.success, "other wallets must still bundle");
    assert_eq!(report.bundled_count(), 4);
    let failed: Vec<usize> = report
        .outcomes
        .iter()
        .filter(|o| o.status == WalletStatus::Failed)
        .map(|o| o.index)
        .collect();
    assert_eq!(failed, vec![2]);
    let detail = report.outcomes[2].detail.as_deref().unwrap();
    assert!(detail.contains("simulation"), "{detail}");
    assert!(detail.contains("6004"), "{detail}");
    assert!(!report.bundle_ids.is_empty());
}

#[tokio::test]
async fn buy_bundles_chunk_at_four_wallets_plus_tip() {
    let mint = Pubkey::new_unique();
    let creator = Pubkey::new_unique();
    let buyers: Vec<Keypair> = (0..12).map(|_| Keypair::new()).collect();

    let mut gateway = MockGateway::default();
    let (curve_address, curve_data) = live_curve(&mint, &creator);
    gateway.accounts.insert(curve_address, curve_data);

    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let report = runner
        .buy_bundle(&BuyRequest {
            mint: mint.to_string(),
            buyers: buyer_lines(&buyers, 0.05),
            slippage_pct: None,
            bundle_size: Some(5),
        })
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.bundled_count(), 12);
    let sizes: Vec<usize> = relay.bundles.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 5, 5], "4 wallets + 1 tip per bundle");
}

#[tokio::test]
async fn create_bundles_lead_with_the_creation_transaction() {
    let buyers: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();
    let gateway = MockGateway::default();
    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let dev = Keypair::new();
    let report = runner
        .create_and_bundle(&CreateRequest {
            dev_private_key: bs58::encode(dev.to_bytes()).into_string(),
            dev_buy_sol: 0.5,
            buyers: buyer_lines(&buyers, 0.1),
            token_name: "Test Token".to_string(),
            token_symbol: "TEST".to_string(),
            token_uri: "ipfs://meta".to_string(),
            slippage_pct: Some(10),
            bundle_size: Some(5),
        })
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.mint.is_some());
    // one bundle: create + 3 buyers + tip
    let bundles = relay.bundles.lock().unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].len(), 5);
    // dev (index 0) and all three buyers bundled
    assert_eq!(report.bundled_count(), 4);
}

#[tokio::test]
async fn create_aborts_when_mandatory_transaction_fails_simulation() {
    let buyers: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();
    let dev = Keypair::new();

    let mut gateway = MockGateway::default();
    gateway.fail_sim_payers.insert(dev.pubkey());
    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let report = runner
        .create_and_bundle(&CreateRequest {
            dev_private_key: bs58::encode(dev.to_bytes()).into_string(),
            dev_buy_sol: 0.5,
            buyers: buyer_lines(&buyers, 0.1),
            token_name: "Test Token".to_string(),
            token_symbol: "TEST".to_string(),
            token_uri: "ipfs://meta".to_string(),
            slippage_pct: None,
            bundle_size: None,
        })
        .await
        .unwrap();

    assert!(!report.success);
    assert!(relay.bundles.lock().unwrap().is_empty(), "nothing submitted");
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, WalletStatus::Failed);
}

#[tokio::test]
async fn sell_skips_empty_wallets_and_bundles_the_rest() {
    let mint = Pubkey::new_unique();
    let creator = Pubkey::new_unique();
    let sellers: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();

    let mut gateway = MockGateway::default();
    let (curve_address, curve_data) = live_curve(&mint, &creator);
    gateway.accounts.insert(curve_address, curve_data);
    // wallets 1 and 3 hold tokens; wallet 2 holds none
    for (i, seller) in sellers.iter().enumerate() {
        if i == 1 {
            continue;
        }
        let ata = get_associated_token_address(&seller.pubkey(), &mint);
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&1_000_000_000u64.to_le_bytes());
        gateway.accounts.insert(ata, data);
    }

    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let report = runner
        .sell_tokens(&SellRequest {
            mint: mint.to_string(),
            wallets: sellers
                .iter()
                .map(|kp| SellWalletSpec {
                    private_key: bs58::encode(kp.to_bytes()).into_string(),
                    percentage: 50,
                })
                .collect(),
            slippage_pct: Some(10),
            bundle_size: None,
            simulate_first: true,
        })
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.bundled_count(), 2);
    assert_eq!(report.outcomes[1].status, WalletStatus::Skipped);
    // one bundle: 2 sells + tip
    let bundles = relay.bundles.lock().unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].len(), 3);
}

#[tokio::test]
async fn consolidate_sweeps_sol_over_rpc() {
    let mint = Pubkey::new_unique();
    let target = Pubkey::new_unique();
    let wallets: Vec<Keypair> = (0..2).map(|_| Keypair::new()).collect();

    let mut gateway = MockGateway::default();
    for wallet in &wallets {
        gateway.lamports.insert(wallet.pubkey(), 5_000_000_000);
    }

    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let report = runner
        .consolidate(&ConsolidateRequest {
            mint: mint.to_string(),
            wallets: wallets
                .iter()
                .map(|kp| bs58::encode(kp.to_bytes()).into_string())
                .collect(),
            wallet_batch: None,
            target_address: target.to_string(),
            consolidate_sol: true,
            consolidate_tokens: false,
        })
        .await
        .unwrap();

    assert!(report.success);
    let submitted = report
        .outcomes
        .iter()
        .filter(|o| o.status == WalletStatus::Submitted)
        .count();
    assert_eq!(submitted, 2);
    assert!(report.outcomes.iter().all(|o| o.signature.is_some()));
    // sweeps go out individually; the relay never sees them
    assert!(relay.bundles.lock().unwrap().is_empty());
}

#[tokio::test]
async fn endpoint_exhaustion_is_fatal_for_the_flow() {
    let mint = Pubkey::new_unique();
    let creator = Pubkey::new_unique();
    let buyers = vec![Keypair::new()];

    let mut gateway = MockGateway::default();
    let (curve_address, curve_data) = live_curve(&mint, &creator);
    gateway.accounts.insert(curve_address, curve_data);
    gateway.exhausted = true;

    let relay = Arc::new(MockRelay::default());
    let runner = runner(gateway, Arc::clone(&relay));

    let result = runner
        .buy_bundle(&BuyRequest {
            mint: mint.to_string(),
            buyers: buyer_lines(&buyers, 0.1),
            slippage_pct: None,
            bundle_size: None,
        })
        .await;
    assert!(result.is_err());
}
