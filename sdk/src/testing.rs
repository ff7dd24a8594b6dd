//! In-memory transport double for tests
//!
//! [`MockTransport`] keeps a fake ledger of accounts, counts calls per
//! operation and lets tests inject failures or per-call delays.

use crate::error::{DeployError, Result};
use crate::transport::Transport;
use async_trait::async_trait;
use solana_sdk::{
    bpf_loader_upgradeable,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Account as seen by the mock ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAccount {
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Simulated program behaviour: given a submitted instruction, returns the
/// account writes it performs.
pub type InstructionHandler =
    Box<dyn Fn(&Instruction, &HashMap<Pubkey, MockAccount>) -> Vec<(Pubkey, Vec<u8>)> + Send + Sync>;

#[derive(Default)]
struct Ledger {
    balances: HashMap<Pubkey, u64>,
    accounts: HashMap<Pubkey, MockAccount>,
    binaries: Vec<Vec<u8>>,
    submitted: Vec<Vec<Instruction>>,
}

#[derive(Default)]
pub struct MockTransport {
    ledger: Mutex<Ledger>,
    handler: Option<InstructionHandler>,
    deploy_calls: AtomicUsize,
    create_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    fail_deploys: AtomicBool,
    fail_submits: AtomicBool,
    fail_create_at: Mutex<Option<usize>>,
    create_delays: Mutex<VecDeque<Duration>>,
    submit_delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler that applies submitted instructions to the ledger.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Instruction, &HashMap<Pubkey, MockAccount>) -> Vec<(Pubkey, Vec<u8>)>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub async fn set_balance(&self, address: &Pubkey, lamports: u64) {
        self.ledger.lock().await.balances.insert(*address, lamports);
    }

    pub async fn set_account_data(&self, address: &Pubkey, owner: &Pubkey, data: Vec<u8>) {
        self.ledger.lock().await.accounts.insert(
            *address,
            MockAccount {
                owner: *owner,
                data,
            },
        );
    }

    pub async fn account(&self, address: &Pubkey) -> Option<MockAccount> {
        self.ledger.lock().await.accounts.get(address).cloned()
    }

    /// Binaries loaded through `deploy_binary`, in call order
    pub async fn deployed_binaries(&self) -> Vec<Vec<u8>> {
        self.ledger.lock().await.binaries.clone()
    }

    /// Instruction lists passed to `submit_and_confirm`, in call order
    pub async fn submitted(&self) -> Vec<Vec<Instruction>> {
        self.ledger.lock().await.submitted.clone()
    }

    pub fn deploy_calls(&self) -> usize {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn fail_deploys(&self, fail: bool) {
        self.fail_deploys.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }

    /// Make the `index`-th `create_account` call (zero based) fail.
    pub async fn fail_create_at(&self, index: usize) {
        *self.fail_create_at.lock().await = Some(index);
    }

    /// Delay successive `create_account` calls by the given durations.
    pub async fn delay_creates(&self, delays: impl IntoIterator<Item = Duration>) {
        self.create_delays.lock().await.extend(delays);
    }

    /// Hold every `submit_and_confirm` call for `delay` before it lands.
    pub async fn delay_submits(&self, delay: Duration) {
        *self.submit_delay.lock().await = Some(delay);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self
            .ledger
            .lock()
            .await
            .balances
            .get(address)
            .copied()
            .unwrap_or_default())
    }

    async fn deploy_binary(&self, _payer: &Keypair, binary: &[u8]) -> Result<Keypair> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deploys.load(Ordering::SeqCst) {
            return Err(DeployError::transport("simulated deployment failure"));
        }

        let program = Keypair::new();
        let mut ledger = self.ledger.lock().await;
        ledger.binaries.push(binary.to_vec());
        ledger.accounts.insert(
            program.pubkey(),
            MockAccount {
                owner: bpf_loader_upgradeable::id(),
                data: binary.to_vec(),
            },
        );
        Ok(program)
    }

    async fn create_account(&self, _payer: &Keypair, space: usize, owner: &Pubkey) -> Result<Keypair> {
        let index = self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.create_delays.lock().await.pop_front();
        let fail = *self.fail_create_at.lock().await == Some(index);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(DeployError::transport(format!(
                "simulated account creation failure (call {})",
                index
            )));
        }

        let account = Keypair::new();
        self.ledger.lock().await.accounts.insert(
            account.pubkey(),
            MockAccount {
                owner: *owner,
                data: vec![0; space],
            },
        );
        Ok(account)
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .ledger
            .lock()
            .await
            .accounts
            .get(address)
            .map(|account| account.data.clone()))
    }

    async fn submit_and_confirm(
        &self,
        signers: &[&Keypair],
        instructions: &[Instruction],
    ) -> Result<Signature> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if signers.is_empty() {
            return Err(DeployError::transport("Transaction requires at least one signer"));
        }
        if self.fail_submits.load(Ordering::SeqCst) {
            return Err(DeployError::transport("simulated submission failure"));
        }
        let delay = *self.submit_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut ledger = self.ledger.lock().await;
        ledger.submitted.push(instructions.to_vec());
        if let Some(handler) = &self.handler {
            for instruction in instructions {
                for (address, data) in handler(instruction, &ledger.accounts) {
                    if let Some(account) = ledger.accounts.get_mut(&address) {
                        account.data = data;
                    }
                }
            }
        }
        Ok(Signature::new_unique())
    }
}
