//! Network transport used by the deployment manager and invoker
//!
//! The core only talks to the ledger through [`Transport`]. [`RpcTransport`]
//! implements it on top of the nonblocking RPC client; tests use
//! `testing::MockTransport`.

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    bpf_loader_upgradeable::{self, UpgradeableLoaderState},
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::Transaction,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// Bytes of program data carried by each loader write transaction.
pub const WRITE_CHUNK_SIZE: usize = 900;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Lamport balance of `address`
    async fn balance(&self, address: &Pubkey) -> Result<u64>;

    /// Load `binary` as a new executable program and return its key pair
    async fn deploy_binary(&self, payer: &Keypair, binary: &[u8]) -> Result<Keypair>;

    /// Create a rent-exempt account of `space` bytes owned by `owner`
    async fn create_account(&self, payer: &Keypair, space: usize, owner: &Pubkey) -> Result<Keypair>;

    /// Raw account data, `None` when the account does not exist
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Sign with `signers` (the first one pays), submit and wait for confirmation
    async fn submit_and_confirm(
        &self,
        signers: &[&Keypair],
        instructions: &[Instruction],
    ) -> Result<Signature>;
}

/// [`Transport`] backed by a cluster RPC endpoint.
pub struct RpcTransport {
    client: RpcClient,
}

impl RpcTransport {
    /// Connect to `rpc_url` and check that the node answers.
    pub async fn connect(rpc_url: &str, commitment: CommitmentConfig) -> Result<Self> {
        let client = RpcClient::new_with_commitment(rpc_url.to_string(), commitment);
        let version = client.get_version().await?;
        info!(
            "Connection to cluster established: {} (solana-core {})",
            rpc_url, version.solana_core
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for RpcTransport {
    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.client.get_balance(address).await?)
    }

    async fn deploy_binary(&self, payer: &Keypair, binary: &[u8]) -> Result<Keypair> {
        let program = Keypair::new();
        let buffer = Keypair::new();

        let buffer_lamports = self
            .client
            .get_minimum_balance_for_rent_exemption(UpgradeableLoaderState::size_of_buffer(
                binary.len(),
            ))
            .await?;
        let create_buffer = bpf_loader_upgradeable::create_buffer(
            &payer.pubkey(),
            &buffer.pubkey(),
            &payer.pubkey(),
            buffer_lamports,
            binary.len(),
        )
        .map_err(DeployError::transport)?;
        self.submit_and_confirm(&[payer, &buffer], &create_buffer)
            .await?;

        let chunks = binary.len().div_ceil(WRITE_CHUNK_SIZE);
        for (i, chunk) in binary.chunks(WRITE_CHUNK_SIZE).enumerate() {
            let offset = u32::try_from(i * WRITE_CHUNK_SIZE)
                .map_err(|_| DeployError::transport("Program binary too large"))?;
            let write = bpf_loader_upgradeable::write(
                &buffer.pubkey(),
                &payer.pubkey(),
                offset,
                chunk.to_vec(),
            );
            self.submit_and_confirm(&[payer], &[write]).await?;
            debug!("Wrote program chunk {}/{}", i + 1, chunks);
        }

        let program_lamports = self
            .client
            .get_minimum_balance_for_rent_exemption(UpgradeableLoaderState::size_of_program())
            .await?;
        let deploy = bpf_loader_upgradeable::deploy_with_max_program_len(
            &payer.pubkey(),
            &program.pubkey(),
            &buffer.pubkey(),
            &payer.pubkey(),
            program_lamports,
            binary.len() * 2,
        )
        .map_err(DeployError::transport)?;
        self.submit_and_confirm(&[payer, &program], &deploy).await?;

        Ok(program)
    }

    async fn create_account(&self, payer: &Keypair, space: usize, owner: &Pubkey) -> Result<Keypair> {
        let account = Keypair::new();
        let lamports = self
            .client
            .get_minimum_balance_for_rent_exemption(space)
            .await?;
        let instruction = system_instruction::create_account(
            &payer.pubkey(),
            &account.pubkey(),
            lamports,
            space as u64,
            owner,
        );
        self.submit_and_confirm(&[payer, &account], &[instruction])
            .await?;
        Ok(account)
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn submit_and_confirm(
        &self,
        signers: &[&Keypair],
        instructions: &[Instruction],
    ) -> Result<Signature> {
        let payer = signers
            .first()
            .ok_or_else(|| DeployError::transport("Transaction requires at least one signer"))?;

        let recent_blockhash = self.client.get_latest_blockhash().await?;
        let mut transaction =
            Transaction::new_unsigned(Message::new(instructions, Some(&payer.pubkey())));
        transaction
            .try_sign(signers, recent_blockhash)
            .map_err(DeployError::transport)?;

        let signature = self.client.send_and_confirm_transaction(&transaction).await?;
        debug!("Confirmed transaction {}", signature);
        Ok(signature)
    }
}

/// Load the fee payer from a key pair file and check its balance.
///
/// A balance below `min_balance` is only a warning; execution continues.
pub async fn load_payer<T: Transport + ?Sized>(
    keypair_path: &Path,
    min_balance: u64,
    transport: &T,
) -> Result<Keypair> {
    if !keypair_path.exists() {
        return Err(DeployError::configuration(format!(
            "No payer configured: key pair file {} not found",
            keypair_path.display()
        )));
    }
    let payer = read_keypair_file(keypair_path).map_err(|e| {
        DeployError::configuration(format!(
            "Cannot read payer key pair {}: {}",
            keypair_path.display(),
            e
        ))
    })?;

    let balance = transport.balance(&payer.pubkey()).await?;
    if balance < min_balance {
        warn!(
            "{}. You may need to airdrop some to prevent unintended errors.",
            DeployError::InsufficientFunds {
                payer: payer.pubkey(),
                balance,
                required: min_balance,
            }
        );
    }
    Ok(payer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use solana_sdk::signature::write_keypair_file;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_payer_missing_file() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new();

        let result = load_payer(&dir.path().join("id.json"), 0, &transport).await;
        assert!(matches!(result, Err(DeployError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_load_payer_low_balance_continues() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id.json");
        let keypair = Keypair::new();
        write_keypair_file(&keypair, &path).unwrap();

        let transport = MockTransport::new();
        transport.set_balance(&keypair.pubkey(), 5).await;

        let payer = load_payer(&path, 10_000_000_000, &transport).await.unwrap();
        assert_eq!(payer.pubkey(), keypair.pubkey());
    }

    #[tokio::test]
    async fn test_load_payer_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id.json");
        std::fs::write(&path, b"not a keypair").unwrap();

        let transport = MockTransport::new();
        let result = load_payer(&path, 0, &transport).await;
        assert!(matches!(result, Err(DeployError::Configuration(_))));
    }
}
