//! Deploy-if-needed orchestration
//!
//! The manager decides from the persisted records whether the program and its
//! registers have to be (re)deployed, drives the transport when they do, and
//! only records a deployment once every transport call has succeeded.

use crate::error::{DeployError, Result};
use crate::store::{DeploymentStore, PROGRAM_RECORD, REGISTER_RECORD};
use crate::transport::Transport;
use crate::types::{
    program_record, register_from_parts, CacheStatus, ProgramHandle, ProgramRecord, Register,
    RegisterRecord, RegisterSetRecord, RegisterSpec, StaleReason,
};
use futures::future::try_join_all;
use sha2::{Digest, Sha256};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DeploymentManager<T: Transport> {
    store: DeploymentStore,
    transport: Arc<T>,
}

impl<T: Transport> DeploymentManager<T> {
    pub fn new(store: DeploymentStore, transport: Arc<T>) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> &DeploymentStore {
        &self.store
    }

    // ================================
    // Program
    // ================================

    /// Compare the stored program record against `binary` without deploying.
    pub async fn program_status(&self, binary: &[u8]) -> CacheStatus {
        let record: Option<ProgramRecord> = self.store.load(PROGRAM_RECORD).await;
        program_cache(record.as_ref(), binary)
    }

    /// Program recorded by the last successful deployment.
    pub async fn deployed_program(&self) -> Result<ProgramHandle> {
        self.store
            .load::<ProgramRecord>(PROGRAM_RECORD)
            .await
            .map(|record| ProgramHandle::from_record(record, false))
            .ok_or_else(|| DeployError::configuration("No program has been deployed yet"))
    }

    /// Deploy `binary` unless the stored record holds exactly the same bytes.
    pub async fn deploy_program_if_needed(
        &self,
        binary: &[u8],
        payer: &Keypair,
    ) -> Result<ProgramHandle> {
        let stored: Option<ProgramRecord> = self.store.load(PROGRAM_RECORD).await;
        match program_cache(stored.as_ref(), binary) {
            CacheStatus::Fresh => {
                if let Some(record) = stored {
                    info!("Program already deployed at {}", record.address);
                    return Ok(ProgramHandle::from_record(record, false));
                }
            }
            CacheStatus::Stale(reason) => warn!("Stored program is stale, redeploying: {}", reason),
            CacheStatus::Missing => info!("No program deployed yet"),
        }

        info!("Deploying program ({} bytes)", binary.len());
        let account = self.transport.deploy_binary(payer, binary).await?;

        let record = program_record(&account, binary);
        self.store.save(PROGRAM_RECORD, &record).await?;
        info!("Program deployed at {}", record.address);

        Ok(ProgramHandle::from_record(record, true))
    }

    // ================================
    // Registers
    // ================================

    /// Compare the stored register set against `program` without deploying.
    pub async fn register_status(&self, program: &Pubkey) -> CacheStatus {
        let record: Option<RegisterSetRecord> = self.store.load(REGISTER_RECORD).await;
        register_cache(record.as_ref(), program)
    }

    /// Registers recorded by the last successful deployment.
    pub async fn deployed_registers(&self) -> Result<Vec<Register>> {
        self.store
            .load::<RegisterSetRecord>(REGISTER_RECORD)
            .await
            .and_then(|record| record.registers)
            .map(|records| records.into_iter().map(Register::from).collect())
            .ok_or_else(|| DeployError::configuration("No registers have been deployed yet"))
    }

    /// Deploy one account per spec unless the stored set belongs to `program`.
    ///
    /// The result is in the same order as `specs`. The register set record is
    /// written once, after every account has been created.
    pub async fn deploy_registers_if_needed(
        &self,
        specs: &[RegisterSpec],
        payer: &Keypair,
        program: &ProgramHandle,
    ) -> Result<Vec<Register>> {
        let program_address = program.address();
        let stored: Option<RegisterSetRecord> = self.store.load(REGISTER_RECORD).await;

        match register_cache(stored.as_ref(), &program_address) {
            CacheStatus::Fresh => {
                let registers: Vec<Register> = stored
                    .and_then(|record| record.registers)
                    .unwrap_or_default()
                    .into_iter()
                    .map(Register::from)
                    .collect();
                info!(
                    "{} registers already deployed for program {}",
                    registers.len(),
                    program_address
                );
                return Ok(registers);
            }
            CacheStatus::Stale(reason) => {
                warn!("Stored registers are stale, redeploying: {}", reason)
            }
            CacheStatus::Missing => info!("No registers deployed yet"),
        }

        let bound: Vec<RegisterSpec> = specs.iter().map(|spec| spec.bind(&program_address)).collect();
        let spaces = bound
            .iter()
            .map(|spec| spec.schema.span())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!("Deploying {} registers", bound.len());
        let registers = try_join_all(
            bound
                .into_iter()
                .zip(spaces)
                .map(|(spec, space)| self.deploy_register(spec, space, payer, &program_address)),
        )
        .await?;

        let record = RegisterSetRecord {
            program_address,
            registers: Some(registers.iter().map(RegisterRecord::from).collect()),
        };
        self.store.save(REGISTER_RECORD, &record).await?;

        for register in &registers {
            info!("Register {} deployed at {}", register.key, register.address);
        }
        Ok(registers)
    }

    async fn deploy_register(
        &self,
        spec: RegisterSpec,
        space: usize,
        payer: &Keypair,
        program: &Pubkey,
    ) -> Result<Register> {
        let owner = spec.program.unwrap_or(*program);
        let account = self.transport.create_account(payer, space, &owner).await?;
        debug!(
            "Created {} byte account {} for register {}",
            space,
            account.pubkey(),
            spec.key
        );
        Ok(register_from_parts(spec, owner, &account))
    }
}

fn program_cache(stored: Option<&ProgramRecord>, binary: &[u8]) -> CacheStatus {
    match stored {
        None => CacheStatus::Missing,
        Some(record) if record.content_fingerprint == binary => CacheStatus::Fresh,
        Some(record) => CacheStatus::Stale(StaleReason::FingerprintChanged {
            stored_len: record.content_fingerprint.len(),
            stored_digest: digest(&record.content_fingerprint),
            current_len: binary.len(),
            current_digest: digest(binary),
        }),
    }
}

fn register_cache(stored: Option<&RegisterSetRecord>, program: &Pubkey) -> CacheStatus {
    match stored {
        None => CacheStatus::Missing,
        Some(record) if record.program_address != *program => {
            CacheStatus::Stale(StaleReason::ProgramChanged {
                stored: record.program_address,
                current: *program,
            })
        }
        Some(record) if record.registers.is_none() => {
            CacheStatus::Stale(StaleReason::RegistersMissing)
        }
        Some(_) => CacheStatus::Fresh,
    }
}

/// Short digest used to describe binaries in logs
fn digest(bytes: &[u8]) -> String {
    hex::encode(&Sha256::digest(bytes)[..8])
}
