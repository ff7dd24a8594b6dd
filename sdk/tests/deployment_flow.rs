//! End-to-end deployment runs against a directory store and the mock ledger

use deploy_sdk::abi::{Field, FieldType, Schema, StructValue};
use deploy_sdk::testing::MockTransport;
use deploy_sdk::{
    CacheStatus, DeploymentManager, DeploymentStore, Invoker, RegisterSpec, StaleReason,
};
use solana_sdk::signature::Keypair;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn pool_specs() -> Vec<RegisterSpec> {
    vec![
        RegisterSpec::new(
            "pool",
            Schema::new(vec![
                Field::new("code", FieldType::U8),
                Field::new("reserve", FieldType::U64),
                Field::new("lpt", FieldType::U64),
            ])
            .unwrap(),
        ),
        RegisterSpec::new(
            "treasury",
            Schema::new(vec![Field::new("owner", FieldType::Address)]).unwrap(),
        ),
    ]
}

/// A fresh manager over the same directory, as a new process would build it
fn run(dir: &Path, transport: &Arc<MockTransport>) -> DeploymentManager<MockTransport> {
    DeploymentManager::new(DeploymentStore::local(dir.join("store")), transport.clone())
}

#[tokio::test]
async fn test_second_run_reuses_everything() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let payer = Keypair::new();
    let binary = vec![0x7f, b'E', b'L', b'F', 1, 2, 3];

    let first = run(dir.path(), &transport);
    let program = first.deploy_program_if_needed(&binary, &payer).await.unwrap();
    let registers = first
        .deploy_registers_if_needed(&pool_specs(), &payer, &program)
        .await
        .unwrap();

    let second = run(dir.path(), &transport);
    assert_eq!(second.program_status(&binary).await, CacheStatus::Fresh);
    let program_again = second.deploy_program_if_needed(&binary, &payer).await.unwrap();
    let registers_again = second
        .deploy_registers_if_needed(&pool_specs(), &payer, &program_again)
        .await
        .unwrap();

    assert_eq!(program_again.address, program.address);
    assert_eq!(registers_again, registers);
    assert_eq!(transport.deploy_calls(), 1);
    assert_eq!(transport.create_calls(), 2);
}

#[tokio::test]
async fn test_rebuilt_binary_replaces_program_and_registers() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let payer = Keypair::new();

    let first = run(dir.path(), &transport);
    let program = first.deploy_program_if_needed(&[1, 2, 3], &payer).await.unwrap();
    let registers = first
        .deploy_registers_if_needed(&pool_specs(), &payer, &program)
        .await
        .unwrap();

    let second = run(dir.path(), &transport);
    let rebuilt = second.deploy_program_if_needed(&[1, 2, 4], &payer).await.unwrap();
    assert_ne!(rebuilt.address, program.address);
    assert_eq!(
        second.register_status(&rebuilt.address).await,
        CacheStatus::Stale(StaleReason::ProgramChanged {
            stored: program.address,
            current: rebuilt.address,
        })
    );

    let redeployed = second
        .deploy_registers_if_needed(&pool_specs(), &payer, &rebuilt)
        .await
        .unwrap();
    assert_eq!(redeployed.len(), registers.len());
    for (old, new) in registers.iter().zip(&redeployed) {
        assert_eq!(old.key, new.key);
        assert_ne!(old.address, new.address);
        assert_eq!(new.program, rebuilt.address);
    }
    assert_eq!(second.deployed_registers().await.unwrap(), redeployed);
}

#[tokio::test]
async fn test_deployed_registers_can_be_invoked() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new().with_handler(|instruction, _| {
        instruction
            .accounts
            .iter()
            .map(|meta| (meta.pubkey, instruction.data[1..].to_vec()))
            .collect()
    }));
    let payer = Keypair::new();

    let manager = run(dir.path(), &transport);
    let program = manager.deploy_program_if_needed(&[9], &payer).await.unwrap();
    manager
        .deploy_registers_if_needed(&pool_specs(), &payer, &program)
        .await
        .unwrap();

    // Invocation scripts resolve everything from the store
    let scripts = run(dir.path(), &transport);
    let program = scripts.deployed_program().await.unwrap();
    let registers = scripts.deployed_registers().await.unwrap();
    let pool = &registers[0];

    let invoker = Invoker::new(transport.clone());
    let initial = invoker.read_state(pool).await.unwrap();
    assert_eq!(initial.get("reserve").and_then(|v| v.as_u64()), Some(0));

    let values = StructValue::new()
        .with("code", 0u8)
        .with("reserve", 5000u64)
        .with("lpt", 5000u64);
    invoker
        .invoke("Initialize pool", &payer, &program.address, pool, 0, &values)
        .await
        .unwrap();

    assert_eq!(invoker.read_state(pool).await.unwrap(), values);
}

#[tokio::test]
async fn test_failed_first_run_leaves_no_record() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let payer = Keypair::new();
    transport.fail_deploys(true);

    let manager = run(dir.path(), &transport);
    assert!(manager.deploy_program_if_needed(&[1], &payer).await.is_err());
    assert!(!dir.path().join("store").join("program").exists());

    transport.fail_deploys(false);
    let retry = run(dir.path(), &transport);
    assert_eq!(retry.program_status(&[1]).await, CacheStatus::Missing);
    assert!(retry.deploy_program_if_needed(&[1], &payer).await.is_ok());
    assert_eq!(transport.deploy_calls(), 2);
}
