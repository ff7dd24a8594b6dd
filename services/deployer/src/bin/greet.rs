//! Say hello to the first deployed register and report its state before and
//! after.

use anyhow::{Context, Result};
use deploy_sdk::{DeployConfig, DeploymentManager, DeploymentStore, Invoker, TracingListener};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    deployer::init_tracing();

    println!("Let's say hello to a Solana account...");
    let config = DeployConfig::from_env()?;
    let (transport, payer) = deployer::connect(&config).await?;

    let manager = DeploymentManager::new(DeploymentStore::local(&config.store_dir), transport.clone());
    let program = manager.deployed_program().await?;
    let registers = manager.deployed_registers().await?;
    let register = registers
        .first()
        .context("No registers deployed, run the deployer first")?;

    let invoker = Invoker::new(transport).with_listener(Arc::new(TracingListener));

    let current = invoker.read_state(register).await?;
    println!("Current data: {}", current);

    println!("Saying hello to {}", register.address);
    invoker
        .invoke(
            "Say hello",
            &payer,
            &program.address,
            register,
            deployer::GREET_OPCODE,
            &deployer::next_greeting(&current),
        )
        .await?;

    let updated = invoker.read_state(register).await?;
    println!("New data: {}", updated);
    println!("Success");
    Ok(())
}
