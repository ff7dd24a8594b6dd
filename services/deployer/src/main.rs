//! Deploy the program and its registers, reusing earlier deployments when
//! nothing changed.

use anyhow::{Context, Result};
use deploy_sdk::{DeployConfig, DeploymentManager, DeploymentStore};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    deployer::init_tracing();

    let config = DeployConfig::from_env()?;
    info!("Deploying through {}", config.rpc_url);

    let binary = std::fs::read(&config.program_path).with_context(|| {
        format!("Failed to read program binary {}", config.program_path.display())
    })?;
    let specs = deployer::read_register_specs(&config.registers_path)?;

    let (transport, payer) = deployer::connect(&config).await?;
    let manager = DeploymentManager::new(DeploymentStore::local(&config.store_dir), transport);

    let program = manager.deploy_program_if_needed(&binary, &payer).await?;
    let registers = manager
        .deploy_registers_if_needed(&specs, &payer, &program)
        .await?;

    print!("{}", deployer::summary(&program, &registers));
    Ok(())
}
