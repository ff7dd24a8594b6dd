//! Shared plumbing for the deployment binaries

use anyhow::{Context, Result};
use deploy_sdk::abi::StructValue;
use deploy_sdk::{load_payer, DeployConfig, ProgramHandle, Register, RegisterSpec, RpcTransport};
use solana_sdk::signature::Keypair;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Opcode of the greeting instruction
pub const GREET_OPCODE: u8 = 0;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect to the configured cluster and load the fee payer.
pub async fn connect(config: &DeployConfig) -> Result<(Arc<RpcTransport>, Keypair)> {
    let transport = Arc::new(RpcTransport::connect(&config.rpc_url, config.commitment).await?);
    let payer = load_payer(&config.keypair_path, config.min_payer_balance, transport.as_ref()).await?;
    Ok((transport, payer))
}

/// Read the JSON list of register declarations.
pub fn read_register_specs(path: &Path) -> Result<Vec<RegisterSpec>> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read register declarations {}", path.display()))?;
    serde_json::from_slice(&content)
        .with_context(|| format!("Invalid register declarations in {}", path.display()))
}

/// Human-readable deployment summary
pub fn summary(program: &ProgramHandle, registers: &[Register]) -> String {
    let mut out = String::from("Deployment Info:\n");
    let _ = writeln!(out, "\tProgram: {}", program.address);
    for register in registers {
        let _ = writeln!(out, "\tRegister '{}': {}", register.key, register.address);
    }
    out
}

/// Next greeting: one more greet with the toggle flipped.
pub fn next_greeting(current: &StructValue) -> StructValue {
    let toggle = current
        .get("toggleState")
        .and_then(|v| v.as_bool())
        .unwrap_or_default();
    StructValue::new()
        .with("numGreets", 1u32)
        .with("toggleState", !toggle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_sdk::abi::FieldType;
    use deploy_sdk::testing::MockTransport;
    use deploy_sdk::{DeploymentManager, DeploymentStore};

    #[test]
    fn test_read_register_specs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registers.json");
        std::fs::write(
            &path,
            r#"[
                {"key": "pool", "schema": [
                    {"key": "code", "type": "u8"},
                    {"key": "reserve", "type": "u64"},
                    {"key": "lpt", "type": "u64"}
                ]},
                {"key": "owner", "schema": [{"key": "owner", "type": "pub"}]}
            ]"#,
        )
        .unwrap();

        let specs = read_register_specs(&path).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].schema.span().unwrap(), 17);
        assert_eq!(specs[1].schema.fields()[0].ty, FieldType::Address);
    }

    #[test]
    fn test_read_register_specs_rejects_unknown_type() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registers.json");
        std::fs::write(&path, r#"[{"key": "x", "schema": [{"key": "v", "type": "u128"}]}]"#).unwrap();

        assert!(read_register_specs(&path).is_err());
        assert!(read_register_specs(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_next_greeting_flips_toggle() {
        let current = StructValue::new()
            .with("numGreets", 4u32)
            .with("toggleState", true);
        let next = next_greeting(&current);
        assert_eq!(next.get("toggleState").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(next.get("numGreets").and_then(|v| v.as_u64()), Some(1));
    }

    #[tokio::test]
    async fn test_summary_lists_registers_in_order() {
        let transport = Arc::new(MockTransport::new());
        let manager = DeploymentManager::new(DeploymentStore::in_memory(), transport);
        let payer = Keypair::new();
        let specs: Vec<RegisterSpec> = serde_json::from_str(
            r#"[{"key": "first", "schema": [{"key": "a", "type": "u8"}]},
                {"key": "second", "schema": [{"key": "b", "type": "bool"}]}]"#,
        )
        .unwrap();

        let program = manager.deploy_program_if_needed(&[1, 2], &payer).await.unwrap();
        let registers = manager
            .deploy_registers_if_needed(&specs, &payer, &program)
            .await
            .unwrap();

        let text = summary(&program, &registers);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Deployment Info:");
        assert_eq!(lines[1], format!("\tProgram: {}", program.address));
        assert_eq!(lines[2], format!("\tRegister 'first': {}", registers[0].address));
        assert_eq!(lines[3], format!("\tRegister 'second': {}", registers[1].address));
    }
}
