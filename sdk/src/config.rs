//! Deployment configuration

use crate::error::{DeployError, Result};
use solana_sdk::{commitment_config::CommitmentConfig, native_token::LAMPORTS_PER_SOL};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const LOCAL_RPC_URL: &str = "http://localhost:8899";

/// Public clusters reachable when `LIVE` is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cluster {
    Devnet,
    Testnet,
    MainnetBeta,
}

impl Cluster {
    pub fn url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }
}

impl FromStr for Cluster {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet-beta" => Ok(Cluster::MainnetBeta),
            other => Err(DeployError::configuration(format!(
                "Unknown cluster {:?}, expected devnet, testnet or mainnet-beta",
                other
            ))),
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::MainnetBeta => "mainnet-beta",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// RPC endpoint to connect to
    pub rpc_url: String,

    /// Commitment used for reads and confirmations
    pub commitment: CommitmentConfig,

    /// Key pair file of the fee payer
    pub keypair_path: PathBuf,

    /// Directory holding the deployment records
    pub store_dir: PathBuf,

    /// Compiled program binary
    pub program_path: PathBuf,

    /// JSON list of register declarations
    pub registers_path: PathBuf,

    /// Payer balance (lamports) below which a warning is logged
    pub min_payer_balance: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: LOCAL_RPC_URL.to_string(),
            commitment: CommitmentConfig::confirmed(),
            keypair_path: expand_path("~/.config/solana/id.json"),
            store_dir: install_root().join("store"),
            program_path: PathBuf::from("dist/program/main.so"),
            registers_path: install_root().join("configs").join("registers.json"),
            min_payer_balance: 10 * LAMPORTS_PER_SOL,
        }
    }
}

impl DeployConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from `lookup`, falling back to defaults for
    /// every unset variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let rpc_url = match lookup("RPC_URL") {
            Some(url) => url,
            None => match live_cluster(&lookup)? {
                Some(cluster) => cluster.url().to_string(),
                None => defaults.rpc_url,
            },
        };

        let commitment = match lookup("COMMITMENT") {
            Some(level) => CommitmentConfig::from_str(&level).map_err(|_| {
                DeployError::configuration(format!("Invalid COMMITMENT {:?}", level))
            })?,
            None => defaults.commitment,
        };

        let min_payer_balance = match lookup("MIN_PAYER_BALANCE") {
            Some(value) => value.parse().map_err(|_| {
                DeployError::configuration(format!("Invalid MIN_PAYER_BALANCE {:?}", value))
            })?,
            None => defaults.min_payer_balance,
        };

        let path = |name: &str, default: PathBuf| lookup(name).map(|p| expand_path(&p)).unwrap_or(default);

        Ok(Self {
            rpc_url,
            commitment,
            keypair_path: path("KEYPAIR_PATH", defaults.keypair_path),
            store_dir: path("STORE_DIR", defaults.store_dir),
            program_path: path("PROGRAM_PATH", defaults.program_path),
            registers_path: path("REGISTERS_PATH", defaults.registers_path),
            min_payer_balance,
        })
    }
}

/// Cluster selected through `LIVE` and `CLUSTER`, `None` for a local node.
fn live_cluster<F>(lookup: &F) -> Result<Option<Cluster>>
where
    F: Fn(&str) -> Option<String>,
{
    if lookup("LIVE").map_or(true, |live| live.is_empty()) {
        return Ok(None);
    }
    let cluster = lookup("CLUSTER").unwrap_or_default();
    cluster.parse().map(Some)
}

/// Workspace root the tool is built from. Deployment records default to a
/// fixed directory beneath it, whatever the working directory of a run.
pub fn install_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DeployConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DeployConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.rpc_url, LOCAL_RPC_URL);
        assert_eq!(config.commitment, CommitmentConfig::confirmed());
        assert!(config.store_dir.is_absolute());
        assert_eq!(config.store_dir, install_root().join("store"));
        assert_eq!(config.min_payer_balance, 10 * LAMPORTS_PER_SOL);
        assert!(!config.keypair_path.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_default_paths_ignore_working_directory() {
        let config = load(&[]).unwrap();
        assert!(install_root().join("sdk").join("Cargo.toml").exists());
        assert!(config.registers_path.is_absolute());
        assert!(config.registers_path.exists());

        // A relative override is taken as given
        let config = load(&[("STORE_DIR", "records")]).unwrap();
        assert_eq!(config.store_dir, PathBuf::from("records"));
    }

    #[test]
    fn test_live_cluster() {
        let config = load(&[("LIVE", "1"), ("CLUSTER", "devnet")]).unwrap();
        assert_eq!(config.rpc_url, "https://api.devnet.solana.com");

        let config = load(&[("LIVE", "1"), ("CLUSTER", "mainnet-beta")]).unwrap();
        assert_eq!(config.rpc_url, Cluster::MainnetBeta.url());
    }

    #[test]
    fn test_unknown_cluster_rejected() {
        assert!(matches!(
            load(&[("LIVE", "1"), ("CLUSTER", "moonnet")]),
            Err(DeployError::Configuration(_))
        ));
        assert!(load(&[("LIVE", "1")]).is_err());
    }

    #[test]
    fn test_cluster_ignored_when_not_live() {
        let config = load(&[("CLUSTER", "moonnet")]).unwrap();
        assert_eq!(config.rpc_url, LOCAL_RPC_URL);
    }

    #[test]
    fn test_rpc_url_wins() {
        let config = load(&[
            ("RPC_URL", "http://10.0.0.5:8899"),
            ("LIVE", "1"),
            ("CLUSTER", "testnet"),
        ])
        .unwrap();
        assert_eq!(config.rpc_url, "http://10.0.0.5:8899");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("COMMITMENT", "finalized"),
            ("MIN_PAYER_BALANCE", "5"),
            ("STORE_DIR", "/tmp/deployments"),
            ("PROGRAM_PATH", "target/deploy/pool.so"),
        ])
        .unwrap();
        assert_eq!(config.commitment, CommitmentConfig::finalized());
        assert_eq!(config.min_payer_balance, 5);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/deployments"));
        assert_eq!(config.program_path, PathBuf::from("target/deploy/pool.so"));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(load(&[("MIN_PAYER_BALANCE", "ten")]).is_err());
        assert!(load(&[("COMMITMENT", "eventually")]).is_err());
    }
}
