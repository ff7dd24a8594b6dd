//! Error types for deployment and invocation

use crate::abi::AbiError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Insufficient funds: payer {payer} holds {balance} lamports, {required} recommended")]
    InsufficientFunds {
        payer: Pubkey,
        balance: u64,
        required: u64,
    },

    #[error("RPC error: {0}")]
    Rpc(Box<solana_client::client_error::ClientError>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("Schema mismatch: {0}")]
    Schema(#[from] AbiError),

    #[error("Invalid keypair material for {name}: {reason}")]
    Keypair { name: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<solana_client::client_error::ClientError> for DeployError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        Self::Rpc(Box::new(err))
    }
}

impl DeployError {
    pub fn transport<T: std::fmt::Display>(msg: T) -> Self {
        DeployError::Transport(msg.to_string())
    }

    pub fn configuration<T: std::fmt::Display>(msg: T) -> Self {
        DeployError::Configuration(msg.to_string())
    }

    /// Whether the failure came from the network or submission layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, DeployError::Rpc(_) | DeployError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = DeployError::configuration("Not yet setup payers");
        assert_eq!(err.to_string(), "Invalid configuration: Not yet setup payers");

        let err = DeployError::Schema(AbiError::TruncatedBuffer {
            expected: 9,
            actual: 4,
        });
        assert!(err.to_string().contains("expected at least 9 bytes, got 4"));

        let address = Pubkey::new_unique();
        let err = DeployError::AccountNotFound(address);
        assert!(err.to_string().contains(&address.to_string()));
    }

    #[test]
    fn test_transport_classification() {
        assert!(DeployError::transport("connection refused").is_transport());
        assert!(!DeployError::configuration("missing keypair").is_transport());
        assert!(!DeployError::from(AbiError::MissingField("code".to_string())).is_transport());
    }
}
