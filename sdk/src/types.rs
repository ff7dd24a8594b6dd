//! Deployment records and the handles resolved from them

use crate::abi::Schema;
use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::fmt;

/// Persisted record of a deployed program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRecord {
    #[serde(with = "serde_pubkey")]
    pub address: Pubkey,
    #[serde(with = "serde_hex")]
    pub secret_key: Vec<u8>,
    /// Exact content of the deployed binary
    #[serde(with = "serde_hex")]
    pub content_fingerprint: Vec<u8>,
}

/// Persisted record of one deployed register account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRecord {
    pub key: String,
    #[serde(with = "serde_pubkey")]
    pub program: Pubkey,
    pub schema: Schema,
    #[serde(with = "serde_pubkey")]
    pub address: Pubkey,
    #[serde(with = "serde_hex")]
    pub secret_key: Vec<u8>,
}

/// Persisted record of the full register set deployed for a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSetRecord {
    #[serde(with = "serde_pubkey")]
    pub program_address: Pubkey,
    #[serde(default)]
    pub registers: Option<Vec<RegisterRecord>>,
}

/// A register as declared before deployment.
///
/// `program` names the owning program; when absent the register belongs to
/// whichever program it is deployed alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSpec {
    pub key: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_serde_pubkey"
    )]
    pub program: Option<Pubkey>,
    pub schema: Schema,
}

impl RegisterSpec {
    pub fn new(key: impl Into<String>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            program: None,
            schema,
        }
    }

    pub fn owned_by(mut self, program: Pubkey) -> Self {
        self.program = Some(program);
        self
    }

    /// Resolve an unset owner to `program`, leaving `self` untouched.
    pub fn bind(&self, program: &Pubkey) -> RegisterSpec {
        RegisterSpec {
            key: self.key.clone(),
            program: Some(self.program.unwrap_or(*program)),
            schema: self.schema.clone(),
        }
    }
}

/// A deployed register ready for invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub key: String,
    pub program: Pubkey,
    pub schema: Schema,
    pub address: Pubkey,
    secret_key: Vec<u8>,
}

impl Register {
    pub fn keypair(&self) -> Result<Keypair> {
        keypair_from_bytes(&self.key, &self.secret_key)
    }
}

impl From<RegisterRecord> for Register {
    fn from(record: RegisterRecord) -> Self {
        Self {
            key: record.key,
            program: record.program,
            schema: record.schema,
            address: record.address,
            secret_key: record.secret_key,
        }
    }
}

impl From<&Register> for RegisterRecord {
    fn from(register: &Register) -> Self {
        Self {
            key: register.key.clone(),
            program: register.program,
            schema: register.schema.clone(),
            address: register.address,
            secret_key: register.secret_key.clone(),
        }
    }
}

/// Handle to a deployed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHandle {
    pub address: Pubkey,
    /// Whether this run performed the deployment
    pub freshly_deployed: bool,
    secret_key: Vec<u8>,
}

impl ProgramHandle {
    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn keypair(&self) -> Result<Keypair> {
        keypair_from_bytes("program", &self.secret_key)
    }

    pub(crate) fn from_record(record: ProgramRecord, freshly_deployed: bool) -> Self {
        Self {
            address: record.address,
            freshly_deployed,
            secret_key: record.secret_key,
        }
    }
}

/// Outcome of comparing a stored record against the current deployment inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing stored yet
    Missing,
    /// Stored record matches and can be reused
    Fresh,
    /// Stored record no longer matches and must be replaced
    Stale(StaleReason),
}

impl CacheStatus {
    pub fn needs_deployment(&self) -> bool {
        !matches!(self, CacheStatus::Fresh)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    FingerprintChanged {
        stored_len: usize,
        stored_digest: String,
        current_len: usize,
        current_digest: String,
    },
    ProgramChanged {
        stored: Pubkey,
        current: Pubkey,
    },
    RegistersMissing,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::FingerprintChanged {
                stored_len,
                stored_digest,
                current_len,
                current_digest,
            } => write!(
                f,
                "binary changed: stored {} bytes ({}), current {} bytes ({})",
                stored_len, stored_digest, current_len, current_digest
            ),
            StaleReason::ProgramChanged { stored, current } => write!(
                f,
                "registers belong to program {}, current program is {}",
                stored, current
            ),
            StaleReason::RegistersMissing => write!(f, "record holds no registers"),
        }
    }
}

pub(crate) fn keypair_from_bytes(name: &str, bytes: &[u8]) -> Result<Keypair> {
    Keypair::from_bytes(bytes).map_err(|e| DeployError::Keypair {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn register_from_parts(spec: RegisterSpec, owner: Pubkey, account: &Keypair) -> Register {
    Register {
        key: spec.key,
        program: owner,
        schema: spec.schema,
        address: account.pubkey(),
        secret_key: account.to_bytes().to_vec(),
    }
}

pub(crate) fn program_record(account: &Keypair, binary: &[u8]) -> ProgramRecord {
    ProgramRecord {
        address: account.pubkey(),
        secret_key: account.to_bytes().to_vec(),
        content_fingerprint: binary.to_vec(),
    }
}

// Addresses are stored as base58 strings
mod serde_pubkey {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pubkey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s)
            .map_err(|e| serde::de::Error::custom(format!("Invalid address {}: {}", s, e)))
    }
}

mod option_serde_pubkey {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S>(key: &Option<Pubkey>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match key {
            Some(key) => serializer.serialize_some(&key.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Pubkey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                Pubkey::from_str(&s)
                    .map_err(|e| serde::de::Error::custom(format!("Invalid address {}: {}", s, e)))
            })
            .transpose()
    }
}

mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
