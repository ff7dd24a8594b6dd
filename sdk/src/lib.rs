//! Deploy SDK - idempotent program and register deployment
//!
//! This SDK provides:
//! - A schema-driven codec for account data and instruction payloads
//! - A persistent record of completed deployments
//! - Deploy-if-needed orchestration for a program and its registers
//! - Instruction building and register reads on top of a transport

pub mod abi;
pub mod config;
pub mod error;
pub mod invoke;
pub mod manager;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod testing;

// Re-export key types
pub use config::{Cluster, DeployConfig};
pub use error::{DeployError, Result};
pub use invoke::{Invoker, TracingListener, TransactionEvent, TransactionListener};
pub use manager::DeploymentManager;
pub use store::{DeploymentStore, InMemoryStorage, LocalStorage, StorageBackend};
pub use transport::{load_payer, RpcTransport, Transport};
pub use types::*;

// Prelude for deployment scripts
pub mod prelude {
    pub use crate::abi::{pack, Field, FieldType, Schema, StructValue, Value};
    pub use crate::invoke::{build_instruction_data, read_account_state, register_instruction};
    pub use crate::{
        DeployConfig, DeployError, DeploymentManager, DeploymentStore, Invoker, ProgramHandle,
        Register, RegisterSpec, RpcTransport, TracingListener, Transport,
    };
}
