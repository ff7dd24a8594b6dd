//! Instruction building and register reads
//!
//! Instruction data is a one byte opcode followed by a payload encoded
//! against the target register's schema. Sent transactions are reported to
//! an optional [`TransactionListener`].

use crate::abi::{pack, Schema, StructValue};
use crate::error::{DeployError, Result};
use crate::transport::Transport;
use crate::types::Register;
use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Encode `opcode` followed by `values` laid out by `schema`.
pub fn build_instruction_data(opcode: u8, schema: &Schema, values: &StructValue) -> Result<Vec<u8>> {
    let payload = schema.encode(values)?;
    Ok(pack(&[vec![opcode], payload]))
}

/// Instruction for `program` acting on `register` as its only, writable account.
pub fn register_instruction(
    program: &Pubkey,
    register: &Register,
    opcode: u8,
    values: &StructValue,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id: *program,
        accounts: vec![AccountMeta::new(register.address, false)],
        data: build_instruction_data(opcode, &register.schema, values)?,
    })
}

/// Fetch and decode the current content of `register`.
pub async fn read_account_state<T: Transport + ?Sized>(
    register: &Register,
    transport: &T,
) -> Result<StructValue> {
    let data = transport
        .account_data(&register.address)
        .await?
        .ok_or(DeployError::AccountNotFound(register.address))?;
    debug!(
        "Read {} bytes from register {} ({})",
        data.len(),
        register.key,
        register.address
    );
    Ok(register.schema.decode(&data)?)
}

// ================================
// Transaction Events
// ================================

/// Summary of one instruction inside a sent transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionSummary {
    pub keys: Vec<String>,
    pub program_id: String,
    /// Hex encoded instruction data
    pub data: String,
}

impl From<&Instruction> for InstructionSummary {
    fn from(instruction: &Instruction) -> Self {
        Self {
            keys: instruction
                .accounts
                .iter()
                .map(|meta| meta.pubkey.to_string())
                .collect(),
            program_id: instruction.program_id.to_string(),
            data: hex::encode(&instruction.data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionDetails {
    /// RFC 3339 timestamp of submission
    pub time: String,
    pub signature: String,
    pub instructions: Vec<InstructionSummary>,
}

/// Emitted once per confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionEvent {
    pub title: String,
    pub details: TransactionDetails,
}

impl TransactionEvent {
    pub fn new(
        title: impl Into<String>,
        sent_at: DateTime<Utc>,
        signature: &Signature,
        instructions: &[Instruction],
    ) -> Self {
        Self {
            title: title.into(),
            details: TransactionDetails {
                time: sent_at.to_rfc3339(),
                signature: signature.to_string(),
                instructions: instructions.iter().map(InstructionSummary::from).collect(),
            },
        }
    }
}

pub trait TransactionListener: Send + Sync {
    fn on_transaction(&self, event: &TransactionEvent);
}

/// Logs every transaction event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl TransactionListener for TracingListener {
    fn on_transaction(&self, event: &TransactionEvent) {
        info!(
            signature = %event.details.signature,
            instructions = event.details.instructions.len(),
            "{}",
            event.title
        );
        if let Ok(details) = serde_json::to_string(&event.details) {
            debug!("{}", details);
        }
    }
}

// ================================
// Invoker
// ================================

/// Sends instructions and reads registers through a shared transport.
pub struct Invoker<T: Transport> {
    transport: Arc<T>,
    listener: Option<Arc<dyn TransactionListener>>,
}

impl<T: Transport> Invoker<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn TransactionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Submit `instructions`, wait for confirmation and notify the listener.
    pub async fn send(
        &self,
        title: &str,
        signers: &[&Keypair],
        instructions: &[Instruction],
    ) -> Result<Signature> {
        let sent_at = Utc::now();
        let signature = self
            .transport
            .submit_and_confirm(signers, instructions)
            .await?;

        if let Some(listener) = &self.listener {
            listener.on_transaction(&TransactionEvent::new(
                title,
                sent_at,
                &signature,
                instructions,
            ));
        }
        Ok(signature)
    }

    /// Encode and send a single-register instruction.
    pub async fn invoke(
        &self,
        title: &str,
        payer: &Keypair,
        program: &Pubkey,
        register: &Register,
        opcode: u8,
        values: &StructValue,
    ) -> Result<Signature> {
        let instruction = register_instruction(program, register, opcode, values)?;
        self.send(title, &[payer], &[instruction]).await
    }

    pub async fn read_state(&self, register: &Register) -> Result<StructValue> {
        read_account_state(register, self.transport.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiError, Field, FieldType};
    use crate::testing::MockTransport;
    use crate::types::{register_from_parts, RegisterSpec};
    use std::sync::Mutex;
    use std::time::Duration;

    fn greeting_schema() -> Schema {
        Schema::new(vec![
            Field::new("numGreets", FieldType::U32),
            Field::new("toggleState", FieldType::Bool),
        ])
        .unwrap()
    }

    fn greeter(program: &Pubkey) -> Register {
        register_from_parts(
            RegisterSpec::new("greeter", greeting_schema()),
            *program,
            &Keypair::new(),
        )
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TransactionEvent>>,
    }

    impl TransactionListener for Recorder {
        fn on_transaction(&self, event: &TransactionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_instruction_data_layout() {
        let values = StructValue::new()
            .with("numGreets", 1u32)
            .with("toggleState", true);
        let data = build_instruction_data(0, &greeting_schema(), &values).unwrap();
        assert_eq!(data, vec![0, 1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_instruction_data_missing_field() {
        let values = StructValue::new().with("numGreets", 1u32);
        let result = build_instruction_data(0, &greeting_schema(), &values);
        assert!(matches!(
            result,
            Err(DeployError::Schema(AbiError::MissingField(_)))
        ));
    }

    #[tokio::test]
    async fn test_read_missing_account() {
        let transport = MockTransport::new();
        let register = greeter(&Pubkey::new_unique());

        let result = read_account_state(&register, &transport).await;
        assert!(matches!(result, Err(DeployError::AccountNotFound(address)) if address == register.address));
    }

    #[tokio::test]
    async fn test_read_short_account() {
        let transport = MockTransport::new();
        let program = Pubkey::new_unique();
        let register = greeter(&program);
        transport
            .set_account_data(&register.address, &program, vec![1, 0])
            .await;

        let result = read_account_state(&register, &transport).await;
        assert!(matches!(
            result,
            Err(DeployError::Schema(AbiError::TruncatedBuffer {
                expected: 5,
                actual: 2
            }))
        ));
    }

    #[tokio::test]
    async fn test_invoke_updates_state_and_notifies() {
        let program = Pubkey::new_unique();
        let register = greeter(&program);
        let schema = greeting_schema();

        // Greeter program: store the payload that follows the opcode
        let transport = Arc::new(MockTransport::new().with_handler(move |instruction, _| {
            instruction
                .accounts
                .iter()
                .map(|meta| (meta.pubkey, instruction.data[1..].to_vec()))
                .collect()
        }));
        transport
            .set_account_data(&register.address, &program, vec![0; 5])
            .await;

        let recorder = Arc::new(Recorder::default());
        let invoker = Invoker::new(transport.clone()).with_listener(recorder.clone());
        let payer = Keypair::new();

        let before = invoker.read_state(&register).await.unwrap();
        assert_eq!(before.get("numGreets").and_then(|v| v.as_u64()), Some(0));

        let values = StructValue::new()
            .with("numGreets", 1u32)
            .with("toggleState", true);
        let signature = invoker
            .invoke("Greet", &payer, &program, &register, 0, &values)
            .await
            .unwrap();

        let after = invoker.read_state(&register).await.unwrap();
        assert_eq!(after, schema.decode(&schema.encode(&values).unwrap()).unwrap());

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.title, "Greet");
        assert_eq!(event.details.signature, signature.to_string());
        assert_eq!(
            event.details.instructions,
            vec![InstructionSummary {
                keys: vec![register.address.to_string()],
                program_id: program.to_string(),
                data: "000100000001".to_string(),
            }]
        );
        drop(events);

        assert_eq!(transport.submit_calls(), 1);
        let submitted = transport.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0][0].data, vec![0, 1, 0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_event_time_is_submission_time() {
        let transport = Arc::new(MockTransport::new());
        transport.delay_submits(Duration::from_millis(50)).await;
        let recorder = Arc::new(Recorder::default());
        let invoker = Invoker::new(transport).with_listener(recorder.clone());

        let before = Utc::now();
        invoker
            .send("Slow", &[&Keypair::new()], &[])
            .await
            .unwrap();
        let after = Utc::now();

        let events = recorder.events.lock().unwrap();
        let time = DateTime::parse_from_rfc3339(&events[0].details.time)
            .unwrap()
            .with_timezone(&Utc);
        assert!(time >= before);
        assert!((after - time).num_milliseconds() >= 50);
    }

    #[tokio::test]
    async fn test_failed_send_is_not_reported() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_submits(true);
        let recorder = Arc::new(Recorder::default());
        let invoker = Invoker::new(transport.clone()).with_listener(recorder.clone());

        let result = invoker.send("Nothing", &[&Keypair::new()], &[]).await;
        assert!(result.unwrap_err().is_transport());
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(transport.submitted().await.is_empty());
    }
}
