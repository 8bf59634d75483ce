use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domains::envelope::{DecryptedEnvelope, ValidatedEnvelope};
use crate::error::DecryptionError;

/// Output of the cryptographic collaborator for one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptResult {
    pub source_service_id: Uuid,
    pub source_device_id: u32,
    pub plaintext: Vec<u8>,
}

#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(
        &self,
        envelope: &ValidatedEnvelope,
    ) -> std::result::Result<DecryptResult, DecryptionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundItem {
    ServerReceipt(ValidatedEnvelope),
    Message(Box<DecryptedEnvelope>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionError),
    /// Storage or another local dependency failed; the server should redeliver.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The envelope can never be processed.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ProcessingError {
    pub fn is_terminal(&self) -> bool {
        match self {
            ProcessingError::Decryption(err) => err.is_terminal(),
            ProcessingError::Transient(_) => false,
            ProcessingError::Rejected(_) => true,
        }
    }
}

pub type ProcessOutcome = std::result::Result<(), ProcessingError>;

/// Downstream consumer of decrypted envelopes and server receipts.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, item: InboundItem) -> ProcessOutcome;
}
