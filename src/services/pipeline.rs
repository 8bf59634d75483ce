use std::sync::Arc;

use tracing::{debug, warn};

use crate::domains::envelope::{AckInfo, Kind, MalformedEnvelope, RawEnvelope, ValidatedEnvelope};
use crate::error::ValidationError;
use crate::interfaces::processing::{
    Decryptor, InboundItem, MessageProcessor, ProcessOutcome, ProcessingError,
};
use crate::services::ack::AckManager;
use crate::services::decrypted::DecryptedEnvelopeBuilder;
use crate::services::validator::EnvelopeValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBehavior {
    ShouldAck,
    ShouldNotAck,
}

impl AckBehavior {
    pub fn from_outcome(outcome: &ProcessOutcome) -> Self {
        match outcome {
            Ok(()) => AckBehavior::ShouldAck,
            Err(err) if err.is_terminal() => AckBehavior::ShouldAck,
            Err(_) => AckBehavior::ShouldNotAck,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Dropped(ValidationError),
    Processed {
        outcome: ProcessOutcome,
        ack: AckBehavior,
    },
}

/// Validation, decryption, processing and acknowledgment for single envelopes.
pub struct MessagePipeline {
    validator: EnvelopeValidator,
    decryptor: Arc<dyn Decryptor>,
    processor: Arc<dyn MessageProcessor>,
    acks: AckManager,
}

impl MessagePipeline {
    pub fn new(
        validator: EnvelopeValidator,
        decryptor: Arc<dyn Decryptor>,
        processor: Arc<dyn MessageProcessor>,
        acks: AckManager,
    ) -> Self {
        Self {
            validator,
            decryptor,
            processor,
            acks,
        }
    }

    pub fn acks(&self) -> &AckManager {
        &self.acks
    }

    pub fn validator(&self) -> &EnvelopeValidator {
        &self.validator
    }

    pub async fn route(
        &self,
        raw: RawEnvelope,
        server_delivery_timestamp: Option<u64>,
    ) -> RouteOutcome {
        let envelope = match self.validator.validate(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    timestamp = raw.timestamp,
                    server_guid = ?raw.guid,
                    "dropping envelope: {err}"
                );
                // Acked so the server stops redelivering something we can never read.
                self.acks.acknowledge(AckInfo {
                    server_guid: raw.guid.clone(),
                    timestamp: raw.timestamp,
                });
                return RouteOutcome::Dropped(err);
            }
        };
        let envelope = match server_delivery_timestamp {
            Some(value) => envelope.with_server_delivery_timestamp(value),
            None => envelope,
        };

        let ack_info = envelope.ack_info();
        let outcome = self.process(envelope).await;
        let ack = AckBehavior::from_outcome(&outcome);
        match (&outcome, ack) {
            (Err(err), AckBehavior::ShouldNotAck) => {
                warn!(timestamp = ack_info.timestamp, "processing failed, withholding ack: {err}")
            }
            (Err(err), AckBehavior::ShouldAck) => {
                debug!(timestamp = ack_info.timestamp, "processing failed terminally: {err}")
            }
            _ => {}
        }
        if ack == AckBehavior::ShouldAck {
            self.acks.acknowledge(ack_info);
        }
        RouteOutcome::Processed { outcome, ack }
    }

    /// Drops an entry that never decoded, acknowledging it when its guid could be read.
    pub fn drop_malformed(&self, entry: &MalformedEnvelope) -> RouteOutcome {
        warn!(
            timestamp = entry.timestamp,
            server_guid = ?entry.server_guid,
            "dropping undecodable envelope: {}",
            entry.reason
        );
        self.acks.acknowledge(AckInfo {
            server_guid: entry.server_guid.clone(),
            timestamp: entry.timestamp,
        });
        RouteOutcome::Dropped(ValidationError::Malformed)
    }

    async fn process(&self, envelope: ValidatedEnvelope) -> ProcessOutcome {
        if envelope.kind() == Kind::ServerReceipt {
            return self
                .processor
                .process(InboundItem::ServerReceipt(envelope))
                .await;
        }
        let decrypted = self
            .decryptor
            .decrypt(&envelope)
            .await
            .map_err(ProcessingError::Decryption)?;
        let decrypted = DecryptedEnvelopeBuilder::build(&envelope, decrypted)?;
        self.processor
            .process(InboundItem::Message(Box::new(decrypted)))
            .await
    }
}
