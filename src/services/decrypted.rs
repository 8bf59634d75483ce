use tracing::debug;

use crate::domains::content::{strip_padding, Content};
use crate::domains::envelope::{DecryptedEnvelope, Kind, ValidatedEnvelope};
use crate::interfaces::processing::{DecryptResult, ProcessingError};

pub struct DecryptedEnvelopeBuilder;

impl DecryptedEnvelopeBuilder {
    /// Unifies identified and sealed-sender results. A content parse failure leaves
    /// `content` empty but still yields an envelope.
    pub fn build(
        envelope: &ValidatedEnvelope,
        decrypted: DecryptResult,
    ) -> Result<DecryptedEnvelope, ProcessingError> {
        let was_sealed_sender = match envelope.kind() {
            Kind::ServerReceipt => {
                return Err(ProcessingError::Rejected(
                    "server receipts carry no ciphertext".to_string(),
                ))
            }
            Kind::IdentifiedSender(_) => false,
            Kind::UnidentifiedSender => true,
        };

        let plaintext = strip_padding(&decrypted.plaintext).to_vec();
        let content = match Content::parse(&plaintext) {
            Ok(content) => Some(content),
            Err(err) => {
                debug!(
                    timestamp = envelope.timestamp(),
                    "content did not parse: {err}"
                );
                None
            }
        };

        Ok(DecryptedEnvelope {
            source_service_id: decrypted.source_service_id,
            source_device_id: decrypted.source_device_id,
            timestamp: envelope.timestamp(),
            server_timestamp: envelope.server_timestamp(),
            server_delivery_timestamp: envelope.server_delivery_timestamp(),
            local_identity: envelope.local_identity(),
            was_received_by_unidentified_delivery: was_sealed_sender,
            plaintext,
            content,
            server_guid: envelope.server_guid().map(str::to_string),
            story: envelope.is_story(),
            spam_reporting_token: envelope.spam_reporting_token().map(<[u8]>::to_vec),
        })
    }
}
