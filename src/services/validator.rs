use std::collections::HashMap;

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::domains::envelope::{
    CiphertextType, EnvelopeSource, EnvelopeType, Kind, LocalIdentities, LocalIdentity,
    RawEnvelope, ValidatedEnvelope,
};
use crate::error::ValidationError;

/// Which envelope kinds may be addressed to which local identity.
const KIND_DESTINATION_POLICY: [((Kind, LocalIdentity), bool); 12] = [
    ((Kind::ServerReceipt, LocalIdentity::Primary), true),
    ((Kind::ServerReceipt, LocalIdentity::Secondary), true),
    ((Kind::IdentifiedSender(CiphertextType::PreKey), LocalIdentity::Primary), true),
    ((Kind::IdentifiedSender(CiphertextType::PreKey), LocalIdentity::Secondary), true),
    ((Kind::IdentifiedSender(CiphertextType::Whisper), LocalIdentity::Primary), true),
    ((Kind::IdentifiedSender(CiphertextType::Whisper), LocalIdentity::Secondary), false),
    ((Kind::IdentifiedSender(CiphertextType::SenderKey), LocalIdentity::Primary), true),
    ((Kind::IdentifiedSender(CiphertextType::SenderKey), LocalIdentity::Secondary), false),
    ((Kind::IdentifiedSender(CiphertextType::Plaintext), LocalIdentity::Primary), true),
    ((Kind::IdentifiedSender(CiphertextType::Plaintext), LocalIdentity::Secondary), false),
    ((Kind::UnidentifiedSender, LocalIdentity::Primary), true),
    ((Kind::UnidentifiedSender, LocalIdentity::Secondary), false),
];

static KIND_DESTINATION_TABLE: Lazy<HashMap<(Kind, LocalIdentity), bool>> =
    Lazy::new(|| KIND_DESTINATION_POLICY.into_iter().collect());

/// Pairs missing from the table are rejected.
pub fn is_allowed(kind: Kind, identity: LocalIdentity) -> bool {
    KIND_DESTINATION_TABLE
        .get(&(kind, identity))
        .copied()
        .unwrap_or(false)
}

pub fn kind_for(envelope_type: Option<EnvelopeType>) -> Result<Kind, ValidationError> {
    match envelope_type {
        Some(EnvelopeType::Receipt) => Ok(Kind::ServerReceipt),
        Some(EnvelopeType::Ciphertext) => Ok(Kind::IdentifiedSender(CiphertextType::Whisper)),
        Some(EnvelopeType::PrekeyBundle) => Ok(Kind::IdentifiedSender(CiphertextType::PreKey)),
        Some(EnvelopeType::SenderkeyMessage) => {
            Ok(Kind::IdentifiedSender(CiphertextType::SenderKey))
        }
        Some(EnvelopeType::PlaintextContent) => {
            Ok(Kind::IdentifiedSender(CiphertextType::Plaintext))
        }
        Some(EnvelopeType::UnidentifiedSender) => Ok(Kind::UnidentifiedSender),
        Some(EnvelopeType::KeyExchange) | Some(EnvelopeType::Unknown) | None => {
            Err(ValidationError::UnsupportedType)
        }
    }
}

pub struct EnvelopeValidator {
    identities: LocalIdentities,
}

impl EnvelopeValidator {
    pub fn new(identities: LocalIdentities) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &LocalIdentities {
        &self.identities
    }

    pub fn validate(&self, raw: &RawEnvelope) -> Result<ValidatedEnvelope, ValidationError> {
        validate(raw, &self.identities)
    }
}

pub fn validate(
    raw: &RawEnvelope,
    identities: &LocalIdentities,
) -> Result<ValidatedEnvelope, ValidationError> {
    if raw.timestamp < 1 || !fits_in_i64(raw.timestamp) {
        return Err(ValidationError::InvalidTimestamp);
    }
    let server_timestamp = match raw.server_timestamp {
        Some(value) if fits_in_i64(value) => value,
        _ => return Err(ValidationError::InvalidServerTimestamp),
    };

    let kind = kind_for(raw.envelope_type)?;
    let local_identity = resolve_destination(raw.destination_uuid.as_deref(), identities)?;
    if !is_allowed(kind, local_identity) {
        return Err(ValidationError::InvalidKindForDestination);
    }

    let source = match kind {
        Kind::UnidentifiedSender => None,
        Kind::ServerReceipt | Kind::IdentifiedSender(_) => Some(parse_source(raw)?),
    };

    let content = match kind {
        Kind::ServerReceipt => raw.content.clone(),
        _ => match &raw.content {
            Some(bytes) if !bytes.is_empty() => Some(bytes.clone()),
            _ => return Err(ValidationError::MissingContent),
        },
    };

    Ok(ValidatedEnvelope {
        timestamp: raw.timestamp,
        server_timestamp,
        server_delivery_timestamp: None,
        kind,
        local_identity,
        source,
        content,
        server_guid: raw.guid.clone().filter(|guid| !guid.is_empty()),
        story: raw.story,
        spam_reporting_token: raw.report_spam_token.clone().filter(|token| !token.is_empty()),
    })
}

fn resolve_destination(
    destination: Option<&str>,
    identities: &LocalIdentities,
) -> Result<LocalIdentity, ValidationError> {
    let destination = match destination.map(str::trim) {
        None | Some("") => return Ok(LocalIdentity::Primary),
        Some(value) => value,
    };
    let parsed = Uuid::parse_str(destination).map_err(|_| ValidationError::WrongDestination)?;
    identities
        .resolve(&parsed)
        .ok_or(ValidationError::WrongDestination)
}

fn parse_source(raw: &RawEnvelope) -> Result<EnvelopeSource, ValidationError> {
    let service_id = raw
        .source_uuid
        .as_deref()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(ValidationError::InvalidSource)?;
    let device_id = raw
        .source_device
        .filter(|device| *device >= 1)
        .ok_or(ValidationError::InvalidSource)?;
    Ok(EnvelopeSource {
        service_id,
        device_id,
    })
}

fn fits_in_i64(value: u64) -> bool {
    i64::try_from(value).is_ok()
}
