use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::content::Content;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum EnvelopeType {
    Unknown,
    Ciphertext,
    KeyExchange,
    PrekeyBundle,
    Receipt,
    UnidentifiedSender,
    SenderkeyMessage,
    PlaintextContent,
}

impl From<i32> for EnvelopeType {
    fn from(value: i32) -> Self {
        match value {
            1 => EnvelopeType::Ciphertext,
            2 => EnvelopeType::KeyExchange,
            3 => EnvelopeType::PrekeyBundle,
            5 => EnvelopeType::Receipt,
            6 => EnvelopeType::UnidentifiedSender,
            7 => EnvelopeType::SenderkeyMessage,
            8 => EnvelopeType::PlaintextContent,
            _ => EnvelopeType::Unknown,
        }
    }
}

impl From<EnvelopeType> for i32 {
    fn from(value: EnvelopeType) -> Self {
        match value {
            EnvelopeType::Unknown => 0,
            EnvelopeType::Ciphertext => 1,
            EnvelopeType::KeyExchange => 2,
            EnvelopeType::PrekeyBundle => 3,
            EnvelopeType::Receipt => 5,
            EnvelopeType::UnidentifiedSender => 6,
            EnvelopeType::SenderkeyMessage => 7,
            EnvelopeType::PlaintextContent => 8,
        }
    }
}

/// Envelope as delivered by the server, before any classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub envelope_type: Option<EnvelopeType>,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_device: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default)]
    pub story: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub report_spam_token: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiphertextType {
    Whisper,
    PreKey,
    SenderKey,
    Plaintext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    ServerReceipt,
    IdentifiedSender(CiphertextType),
    UnidentifiedSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalIdentity {
    Primary,
    Secondary,
}

/// The two service identifiers this client can be addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIdentities {
    pub primary: Uuid,
    pub secondary: Option<Uuid>,
}

impl LocalIdentities {
    pub fn new(primary: Uuid, secondary: Option<Uuid>) -> Self {
        Self { primary, secondary }
    }

    pub fn resolve(&self, destination: &Uuid) -> Option<LocalIdentity> {
        if *destination == self.primary {
            return Some(LocalIdentity::Primary);
        }
        match self.secondary {
            Some(secondary) if secondary == *destination => Some(LocalIdentity::Secondary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeSource {
    pub service_id: Uuid,
    pub device_id: u32,
}

/// An envelope that passed classification. Only the validator constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEnvelope {
    pub(crate) timestamp: u64,
    pub(crate) server_timestamp: u64,
    pub(crate) server_delivery_timestamp: Option<u64>,
    pub(crate) kind: Kind,
    pub(crate) local_identity: LocalIdentity,
    pub(crate) source: Option<EnvelopeSource>,
    pub(crate) content: Option<Vec<u8>>,
    pub(crate) server_guid: Option<String>,
    pub(crate) story: bool,
    pub(crate) spam_reporting_token: Option<Vec<u8>>,
}

impl ValidatedEnvelope {
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn server_timestamp(&self) -> u64 {
        self.server_timestamp
    }

    pub fn server_delivery_timestamp(&self) -> Option<u64> {
        self.server_delivery_timestamp
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn local_identity(&self) -> LocalIdentity {
        self.local_identity
    }

    /// Present for server receipts and identified senders; sealed-sender envelopes hide it.
    pub fn source(&self) -> Option<EnvelopeSource> {
        self.source
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    pub fn server_guid(&self) -> Option<&str> {
        self.server_guid.as_deref()
    }

    pub fn is_story(&self) -> bool {
        self.story
    }

    pub fn spam_reporting_token(&self) -> Option<&[u8]> {
        self.spam_reporting_token.as_deref()
    }

    pub fn with_server_delivery_timestamp(mut self, value: u64) -> Self {
        self.server_delivery_timestamp = Some(value);
        self
    }

    pub fn ack_info(&self) -> AckInfo {
        AckInfo {
            server_guid: self.server_guid.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// What the acknowledgment path needs to know about a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckInfo {
    pub server_guid: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedEnvelope {
    pub source_service_id: Uuid,
    pub source_device_id: u32,
    pub timestamp: u64,
    pub server_timestamp: u64,
    pub server_delivery_timestamp: Option<u64>,
    pub local_identity: LocalIdentity,
    pub was_received_by_unidentified_delivery: bool,
    pub plaintext: Vec<u8>,
    pub content: Option<Content>,
    pub server_guid: Option<String>,
    pub story: bool,
    pub spam_reporting_token: Option<Vec<u8>>,
}

/// Batch entry that could not be decoded into a `RawEnvelope`. Identifiers are read
/// best-effort from the undecoded JSON so the entry can still be acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEnvelope {
    pub server_guid: Option<String>,
    pub timestamp: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestBatch {
    pub envelopes: Vec<RawEnvelope>,
    pub malformed: Vec<MalformedEnvelope>,
    pub server_delivery_timestamp: u64,
    pub has_more: bool,
}

impl RestBatch {
    pub fn len(&self) -> usize {
        self.envelopes.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod base64_opt {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(text) => BASE64
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
