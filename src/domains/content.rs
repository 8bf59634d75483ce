use serde::{Deserialize, Serialize};
use serde_json::Value;

const PADDING_TERMINATOR: u8 = 0x80;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_message: Option<DataMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_message: Option<ReceiptMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing_message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_message: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_timer: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub receipt_type: Option<String>,
    #[serde(default)]
    pub timestamps: Vec<u64>,
}

impl Content {
    pub fn parse(plaintext: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(plaintext)
    }

    pub fn is_empty(&self) -> bool {
        self == &Content::default()
    }
}

/// Removes trailing `0x80 00 00 ...` transport padding. Input without a terminator is returned as-is.
pub fn strip_padding(plaintext: &[u8]) -> &[u8] {
    let Some(last) = plaintext.iter().rposition(|byte| *byte != 0) else {
        return plaintext;
    };
    if plaintext[last] == PADDING_TERMINATOR {
        &plaintext[..last]
    } else {
        plaintext
    }
}
