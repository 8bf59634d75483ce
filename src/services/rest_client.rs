use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::domains::envelope::{MalformedEnvelope, RawEnvelope, RestBatch};
use crate::error::{AckError, IntakeError, Result};
use crate::interfaces::transport::{Acknowledger, MessageSource};

pub const SERVER_DELIVERY_TIMESTAMP_HEADER: &str = "x-signal-timestamp";
const MESSAGES_PATH: &str = "/v1/messages";

#[derive(Deserialize)]
struct WireBatch {
    messages: Vec<Value>,
    #[serde(default)]
    more: Option<Value>,
}

/// REST pull transport and acknowledgment endpoint of the delivery server.
pub struct RestMessageClient {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

impl RestMessageClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| IntakeError::Http(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim().to_string(),
            username: config.username.clone().filter(|v| !v.trim().is_empty()),
            password: config.password.clone(),
            http,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }
}

#[async_trait]
impl MessageSource for RestMessageClient {
    async fn fetch_batch(&self) -> Result<RestBatch> {
        let url = join_url(&self.base_url, MESSAGES_PATH);
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e: reqwest::Error| IntakeError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IntakeError::Http(format!("fetch messages failed: {status}")));
        }
        let header = delivery_timestamp_header(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e: reqwest::Error| IntakeError::Http(e.to_string()))?;
        parse_batch(&body, header.as_deref())
    }
}

#[async_trait]
impl Acknowledger for RestMessageClient {
    async fn acknowledge(&self, server_guid: &str) -> std::result::Result<(), AckError> {
        if server_guid.trim().is_empty() {
            return Err(AckError::MissingServerGuid);
        }
        let path = format!("{MESSAGES_PATH}/uuid/{}", urlencoding::encode(server_guid));
        let url = join_url(&self.base_url, &path);
        let response = self
            .authorize(self.http.delete(url))
            .send()
            .await
            .map_err(|e: reqwest::Error| AckError::Http(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            debug!(server_guid, "acknowledged delivery");
            Ok(())
        } else {
            Err(AckError::Http(format!("ack failed: {status}")))
        }
    }
}

fn delivery_timestamp_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SERVER_DELIVERY_TIMESTAMP_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).to_string())
}

/// Decodes one fetch-batch response. The delivery timestamp header is mandatory.
pub fn parse_batch(body: &[u8], delivery_timestamp: Option<&str>) -> Result<RestBatch> {
    let raw = delivery_timestamp.ok_or(IntakeError::MissingDeliveryTimestamp)?;
    let server_delivery_timestamp = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| IntakeError::InvalidDeliveryTimestamp(raw.to_string()))?;

    let wire: WireBatch =
        serde_json::from_slice(body).map_err(|e| IntakeError::Serialization(e.to_string()))?;
    let has_more = match wire.more {
        Some(Value::Bool(more)) => more,
        other => {
            warn!(more = ?other, "fetch batch response has no boolean `more`; assuming false");
            false
        }
    };

    let mut envelopes = Vec::with_capacity(wire.messages.len());
    let mut malformed = Vec::new();
    for message in wire.messages {
        match decode_envelope(message) {
            Ok(envelope) => envelopes.push(envelope),
            Err(entry) => {
                warn!(
                    server_guid = ?entry.server_guid,
                    timestamp = entry.timestamp,
                    "undecodable envelope in batch: {}",
                    entry.reason
                );
                malformed.push(entry);
            }
        }
    }

    Ok(RestBatch {
        envelopes,
        malformed,
        server_delivery_timestamp,
        has_more,
    })
}

fn decode_envelope(message: Value) -> std::result::Result<RawEnvelope, MalformedEnvelope> {
    let server_guid = message
        .get("guid")
        .and_then(Value::as_str)
        .filter(|guid| !guid.is_empty())
        .map(str::to_string);
    let timestamp = message
        .get("timestamp")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    serde_json::from_value(message).map_err(|e| MalformedEnvelope {
        server_guid,
        timestamp,
        reason: e.to_string(),
    })
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
